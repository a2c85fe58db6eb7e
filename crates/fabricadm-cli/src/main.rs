mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CLIENT_ERROR, EXIT_FAILURE, EXIT_VALIDATION_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "fabricadm",
    version,
    about = "Set up network fabrics (overlay networking) for a datacenter"
)]
struct Cli {
    /// Tool configuration file (default: $FABRICADM_CONFIG or ~/.config/fabricadm/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision the fabric services and apply a fabric configuration.
    Fabrics {
        /// Fabric configuration JSON file.
        #[arg(short = 'c', long = "conf")]
        conf: PathBuf,
        /// Replace a stored fabric configuration that differs.
        #[arg(short, long, default_value_t = false)]
        reconfigure: bool,
    },
    /// Check a fabric configuration against the schema and live network state.
    Validate {
        /// Fabric configuration JSON file.
        #[arg(short = 'c', long = "conf")]
        conf: PathBuf,
    },
    /// Print the stored fabric configuration.
    Show,
    /// Print the fabric configuration JSON schema.
    Schema,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FABRICADM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Fabrics { conf, reconfigure } => {
            commands::fabrics::run(config, &conf, reconfigure, json_output)
        }
        Commands::Validate { conf } => commands::validate::run(config, &conf, json_output),
        Commands::Show => commands::show::run(config, json_output),
        Commands::Schema => commands::schema::run(),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("validation error:") {
                EXIT_VALIDATION_ERROR
            } else if msg.starts_with("client error") {
                EXIT_CLIENT_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
