//! Collaborators backed by local processes and files on the headnode.

use crate::{CommandRunner, NodeResolver, RemoteError, ScriptResolver};
use std::path::PathBuf;
use std::process::Command;

/// Resolves the node identity by running `sysinfo` and reading its `UUID`.
pub struct SysinfoResolver {
    program: String,
}

impl Default for SysinfoResolver {
    fn default() -> Self {
        Self {
            program: "sysinfo".to_owned(),
        }
    }
}

impl NodeResolver for SysinfoResolver {
    fn current_node_id(&self) -> Result<String, RemoteError> {
        let output = Command::new(&self.program).output()?;
        if !output.status.success() {
            return Err(RemoteError::Command {
                service: "headnode".to_owned(),
                command: self.program.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        parse_sysinfo_uuid(&output.stdout)
    }
}

fn parse_sysinfo_uuid(stdout: &[u8]) -> Result<String, RemoteError> {
    let info: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| RemoteError::Serialization(format!("invalid sysinfo output: {e}")))?;
    info.get("UUID")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| RemoteError::Serialization("sysinfo output has no UUID".to_owned()))
}

/// A node identity fixed by configuration.
pub struct StaticNodeResolver(pub String);

impl NodeResolver for StaticNodeResolver {
    fn current_node_id(&self) -> Result<String, RemoteError> {
        Ok(self.0.clone())
    }
}

/// Reads the shared startup script from a file.
pub struct FileScriptResolver {
    path: PathBuf,
}

impl FileScriptResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScriptResolver for FileScriptResolver {
    fn user_script(&self) -> Result<String, RemoteError> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            RemoteError::Config(format!(
                "cannot read user script {}: {e}",
                self.path.display()
            ))
        })
    }
}

/// Runs commands in a service zone through a login wrapper.
///
/// The template is split on whitespace; a `{service}` token is replaced by the
/// service name and a `{command}` token expands to the command's words, e.g.
/// `sdc-login -l {service} {command}`.
pub struct LoginCommandRunner {
    template: Vec<String>,
}

impl LoginCommandRunner {
    pub fn new(template: &str) -> Result<Self, RemoteError> {
        let template: Vec<String> = template.split_whitespace().map(str::to_owned).collect();
        if template.is_empty() {
            return Err(RemoteError::Config("empty login command template".to_owned()));
        }
        if !template.iter().any(|t| t == "{command}") {
            return Err(RemoteError::Config(
                "login command template has no {command} placeholder".to_owned(),
            ));
        }
        Ok(Self { template })
    }

    /// Expand the template into argv.
    pub fn argv(&self, service: &str, command: &str) -> Vec<String> {
        let mut argv = Vec::new();
        for token in &self.template {
            if token == "{command}" {
                argv.extend(command.split_whitespace().map(str::to_owned));
            } else {
                argv.push(token.replace("{service}", service));
            }
        }
        argv
    }
}

impl CommandRunner for LoginCommandRunner {
    fn run(&self, service: &str, command: &str) -> Result<(), RemoteError> {
        let argv = self.argv(service, command);
        tracing::debug!("running {argv:?}");
        let Some((program, args)) = argv.split_first() else {
            return Err(RemoteError::Config(format!("nothing to run for '{service}'")));
        };
        let output = Command::new(program).args(args).output()?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            Err(RemoteError::Command {
                service: service.to_owned(),
                command: command.to_owned(),
                message: if stderr.is_empty() {
                    output.status.to_string()
                } else {
                    stderr
                },
            })
        }
    }
}
