use super::{json_pretty, load_pipeline, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config: Option<&Path>, json: bool) -> Result<u8, String> {
    let pipeline = load_pipeline(config)?;
    let current = pipeline.current_config().map_err(|e| e.to_string())?;
    match current {
        Some(cfg) => println!("{}", json_pretty(&cfg)?),
        None if json => println!("null"),
        None => println!("no fabric configuration stored"),
    }
    Ok(EXIT_SUCCESS)
}
