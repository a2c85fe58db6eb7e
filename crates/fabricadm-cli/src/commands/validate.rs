use super::{json_pretty, load_pipeline, SpinnerObserver, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config: Option<&Path>, conf: &Path, json: bool) -> Result<u8, String> {
    let pipeline = load_pipeline(config)?;
    let observer = SpinnerObserver::new(json);
    let fabric = pipeline
        .validate(conf, &observer)
        .map_err(|e| e.to_string())?;

    if json {
        let payload = serde_json::json!({
            "valid": true,
            "config": fabric,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{} is a valid fabric configuration", conf.display());
    }
    Ok(EXIT_SUCCESS)
}
