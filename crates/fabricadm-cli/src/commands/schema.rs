use super::{json_pretty, EXIT_SUCCESS};

pub fn run() -> Result<u8, String> {
    println!("{}", json_pretty(&fabricadm_schema::fabric_cfg_schema())?);
    Ok(EXIT_SUCCESS)
}
