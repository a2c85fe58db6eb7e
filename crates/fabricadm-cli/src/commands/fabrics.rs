use super::{json_pretty, load_pipeline, yes_no, SpinnerObserver, EXIT_SUCCESS};
use fabricadm_core::{PipelineOptions, PipelineReport};
use std::path::Path;

pub fn run(
    config: Option<&Path>,
    conf: &Path,
    reconfigure: bool,
    json: bool,
) -> Result<u8, String> {
    let pipeline = load_pipeline(config)?;
    let observer = SpinnerObserver::new(json);
    let options = PipelineOptions {
        config_path: conf.to_path_buf(),
        allow_overwrite: reconfigure,
    };
    let report = pipeline
        .run(&options, &observer)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(EXIT_SUCCESS)
}

fn print_report(report: &PipelineReport) {
    println!("headnode: {}", report.node_id);
    for svc in &report.services {
        println!(
            "{}: service {} (created: {}), instance {} (created: {}), image {} {}",
            svc.name,
            svc.service_uuid,
            yes_no(svc.service_created),
            svc.instance_uuid,
            yes_no(svc.instance_created),
            svc.image_uuid,
            svc.image_version
        );
    }
    println!("fabric configuration: {}", report.config);
    if report.restarted.is_empty() {
        println!("no services restarted");
    } else {
        println!("restarted config-agent on: {}", report.restarted.join(", "));
    }
    for notice in &report.notices {
        println!("note: {notice}");
    }
}
