pub mod completions;
pub mod fabrics;
pub mod man_pages;
pub mod schema;
pub mod show;
pub mod validate;

use fabricadm_core::{select_backend, CoreError, FabricsPipeline, Stage, StageObserver, ToolConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_VALIDATION_ERROR: u8 = 2;
pub const EXIT_CLIENT_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(finished_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(finished_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn yes_no(flag: bool) -> String {
    use console::Style;
    if flag {
        Style::new().green().apply_to("yes").to_string()
    } else {
        Style::new().dim().apply_to("no").to_string()
    }
}

/// Build the pipeline from the tool configuration.
pub fn load_pipeline(config: Option<&Path>) -> Result<FabricsPipeline, String> {
    let path = ToolConfig::resolve_path(config).map_err(|e| CoreError::from(e).to_string())?;
    let tool = ToolConfig::load(&path).map_err(|e| CoreError::from(e).to_string())?;
    tracing::debug!("using {} backend from {}", tool.backend, path.display());
    let collaborators = select_backend(&tool).map_err(|e| CoreError::from(e).to_string())?;
    Ok(FabricsPipeline::from_config(&collaborators, &tool))
}

/// One spinner per pipeline stage; silent in JSON mode.
pub struct SpinnerObserver {
    enabled: bool,
    current: RefCell<Option<ProgressBar>>,
}

impl SpinnerObserver {
    pub fn new(json: bool) -> Self {
        Self {
            enabled: !json,
            current: RefCell::new(None),
        }
    }
}

impl StageObserver for SpinnerObserver {
    fn stage_started(&self, stage: Stage) {
        if self.enabled {
            *self.current.borrow_mut() = Some(spinner(&format!("{}...", stage.description())));
        }
    }

    fn stage_finished(&self, stage: Stage) {
        if let Some(pb) = self.current.borrow_mut().take() {
            spin_ok(&pb, stage.description());
        }
    }

    fn stage_failed(&self, stage: Stage, _err: &CoreError) {
        if let Some(pb) = self.current.borrow_mut().take() {
            spin_fail(&pb, &format!("{} failed", stage.description()));
        }
    }
}
