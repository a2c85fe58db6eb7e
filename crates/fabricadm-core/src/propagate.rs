use crate::dependent::DOCKER_SERVICE;
use crate::CoreError;
use fabricadm_remote::CommandRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Services reloaded on every configuration change, in order.
pub const FIXED_DEPENDENTS: [&str; 3] = ["napi", "vmapi", "dhcpd"];

pub const DEFAULT_RELOAD_COMMAND: &str = "svcadm restart config-agent";

pub const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

/// How to wait for restarted services before reporting success.
pub trait ReadinessWait: Send + Sync {
    fn wait(&self, services: &[String]);
}

/// Sleep for a fixed duration regardless of service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl Default for FixedDelay {
    fn default() -> Self {
        Self(DEFAULT_SETTLE)
    }
}

impl ReadinessWait for FixedDelay {
    fn wait(&self, services: &[String]) {
        if self.0.is_zero() {
            return;
        }
        info!(
            "waiting {}s for {} to settle",
            self.0.as_secs(),
            services.join(", ")
        );
        std::thread::sleep(self.0);
    }
}

/// Reloads the services that consume the fabric configuration.
pub struct PropagationCoordinator {
    runner: Arc<dyn CommandRunner>,
    readiness: Arc<dyn ReadinessWait>,
    command: String,
}

impl PropagationCoordinator {
    pub fn new(runner: Arc<dyn CommandRunner>, readiness: Arc<dyn ReadinessWait>) -> Self {
        Self {
            runner,
            readiness,
            command: DEFAULT_RELOAD_COMMAND.to_owned(),
        }
    }

    #[must_use]
    pub fn with_command(mut self, command: &str) -> Self {
        self.command = command.to_owned();
        self
    }

    /// The services reloaded for a change, in order.
    pub fn targets(dependent_present: bool) -> Vec<&'static str> {
        let mut targets = FIXED_DEPENDENTS.to_vec();
        if dependent_present {
            targets.push(DOCKER_SERVICE);
        }
        targets
    }

    /// Reload every target in sequence and wait for them to settle.
    ///
    /// Does nothing when nothing changed. Stops at the first failing service.
    /// Returns the services reloaded.
    pub fn propagate(
        &self,
        changed: bool,
        dependent_present: bool,
    ) -> Result<Vec<String>, CoreError> {
        if !changed {
            info!("fabric configuration unchanged, nothing to propagate");
            return Ok(Vec::new());
        }
        let mut restarted = Vec::new();
        for service in Self::targets(dependent_present) {
            info!("running '{}' on {service}", self.command);
            self.runner
                .run(service, &self.command)
                .map_err(|e| CoreError::client(service, e))?;
            restarted.push(service.to_owned());
        }
        self.readiness.wait(&restarted);
        Ok(restarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabricadm_remote::MockDatacenter;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWait(Mutex<Vec<Vec<String>>>);

    impl ReadinessWait for RecordingWait {
        fn wait(&self, services: &[String]) {
            self.0.lock().unwrap().push(services.to_vec());
        }
    }

    fn setup() -> (Arc<MockDatacenter>, Arc<RecordingWait>, PropagationCoordinator) {
        let dc = Arc::new(MockDatacenter::new());
        let wait = Arc::new(RecordingWait::default());
        let coordinator = PropagationCoordinator::new(dc.clone(), wait.clone());
        (dc, wait, coordinator)
    }

    #[test]
    fn unchanged_is_noop() {
        let (dc, wait, c) = setup();
        assert!(c.propagate(false, true).unwrap().is_empty());
        assert!(dc.commands().is_empty());
        assert!(wait.0.lock().unwrap().is_empty());
    }

    #[test]
    fn fixed_services_in_order() {
        let (dc, wait, c) = setup();
        let restarted = c.propagate(true, false).unwrap();
        assert_eq!(restarted, vec!["napi", "vmapi", "dhcpd"]);
        let commands = dc.commands();
        assert_eq!(commands.len(), 3);
        assert!(commands.iter().all(|(_, cmd)| cmd == DEFAULT_RELOAD_COMMAND));
        assert_eq!(wait.0.lock().unwrap().as_slice(), &[restarted]);
    }

    #[test]
    fn dependent_appended_last() {
        let (dc, _wait, c) = setup();
        c.propagate(true, true).unwrap();
        let services: Vec<String> = dc.commands().into_iter().map(|(s, _)| s).collect();
        assert_eq!(services, vec!["napi", "vmapi", "dhcpd", "docker"]);
    }

    #[test]
    fn first_failure_aborts_and_skips_wait() {
        let (dc, wait, c) = setup();
        dc.fail_commands_on("vmapi");
        let err = c.propagate(true, true).unwrap_err();
        assert!(matches!(err, CoreError::Client { ref service, .. } if service == "vmapi"));
        let services: Vec<String> = dc.commands().into_iter().map(|(s, _)| s).collect();
        assert_eq!(services, vec!["napi", "vmapi"]);
        assert!(wait.0.lock().unwrap().is_empty());
    }

    #[test]
    fn custom_command() {
        let (dc, _wait, c) = setup();
        let c = c.with_command("svcadm refresh config-agent");
        c.propagate(true, false).unwrap();
        assert_eq!(dc.commands()[0].1, "svcadm refresh config-agent");
    }

    #[test]
    fn zero_delay_returns_immediately() {
        FixedDelay(Duration::ZERO).wait(&["napi".to_owned()]);
        assert_eq!(FixedDelay::default().0, DEFAULT_SETTLE);
    }
}
