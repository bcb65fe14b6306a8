use std::sync::Arc;
use std::time::Duration;

use crate::app::adb::runner::{CommandOutput, CommandRunner, ProcessRunner};
use crate::app::config::TimeoutSettings;
use crate::app::error::CommandError;

/// Placeholder a front-end shows when no device is attached. Never a real serial.
pub const NO_DEVICE_SENTINEL: &str = "No devices found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTimeouts {
    pub probe: Duration,
    pub devices: Duration,
    pub packages: Duration,
    pub uninstall: Duration,
}

impl Default for BridgeTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(5),
            devices: Duration::from_secs(10),
            packages: Duration::from_secs(60),
            uninstall: Duration::from_secs(60),
        }
    }
}

impl From<&TimeoutSettings> for BridgeTimeouts {
    fn from(settings: &TimeoutSettings) -> Self {
        Self {
            probe: Duration::from_secs(settings.probe_secs),
            devices: Duration::from_secs(settings.devices_secs),
            packages: Duration::from_secs(settings.packages_secs),
            uninstall: Duration::from_secs(settings.uninstall_secs),
        }
    }
}

/// The configured bridge executable plus the runner used to invoke it.
///
/// The program path is fixed at construction and shared read-only between the control
/// path and uninstall workers.
#[derive(Clone)]
pub struct AdbBridge {
    runner: Arc<dyn CommandRunner>,
    program: Option<Arc<str>>,
    timeouts: BridgeTimeouts,
}

impl AdbBridge {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: Option<String>,
        timeouts: BridgeTimeouts,
    ) -> Self {
        let program = program
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(Arc::from);
        Self {
            runner,
            program,
            timeouts,
        }
    }

    pub fn with_process_runner(program: Option<String>, timeouts: BridgeTimeouts) -> Self {
        Self::new(Arc::new(ProcessRunner), program, timeouts)
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    pub fn timeouts(&self) -> &BridgeTimeouts {
        &self.timeouts
    }

    pub fn run(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, CommandError> {
        let Some(program) = self.program.as_deref() else {
            return Err(CommandError::Launch {
                program: "adb".to_string(),
                message: "no executable configured".to_string(),
            });
        };
        self.runner.run(program, args, timeout, trace_id)
    }
}

pub fn is_usable_serial(serial: &str) -> bool {
    let trimmed = serial.trim();
    !trimmed.is_empty() && trimmed != NO_DEVICE_SENTINEL
}

fn device_args(serial: &str, rest: &[&str]) -> Vec<String> {
    let mut args = vec!["-s".to_string(), serial.to_string()];
    args.extend(rest.iter().map(|value| value.to_string()));
    args
}

pub fn version_args() -> Vec<String> {
    vec!["version".to_string()]
}

pub fn devices_args() -> Vec<String> {
    vec!["devices".to_string()]
}

pub fn model_args(serial: &str) -> Vec<String> {
    device_args(serial, &["shell", "getprop", "ro.product.model"])
}

pub fn list_packages_args(serial: &str) -> Vec<String> {
    device_args(serial, &["shell", "pm", "list", "packages", "-f"])
}

pub fn uninstall_args(serial: &str, package_name: &str) -> Vec<String> {
    device_args(serial, &["uninstall", package_name])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::runner::fake::ScriptedRunner;

    #[test]
    fn builds_bridge_arguments_in_cli_order() {
        assert_eq!(devices_args(), vec!["devices"]);
        assert_eq!(
            model_args("ABC"),
            vec!["-s", "ABC", "shell", "getprop", "ro.product.model"]
        );
        assert_eq!(
            list_packages_args("ABC"),
            vec!["-s", "ABC", "shell", "pm", "list", "packages", "-f"]
        );
        assert_eq!(
            uninstall_args("ABC", "com.example"),
            vec!["-s", "ABC", "uninstall", "com.example"]
        );
    }

    #[test]
    fn rejects_empty_and_sentinel_serials() {
        assert!(!is_usable_serial(""));
        assert!(!is_usable_serial("   "));
        assert!(!is_usable_serial(NO_DEVICE_SENTINEL));
        assert!(is_usable_serial("emulator-5554"));
    }

    #[test]
    fn blank_program_counts_as_unconfigured() {
        let runner = Arc::new(ScriptedRunner::replying(0, "", ""));
        let bridge = AdbBridge::new(runner.clone(), Some("   ".to_string()), BridgeTimeouts::default());
        assert!(bridge.program().is_none());
        let err = bridge
            .run(&devices_args(), Duration::from_secs(1), "trace-1")
            .expect_err("expected unconfigured bridge to fail");
        assert!(matches!(err, CommandError::Launch { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn converts_timeout_settings() {
        let settings = TimeoutSettings {
            probe_secs: 1,
            devices_secs: 2,
            packages_secs: 3,
            uninstall_secs: 4,
        };
        let timeouts = BridgeTimeouts::from(&settings);
        assert_eq!(timeouts.probe, Duration::from_secs(1));
        assert_eq!(timeouts.uninstall, Duration::from_secs(4));
    }
}
