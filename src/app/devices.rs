use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::adb::bridge::{devices_args, is_usable_serial, model_args, AdbBridge};
use crate::app::adb::parse::{parse_adb_devices, parse_getprop_value};
use crate::app::models::{Device, Severity};
use crate::app::notify::{truncate_for_status, Notifier};

/// Lists attached devices. Never fails: problems become an empty map plus a status event.
#[derive(Clone)]
pub struct DeviceDirectory {
    bridge: AdbBridge,
    notifier: Notifier,
    status_max_chars: usize,
}

impl DeviceDirectory {
    pub fn new(bridge: AdbBridge, notifier: Notifier, status_max_chars: usize) -> Self {
        Self {
            bridge,
            notifier,
            status_max_chars,
        }
    }

    pub fn bridge(&self) -> &AdbBridge {
        &self.bridge
    }

    pub fn list(&self) -> BTreeMap<String, Device> {
        let trace_id = Uuid::new_v4().to_string();
        info!(trace_id = %trace_id, "list_devices");

        if self.bridge.program().is_none() {
            warn!(trace_id = %trace_id, "adb path is not configured");
            self.notifier
                .status(Severity::Error, "ADB not found. Check the configured path.");
            return BTreeMap::new();
        }

        let output = match self
            .bridge
            .run(&devices_args(), self.bridge.timeouts().devices, &trace_id)
        {
            Ok(output) => output,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "adb devices failed to run");
                let text = if err.is_timeout() {
                    "ADB devices command timed out.".to_string()
                } else {
                    format!(
                        "Error getting devices: {}",
                        truncate_for_status(&err.to_string(), self.status_max_chars)
                    )
                };
                self.notifier.status(Severity::Error, text);
                return BTreeMap::new();
            }
        };

        debug!(trace_id = %trace_id, stdout = %output.stdout.trim(), stderr = %output.stderr.trim(), "adb devices output");
        if !output.succeeded() {
            warn!(
                trace_id = %trace_id,
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "adb devices exited with failure"
            );
            self.notifier.status(
                Severity::Error,
                format!(
                    "ADB error: {}",
                    truncate_for_status(&output.stderr, self.status_max_chars)
                ),
            );
            return BTreeMap::new();
        }

        let devices: BTreeMap<String, Device> = parse_adb_devices(&output.stdout)
            .into_iter()
            .filter(|line| line.state.is_usable())
            .map(|line| {
                (
                    line.serial.clone(),
                    Device {
                        serial: line.serial,
                        authorized: true,
                    },
                )
            })
            .collect();

        if devices.is_empty() {
            self.notifier.status(
                Severity::Warning,
                "No ADB devices connected. Connect a device.",
            );
        } else {
            info!(trace_id = %trace_id, devices = ?devices.keys().collect::<Vec<_>>(), "devices detected");
            self.notifier.status(Severity::Success, "Devices detected!");
        }
        devices
    }

    /// `ro.product.model` of a device, or None when it cannot be read.
    pub fn model(&self, serial: &str) -> Option<String> {
        if !is_usable_serial(serial) {
            return None;
        }
        let trace_id = Uuid::new_v4().to_string();
        match self
            .bridge
            .run(&model_args(serial), self.bridge.timeouts().probe, &trace_id)
        {
            Ok(output) if output.succeeded() => parse_getprop_value(&output.stdout),
            Ok(output) => {
                debug!(trace_id = %trace_id, serial = %serial, exit_code = ?output.exit_code, "getprop failed");
                None
            }
            Err(err) => {
                debug!(trace_id = %trace_id, serial = %serial, error = %err, "getprop failed to run");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::app::adb::bridge::BridgeTimeouts;
    use crate::app::adb::runner::fake::{output, ScriptedRunner};
    use crate::app::error::CommandError;
    use crate::app::models::Notification;
    use crate::app::notify::{notification_channel, Notifications};

    fn directory(runner: Arc<ScriptedRunner>) -> (DeviceDirectory, Notifications) {
        let (notifier, notifications) = notification_channel();
        let bridge = AdbBridge::new(runner, Some("adb".to_string()), BridgeTimeouts::default());
        (DeviceDirectory::new(bridge, notifier, 100), notifications)
    }

    fn last_severity(notifications: &Notifications) -> Option<Severity> {
        notifications.drain_all().into_iter().rev().find_map(|event| match event {
            Notification::StatusUpdate { severity, .. } => Some(severity),
            Notification::RefreshRequested => None,
        })
    }

    #[test]
    fn lists_only_authorized_devices() {
        let runner = Arc::new(ScriptedRunner::replying(
            0,
            "List of devices attached\nABC123\tdevice\nXYZ999\tunauthorized\nOFF1\toffline\n",
            "",
        ));
        let (directory, notifications) = directory(runner.clone());

        let devices = directory.list();
        assert_eq!(devices.keys().collect::<Vec<_>>(), vec!["ABC123"]);
        assert!(devices["ABC123"].authorized);
        assert_eq!(last_severity(&notifications), Some(Severity::Success));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, vec!["devices"]);
        assert_eq!(calls[0].timeout, Duration::from_secs(10));
    }

    #[test]
    fn empty_listing_warns() {
        let runner = Arc::new(ScriptedRunner::replying(0, "List of devices attached\n\n", ""));
        let (directory, notifications) = directory(runner);
        assert!(directory.list().is_empty());
        assert_eq!(last_severity(&notifications), Some(Severity::Warning));
    }

    #[test]
    fn nonzero_exit_yields_empty_map_and_error() {
        let runner = Arc::new(ScriptedRunner::replying(
            1,
            "List of devices attached\nABC\tdevice\n",
            "adb: server version mismatch",
        ));
        let (directory, notifications) = directory(runner);
        assert!(directory.list().is_empty());
        let events = notifications.drain_all();
        assert!(matches!(
            &events[..],
            [Notification::StatusUpdate { severity: Severity::Error, text }] if text.contains("server version mismatch")
        ));
    }

    #[test]
    fn runner_failure_yields_empty_map_and_error() {
        let runner = Arc::new(ScriptedRunner::failing(CommandError::Timeout {
            program: "adb".to_string(),
            timeout: Duration::from_secs(10),
        }));
        let (directory, notifications) = directory(runner);
        assert!(directory.list().is_empty());
        assert_eq!(
            notifications.drain_all(),
            vec![Notification::status(Severity::Error, "ADB devices command timed out.")]
        );
    }

    #[test]
    fn unconfigured_bridge_does_not_spawn() {
        let runner = Arc::new(ScriptedRunner::replying(0, "", ""));
        let (notifier, notifications) = notification_channel();
        let bridge = AdbBridge::new(runner.clone(), None, BridgeTimeouts::default());
        let directory = DeviceDirectory::new(bridge, notifier, 100);
        assert!(directory.list().is_empty());
        assert!(runner.calls().is_empty());
        assert_eq!(last_severity(&notifications), Some(Severity::Error));
    }

    #[cfg(unix)]
    #[test]
    fn lists_devices_from_a_fake_adb_script() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().expect("tmp");
        let script = tmp.path().join("adb");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf 'List of devices attached\\nFAKE01\\tdevice\\nFAKE02\\toffline\\n'\n",
        )
        .expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let (notifier, notifications) = notification_channel();
        let bridge = AdbBridge::with_process_runner(
            Some(script.to_string_lossy().to_string()),
            BridgeTimeouts::default(),
        );
        let devices = DeviceDirectory::new(bridge, notifier, 100).list();
        assert_eq!(devices.keys().collect::<Vec<_>>(), vec!["FAKE01"]);
        assert_eq!(last_severity(&notifications), Some(Severity::Success));
    }

    #[test]
    fn reads_device_model() {
        let runner = Arc::new(ScriptedRunner::new(|args| {
            if args.ends_with(&["ro.product.model".to_string()]) {
                Ok(output(0, "Pixel 7\n", ""))
            } else {
                Ok(output(1, "", "unexpected"))
            }
        }));
        let (directory, _notifications) = directory(runner.clone());
        assert_eq!(directory.model("ABC").as_deref(), Some("Pixel 7"));
        assert_eq!(directory.model(""), None);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args[..2], ["-s".to_string(), "ABC".to_string()]);
        assert_eq!(calls[0].timeout, Duration::from_secs(5));
    }
}
