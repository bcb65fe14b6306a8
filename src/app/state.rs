use std::collections::BTreeMap;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::app::adb::bridge::{AdbBridge, BridgeTimeouts, NO_DEVICE_SENTINEL};
use crate::app::adb::locator::configured_adb_program;
use crate::app::catalog::{filter_catalog, PackageCatalog};
use crate::app::config::AppConfig;
use crate::app::devices::DeviceDirectory;
use crate::app::error::AppError;
use crate::app::models::{Catalog, Device, Notification, Severity};
use crate::app::notify::{notification_channel, Notifications};
use crate::app::uninstall::UninstallOrchestrator;

/// Last status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub severity: Severity,
    pub text: String,
}

/// Control-path state of the application: the single consumer of the notification channel.
///
/// Device listing and catalog fetches run synchronously on the caller's thread; uninstalls
/// run on workers and report back through [`AppSession::poll`].
pub struct AppSession {
    directory: DeviceDirectory,
    packages: PackageCatalog,
    orchestrator: UninstallOrchestrator,
    notifications: Notifications,
    devices: BTreeMap<String, Device>,
    selected: Option<String>,
    catalog: Catalog,
    query: String,
    status: Option<StatusLine>,
}

impl AppSession {
    pub fn new(bridge: AdbBridge, status_max_chars: usize) -> Self {
        let (notifier, notifications) = notification_channel();
        Self {
            directory: DeviceDirectory::new(bridge.clone(), notifier.clone(), status_max_chars),
            packages: PackageCatalog::new(bridge.clone(), notifier.clone(), status_max_chars),
            orchestrator: UninstallOrchestrator::new(bridge, notifier, status_max_chars),
            notifications,
            devices: BTreeMap::new(),
            selected: None,
            catalog: Catalog::default(),
            query: String::new(),
            status: None,
        }
    }

    /// Session over the real `adb` described by `config`. An invalid path leaves the bridge
    /// unconfigured; every operation then reports that through a status event.
    pub fn from_config(config: &AppConfig) -> Self {
        let program = match configured_adb_program(&config.adb.command_path) {
            Ok(program) => Some(program),
            Err(message) => {
                warn!(error = %message, "adb path rejected");
                None
            }
        };
        let bridge =
            AdbBridge::with_process_runner(program, BridgeTimeouts::from(&config.timeouts));
        Self::new(bridge, config.notifications.status_max_chars)
    }

    pub fn directory(&self) -> &DeviceDirectory {
        &self.directory
    }

    pub fn devices(&self) -> &BTreeMap<String, Device> {
        &self.devices
    }

    pub fn selected_serial(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn status(&self) -> Option<&StatusLine> {
        self.status.as_ref()
    }

    /// Re-lists devices, keeps the current selection when it is still attached (otherwise
    /// picks the first one) and reloads the catalog of the selected device.
    pub fn refresh_devices(&mut self) {
        self.devices = self.directory.list();
        let keep = self
            .selected
            .as_ref()
            .filter(|serial| self.devices.contains_key(serial.as_str()))
            .cloned();
        self.selected = keep.or_else(|| self.devices.keys().next().cloned());
        match self.selected.clone() {
            Some(serial) => self.catalog = self.packages.fetch(&serial),
            None => self.catalog = Catalog::default(),
        }
    }

    pub fn select_device(&mut self, serial: &str, trace_id: &str) -> Result<(), AppError> {
        let serial = serial.trim();
        if !self.devices.contains_key(serial) {
            return Err(AppError::validation(
                format!("Device {serial} is not attached"),
                trace_id,
            ));
        }
        self.selected = Some(serial.to_string());
        self.reload_catalog();
        Ok(())
    }

    pub fn reload_catalog(&mut self) {
        self.catalog = match self.selected.as_deref() {
            Some(serial) => self.packages.fetch(serial),
            None => Catalog::default(),
        };
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.trim().to_string();
    }

    /// Current catalog narrowed by the search query, sorted for display.
    pub fn visible_catalog(&self) -> Catalog {
        filter_catalog(&self.catalog, &self.query)
    }

    pub fn request_delete(&self, package: &str) -> Option<JoinHandle<()>> {
        let serial = self.selected.as_deref().unwrap_or(NO_DEVICE_SENTINEL);
        self.orchestrator.delete_async(serial, package)
    }

    /// Drains pending notifications, applies them and returns them for rendering.
    ///
    /// A `RefreshRequested` reloads the catalog; the status that reload produces shows up on
    /// the next poll.
    pub fn poll(&mut self) -> Vec<Notification> {
        let events = self.notifications.drain_all();
        for event in &events {
            match event {
                Notification::StatusUpdate { text, severity } => {
                    self.status = Some(StatusLine {
                        severity: *severity,
                        text: text.clone(),
                    });
                }
                Notification::RefreshRequested => {
                    debug!(selected = ?self.selected, "refresh requested");
                    self.reload_catalog();
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::app::adb::runner::fake::{output, ScriptedRunner};

    /// Fake device with two packages; uninstalling `com.alpha` removes it from later listings.
    fn fake_device() -> Arc<ScriptedRunner> {
        let removed = Arc::new(AtomicBool::new(false));
        Arc::new(ScriptedRunner::new(move |args| {
            let joined = args.join(" ");
            if joined == "devices" {
                return Ok(output(0, "List of devices attached\nSER1\tdevice\nSER2\tunauthorized\n", ""));
            }
            if joined.ends_with("pm list packages -f") {
                let mut listing = String::from("package:/system/app/Cam/Cam.apk=com.android.camera\n");
                if !removed.load(Ordering::SeqCst) {
                    listing.push_str("package:/data/app/com.alpha/base.apk=com.alpha\n");
                }
                return Ok(output(0, &listing, ""));
            }
            if joined == "-s SER1 uninstall com.alpha" {
                removed.store(true, Ordering::SeqCst);
                return Ok(output(0, "Success\n", ""));
            }
            Ok(output(1, "", "Failure [DELETE_FAILED_INTERNAL_ERROR]"))
        }))
    }

    fn session(runner: Arc<ScriptedRunner>) -> AppSession {
        let bridge = AdbBridge::new(runner, Some("adb".to_string()), BridgeTimeouts::default());
        AppSession::new(bridge, 100)
    }

    #[test]
    fn refresh_selects_first_authorized_device_and_loads_catalog() {
        let mut session = session(fake_device());
        session.refresh_devices();
        assert_eq!(session.selected_serial(), Some("SER1"));
        assert_eq!(session.devices().len(), 1);
        assert_eq!(session.catalog().len(), 2);

        session.poll();
        assert_eq!(
            session.status(),
            Some(&StatusLine {
                severity: Severity::Success,
                text: "Found 2 apps.".to_string()
            })
        );
    }

    #[test]
    fn successful_delete_triggers_catalog_reload_on_poll() {
        let mut session = session(fake_device());
        session.refresh_devices();
        session.poll();

        let handle = session.request_delete("com.alpha").expect("dispatched");
        handle.join().expect("join");

        let events = session.poll();
        assert_eq!(events.last(), Some(&Notification::RefreshRequested));
        assert!(session.catalog().find("com.alpha").is_none());
        assert_eq!(session.catalog().len(), 1);

        session.poll();
        assert_eq!(session.status().map(|s| s.text.as_str()), Some("Found 1 apps."));
    }

    #[test]
    fn failed_delete_keeps_catalog() {
        let mut session = session(fake_device());
        session.refresh_devices();
        session.poll();

        let handle = session.request_delete("com.android.camera").expect("dispatched");
        handle.join().expect("join");

        let events = session.poll();
        assert!(!events.contains(&Notification::RefreshRequested));
        assert_eq!(session.catalog().len(), 2);
        assert_eq!(session.status().map(|s| s.severity), Some(Severity::Error));
    }

    #[test]
    fn delete_without_device_is_rejected() {
        let mut session = session(Arc::new(ScriptedRunner::replying(
            0,
            "List of devices attached\n",
            "",
        )));
        session.refresh_devices();
        assert!(session.selected_serial().is_none());
        assert!(session.request_delete("com.alpha").is_none());
        session.poll();
        assert_eq!(
            session.status().map(|s| s.text.as_str()),
            Some("No device selected for deletion.")
        );
    }

    #[test]
    fn selecting_unknown_device_is_a_validation_error() {
        let mut session = session(fake_device());
        session.refresh_devices();
        let err = session
            .select_device("SER2", "trace-select")
            .expect_err("unauthorized device is not selectable");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert!(session.select_device("SER1", "trace-select").is_ok());
    }

    #[test]
    fn query_narrows_visible_catalog_only() {
        let mut session = session(fake_device());
        session.refresh_devices();
        session.set_query("  ALPHA ");
        let visible = session.visible_catalog();
        assert_eq!(visible.external.len(), 1);
        assert!(visible.system.is_empty());
        assert_eq!(session.catalog().len(), 2);
        assert_eq!(session.query(), "ALPHA");
    }
}
