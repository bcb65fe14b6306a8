use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::adb::apps::parse_pm_list_packages_output;
use crate::app::adb::bridge::{is_usable_serial, list_packages_args, AdbBridge};
use crate::app::models::{Catalog, Package, Severity};
use crate::app::notify::{truncate_for_status, Notifier};

/// Fetches and classifies the installed packages of a device.
///
/// Like [`DeviceDirectory`](crate::app::devices::DeviceDirectory), it never fails the caller:
/// failures become an empty catalog plus a status event.
#[derive(Clone)]
pub struct PackageCatalog {
    bridge: AdbBridge,
    notifier: Notifier,
    status_max_chars: usize,
}

impl PackageCatalog {
    pub fn new(bridge: AdbBridge, notifier: Notifier, status_max_chars: usize) -> Self {
        Self {
            bridge,
            notifier,
            status_max_chars,
        }
    }

    pub fn fetch(&self, serial: &str) -> Catalog {
        let trace_id = Uuid::new_v4().to_string();
        info!(trace_id = %trace_id, serial = %serial, "list_packages");

        if !is_usable_serial(serial) {
            self.notifier.status(Severity::Warning, "No device selected.");
            return Catalog::default();
        }
        if self.bridge.program().is_none() {
            warn!(trace_id = %trace_id, "adb path is not configured");
            self.notifier
                .status(Severity::Error, "ADB not found. Cannot list apps.");
            return Catalog::default();
        }

        let output = match self.bridge.run(
            &list_packages_args(serial),
            self.bridge.timeouts().packages,
            &trace_id,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(trace_id = %trace_id, serial = %serial, error = %err, "pm list packages failed to run");
                let text = if err.is_timeout() {
                    "ADB app list command timed out.".to_string()
                } else {
                    format!(
                        "Error getting app list: {}",
                        truncate_for_status(&err.to_string(), self.status_max_chars)
                    )
                };
                self.notifier.status(Severity::Error, text);
                return Catalog::default();
            }
        };

        if !output.succeeded() {
            warn!(
                trace_id = %trace_id,
                serial = %serial,
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "pm list packages exited with failure"
            );
            self.notifier.status(
                Severity::Error,
                format!(
                    "ADB app list error: {}",
                    truncate_for_status(&output.stderr, self.status_max_chars)
                ),
            );
            return Catalog::default();
        }

        let catalog = Catalog::from_packages(parse_pm_list_packages_output(&output.stdout));
        debug!(
            trace_id = %trace_id,
            external = catalog.external.len(),
            system = catalog.system.len(),
            "classified packages"
        );
        if catalog.is_empty() {
            self.notifier
                .status(Severity::Warning, format!("No apps found on {serial}."));
        } else {
            self.notifier
                .status(Severity::Success, format!("Found {} apps.", catalog.len()));
        }
        catalog
    }
}

/// Case-insensitive substring filter on package names, applied per category.
///
/// Each category of the result is sorted by lowercase name, whatever the input order.
pub fn filter_catalog(catalog: &Catalog, query: &str) -> Catalog {
    let needle = query.trim().to_lowercase();
    Catalog {
        external: filter_sorted(&catalog.external, &needle),
        system: filter_sorted(&catalog.system, &needle),
    }
}

fn filter_sorted(packages: &[Package], needle: &str) -> Vec<Package> {
    let mut matched: Vec<Package> = packages
        .iter()
        .filter(|package| needle.is_empty() || package.name.to_lowercase().contains(needle))
        .cloned()
        .collect();
    matched.sort_by_cached_key(|package| package.name.to_lowercase());
    matched
}
