use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::adb::bridge::{is_usable_serial, uninstall_args, AdbBridge};
use crate::app::adb::parse::parse_uninstall_failure_reason;
use crate::app::adb::runner::CommandOutput;
use crate::app::error::CommandError;
use crate::app::models::{Notification, Severity};
use crate::app::notify::{truncate_for_status, Notifier};

const SUCCESS_TOKEN: &str = "Success";

/// Runs uninstalls on background threads; outcomes arrive only through the notifier.
#[derive(Clone)]
pub struct UninstallOrchestrator {
    bridge: AdbBridge,
    notifier: Notifier,
    status_max_chars: usize,
}

impl UninstallOrchestrator {
    pub fn new(bridge: AdbBridge, notifier: Notifier, status_max_chars: usize) -> Self {
        Self {
            bridge,
            notifier,
            status_max_chars,
        }
    }

    /// Validates inputs on the caller's thread, then uninstalls on a worker.
    ///
    /// Returns `None` when nothing was dispatched (the reason is already queued as an error
    /// status). Dropping the returned handle detaches the worker.
    pub fn delete_async(&self, serial: &str, package_raw: &str) -> Option<JoinHandle<()>> {
        let trace_id = Uuid::new_v4().to_string();
        let package_name = normalize_package_name(package_raw).to_string();
        info!(
            trace_id = %trace_id,
            serial = %serial,
            package_raw = %package_raw,
            package_name = %package_name,
            "uninstall_app"
        );

        if !is_usable_serial(serial) {
            self.notifier
                .status(Severity::Error, "No device selected for deletion.");
            return None;
        }
        if self.bridge.program().is_none() {
            self.notifier
                .status(Severity::Error, "ADB not found. Cannot delete.");
            return None;
        }
        if package_name.is_empty() {
            self.notifier
                .status(Severity::Error, "No package selected for deletion.");
            return None;
        }

        self.notifier
            .status(Severity::Info, format!("Deleting {package_name}..."));

        let bridge = self.bridge.clone();
        let notifier = self.notifier.clone();
        let serial = serial.trim().to_string();
        let max_chars = self.status_max_chars;
        let worker_trace = trace_id.clone();
        let worker_package = package_name.clone();
        let spawned = thread::Builder::new()
            .name("uninstall-worker".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_uninstall(&bridge, &serial, &worker_package, max_chars, &worker_trace)
                }));
                match outcome {
                    Ok(events) => events.into_iter().for_each(|event| notifier.push(event)),
                    Err(_) => {
                        error!(trace_id = %worker_trace, package_name = %worker_package, "uninstall worker panicked");
                        notifier.status(
                            Severity::Error,
                            format!("An unexpected error occurred while deleting {worker_package}."),
                        );
                    }
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(trace_id = %trace_id, error = %err, "failed to spawn uninstall worker");
                self.notifier.status(
                    Severity::Error,
                    format!("Could not start deletion of {package_name}."),
                );
                None
            }
        }
    }
}

/// Strips display decoration such as `path=name`; only the part after the last `=` counts.
pub fn normalize_package_name(raw: &str) -> &str {
    let name = match raw.rsplit_once('=') {
        Some((_, tail)) => tail,
        None => raw,
    };
    name.trim()
}

/// Exit code 0 alone is not enough: some adb builds exit 0 after printing `Failure [...]`.
pub fn is_uninstall_success(output: &CommandOutput) -> bool {
    output.succeeded() && output.stdout.contains(SUCCESS_TOKEN)
}

/// Short diagnostic for a failed uninstall: stderr, else stdout, else a generic message.
pub fn failure_detail(output: &CommandOutput, max_chars: usize) -> String {
    let stderr = output.stderr.trim();
    let stdout = output.stdout.trim();
    let detail = if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        "failed with no output"
    };
    truncate_for_status(detail, max_chars)
}

/// Blocking body of one uninstall. Returns the events to publish, in order.
pub fn run_uninstall(
    bridge: &AdbBridge,
    serial: &str,
    package_name: &str,
    max_chars: usize,
    trace_id: &str,
) -> Vec<Notification> {
    let result = bridge.run(
        &uninstall_args(serial, package_name),
        bridge.timeouts().uninstall,
        trace_id,
    );
    outcome_events(package_name, result, max_chars, trace_id)
}

fn outcome_events(
    package_name: &str,
    result: Result<CommandOutput, CommandError>,
    max_chars: usize,
    trace_id: &str,
) -> Vec<Notification> {
    match result {
        Ok(output) if is_uninstall_success(&output) => {
            info!(trace_id = %trace_id, package_name = %package_name, "uninstall succeeded");
            vec![
                Notification::status(
                    Severity::Success,
                    format!("Successfully deleted {package_name}!"),
                ),
                Notification::RefreshRequested,
            ]
        }
        Ok(output) => {
            warn!(
                trace_id = %trace_id,
                package_name = %package_name,
                exit_code = ?output.exit_code,
                reason = ?parse_uninstall_failure_reason(&output.stdout),
                stdout = %output.stdout.trim(),
                stderr = %output.stderr.trim(),
                "uninstall failed"
            );
            vec![Notification::status(
                Severity::Error,
                format!(
                    "Failed to delete {package_name}: {}",
                    failure_detail(&output, max_chars)
                ),
            )]
        }
        Err(err) => {
            warn!(trace_id = %trace_id, package_name = %package_name, error = %err, "uninstall command failed");
            let detail = if err.is_timeout() {
                "command timed out.".to_string()
            } else {
                truncate_for_status(&err.to_string(), max_chars)
            };
            vec![Notification::status(
                Severity::Error,
                format!("Error deleting {package_name}: {detail}"),
            )]
        }
    }
}
