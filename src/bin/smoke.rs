use std::time::{Duration, Instant};

use adb_app_manager_lib::app::adb::bridge::{AdbBridge, BridgeTimeouts};
use adb_app_manager_lib::app::adb::locator::{check_adb, normalize_command_path, resolve_adb_program};
use adb_app_manager_lib::app::catalog::{filter_catalog, PackageCatalog};
use adb_app_manager_lib::app::config::{load_config, AppConfig};
use adb_app_manager_lib::app::devices::DeviceDirectory;
use adb_app_manager_lib::app::logging::init_logging;
use adb_app_manager_lib::app::models::{Catalog, Notification, Severity};
use adb_app_manager_lib::app::notify::{notification_channel, Notifications};
use adb_app_manager_lib::app::uninstall::UninstallOrchestrator;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    adb: Option<String>,
    filter: Option<String>,
    uninstall: Option<String>,
    json: bool,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    started_at: String,
    serial: Option<String>,
    adb_program: String,
    external_count: usize,
    system_count: usize,
    checks: Vec<SmokeCheck>,
    events: Vec<Notification>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn|skip
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut adb: Option<String> = None;
    let mut filter: Option<String> = None;
    let mut uninstall: Option<String> = None;
    let mut json = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--adb" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--adb requires a value".to_string())?;
                adb = Some(normalize_command_path(&value));
            }
            "--filter" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--filter requires a value".to_string())?;
                filter = Some(value);
            }
            "--uninstall" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--uninstall requires a value".to_string())?;
                uninstall = Some(value);
            }
            "--json" => {
                json = true;
            }
            "-h" | "--help" => {
                return Err(
                    "Usage: cargo run --bin smoke -- [--serial SERIAL] [--adb PATH] [--filter TEXT] [--uninstall PACKAGE] [--json]\n"
                        .to_string(),
                );
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    Ok(Args {
        serial,
        adb,
        filter,
        uninstall,
        json,
    })
}

fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> Result<(), ()>
where
    F: FnOnce() -> Result<Option<String>, String>,
{
    let start = Instant::now();
    match f() {
        Ok(detail) => {
            checks.push(SmokeCheck {
                name,
                status: "pass",
                duration_ms: start.elapsed().as_millis(),
                detail,
            });
            Ok(())
        }
        Err(err) => {
            checks.push(SmokeCheck {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                detail: Some(err),
            });
            Err(())
        }
    }
}

fn skip(checks: &mut Vec<SmokeCheck>, name: &'static str) {
    checks.push(SmokeCheck {
        name,
        status: "skip",
        duration_ms: 0,
        detail: None,
    });
}

fn last_error(events: &[Notification]) -> Option<String> {
    events.iter().rev().find_map(|event| match event {
        Notification::StatusUpdate {
            text,
            severity: Severity::Error,
        } => Some(text.clone()),
        _ => None,
    })
}

/// Moves every queued event into `events` and returns the newest error text among them.
fn absorb(notifications: &Notifications, events: &mut Vec<Notification>) -> Option<String> {
    let drained = notifications.drain_all();
    let error = last_error(&drained);
    events.extend(drained);
    error
}

/// Polls like a front-end would until the uninstall reports an outcome or `deadline` passes.
fn wait_for_uninstall(notifications: &Notifications, events: &mut Vec<Notification>, deadline: Duration) -> Result<Option<String>, String> {
    let started = Instant::now();
    while started.elapsed() < deadline {
        std::thread::sleep(Duration::from_millis(100));
        let seen = events.len();
        let failed = absorb(notifications, events);
        if events[seen..].contains(&Notification::RefreshRequested) {
            return Ok(None);
        }
        if let Some(error) = failed {
            return Err(error);
        }
    }
    Err("uninstall did not report an outcome in time".to_string())
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().to_rfc3339();
    let mut checks: Vec<SmokeCheck> = Vec::new();
    let mut events: Vec<Notification> = Vec::new();
    let mut status = "pass";

    // Resolve adb program the same way the app does (config-aware).
    let config = match load_config(&trace_id) {
        Ok(cfg) => cfg,
        Err(err) => {
            checks.push(SmokeCheck {
                name: "load_config",
                status: "warn",
                duration_ms: 0,
                detail: Some(err.to_string()),
            });
            AppConfig::default()
        }
    };
    init_logging(&config.logging.log_level);
    let adb_program = args
        .adb
        .clone()
        .unwrap_or_else(|| resolve_adb_program(&config.adb.command_path));

    let (notifier, notifications) = notification_channel();
    let bridge = AdbBridge::with_process_runner(
        Some(adb_program.clone()),
        BridgeTimeouts::from(&config.timeouts),
    );
    let max_chars = config.notifications.status_max_chars;
    let directory = DeviceDirectory::new(bridge.clone(), notifier.clone(), max_chars);
    let packages = PackageCatalog::new(bridge.clone(), notifier.clone(), max_chars);
    let orchestrator = UninstallOrchestrator::new(bridge.clone(), notifier, max_chars);

    if run_check(&mut checks, "check_adb", || {
        let info = check_adb(&bridge, &trace_id);
        if info.available {
            Ok(info.version_output.lines().next().map(str::to_string))
        } else {
            Err(info.error.unwrap_or_else(|| "adb unavailable".to_string()))
        }
    })
    .is_err()
    {
        status = "fail";
    }

    let mut serial = args.serial.clone();
    if run_check(&mut checks, "list_devices", || {
        let devices = directory.list();
        let error = absorb(&notifications, &mut events);
        if devices.is_empty() {
            return Err(error.unwrap_or_else(|| "No online adb devices found.".to_string()));
        }
        match serial.as_deref() {
            Some(wanted) if !devices.contains_key(wanted) => {
                Err(format!("Device {wanted} is not attached or not authorized."))
            }
            Some(_) => Ok(None),
            None if devices.len() > 1 => Err(format!(
                "Multiple online devices found ({}). Set ANDROID_SERIAL or pass --serial.",
                devices.keys().cloned().collect::<Vec<_>>().join(", ")
            )),
            None => {
                serial = devices.keys().next().cloned();
                Ok(None)
            }
        }
    })
    .is_err()
    {
        status = "fail";
    }

    let mut catalog = Catalog::default();
    match serial.clone() {
        Some(serial) if status == "pass" => {
            if run_check(&mut checks, "fetch_catalog", || {
                catalog = packages.fetch(&serial);
                let error = absorb(&notifications, &mut events);
                if catalog.is_empty() {
                    Err(error.unwrap_or_else(|| "No packages listed.".to_string()))
                } else {
                    Ok(Some(format!(
                        "{} external, {} system",
                        catalog.external.len(),
                        catalog.system.len()
                    )))
                }
            })
            .is_err()
            {
                status = "fail";
            }

            if let Some(query) = args.filter.as_deref() {
                let _ = run_check(&mut checks, "filter_catalog", || {
                    let filtered = filter_catalog(&catalog, query);
                    Ok(Some(format!(
                        "{} external, {} system match {query:?}",
                        filtered.external.len(),
                        filtered.system.len()
                    )))
                });
            } else {
                skip(&mut checks, "filter_catalog");
            }

            if let Some(package) = args.uninstall.as_deref() {
                let deadline = bridge.timeouts().uninstall + Duration::from_secs(5);
                if run_check(&mut checks, "uninstall", || {
                    if orchestrator.delete_async(&serial, package).is_none() {
                        let error = absorb(&notifications, &mut events);
                        return Err(error.unwrap_or_else(|| "uninstall was not dispatched".to_string()));
                    }
                    wait_for_uninstall(&notifications, &mut events, deadline)
                })
                .is_err()
                {
                    status = "fail";
                }
            } else {
                skip(&mut checks, "uninstall");
            }
        }
        _ => {
            skip(&mut checks, "fetch_catalog");
            skip(&mut checks, "filter_catalog");
            skip(&mut checks, "uninstall");
        }
    }

    let summary = SmokeSummary {
        tool: "adb_app_manager_smoke",
        status,
        trace_id,
        started_at,
        serial,
        adb_program,
        external_count: catalog.external.len(),
        system_count: catalog.system.len(),
        checks,
        events,
    };

    let output = if args.json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut text = format!(
            "status: {}\ntrace_id: {}\nserial: {}\n",
            summary.status,
            summary.trace_id,
            summary.serial.as_deref().unwrap_or("-")
        );
        for check in &summary.checks {
            text.push_str(&format!(
                "  {:<15} {:<4} {:>6}ms {}\n",
                check.name,
                check.status,
                check.duration_ms,
                check.detail.as_deref().unwrap_or("")
            ));
        }
        text
    };

    println!("{output}");
    if summary.status != "pass" {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_keeps_every_event_and_reports_the_newest_error() {
        let (notifier, notifications) = notification_channel();
        notifier.status(Severity::Error, "ADB devices command timed out.");
        notifier.status(Severity::Warning, "No ADB devices connected. Connect a device.");
        notifier.status(Severity::Error, "ADB error: protocol fault");

        let mut events = vec![Notification::RefreshRequested];
        let error = absorb(&notifications, &mut events);
        assert_eq!(error.as_deref(), Some("ADB error: protocol fault"));
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], Notification::RefreshRequested);
        assert!(absorb(&notifications, &mut events).is_none());
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn waiting_stops_at_the_refresh_of_a_successful_uninstall() {
        let (notifier, notifications) = notification_channel();
        notifier.status(Severity::Success, "Successfully deleted com.example!");
        notifier.push(Notification::RefreshRequested);

        let mut events = Vec::new();
        let outcome = wait_for_uninstall(&notifications, &mut events, Duration::from_secs(2));
        assert_eq!(outcome, Ok(None));
        assert_eq!(events.len(), 2);
    }
}
