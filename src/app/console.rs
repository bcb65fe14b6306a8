//! Line-oriented front-end over [`AppSession`].
//!
//! Stdin is read on a helper thread so the main loop can wake on the notification polling
//! cadence even while the user is not typing.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::info;
use uuid::Uuid;

use crate::app::adb::bridge::{AdbBridge, BridgeTimeouts};
use crate::app::adb::locator::{check_adb, configured_adb_program, normalize_command_path, probe_adb};
use crate::app::adb::runner::{CommandRunner, ProcessRunner};
use crate::app::config::{backup_config_path, config_path, save_config_to_path, AppConfig};
use crate::app::error::AppError;
use crate::app::models::{Catalog, Notification, Package};
use crate::app::state::AppSession;
use crate::app::uninstall::normalize_package_name;

const HELP: &str = "Commands:
  devices            re-list attached devices
  use <serial>       select a device
  model              show the selected device's model
  find <text>        filter packages by name (empty clears)
  list               show external and system packages
  delete <package>   uninstall a package in the background
  refresh            reload the package list
  adb <path>         check and save the adb executable to use
  help               show this help
  quit               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Devices,
    Use(String),
    Model,
    Find(String),
    List,
    Delete(String),
    Refresh,
    SetAdb(String),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let trimmed = line.trim();
    let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (trimmed, ""),
    };
    match verb.to_lowercase().as_str() {
        "devices" => Ok(ConsoleCommand::Devices),
        "use" if !rest.is_empty() => Ok(ConsoleCommand::Use(rest.to_string())),
        "use" => Err("use requires a serial".to_string()),
        "model" => Ok(ConsoleCommand::Model),
        "find" | "search" => Ok(ConsoleCommand::Find(rest.to_string())),
        "list" | "ls" => Ok(ConsoleCommand::List),
        "delete" | "uninstall" if !rest.is_empty() => Ok(ConsoleCommand::Delete(rest.to_string())),
        "delete" | "uninstall" => Err("delete requires a package name".to_string()),
        "refresh" => Ok(ConsoleCommand::Refresh),
        "adb" if !rest.is_empty() => Ok(ConsoleCommand::SetAdb(rest.to_string())),
        "adb" => Err("adb requires a path".to_string()),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
        "" => Err(String::new()),
        other => Err(format!("Unknown command: {other} (try `help`)")),
    }
}

pub fn render_event(out: &mut impl Write, event: &Notification) -> io::Result<()> {
    match event {
        Notification::StatusUpdate { text, severity } => writeln!(
            out,
            "[{}] {:<7} {}",
            Local::now().format("%H:%M:%S"),
            severity.label(),
            text
        ),
        Notification::RefreshRequested => Ok(()),
    }
}

fn render_section(out: &mut impl Write, title: &str, packages: &[Package], filtered: bool) -> io::Result<()> {
    writeln!(out, "{title} ({}):", packages.len())?;
    if packages.is_empty() {
        let kind = title.to_lowercase();
        if filtered {
            writeln!(out, "  No matching {kind} found.")?;
        } else {
            writeln!(out, "  No {kind} found.")?;
        }
    }
    for package in packages {
        writeln!(out, "  {}\n      {}", package.name, package.install_path)?;
    }
    Ok(())
}

pub fn render_catalog(out: &mut impl Write, catalog: &Catalog, query: &str) -> io::Result<()> {
    let filtered = !query.is_empty();
    render_section(out, "External apps", &catalog.external, filtered)?;
    render_section(out, "System apps", &catalog.system, filtered)
}

fn render_devices(out: &mut impl Write, session: &AppSession) -> io::Result<()> {
    if session.devices().is_empty() {
        return writeln!(out, "No devices found. Connect a device and run `devices`.");
    }
    for serial in session.devices().keys() {
        let marker = if session.selected_serial() == Some(serial.as_str()) {
            '*'
        } else {
            ' '
        };
        writeln!(out, "{marker} {serial}")?;
    }
    Ok(())
}

/// Validates `raw_path`, confirms `adb version` runs there and writes the updated config.
pub fn persist_adb_path(
    config: &AppConfig,
    raw_path: &str,
    runner: Arc<dyn CommandRunner>,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<AppConfig, AppError> {
    let command_path = normalize_command_path(raw_path);
    let program = configured_adb_program(&command_path)
        .map_err(|message| AppError::validation(message, trace_id))?;
    let bridge = AdbBridge::new(runner, Some(program), BridgeTimeouts::from(&config.timeouts));
    let version = probe_adb(&bridge, trace_id)?;
    info!(trace_id = %trace_id, command_path = %command_path, version = %version, "adb path accepted");

    let mut updated = config.clone();
    updated.adb.command_path = command_path;
    save_config_to_path(&updated, path, backup_path, trace_id)?;
    Ok(updated)
}

fn execute(
    session: &mut AppSession,
    config: &mut AppConfig,
    command: ConsoleCommand,
    out: &mut impl Write,
) -> io::Result<()> {
    match command {
        ConsoleCommand::Devices => {
            session.refresh_devices();
            render_devices(out, session)
        }
        ConsoleCommand::Use(serial) => {
            let trace_id = Uuid::new_v4().to_string();
            match session.select_device(&serial, &trace_id) {
                Ok(()) => writeln!(out, "Using {serial}"),
                Err(err) => writeln!(out, "{}", err.error),
            }
        }
        ConsoleCommand::Model => match session.selected_serial() {
            Some(serial) => {
                let model = session.directory().model(serial);
                writeln!(out, "{serial}: {}", model.as_deref().unwrap_or("unknown model"))
            }
            None => writeln!(out, "No device selected."),
        },
        ConsoleCommand::Find(query) => {
            session.set_query(&query);
            render_catalog(out, &session.visible_catalog(), session.query())
        }
        ConsoleCommand::List => render_catalog(out, &session.visible_catalog(), session.query()),
        ConsoleCommand::Delete(package) => {
            let name = normalize_package_name(&package);
            if !name.is_empty() && session.catalog().find(name).is_none() {
                writeln!(out, "{name} is not in the current package list; trying anyway.")?;
            }
            // Fire and forget: the outcome arrives through the next polls.
            let _ = session.request_delete(&package);
            Ok(())
        }
        ConsoleCommand::Refresh => {
            session.reload_catalog();
            Ok(())
        }
        ConsoleCommand::SetAdb(raw_path) => {
            let trace_id = Uuid::new_v4().to_string();
            match persist_adb_path(
                config,
                &raw_path,
                Arc::new(ProcessRunner),
                &config_path(),
                &backup_config_path(),
                &trace_id,
            ) {
                Ok(updated) => {
                    *config = updated;
                    *session = AppSession::from_config(config);
                    writeln!(out, "Saved adb path {}", config.adb.command_path)?;
                    session.refresh_devices();
                    render_devices(out, session)
                }
                Err(err) => writeln!(out, "{} ({})", err.error, err.code),
            }
        }
        ConsoleCommand::Help => writeln!(out, "{HELP}"),
        ConsoleCommand::Quit => Ok(()),
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub fn run(config: &AppConfig) -> io::Result<()> {
    let mut out = io::stdout();
    let mut config = config.clone();
    let poll_interval = config.notifications.poll_interval();
    let refresh_interval = Duration::from_secs(config.device.refresh_interval_secs);

    let mut session = AppSession::from_config(&config);
    let trace_id = Uuid::new_v4().to_string();
    let adb = check_adb(session.directory().bridge(), &trace_id);
    info!(trace_id = %trace_id, available = adb.available, command_path = %adb.command_path, "adb probe");
    if !adb.available {
        writeln!(
            out,
            "adb is not usable ({}). Set adb.command_path in the config file.",
            adb.error.as_deref().unwrap_or("unknown error")
        )?;
    }

    writeln!(out, "{HELP}")?;
    session.refresh_devices();
    render_devices(&mut out, &session)?;
    let mut last_device_refresh = Instant::now();
    let lines = spawn_stdin_reader();

    loop {
        match lines.recv_timeout(poll_interval) {
            Ok(line) => match parse_command(&line) {
                Ok(ConsoleCommand::Quit) => break,
                Ok(command) => execute(&mut session, &mut config, command, &mut out)?,
                Err(message) if message.is_empty() => {}
                Err(message) => writeln!(out, "{message}")?,
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for event in session.poll() {
            render_event(&mut out, &event)?;
        }

        if session.selected_serial().is_none() && last_device_refresh.elapsed() >= refresh_interval {
            session.refresh_devices();
            last_device_refresh = Instant::now();
            if session.selected_serial().is_some() {
                render_devices(&mut out, &session)?;
            }
        }
        out.flush()?;
    }
    Ok(())
}
