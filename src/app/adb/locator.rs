use std::path::Path;

use tracing::warn;

use crate::app::adb::bridge::{version_args, AdbBridge};
use crate::app::error::AppError;
use crate::app::models::AdbInfo;

/// Strips surrounding whitespace and one pair of matching quotes from a configured path.
pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// `adb.command_path` as the program to spawn; empty means `adb` from PATH.
pub fn resolve_adb_program(config_command_path: &str) -> String {
    match normalize_command_path(config_command_path) {
        path if path.is_empty() => "adb".to_string(),
        path => path,
    }
}

/// Bare command names are left to PATH lookup; anything with a separator must be a file.
pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("adb.command_path is empty".to_string());
    }
    if !program.contains(|c: char| c == '/' || c == '\\') {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(format!("adb.command_path is a directory: {program}"));
    }
    if !path.is_file() {
        return Err(format!("adb.command_path does not exist: {program}"));
    }
    Ok(())
}

/// Resolves the configured path and returns it only if it passes validation.
pub fn configured_adb_program(config_command_path: &str) -> Result<String, String> {
    let program = resolve_adb_program(config_command_path);
    validate_adb_program(&program)?;
    Ok(program)
}

/// Runs `adb version` and returns its combined output, or why the executable is unusable.
pub fn probe_adb(bridge: &AdbBridge, trace_id: &str) -> Result<String, AppError> {
    let output = bridge
        .run(&version_args(), bridge.timeouts().probe, trace_id)
        .map_err(|err| {
            warn!(trace_id = %trace_id, code = err.code(), error = %err, "adb probe failed");
            err.into_app_error(trace_id)
        })?;

    let mut version_output = output.stdout.trim().to_string();
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        if !version_output.is_empty() {
            version_output.push('\n');
        }
        version_output.push_str(stderr);
    }

    if !output.succeeded() {
        return Err(AppError::dependency(
            format!("adb version exited with {:?}", output.exit_code),
            trace_id,
        ));
    }
    Ok(version_output)
}

/// [`probe_adb`] folded into the [`AdbInfo`] shown at start-up.
pub fn check_adb(bridge: &AdbBridge, trace_id: &str) -> AdbInfo {
    let command_path = bridge.program().unwrap_or_default().to_string();
    match probe_adb(bridge, trace_id) {
        Ok(version_output) => AdbInfo {
            available: true,
            version_output,
            command_path,
            error: None,
        },
        Err(err) => AdbInfo {
            available: false,
            version_output: String::new(),
            command_path,
            error: Some(err.error),
        },
    }
}
