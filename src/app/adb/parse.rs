//! Line parsers for bridge output.
//!
//! Every parser here is total: a line either yields a value or is discarded. The bridge's
//! output is not a versioned format, so unrecognised lines are skipped rather than reported.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Device,
    Unauthorized,
    Offline,
    Other(String),
}

impl DeviceState {
    pub fn from_token(token: &str) -> Self {
        match token {
            "device" => DeviceState::Device,
            "unauthorized" => DeviceState::Unauthorized,
            "offline" => DeviceState::Offline,
            other => DeviceState::Other(other.to_string()),
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, DeviceState::Device)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLine {
    pub serial: String,
    pub state: DeviceState,
}

pub fn parse_device_line(line: &str) -> Option<DeviceLine> {
    let mut tokens = line.split_whitespace();
    let serial = tokens.next()?;
    let state = tokens.next()?;
    // adb prints daemon start-up chatter as "* daemon ..." lines.
    if serial.starts_with('*') {
        return None;
    }
    Some(DeviceLine {
        serial: serial.to_string(),
        state: DeviceState::from_token(state),
    })
}

/// Parses `adb devices` output. The first line is the header and is always dropped.
pub fn parse_adb_devices(output: &str) -> Vec<DeviceLine> {
    output
        .trim()
        .lines()
        .skip(1)
        .filter_map(parse_device_line)
        .collect()
}

/// First non-empty line of a `getprop <key>` reply.
pub fn parse_getprop_value(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Extracts the bracketed reason from replies like `Failure [DELETE_FAILED_INTERNAL_ERROR]`.
pub fn parse_uninstall_failure_reason(output: &str) -> Option<String> {
    static FAILURE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = FAILURE_RE
        .get_or_init(|| Regex::new(r"Failure\s*\[([^\]]+)\]").ok())
        .as_ref()?;
    re.captures(output)
        .map(|caps| caps[1].trim().to_string())
        .filter(|reason| !reason.is_empty())
}
