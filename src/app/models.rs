use serde::{Deserialize, Serialize};

use crate::app::adb::apps::classify_install_path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    pub authorized: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PackageCategory {
    External,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub install_path: String,
    pub category: PackageCategory,
}

impl Package {
    /// Builds a package whose category is derived from `install_path`.
    pub fn new(name: impl Into<String>, install_path: impl Into<String>) -> Self {
        let install_path = install_path.into();
        let category = classify_install_path(&install_path);
        Self {
            name: name.into(),
            install_path,
            category,
        }
    }
}

/// Installed packages of one device at one point in time, split by category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub external: Vec<Package>,
    pub system: Vec<Package>,
}

impl Catalog {
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let (system, external) = packages
            .into_iter()
            .partition(|package| package.category == PackageCategory::System);
        Self { external, system }
    }

    pub fn len(&self) -> usize {
        self.external.len() + self.system.len()
    }

    pub fn is_empty(&self) -> bool {
        self.external.is_empty() && self.system.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Package> {
        self.external
            .iter()
            .chain(self.system.iter())
            .find(|package| package.name == name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Event delivered from producers (directory, catalog, uninstall workers) to the single
/// consumer draining the notification channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    StatusUpdate { text: String, severity: Severity },
    RefreshRequested,
}

impl Notification {
    pub fn status(severity: Severity, text: impl Into<String>) -> Self {
        Notification::StatusUpdate {
            text: text.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdbInfo {
    pub available: bool,
    pub version_output: String,
    pub command_path: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_partitions_by_category_preserving_order() {
        let catalog = Catalog::from_packages(vec![
            Package::new("com.b", "/data/app/com.b/base.apk"),
            Package::new("com.android.settings", "/system/priv-app/Settings/Settings.apk"),
            Package::new("com.a", "/data/app/com.a/base.apk"),
        ]);
        let external: Vec<_> = catalog.external.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(external, vec!["com.b", "com.a"]);
        assert_eq!(catalog.system.len(), 1);
        assert_eq!(catalog.len(), 3);
        assert!(catalog.find("com.android.settings").is_some());
        assert!(catalog.find("com.missing").is_none());
    }

    #[test]
    fn notifications_serialize_with_type_tag() {
        let value = serde_json::to_value(Notification::status(Severity::Success, "done"))
            .expect("serialize");
        assert_eq!(value["type"], "status_update");
        assert_eq!(value["severity"], "success");
        let refresh = serde_json::to_value(Notification::RefreshRequested).expect("serialize");
        assert_eq!(refresh["type"], "refresh_requested");
    }
}
