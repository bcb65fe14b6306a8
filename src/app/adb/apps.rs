use crate::app::models::{Package, PackageCategory};

/// Install roots whose packages count as system packages.
pub const SYSTEM_PATH_PREFIXES: [&str; 5] = [
    "/system/app/",
    "/system/priv-app/",
    "/vendor/app/",
    "/product/app/",
    "/data/app/~~/",
];

const PACKAGE_LINE_PREFIX: &str = "package:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLine {
    pub install_path: String,
    pub package_name: String,
}

pub fn classify_install_path(path: &str) -> PackageCategory {
    if SYSTEM_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        PackageCategory::System
    } else {
        PackageCategory::External
    }
}

/// Parses one `package:<path>=<name>` line, splitting on the first `=`.
pub fn parse_package_line(raw: &str) -> Option<PackageLine> {
    let line = raw.trim();
    let payload = line.strip_prefix(PACKAGE_LINE_PREFIX)?;
    let (install_path, package_name) = payload.split_once('=')?;
    let package_name = package_name.trim();
    if package_name.is_empty() {
        return None;
    }
    Some(PackageLine {
        install_path: install_path.trim().to_string(),
        package_name: package_name.to_string(),
    })
}

pub fn parse_pm_list_packages_output(output: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(parse_package_line)
        .map(|line| Package::new(line.package_name, line.install_path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pm_list_packages_output() {
        let output = "package:/data/app/com.example/base.apk=com.example\npackage:/system/app/Sys.apk=com.android.sys\n";
        let items = parse_pm_list_packages_output(output);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "com.example");
        assert_eq!(items[0].install_path, "/data/app/com.example/base.apk");
        assert_eq!(items[0].category, PackageCategory::External);
        assert_eq!(items[1].category, PackageCategory::System);
    }

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(classify_install_path("/system/app/Foo.apk"), PackageCategory::System);
        assert_eq!(
            classify_install_path("/system/priv-app/Settings/Settings.apk"),
            PackageCategory::System
        );
        assert_eq!(classify_install_path("/vendor/app/V.apk"), PackageCategory::System);
        assert_eq!(classify_install_path("/product/app/P.apk"), PackageCategory::System);
        assert_eq!(
            classify_install_path("/data/app/~~/com.bar/base.apk"),
            PackageCategory::System
        );
        assert_eq!(
            classify_install_path("/data/app/com.foo/base.apk"),
            PackageCategory::External
        );
    }

    #[test]
    fn classification_is_not_substring_based() {
        assert_eq!(
            classify_install_path("/mnt/expand/system/app/Foo.apk"),
            PackageCategory::External
        );
        assert_eq!(classify_install_path("/system/framework/x.apk"), PackageCategory::External);
        assert_eq!(classify_install_path(""), PackageCategory::External);
    }

    #[test]
    fn splits_on_first_equals_sign() {
        let line = parse_package_line("package:/data/app/a=b/base.apk=com.example").expect("line");
        assert_eq!(line.install_path, "/data/app/a");
        assert_eq!(line.package_name, "b/base.apk=com.example");
    }

    #[test]
    fn skips_lines_without_prefix_or_name() {
        let output = "Error: could not access the Package Manager\npackage:/data/app/x.apk\npackage:/data/app/y.apk=\n\r\npackage:/data/app/z/base.apk=com.z\r\n";
        let items = parse_pm_list_packages_output(output);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "com.z");
    }

    #[test]
    fn reclassifying_is_stable() {
        let items = parse_pm_list_packages_output(
            "package:/system/app/A.apk=a\npackage:/data/app/b/base.apk=b\n",
        );
        for item in items {
            assert_eq!(classify_install_path(&item.install_path), item.category);
        }
    }
}
