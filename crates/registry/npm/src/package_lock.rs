use lstn_core::{
    DependencyKind, Ecosystem, Lockfile, LockfileEntry, LockfileError, read_from_directory,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub const PACKAGE_LOCK_FILE: &str = "package-lock.json";

const NODE_MODULES: &str = "node_modules/";

/// A parsed `package-lock.json`, versions 1 to 3.
#[derive(Debug, Clone)]
pub struct PackageLockJson {
    raw: Vec<u8>,
    name: Option<String>,
    lockfile_version: i64,
    entries: Vec<LockfileEntry>,
}

impl PackageLockJson {
    pub fn from_dir(directory: &Path) -> Result<Self, LockfileError> {
        let raw = read_from_directory(directory, PACKAGE_LOCK_FILE)?;
        Self::parse(raw, &directory.join(PACKAGE_LOCK_FILE).display().to_string())
    }

    pub fn parse(raw: Vec<u8>, path: &str) -> Result<Self, LockfileError> {
        let root: Value =
            serde_json::from_slice(&raw).map_err(|error| LockfileError::ParseFile {
                path: path.to_string(),
                message: error.to_string(),
            })?;
        let Some(root) = root.as_object() else {
            return Err(LockfileError::ParseFile {
                path: path.to_string(),
                message: "expected a JSON object".to_string(),
            });
        };

        let lockfile_version = root
            .get("lockfileVersion")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        if !(1..=3).contains(&lockfile_version) {
            return Err(LockfileError::UnsupportedVersion {
                path: path.to_string(),
                version: lockfile_version,
            });
        }

        let mut collected = BTreeMap::<(String, String), LockfileEntry>::new();
        match root.get("packages").and_then(Value::as_object) {
            Some(packages) if lockfile_version >= 2 => collect_packages(packages, &mut collected),
            _ => {
                if let Some(dependencies) = root.get("dependencies").and_then(Value::as_object) {
                    collect_dependencies(dependencies, &mut collected);
                }
            }
        }

        Ok(Self {
            name: root.get("name").and_then(Value::as_str).map(str::to_string),
            raw,
            lockfile_version,
            entries: collected.into_values().collect(),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn lockfile_version(&self) -> i64 {
        self.lockfile_version
    }
}

impl Lockfile for PackageLockJson {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn file_name(&self) -> &'static str {
        PACKAGE_LOCK_FILE
    }

    fn raw(&self) -> &[u8] {
        &self.raw
    }

    fn entries(&self) -> Vec<LockfileEntry> {
        self.entries.clone()
    }
}

/// Lockfile v2/v3 layout: a flat map keyed by install path.
fn collect_packages(
    packages: &Map<String, Value>,
    collected: &mut BTreeMap<(String, String), LockfileEntry>,
) {
    for (install_path, value) in packages {
        let Some(name) = package_name_from_install_path(install_path) else {
            continue;
        };
        let Some(details) = value.as_object() else {
            continue;
        };
        if flag(details, "link") {
            continue;
        }
        insert_entry(name, details, collected);
    }
}

/// Lockfile v1 layout: nested `dependencies` objects.
fn collect_dependencies(
    dependencies: &Map<String, Value>,
    collected: &mut BTreeMap<(String, String), LockfileEntry>,
) {
    for (name, value) in dependencies {
        let Some(details) = value.as_object() else {
            continue;
        };
        insert_entry(name.clone(), details, collected);
        if let Some(nested) = details.get("dependencies").and_then(Value::as_object) {
            collect_dependencies(nested, collected);
        }
    }
}

fn insert_entry(
    name: String,
    details: &Map<String, Value>,
    collected: &mut BTreeMap<(String, String), LockfileEntry>,
) {
    let Some(version) = details.get("version").and_then(Value::as_str) else {
        return;
    };
    let version = version.trim();
    if version.is_empty() {
        return;
    }

    let entry = LockfileEntry {
        name: name.clone(),
        version: version.to_string(),
        integrity: details
            .get("integrity")
            .and_then(Value::as_str)
            .map(str::to_string),
        kind: entry_kind(details),
    };
    collected
        .entry((name, version.to_string()))
        .or_insert(entry);
}

fn entry_kind(details: &Map<String, Value>) -> DependencyKind {
    if flag(details, "inBundle") || flag(details, "bundled") {
        DependencyKind::BundleDependencies
    } else if flag(details, "dev") || flag(details, "devOptional") {
        DependencyKind::DevDependencies
    } else if flag(details, "peer") {
        DependencyKind::PeerDependencies
    } else if flag(details, "optional") {
        DependencyKind::OptionalDependencies
    } else {
        DependencyKind::Dependencies
    }
}

fn flag(details: &Map<String, Value>, key: &str) -> bool {
    details.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn package_name_from_install_path(install_path: &str) -> Option<String> {
    let index = install_path.rfind(NODE_MODULES)?;
    let name = &install_path[index + NODE_MODULES.len()..];
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(suffix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("lstn-npm-lockfile-{nanos}-{suffix}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn find<'a>(lock: &'a [LockfileEntry], name: &str) -> Option<&'a LockfileEntry> {
        lock.iter().find(|entry| entry.name == name)
    }

    #[test]
    fn parses_version_one_nested_dependencies() {
        let raw = br#"{
          "name": "demo",
          "lockfileVersion": 1,
          "dependencies": {
            "react": {
              "version": "18.0.0",
              "integrity": "sha512-abc",
              "dependencies": {
                "loose-envify": {"version": "1.4.0", "dev": true}
              }
            },
            "fsevents": {"version": "2.3.2", "optional": true}
          }
        }"#
        .to_vec();

        let lock = PackageLockJson::parse(raw, "package-lock.json").expect("parse v1");
        let entries = lock.entries();
        assert_eq!(lock.lockfile_version(), 1);
        assert_eq!(lock.name(), Some("demo"));
        assert_eq!(entries.len(), 3);
        assert_eq!(
            find(&entries, "react").and_then(|entry| entry.integrity.as_deref()),
            Some("sha512-abc")
        );
        assert_eq!(
            find(&entries, "loose-envify").map(|entry| entry.kind),
            Some(DependencyKind::DevDependencies)
        );
        assert_eq!(
            find(&entries, "fsevents").map(|entry| entry.kind),
            Some(DependencyKind::OptionalDependencies)
        );
    }

    #[test]
    fn parses_version_three_packages_map() {
        let raw = br#"{
          "name": "demo",
          "lockfileVersion": 3,
          "packages": {
            "": {"name": "demo", "dependencies": {"react": "^18.0.0"}},
            "node_modules/react": {"version": "18.2.0"},
            "node_modules/react/node_modules/@scope/pkg": {"version": "1.0.0", "peer": true},
            "node_modules/bundled": {"version": "0.1.0", "inBundle": true},
            "node_modules/local": {"resolved": "../local", "link": true}
          }
        }"#
        .to_vec();

        let lock = PackageLockJson::parse(raw, "package-lock.json").expect("parse v3");
        let entries = lock.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            find(&entries, "@scope/pkg").map(|entry| entry.kind),
            Some(DependencyKind::PeerDependencies)
        );
        assert_eq!(
            find(&entries, "bundled").map(|entry| entry.kind),
            Some(DependencyKind::BundleDependencies)
        );
        assert!(find(&entries, "local").is_none());
    }

    #[test]
    fn keeps_a_single_entry_per_name_and_version() {
        let raw = br#"{
          "lockfileVersion": 2,
          "packages": {
            "node_modules/ms": {"version": "2.1.3"},
            "node_modules/debug/node_modules/ms": {"version": "2.1.3"},
            "node_modules/send/node_modules/ms": {"version": "2.0.0"}
          },
          "dependencies": {"ms": {"version": "2.1.3"}}
        }"#
        .to_vec();

        let lock = PackageLockJson::parse(raw, "package-lock.json").expect("parse v2");
        let versions = lock
            .entries()
            .into_iter()
            .map(|entry| format!("{}@{}", entry.name, entry.version))
            .collect::<Vec<_>>();
        assert_eq!(versions, vec!["ms@2.0.0", "ms@2.1.3"]);
    }

    #[test]
    fn keeps_raw_bytes_for_encoding() {
        let raw = br#"{"lockfileVersion": 3, "packages": {}}"#.to_vec();
        let lock = PackageLockJson::parse(raw.clone(), "package-lock.json").expect("parse");
        assert_eq!(lock.raw(), raw.as_slice());
        assert_eq!(
            lstn_core::decode_lockfile(&lock.encode()).expect("base64"),
            raw
        );
    }

    #[test]
    fn rejects_unknown_versions_and_invalid_json() {
        let err = PackageLockJson::parse(br#"{"lockfileVersion": 9}"#.to_vec(), "x.json")
            .expect_err("unsupported version");
        assert!(matches!(
            err,
            LockfileError::UnsupportedVersion { version: 9, .. }
        ));

        let err = PackageLockJson::parse(b"{invalid".to_vec(), "x.json").expect_err("bad json");
        assert!(matches!(err, LockfileError::ParseFile { .. }));
    }

    #[test]
    fn from_dir_reports_missing_lockfile() {
        let dir = unique_temp_dir("missing");
        let err = PackageLockJson::from_dir(&dir).expect_err("missing lockfile");
        assert_eq!(
            err.to_string(),
            format!(
                "directory {} does not contain the package-lock.json file",
                dir.display()
            )
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn install_path_names_handle_nested_scopes() {
        assert_eq!(
            package_name_from_install_path("node_modules/a/node_modules/@s/b"),
            Some("@s/b".to_string())
        );
        assert_eq!(package_name_from_install_path(""), None);
        assert_eq!(package_name_from_install_path("packages/demo"), None);
    }
}
