use lstn_core::{
    DependencyKind, Ecosystem, Lockfile, LockfileEntry, LockfileError, read_from_directory,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const POETRY_LOCK_FILE: &str = "poetry.lock";

/// A `poetry.lock` file.
///
/// Only the `[[package]]` tables are decoded; the service receives the raw bytes.
#[derive(Debug, Clone)]
pub struct PoetryLock {
    raw: Vec<u8>,
    entries: Vec<LockfileEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPoetryLock {
    #[serde(default)]
    package: Vec<RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    name: String,
    version: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    optional: bool,
}

impl PoetryLock {
    pub fn from_dir(directory: &Path) -> Result<Self, LockfileError> {
        let raw = read_from_directory(directory, POETRY_LOCK_FILE)?;
        Self::parse(raw, &directory.join(POETRY_LOCK_FILE).display().to_string())
    }

    pub fn parse(raw: Vec<u8>, path: &str) -> Result<Self, LockfileError> {
        let parse_error = |message: String| LockfileError::ParseFile {
            path: path.to_string(),
            message,
        };
        let text = std::str::from_utf8(&raw).map_err(|error| parse_error(error.to_string()))?;
        let decoded: RawPoetryLock =
            toml::from_str(text).map_err(|error| parse_error(error.to_string()))?;

        let mut entries = BTreeMap::new();
        for package in decoded.package {
            let kind = match package.category.as_deref() {
                Some("dev") => DependencyKind::DevDependencies,
                _ if package.optional => DependencyKind::OptionalDependencies,
                _ => DependencyKind::Dependencies,
            };
            entries
                .entry((package.name.clone(), package.version.clone()))
                .or_insert(LockfileEntry {
                    name: package.name,
                    version: package.version,
                    integrity: None,
                    kind,
                });
        }

        Ok(Self {
            raw,
            entries: entries.into_values().collect(),
        })
    }
}

impl Lockfile for PoetryLock {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn file_name(&self) -> &'static str {
        POETRY_LOCK_FILE
    }

    fn raw(&self) -> &[u8] {
        &self.raw
    }

    fn entries(&self) -> Vec<LockfileEntry> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    const LOCK: &str = r#"
[[package]]
name = "requests"
version = "2.31.0"
description = "Python HTTP for Humans."
optional = false
python-versions = ">=3.7"
category = "main"

[[package]]
name = "pytest"
version = "7.4.0"
optional = false
python-versions = ">=3.7"
category = "dev"

[[package]]
name = "brotli"
version = "1.1.0"
optional = true
python-versions = "*"

[metadata]
lock-version = "2.0"
python-versions = "^3.10"
content-hash = "abc"
"#;

    fn unique_temp_dir(suffix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("lstn-pypi-{nanos}-{suffix}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn parses_packages_with_their_kind() {
        let lock = PoetryLock::parse(LOCK.as_bytes().to_vec(), "poetry.lock").expect("parse");
        let kinds = lock
            .entries()
            .into_iter()
            .map(|entry| (entry.name, entry.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ("brotli".to_string(), DependencyKind::OptionalDependencies),
                ("pytest".to_string(), DependencyKind::DevDependencies),
                ("requests".to_string(), DependencyKind::Dependencies),
            ]
        );
        assert_eq!(lock.ecosystem(), Ecosystem::Pypi);
    }

    #[test]
    fn encodes_the_file_as_read() {
        let lock = PoetryLock::parse(LOCK.as_bytes().to_vec(), "poetry.lock").expect("parse");
        let decoded = lstn_core::decode_lockfile(&lock.encode()).expect("base64");
        assert_eq!(decoded, LOCK.as_bytes());
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = PoetryLock::parse(b"[[package]\nname=".to_vec(), "poetry.lock")
            .expect_err("malformed toml");
        assert!(matches!(err, LockfileError::ParseFile { .. }));
    }

    #[test]
    fn from_dir_reads_the_lockfile() {
        let dir = unique_temp_dir("read");
        let err = PoetryLock::from_dir(&dir).expect_err("missing file");
        assert!(matches!(err, LockfileError::MissingFile { .. }));

        std::fs::write(dir.join(POETRY_LOCK_FILE), LOCK).expect("write lock");
        let lock = PoetryLock::from_dir(&dir).expect("lockfile");
        assert_eq!(lock.entries().len(), 3);
        let _ = std::fs::remove_dir_all(dir);
    }
}
