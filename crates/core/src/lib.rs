//! Domain types shared by every crate of the lstn workspace.

mod executable;
mod verdict;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub use executable::{find_executable, is_executable};
pub use verdict::{Package, Problem, Response, Severity, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pypi,
}

impl Ecosystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pypi => "pypi",
        }
    }

    /// Human-facing spelling.
    pub fn label(self) -> &'static str {
        match self {
            Self::Npm => "NPM",
            Self::Pypi => "PyPi",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The section of a manifest a dependency was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyKind {
    #[serde(rename = "dep")]
    Dependencies,
    #[serde(rename = "dev")]
    DevDependencies,
    #[serde(rename = "peer")]
    PeerDependencies,
    #[serde(rename = "optional")]
    OptionalDependencies,
    #[serde(rename = "bundle")]
    BundleDependencies,
}

impl DependencyKind {
    pub const ALL: [DependencyKind; 5] = [
        Self::Dependencies,
        Self::DevDependencies,
        Self::PeerDependencies,
        Self::OptionalDependencies,
        Self::BundleDependencies,
    ];

    /// Short identifier used on the command line and in configuration files.
    pub fn id(self) -> &'static str {
        match self {
            Self::Dependencies => "dep",
            Self::DevDependencies => "dev",
            Self::PeerDependencies => "peer",
            Self::OptionalDependencies => "optional",
            Self::BundleDependencies => "bundle",
        }
    }

    /// Key of the matching object in `package.json`.
    pub fn manifest_key(self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::DevDependencies => "devDependencies",
            Self::PeerDependencies => "peerDependencies",
            Self::OptionalDependencies => "optionalDependencies",
            Self::BundleDependencies => "bundleDependencies",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} is not a valid dependency type")]
pub struct UnknownDependencyKind(pub String);

impl FromStr for DependencyKind {
    type Err = UnknownDependencyKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| {
                kind.id() == normalized || kind.manifest_key().eq_ignore_ascii_case(&normalized)
            })
            .ok_or_else(|| UnknownDependencyKind(raw.to_string()))
    }
}

/// A declared dependency, before any version resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub specifier: Option<String>,
}

/// A pinned package as recorded by a lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockfileEntry {
    pub name: String,
    pub version: String,
    pub integrity: Option<String>,
    pub kind: DependencyKind,
}

/// A lockfile loaded from disk.
///
/// Implementors keep the exact bytes they were parsed from: the verdict service
/// re-parses the lockfile on its side, so it receives [`Lockfile::encode`].
pub trait Lockfile: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;
    fn file_name(&self) -> &'static str;
    fn raw(&self) -> &[u8];
    fn entries(&self) -> Vec<LockfileEntry>;

    fn encode(&self) -> String {
        BASE64_STANDARD.encode(self.raw())
    }
}

/// Inverse of [`Lockfile::encode`].
pub fn decode_lockfile(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_STANDARD.decode(encoded)
}

/// All known versions of a package in a registry.
#[derive(Debug, Clone, Default)]
pub struct PackageVersions {
    pub name: String,
    pub latest: Option<Version>,
    pub versions: Vec<Version>,
}

impl PackageVersions {
    /// Versions accepted by `accepts`, in ascending order.
    pub fn matching(&self, accepts: impl Fn(&Version) -> bool) -> Vec<Version> {
        let mut matched = self
            .versions
            .iter()
            .filter(|version| accepts(version))
            .cloned()
            .collect::<Vec<_>>();
        matched.sort();
        matched.dedup();
        matched
    }

    pub fn highest(&self, accepts: impl Fn(&Version) -> bool) -> Option<Version> {
        self.versions
            .iter()
            .filter(|version| accepts(version))
            .max()
            .cloned()
    }
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("package '{package}' was not found in the {registry} registry")]
    NotFound {
        registry: &'static str,
        package: String,
    },
    #[error("the {registry} registry response for {url} was not ok")]
    NotOk { registry: &'static str, url: String },
    #[error("registry request failed: {message}")]
    Transport { message: String },
    #[error("registry returned invalid data: {message}")]
    InvalidResponse { message: String },
    #[error("the operation was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("failed to determine current directory: {source}")]
    CurrentDirectory {
        #[source]
        source: std::io::Error,
    },
    #[error("requires the argument to be an existing directory ({path})")]
    NotADirectory { path: String },
    #[error("directory {directory} does not contain the {file_name} file")]
    MissingFile {
        directory: String,
        file_name: String,
    },
    #[error("directory {directory} does not contain a package.json file")]
    MissingManifest { directory: String },
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't parse {path}: {message}")]
    ParseFile { path: String, message: String },
    #[error("unsupported lockfile version {version} in {path}")]
    UnsupportedVersion { path: String, version: i64 },
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;
    async fn fetch_versions(&self, package: &str) -> Result<PackageVersions, RegistryError>;
}

/// Resolves the directory a command operates on.
///
/// `None` means the current working directory. The result is absolute.
///
/// # Errors
///
/// Returns an error when the path does not exist or is not a directory.
pub fn resolve_directory(path: Option<&str>) -> Result<PathBuf, LockfileError> {
    let candidate = match path {
        Some(value) => PathBuf::from(value),
        None => std::env::current_dir()
            .map_err(|source| LockfileError::CurrentDirectory { source })?,
    };

    if !candidate.is_dir() {
        return Err(LockfileError::NotADirectory {
            path: candidate.display().to_string(),
        });
    }

    std::path::absolute(&candidate).map_err(|source| LockfileError::CurrentDirectory { source })
}

/// Reads `file_name` from `directory`, reporting a missing file the way users expect.
///
/// # Errors
///
/// Returns [`LockfileError::MissingFile`] when the file is absent and
/// [`LockfileError::ReadFile`] on I/O failures.
pub fn read_from_directory(directory: &Path, file_name: &str) -> Result<Vec<u8>, LockfileError> {
    let path = directory.join(file_name);
    if !path.is_file() {
        return Err(LockfileError::MissingFile {
            directory: directory.display().to_string(),
            file_name: file_name.to_string(),
        });
    }

    std::fs::read(&path).map_err(|source| LockfileError::ReadFile {
        path: path.display().to_string(),
        source,
    })
}
