use crate::range::{VersionRange, exact_version};
use lstn_core::{DependencyKind, LockfileError, RegistryClient};
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const PACKAGE_JSON_FILE: &str = "package.json";

/// Kind → (name → resolved version).
pub type ResolvedDependencies = BTreeMap<DependencyKind, BTreeMap<String, Version>>;

/// Direct dependencies declared by a `package.json`, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
    dependencies: BTreeMap<DependencyKind, BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPackageJson {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default, alias = "bundledDependencies")]
    bundle_dependencies: Option<BundleDependencies>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BundleDependencies {
    Names(Vec<String>),
    All(bool),
}

/// How a declared specifier is turned into a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Specifier {
    Latest,
    Exact(Version),
    Range(VersionRange),
    Unsupported,
}

impl Specifier {
    fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "latest" {
            return Self::Latest;
        }
        if let Some(version) = exact_version(trimmed) {
            return Self::Exact(version);
        }
        match VersionRange::parse(trimmed) {
            Ok(range) => Self::Range(range),
            Err(_) => Self::Unsupported,
        }
    }
}

impl PackageJson {
    pub fn from_dir(directory: &Path) -> Result<Self, LockfileError> {
        let path = directory.join(PACKAGE_JSON_FILE);
        if !path.is_file() {
            return Err(LockfileError::MissingManifest {
                directory: directory.display().to_string(),
            });
        }
        let raw = std::fs::read(&path).map_err(|source| LockfileError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    pub fn parse(raw: &[u8], path: &str) -> Result<Self, LockfileError> {
        let parsed: RawPackageJson =
            serde_json::from_slice(raw).map_err(|error| LockfileError::ParseFile {
                path: path.to_string(),
                message: error.to_string(),
            })?;

        let bundled = match &parsed.bundle_dependencies {
            Some(BundleDependencies::Names(names)) => names.clone(),
            Some(BundleDependencies::All(true)) => parsed.dependencies.keys().cloned().collect(),
            Some(BundleDependencies::All(false)) | None => Vec::new(),
        };
        let bundled = bundled
            .into_iter()
            .map(|name| {
                let specifier = parsed
                    .dependencies
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| "latest".to_string());
                (name, specifier)
            })
            .collect::<BTreeMap<_, _>>();

        let mut dependencies = BTreeMap::new();
        for (kind, declared) in [
            (DependencyKind::Dependencies, parsed.dependencies),
            (DependencyKind::DevDependencies, parsed.dev_dependencies),
            (DependencyKind::PeerDependencies, parsed.peer_dependencies),
            (DependencyKind::OptionalDependencies, parsed.optional_dependencies),
            (DependencyKind::BundleDependencies, bundled),
        ] {
            if !declared.is_empty() {
                dependencies.insert(kind, declared);
            }
        }

        Ok(Self {
            name: parsed.name,
            version: parsed.version,
            dependencies,
        })
    }

    pub fn dependencies(&self, kind: DependencyKind) -> Option<&BTreeMap<String, String>> {
        self.dependencies.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.values().all(BTreeMap::is_empty)
    }

    pub fn filter_out_by_kinds(&mut self, kinds: &[DependencyKind]) {
        self.dependencies.retain(|kind, _| !kinds.contains(kind));
    }

    pub fn filter_out_by_names(&mut self, names: &[String]) {
        for declared in self.dependencies.values_mut() {
            declared.retain(|name, _| !names.contains(name));
        }
        self.dependencies.retain(|_, declared| !declared.is_empty());
    }

    /// Resolves every declared specifier to the highest version the registry offers.
    ///
    /// Dependencies that cannot be resolved are logged and left out.
    pub async fn resolve(&self, registry: &dyn RegistryClient) -> ResolvedDependencies {
        let mut resolved = ResolvedDependencies::new();

        for (kind, declared) in &self.dependencies {
            for (name, raw) in declared {
                let specifier = Specifier::classify(raw);
                if specifier == Specifier::Unsupported {
                    tracing::warn!(
                        package = %name,
                        specifier = %raw,
                        "skipping dependency: not a semver specifier"
                    );
                    continue;
                }

                let versions = match registry.fetch_versions(name).await {
                    Ok(versions) => versions,
                    Err(error) => {
                        tracing::warn!(package = %name, %error, "couldn't get versions");
                        continue;
                    }
                };

                let chosen = match &specifier {
                    Specifier::Latest => versions
                        .latest
                        .clone()
                        .or_else(|| versions.highest(|_| true)),
                    Specifier::Exact(version) => versions.highest(|candidate| candidate == version),
                    Specifier::Range(range) => versions.highest(|candidate| range.matches(candidate)),
                    Specifier::Unsupported => None,
                };
                match chosen {
                    Some(version) => {
                        tracing::debug!(package = %name, %version, kind = %kind, "resolved");
                        resolved
                            .entry(*kind)
                            .or_default()
                            .insert(name.clone(), version);
                    }
                    None => {
                        tracing::warn!(
                            package = %name,
                            specifier = %raw,
                            "no registry version satisfies the specifier"
                        );
                    }
                }
            }
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lstn_core::{Ecosystem, PackageVersions, RegistryError};

    struct FakeRegistry;

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        fn ecosystem(&self) -> Ecosystem {
            Ecosystem::Npm
        }

        async fn fetch_versions(&self, package: &str) -> Result<PackageVersions, RegistryError> {
            let raw: &[&str] = match package {
                "react" => &["17.0.2", "18.0.0", "18.2.0", "19.0.0-rc.1"],
                "lodash" => &["4.17.20", "4.17.21"],
                "left-pad" => &["1.3.0"],
                _ => {
                    return Err(RegistryError::NotFound {
                        registry: "npm",
                        package: package.to_string(),
                    });
                }
            };
            let versions = raw
                .iter()
                .map(|value| Version::parse(value).expect("valid version"))
                .collect::<Vec<_>>();
            Ok(PackageVersions {
                name: package.to_string(),
                latest: versions
                    .iter()
                    .filter(|version| version.pre.is_empty())
                    .max()
                    .cloned(),
                versions,
            })
        }
    }

    const MANIFEST: &str = r#"{
      "name": "demo",
      "version": "1.0.0",
      "dependencies": {"react": "^18.0.0", "git-dep": "github:user/repo", "left-pad": "latest"},
      "devDependencies": {"lodash": "~4.17.0"},
      "peerDependencies": {"ghost": "1.0.0"},
      "bundleDependencies": ["left-pad"]
    }"#;

    #[test]
    fn parse_groups_dependencies_by_kind() {
        let manifest = PackageJson::parse(MANIFEST.as_bytes(), "package.json").expect("parse");
        assert_eq!(manifest.name.as_deref(), Some("demo"));
        assert_eq!(
            manifest
                .dependencies(DependencyKind::DevDependencies)
                .and_then(|deps| deps.get("lodash"))
                .map(String::as_str),
            Some("~4.17.0")
        );
        assert_eq!(
            manifest
                .dependencies(DependencyKind::BundleDependencies)
                .and_then(|deps| deps.get("left-pad"))
                .map(String::as_str),
            Some("latest")
        );
        assert!(
            manifest
                .dependencies(DependencyKind::OptionalDependencies)
                .is_none()
        );
    }

    #[test]
    fn filters_drop_kinds_and_names() {
        let mut manifest = PackageJson::parse(MANIFEST.as_bytes(), "package.json").expect("parse");
        manifest.filter_out_by_kinds(&[
            DependencyKind::BundleDependencies,
            DependencyKind::PeerDependencies,
        ]);
        manifest.filter_out_by_names(&["lodash".to_string()]);

        assert!(
            manifest
                .dependencies(DependencyKind::BundleDependencies)
                .is_none()
        );
        assert!(
            manifest
                .dependencies(DependencyKind::DevDependencies)
                .is_none()
        );
        assert!(!manifest.is_empty());

        manifest.filter_out_by_kinds(&[DependencyKind::Dependencies]);
        assert!(manifest.is_empty());
    }

    #[tokio::test]
    async fn resolve_picks_the_highest_matching_version() {
        let mut manifest = PackageJson::parse(MANIFEST.as_bytes(), "package.json").expect("parse");
        manifest.filter_out_by_kinds(&[DependencyKind::BundleDependencies]);

        let resolved = manifest.resolve(&FakeRegistry).await;
        let runtime = resolved
            .get(&DependencyKind::Dependencies)
            .expect("runtime dependencies");
        assert_eq!(runtime.get("react").map(ToString::to_string).as_deref(), Some("18.2.0"));
        assert_eq!(runtime.get("left-pad").map(ToString::to_string).as_deref(), Some("1.3.0"));
        assert!(!runtime.contains_key("git-dep"));

        let dev = resolved
            .get(&DependencyKind::DevDependencies)
            .expect("dev dependencies");
        assert_eq!(dev.get("lodash").map(ToString::to_string).as_deref(), Some("4.17.21"));

        assert!(!resolved.contains_key(&DependencyKind::PeerDependencies));
    }

    #[test]
    fn from_dir_reports_missing_manifest() {
        let dir = std::env::temp_dir().join(format!(
            "lstn-npm-manifest-missing-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("create dir");
        let err = PackageJson::from_dir(&dir).expect_err("missing manifest");
        assert_eq!(
            err.to_string(),
            format!("directory {} does not contain a package.json file", dir.display())
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn specifiers_are_classified() {
        assert_eq!(Specifier::classify("latest"), Specifier::Latest);
        assert_eq!(Specifier::classify(""), Specifier::Latest);
        assert!(matches!(Specifier::classify("=1.0.0"), Specifier::Exact(_)));
        assert!(matches!(Specifier::classify(">=1 <2"), Specifier::Range(_)));
        assert_eq!(
            Specifier::classify("git+https://github.com/u/r.git"),
            Specifier::Unsupported
        );
    }
}
