use std::collections::BTreeMap;
use std::path::Path;

use lstn_http::{OsInfo, ToolVersion};
use serde::Serialize;
use uuid::Uuid;

use super::git::{self, GitInfo};
use crate::config::Env;

/// Provenance attached to every request sent to the verdict service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisContext {
    pub id: Uuid,
    pub version: ToolVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub packagemanagers: BTreeMap<String, String>,
}

impl AnalysisContext {
    /// Gathers what is available. Git info comes from the first of `directories`
    /// inside a repository, then from the working directory.
    pub fn collect(directories: &[&Path], env: &dyn Env) -> Self {
        let home = dirs::home_dir();
        let cwd = std::env::current_dir().ok();
        let git = directories
            .iter()
            .copied()
            .chain(cwd.as_deref())
            .find_map(|directory| git::discover(directory, home.as_deref(), env));

        let os = OsInfo::detect();
        Self {
            id: Uuid::new_v4(),
            version: ToolVersion::current(),
            os: (!os.is_empty()).then_some(os),
            git,
            packagemanagers: BTreeMap::new(),
        }
    }

    pub fn with_package_manager(mut self, name: &str, version: Option<String>) -> Self {
        if let Some(version) = version {
            self.packagemanagers.insert(name.to_string(), version);
        }
        self
    }

    #[cfg(test)]
    pub(crate) fn fixed() -> Self {
        Self {
            id: Uuid::nil(),
            version: ToolVersion {
                short: "0.0.0".to_string(),
                long: "0.0.0-test".to_string(),
            },
            os: None,
            git: None,
            packagemanagers: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_only_known_parts() {
        let context = AnalysisContext::fixed().with_package_manager("npm", Some("9.6.7".into()));
        assert_eq!(
            serde_json::to_value(&context).expect("serialize"),
            json!({
                "id": "00000000-0000-0000-0000-000000000000",
                "version": {"short": "0.0.0", "long": "0.0.0-test"},
                "packagemanagers": {"npm": "9.6.7"}
            })
        );
    }

    #[test]
    fn collect_always_has_version_and_id() {
        let context = AnalysisContext::collect(&[], &BTreeMap::<String, String>::new());
        assert_eq!(context.version, ToolVersion::current());
        assert_ne!(context.id, Uuid::nil());
        assert!(context.packagemanagers.is_empty());
    }
}
