//! Response model of the verdict service.
//!
//! Fields the client does not interpret are kept in `extra` so a decoded response
//! re-serializes without losing information.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pkg: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Verdict {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Name and version of the transitive dependency this verdict was raised on, if any.
    pub fn transitive_origin(&self, package: &str, version: Option<&str>) -> Option<(&str, &str)> {
        let name = self.metadata_str("npm_package_name")?;
        let origin_version = self.metadata_str("npm_package_version")?;
        if name.is_empty() || origin_version.is_empty() {
            return None;
        }
        if name == package && version.is_none_or(|value| value == origin_version) {
            return None;
        }
        Some((name, origin_version))
    }

    /// Detector family encoded in the first three letters of the verdict code.
    pub fn code_group(&self) -> &str {
        match self.code.get(..3) {
            Some(prefix) if !prefix.is_empty() => prefix,
            _ => "UNK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default)]
    pub verdicts: Vec<Verdict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<Problem>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Package {
    pub fn is_clean(&self) -> bool {
        self.verdicts.is_empty() && self.problems.is_empty()
    }
}

/// Ordered list of package reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Response(pub Vec<Package>);

impl Response {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Package> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: Response) {
        self.0.extend(other.0);
    }

    pub fn verdicts(&self) -> impl Iterator<Item = (&Package, &Verdict)> {
        self.0
            .iter()
            .flat_map(|package| package.verdicts.iter().map(move |verdict| (package, verdict)))
    }

    /// Packages ordered by (name, version) for display.
    ///
    /// The sort is stable, and verdicts inside each package keep the server order.
    pub fn sorted(&self) -> Vec<&Package> {
        let mut packages = self.0.iter().collect::<Vec<_>>();
        packages.sort_by(|left, right| {
            left.name
                .cmp(&right.name)
                .then_with(|| left.version.cmp(&right.version))
        });
        packages
    }
}

impl IntoIterator for Response {
    type Item = Package;
    type IntoIter = std::vec::IntoIter<Package>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"[
      {
        "name": "react",
        "version": "18.0.0",
        "digest": "b468736d1f4a5891f38585ba8e8fb29f91c3cb96",
        "verdicts": [
          {
            "message": "outbound network connection",
            "severity": "high",
            "code": "FNI001",
            "pkg": "react",
            "version": "18.0.0",
            "metadata": {"npm_package_name": "loose-envify", "npm_package_version": "1.4.0"},
            "created_at": "2023-02-02T10:00:00Z"
          },
          {"message": "typo", "severity": "low", "code": "TSN001", "pkg": "react", "version": "18.0.0"}
        ],
        "problems": [{"type": "https://listen.dev/probs/invalid-name", "title": "Package name not valid", "detail": "x"}]
      },
      {"name": "abbrev", "verdicts": []}
    ]"#;

    #[test]
    fn decodes_service_payload_and_preserves_unknown_fields() {
        let response: Response = serde_json::from_str(PAYLOAD).expect("decode response");
        assert_eq!(response.len(), 2);

        let react = &response.0[0];
        assert_eq!(react.verdicts.len(), 2);
        assert_eq!(react.verdicts[0].severity, Severity::High);
        assert_eq!(react.verdicts[1].message, "typo");
        assert_eq!(react.problems[0].title, "Package name not valid");
        assert!(react.verdicts[0].extra.contains_key("created_at"));

        let reencoded = serde_json::to_value(&response).expect("encode response");
        assert_eq!(
            reencoded[0]["verdicts"][0]["created_at"],
            serde_json::json!("2023-02-02T10:00:00Z")
        );
    }

    #[test]
    fn transitive_origin_only_reports_other_packages() {
        let response: Response = serde_json::from_str(PAYLOAD).expect("decode response");
        let react = &response.0[0];

        assert_eq!(
            react.verdicts[0].transitive_origin("react", Some("18.0.0")),
            Some(("loose-envify", "1.4.0"))
        );
        assert_eq!(
            react.verdicts[1].transitive_origin("react", Some("18.0.0")),
            None
        );
    }

    #[test]
    fn code_group_falls_back_to_unknown() {
        let response: Response = serde_json::from_str(PAYLOAD).expect("decode response");
        assert_eq!(response.0[0].verdicts[0].code_group(), "FNI");

        let mut verdict = response.0[0].verdicts[1].clone();
        verdict.code.clear();
        assert_eq!(verdict.code_group(), "UNK");
    }

    #[test]
    fn sorted_orders_by_name_then_version() {
        let response: Response = serde_json::from_str(PAYLOAD).expect("decode response");
        let names = response
            .sorted()
            .into_iter()
            .map(|package| package.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["abbrev", "react"]);
    }
}
