use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} is not a valid version constraint")]
pub struct InvalidRange(pub String);

/// An npm version range: alternatives joined by `||`, each one a set of
/// comparators that must all hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    pub fn parse(raw: &str) -> Result<Self, InvalidRange> {
        let invalid = || InvalidRange(raw.to_string());
        let mut alternatives = Vec::new();

        for alternative in raw.split("||") {
            let translated = translate_alternative(alternative.trim()).ok_or_else(invalid)?;
            alternatives.push(VersionReq::parse(&translated).map_err(|_| invalid())?);
        }

        if alternatives.is_empty() {
            return Err(invalid());
        }
        Ok(Self { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|requirement| requirement.matches(version))
    }
}

/// Parses an exact version, tolerating the `=` and `v` prefixes npm accepts.
pub fn exact_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let candidate = trimmed.strip_prefix('=').unwrap_or(trimmed).trim_start();
    let candidate = candidate.strip_prefix('v').unwrap_or(candidate);
    Version::parse(candidate).ok()
}

fn translate_alternative(alternative: &str) -> Option<String> {
    if alternative.is_empty() {
        return Some("*".to_string());
    }

    if let Some((lower, upper)) = alternative.split_once(" - ") {
        let lower = partial_version(lower.trim())?;
        let upper = partial_version(upper.trim())?;
        return Some(match (lower.as_str(), upper.as_str()) {
            ("*", "*") => "*".to_string(),
            ("*", upper) => format!("<={upper}"),
            (lower, "*") => format!(">={lower}"),
            (lower, upper) => format!(">={lower}, <={upper}"),
        });
    }

    let mut comparators = Vec::new();
    let mut pending_operator: Option<&str> = None;
    for token in alternative.split_whitespace() {
        if is_operator(token) {
            pending_operator = Some(token);
            continue;
        }
        let token = match pending_operator.take() {
            Some(operator) => format!("{operator}{token}"),
            None => token.to_string(),
        };
        if let Some(comparator) = translate_comparator(&token)? {
            comparators.push(comparator);
        }
    }
    if pending_operator.is_some() {
        return None;
    }

    if comparators.is_empty() {
        return Some("*".to_string());
    }
    Some(comparators.join(", "))
}

fn is_operator(token: &str) -> bool {
    matches!(token, "<" | "<=" | ">" | ">=" | "=" | "^" | "~")
}

/// Returns `None` for malformed input and `Some(None)` for comparators matching anything.
fn translate_comparator(token: &str) -> Option<Option<String>> {
    let split_at = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '^' | '~'))
        .unwrap_or(token.len());
    let (operator, version) = token.split_at(split_at);
    let version = partial_version(version)?;

    if version == "*" {
        return match operator {
            "" | "=" | "^" | "~" | ">=" | "<=" => Some(None),
            _ => None,
        };
    }

    let operator = match operator {
        // A bare npm version is an exact match, a bare Rust one is a caret.
        "" => "=",
        "~>" => "~",
        other => other,
    };
    Some(Some(format!("{operator}{version}")))
}

/// Normalizes `v1.2.x` style versions to the partial form `1.2`.
fn partial_version(raw: &str) -> Option<String> {
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }

    let (core, suffix) = match raw.find(['-', '+']) {
        Some(index) => raw.split_at(index),
        None => (raw, ""),
    };

    let mut parts = Vec::new();
    for part in core.split('.') {
        if matches!(part, "x" | "X" | "*") {
            break;
        }
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        parts.push(part);
    }

    if parts.is_empty() {
        return Some("*".to_string());
    }
    if parts.len() > 3 || (!suffix.is_empty() && parts.len() != 3) {
        return None;
    }
    Some(format!("{}{suffix}", parts.join(".")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        Version::parse(raw).expect("valid version")
    }

    #[test]
    fn bare_versions_match_exactly() {
        let range = VersionRange::parse("1.2.3").expect("valid range");
        assert!(range.matches(&v("1.2.3")));
        assert!(!range.matches(&v("1.2.4")));
    }

    #[test]
    fn supports_caret_tilde_and_wildcards() {
        let caret = VersionRange::parse("^4.17.0").expect("caret");
        assert!(caret.matches(&v("4.17.21")));
        assert!(!caret.matches(&v("5.0.0")));

        let tilde = VersionRange::parse("~1.2").expect("tilde");
        assert!(tilde.matches(&v("1.2.9")));
        assert!(!tilde.matches(&v("1.3.0")));

        let wildcard = VersionRange::parse("1.x").expect("wildcard");
        assert!(wildcard.matches(&v("1.99.0")));
        assert!(!wildcard.matches(&v("2.0.0")));

        assert!(VersionRange::parse("*").expect("star").matches(&v("0.0.1")));
        assert!(VersionRange::parse("").expect("empty").matches(&v("3.1.4")));
    }

    #[test]
    fn supports_space_separated_sets_and_alternatives() {
        let range = VersionRange::parse(">= 1.0.0 <1.5.0 || ^3").expect("complex range");
        assert!(range.matches(&v("1.4.0")));
        assert!(!range.matches(&v("1.5.0")));
        assert!(!range.matches(&v("2.0.0")));
        assert!(range.matches(&v("3.2.0")));
    }

    #[test]
    fn supports_hyphen_ranges() {
        let range = VersionRange::parse("1.2.3 - 2.3.4").expect("hyphen range");
        assert!(range.matches(&v("1.2.3")));
        assert!(range.matches(&v("2.3.4")));
        assert!(!range.matches(&v("2.3.5")));
    }

    #[test]
    fn rejects_non_semver_specifiers() {
        for raw in [
            "github:user/repo",
            "https://example.com/pkg.tgz",
            "latest",
            "file:../pkg",
            ">=",
        ] {
            assert!(VersionRange::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn exact_version_accepts_prefixes() {
        assert_eq!(exact_version("=1.2.3"), Some(v("1.2.3")));
        assert_eq!(exact_version("v2.0.0"), Some(v("2.0.0")));
        assert_eq!(exact_version("^2.0.0"), None);
    }
}
