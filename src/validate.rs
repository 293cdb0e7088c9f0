//! Field validation and transforms for resolved options and command arguments.
//!
//! Messages use the human name of each option rather than its flag.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

use crate::config::{Options, Scope};
use crate::jq;

pub const MIN_TIMEOUT: u64 = 30;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

static ENDPOINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(http://(localhost|127\.0\.0\.1)(:\d{1,5})?|https://.*\.listen\.dev)")
        .expect("endpoint pattern compiles")
});

static NPM_PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:@[a-z0-9\-*~][a-z0-9\-*._~]*/)?[a-z0-9\-~][a-z0-9\-._~]*$")
        .expect("package name pattern compiles")
});

static SHASUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{40}$").expect("shasum pattern compiles"));

/// Validates the options attached to `scope`, returning one message per failure.
pub fn options(options: &Options, scope: Scope) -> Vec<String> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&options.loglevel.as_str()) {
        errors.push(format!(
            "log level must be one of [{}]",
            LOG_LEVELS.join(" ")
        ));
    }
    if options.timeout < MIN_TIMEOUT {
        errors.push(format!("timeout must be {MIN_TIMEOUT} or greater"));
    }

    endpoint("NPM endpoint", &options.endpoint.npm, &mut errors);
    endpoint("PyPi endpoint", &options.endpoint.pypi, &mut errors);
    if scope.attaches_core_endpoint() && !is_url(&options.endpoint.core) {
        errors.push("Core API must be a valid URL".to_string());
    }

    let mandatory_tokens = scope.attaches_core_endpoint();
    if scope.attaches("gh-token") {
        token("GitHub token", &options.gh_token, mandatory_tokens, &mut errors);
    }
    if scope.attaches("jwt-token") {
        token("JWT token", &options.jwt_token, mandatory_tokens, &mut errors);
    }
    if scope.attaches("npm-registry") && !is_url(&options.npm_registry) {
        errors.push("NPM registry must be a valid URL".to_string());
    }

    if scope.attaches("jq") && !options.jq.is_empty() {
        if !options.json {
            errors.push("jq requires --json".to_string());
        }
        if let Err(error) = jq::Query::compile(&options.jq) {
            errors.push(format!("jq must be a valid JSON query: {error}"));
        }
    }

    if scope.attaches("dir") && !options.dir.is_empty() && !Path::new(&options.dir).is_dir() {
        errors.push("dir must be an existing directory".to_string());
    }

    errors
}

/// Transforms applied after validation succeeded.
pub fn transform(options: &mut Options) {
    for url in [
        &mut options.endpoint.npm,
        &mut options.endpoint.pypi,
        &mut options.endpoint.core,
        &mut options.npm_registry,
    ] {
        let trimmed = url.trim_end_matches('/').len();
        url.truncate(trimmed);
    }
}

fn endpoint(name: &str, value: &str, errors: &mut Vec<String>) {
    if !is_url(value) {
        errors.push(format!("{name} must be a valid URL"));
    } else if !ENDPOINT.is_match(value) {
        errors.push(format!("{name} must be a valid listen.dev endpoint"));
    }
}

fn token(name: &str, value: &str, mandatory: bool, errors: &mut Vec<String>) {
    if value.is_empty() {
        if mandatory {
            errors.push(format!("{name} is mandatory"));
        }
    } else if value.trim().is_empty() {
        errors.push(format!("{name} must not be blank"));
    }
}

pub fn is_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| url.has_host())
}

pub fn is_npm_package_name(value: &str) -> bool {
    !value.is_empty() && value.len() <= 214 && NPM_PACKAGE_NAME.is_match(value)
}

pub fn is_shasum(value: &str) -> bool {
    SHASUM.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Options {
        Options::defaults(None)
    }

    #[test]
    fn defaults_are_valid_outside_ci() {
        for scope in [Scope::In, Scope::Scan, Scope::To] {
            assert!(options(&defaults(), scope).is_empty(), "{scope:?}");
        }
    }

    #[test]
    fn ci_scopes_require_both_tokens() {
        assert_eq!(
            options(&defaults(), Scope::CiReport),
            vec!["GitHub token is mandatory", "JWT token is mandatory"]
        );

        let mut opts = defaults();
        opts.gh_token = "ghp_x".to_string();
        opts.jwt_token = "jwt".to_string();
        assert!(options(&opts, Scope::CiEnable).is_empty());
    }

    #[test]
    fn timeout_and_endpoints_are_checked() {
        let mut opts = defaults();
        opts.timeout = 10;
        opts.endpoint.npm = "https://example.com".to_string();
        opts.endpoint.pypi = "not a url".to_string();

        assert_eq!(
            options(&opts, Scope::In),
            vec![
                "timeout must be 30 or greater",
                "NPM endpoint must be a valid listen.dev endpoint",
                "PyPi endpoint must be a valid URL",
            ]
        );
    }

    #[test]
    fn local_endpoints_are_accepted() {
        let mut opts = defaults();
        opts.endpoint.npm = "http://127.0.0.1:3000".to_string();
        opts.endpoint.pypi = "http://localhost".to_string();
        assert!(options(&opts, Scope::Scan).is_empty());
    }

    #[test]
    fn jq_requires_json_and_must_compile() {
        let mut opts = defaults();
        opts.jq = ".[] | .name".to_string();
        assert_eq!(options(&opts, Scope::To), vec!["jq requires --json"]);

        opts.json = true;
        assert!(options(&opts, Scope::To).is_empty());

        opts.jq = ".[".to_string();
        let errors = options(&opts, Scope::To);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("jq must be a valid JSON query"));
    }

    #[test]
    fn blank_tokens_are_rejected() {
        let mut opts = defaults();
        opts.gh_token = "   ".to_string();
        assert_eq!(
            options(&opts, Scope::Scan),
            vec!["GitHub token must not be blank"]
        );
    }

    #[test]
    fn transform_trims_trailing_slashes() {
        let mut opts = defaults();
        opts.endpoint.npm = "https://npm.listen.dev//".to_string();
        opts.npm_registry = "https://registry.npmjs.org/".to_string();
        transform(&mut opts);
        assert_eq!(opts.endpoint.npm, "https://npm.listen.dev");
        assert_eq!(opts.npm_registry, "https://registry.npmjs.org");
    }

    #[test]
    fn package_names_and_shasums() {
        assert!(is_npm_package_name("react"));
        assert!(is_npm_package_name("@vue/devtools"));
        assert!(!is_npm_package_name("React"));
        assert!(!is_npm_package_name(".hidden"));
        assert!(!is_npm_package_name("with space"));

        assert!(is_shasum("b468736d1f4a5891f38585ba8e8fb29f91c3cb96"));
        assert!(!is_shasum("b468736d"));
    }
}
