//! Option resolution for `lstn`.
//!
//! Every subcommand materializes one [`Options`] value. Values are layered from lowest
//! to highest precedence: compiled-in defaults, the YAML configuration file, `LSTN_*`
//! environment variables, and command-line flags.

mod overlay;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lstn_core::DependencyKind;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::ci::CiInfo;
use crate::error::CliError;
use crate::validate;

use self::overlay::ConfigOverlay;

pub const ENV_PREFIX: &str = "LSTN";

pub const DEFAULT_LOGLEVEL: &str = "info";
pub const DEFAULT_TIMEOUT: u64 = 60;
pub const DEFAULT_NPM_ENDPOINT: &str = "https://npm.listen.dev";
pub const DEFAULT_PYPI_ENDPOINT: &str = "https://pypi.listen.dev";
pub const DEFAULT_CORE_ENDPOINT: &str = "https://core.listen.dev";
pub const DEFAULT_NPM_REGISTRY: &str = lstn_npm::DEFAULT_NPM_REGISTRY_URL;
pub const DEFAULT_LOCKFILES: [&str; 2] = ["package-lock.json", "poetry.lock"];

/// Configuration files looked up in the working directory, in order.
const LOCAL_CONFIG_FILES: [&str; 4] = [
    ".listendev.yaml",
    ".listendev.yml",
    ".listendev/config.yaml",
    ".listendev/config.yml",
];
const HOME_CONFIG_FILE: &str = ".lstn.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReporterKind {
    GhPullComment,
    GhPullReview,
    GhPullCheck,
}

impl ReporterKind {
    pub const ALL: [ReporterKind; 3] = [Self::GhPullCheck, Self::GhPullComment, Self::GhPullReview];

    pub fn id(self) -> &'static str {
        match self {
            Self::GhPullComment => "gh-pull-comment",
            Self::GhPullReview => "gh-pull-review",
            Self::GhPullCheck => "gh-pull-check",
        }
    }
}

impl fmt::Display for ReporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ReporterKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == normalized)
            .ok_or_else(|| format!("{raw} is not a valid reporter"))
    }
}

impl Serialize for ReporterKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoints {
    pub npm: String,
    pub pypi: String,
    pub core: String,
}

impl Endpoints {
    /// A core endpoint over plain HTTP addressed by IPv4 literal is a local one.
    pub fn is_local_core(&self) -> bool {
        let Some(address) = self.core.strip_prefix("http://") else {
            return false;
        };
        let host = address
            .split(['/', ':'])
            .next()
            .unwrap_or_default();
        let octets = host.split('.').collect::<Vec<_>>();
        octets.len() == 4 && octets.iter().all(|octet| octet.parse::<u8>().is_ok())
    }
}

/// Fully resolved options of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Options {
    pub loglevel: String,
    pub timeout: u64,
    pub endpoint: Endpoints,
    pub gh_token: String,
    pub jwt_token: String,
    pub npm_registry: String,
    pub reporter: Vec<ReporterKind>,
    pub gh_owner: String,
    pub gh_repo: String,
    pub gh_pull_id: u64,
    pub ignore_packages: Vec<String>,
    pub ignore_deptypes: Vec<DependencyKind>,
    pub select: String,
    pub json: bool,
    pub jq: String,
    pub lockfiles: Vec<String>,
    pub genlock: bool,
    pub dir: String,
    pub debug_options: bool,
}

impl Options {
    /// Compiled-in defaults. Inside GitHub Actions the pull request coordinates come from CI.
    pub fn defaults(ci: Option<&CiInfo>) -> Self {
        let (gh_owner, gh_repo, gh_pull_id) = match ci {
            Some(info) => (
                info.owner.clone(),
                info.repo.clone(),
                if info.is_github_pull_request() {
                    info.num
                } else {
                    0
                },
            ),
            None => (String::new(), String::new(), 0),
        };

        Self {
            loglevel: DEFAULT_LOGLEVEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            endpoint: Endpoints {
                npm: DEFAULT_NPM_ENDPOINT.to_string(),
                pypi: DEFAULT_PYPI_ENDPOINT.to_string(),
                core: DEFAULT_CORE_ENDPOINT.to_string(),
            },
            gh_token: String::new(),
            jwt_token: String::new(),
            npm_registry: DEFAULT_NPM_REGISTRY.to_string(),
            reporter: Vec::new(),
            gh_owner,
            gh_repo,
            gh_pull_id,
            ignore_packages: Vec::new(),
            ignore_deptypes: vec![DependencyKind::BundleDependencies],
            select: String::new(),
            json: false,
            jq: String::new(),
            lockfiles: DEFAULT_LOCKFILES.iter().map(ToString::to_string).collect(),
            genlock: false,
            dir: String::new(),
            debug_options: false,
        }
    }

    /// The options attached to `scope` as pretty JSON with sorted keys.
    pub fn debug_json(&self, scope: Scope) -> Result<String, CliError> {
        let Value::Object(mut all) = serde_json::to_value(self)? else {
            return Err(CliError::Decoding(
                "options did not serialize to an object".to_string(),
            ));
        };

        all.retain(|key, _| scope.attaches(key));
        if !scope.attaches_core_endpoint()
            && let Some(Value::Object(endpoint)) = all.get_mut("endpoint")
        {
            endpoint.remove("core");
        }

        Ok(serde_json::to_string_pretty(&Value::Object(all))?)
    }
}

/// The subcommand an option set is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    In,
    Scan,
    To,
    CiEnable,
    CiReport,
}

const COMMON_KEYS: [&str; 4] = ["loglevel", "timeout", "endpoint", "debug-options"];
const REPORTING_KEYS: [&str; 4] = ["reporter", "gh-owner", "gh-repo", "gh-pull-id"];
const FILTERING_KEYS: [&str; 3] = ["ignore-packages", "ignore-deptypes", "select"];
const JSON_KEYS: [&str; 2] = ["json", "jq"];

impl Scope {
    pub fn attaches(self, key: &str) -> bool {
        if COMMON_KEYS.contains(&key) {
            return true;
        }
        match self {
            Self::In => {
                matches!(
                    key,
                    "gh-token" | "jwt-token" | "npm-registry" | "lockfiles" | "genlock"
                ) || REPORTING_KEYS.contains(&key)
                    || JSON_KEYS.contains(&key)
            }
            Self::Scan => {
                matches!(key, "gh-token" | "npm-registry")
                    || REPORTING_KEYS.contains(&key)
                    || FILTERING_KEYS.contains(&key)
                    || JSON_KEYS.contains(&key)
            }
            Self::To => {
                matches!(key, "gh-token" | "jwt-token" | "npm-registry")
                    || REPORTING_KEYS.contains(&key)
                    || FILTERING_KEYS.contains(&key)
                    || JSON_KEYS.contains(&key)
            }
            Self::CiEnable => matches!(key, "gh-token" | "jwt-token" | "dir"),
            Self::CiReport => {
                matches!(key, "gh-token" | "jwt-token") || REPORTING_KEYS.contains(&key)
            }
        }
    }

    pub fn attaches_core_endpoint(self) -> bool {
        matches!(self, Self::CiEnable | Self::CiReport)
    }
}

/// Values given on the command line. `None` means the flag was not passed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagValues {
    pub config: Option<PathBuf>,
    pub loglevel: Option<String>,
    pub timeout: Option<u64>,
    pub npm_endpoint: Option<String>,
    pub pypi_endpoint: Option<String>,
    pub core_endpoint: Option<String>,
    pub gh_token: Option<String>,
    pub jwt_token: Option<String>,
    pub npm_registry: Option<String>,
    pub reporter: Option<Vec<String>>,
    pub gh_owner: Option<String>,
    pub gh_repo: Option<String>,
    pub gh_pull_id: Option<u64>,
    pub ignore_packages: Option<Vec<String>>,
    pub ignore_deptypes: Option<Vec<String>>,
    pub select: Option<String>,
    pub json: Option<bool>,
    pub jq: Option<String>,
    pub lockfiles: Option<Vec<String>>,
    pub genlock: Option<bool>,
    pub dir: Option<String>,
    pub debug_options: Option<bool>,
}

/// Source of environment variables.
pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Env for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// `ignore-packages` → `LSTN_IGNORE_PACKAGES`.
pub fn env_name(flag: &str) -> String {
    format!(
        "{ENV_PREFIX}_{}",
        flag.replace(['-', '.'], "_").to_ascii_uppercase()
    )
}

/// Splits a list given as a single string on commas and whitespace.
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// The configuration file in effect for this process, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSource {
    path: Option<PathBuf>,
    overlay: ConfigOverlay,
}

impl ConfigSource {
    /// Loads `explicit` when given, otherwise the first file found in the lookup paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected file cannot be read or parsed.
    pub fn discover(
        explicit: Option<&Path>,
        cwd: &Path,
        home: Option<&Path>,
    ) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => LOCAL_CONFIG_FILES
                .iter()
                .map(|name| cwd.join(name))
                .chain(home.map(|home| home.join(HOME_CONFIG_FILE)))
                .find(|candidate| candidate.is_file()),
        };

        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn load(path: PathBuf) -> Result<Self, CliError> {
        let raw = fs::read_to_string(&path).map_err(|error| {
            CliError::Config(format!(
                "couldn't read the configuration file {}: {error}",
                path.display()
            ))
        })?;
        let overlay = if raw.trim().is_empty() {
            ConfigOverlay::default()
        } else {
            serde_yaml::from_str(&raw).map_err(|error| {
                CliError::Config(format!(
                    "couldn't parse the configuration file {}: {error}",
                    path.display()
                ))
            })?
        };
        Ok(Self {
            path: Some(path),
            overlay,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn loglevel(&self) -> Option<&str> {
        self.overlay.loglevel.as_deref()
    }

    /// The line printed on stderr before running a command.
    pub fn announcement(&self) -> String {
        match &self.path {
            Some(path) => format!("Using config file: {}", path.display()),
            None => "Running without a configuration file".to_string(),
        }
    }
}

/// A type that can be layered by the resolver.
trait OptionValue: Clone + PartialEq + Sized {
    fn is_unset(&self) -> bool;
    fn parse_env(raw: &str) -> Option<Self>;
}

impl OptionValue for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn parse_env(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl OptionValue for u64 {
    fn is_unset(&self) -> bool {
        *self == 0
    }

    fn parse_env(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl OptionValue for bool {
    fn is_unset(&self) -> bool {
        !*self
    }

    fn parse_env(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "on" => Some(true),
            "0" | "f" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl OptionValue for Vec<String> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn parse_env(raw: &str) -> Option<Self> {
        Some(split_list(raw))
    }
}

struct Resolver<'a> {
    env: &'a dyn Env,
    errors: Vec<String>,
}

impl Resolver<'_> {
    /// The environment value when present and not empty, otherwise the file value.
    fn outer<T: OptionValue>(&mut self, flag: &str, from_file: Option<T>) -> Option<T> {
        let name = env_name(flag);
        match self.env.var(&name).filter(|raw| !raw.is_empty()) {
            Some(raw) => match T::parse_env(&raw) {
                Some(value) => Some(value),
                None => {
                    self.errors
                        .push(format!("invalid value \"{raw}\" for {name}"));
                    from_file
                }
            },
            None => from_file,
        }
    }

    /// Outer values win over the default unless empty; flags win when they differ from it.
    fn scalar<T: OptionValue>(
        &mut self,
        flag: &str,
        default: T,
        from_file: Option<T>,
        from_flag: Option<T>,
    ) -> T {
        let mut value = default.clone();
        if let Some(outer) = self.outer(flag, from_file)
            && !outer.is_unset()
            && outer != default
        {
            value = outer;
        }
        if let Some(given) = from_flag
            && given != default
        {
            value = given;
        }
        value
    }

    /// Enum slices accumulate: default, outer, and flag values are all kept.
    fn union(
        &mut self,
        flag: &str,
        default: Vec<String>,
        from_file: Option<Vec<String>>,
        from_flag: Option<Vec<String>>,
    ) -> Vec<String> {
        let mut value = default;
        value.extend(self.outer(flag, from_file).unwrap_or_default());
        value.extend(from_flag.unwrap_or_default());
        unique(value)
    }
}

pub(crate) fn unique<T: PartialEq>(values: Vec<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Builds, validates, and transforms the options of one subcommand invocation.
///
/// # Errors
///
/// Returns [`CliError::Config`] listing every invalid value.
pub fn resolve(
    scope: Scope,
    flags: &FlagValues,
    source: &ConfigSource,
    env: &dyn Env,
    ci: Option<&CiInfo>,
) -> Result<Options, CliError> {
    let defaults = Options::defaults(ci);
    let file = source.overlay.clone();
    let (npm_endpoint, pypi_endpoint, core_endpoint) = (
        file.npm_endpoint(),
        file.pypi_endpoint(),
        file.core_endpoint(),
    );
    let mut resolver = Resolver {
        env,
        errors: Vec::new(),
    };

    let reporter = resolver.union(
        "reporter",
        Vec::new(),
        file.reporter.map(|list| list.into_vec()),
        flags.reporter.clone(),
    );
    let ignore_deptypes = resolver.union(
        "ignore-deptypes",
        vec![DependencyKind::BundleDependencies.id().to_string()],
        file.ignore_deptypes.map(|list| list.into_vec()),
        flags.ignore_deptypes.clone(),
    );

    let mut options = Options {
        loglevel: resolver.scalar(
            "loglevel",
            defaults.loglevel.clone(),
            file.loglevel.clone(),
            flags.loglevel.clone(),
        ),
        timeout: resolver.scalar("timeout", defaults.timeout, file.timeout, flags.timeout),
        endpoint: Endpoints {
            npm: resolver.scalar(
                "npm-endpoint",
                defaults.endpoint.npm.clone(),
                npm_endpoint,
                flags.npm_endpoint.clone(),
            ),
            pypi: resolver.scalar(
                "pypi-endpoint",
                defaults.endpoint.pypi.clone(),
                pypi_endpoint,
                flags.pypi_endpoint.clone(),
            ),
            core: resolver.scalar(
                "core-endpoint",
                defaults.endpoint.core.clone(),
                core_endpoint,
                flags.core_endpoint.clone(),
            ),
        },
        gh_token: resolver.scalar(
            "gh-token",
            String::new(),
            file.gh_token,
            flags.gh_token.clone(),
        ),
        jwt_token: resolver.scalar(
            "jwt-token",
            String::new(),
            file.jwt_token,
            flags.jwt_token.clone(),
        ),
        npm_registry: resolver.scalar(
            "npm-registry",
            defaults.npm_registry.clone(),
            file.npm_registry,
            flags.npm_registry.clone(),
        ),
        reporter: Vec::new(),
        gh_owner: resolver.scalar(
            "gh-owner",
            defaults.gh_owner.clone(),
            file.gh_owner,
            flags.gh_owner.clone(),
        ),
        gh_repo: resolver.scalar(
            "gh-repo",
            defaults.gh_repo.clone(),
            file.gh_repo,
            flags.gh_repo.clone(),
        ),
        gh_pull_id: resolver.scalar(
            "gh-pull-id",
            defaults.gh_pull_id,
            file.gh_pull_id,
            flags.gh_pull_id,
        ),
        ignore_packages: unique(resolver.scalar(
            "ignore-packages",
            Vec::new(),
            file.ignore_packages.map(|list| list.into_vec()),
            flags.ignore_packages.clone(),
        )),
        ignore_deptypes: Vec::new(),
        select: resolver.scalar("select", String::new(), file.select, flags.select.clone()),
        json: resolver.scalar("json", false, file.json, flags.json),
        jq: resolver.scalar("jq", String::new(), file.jq, flags.jq.clone()),
        lockfiles: unique(resolver.scalar(
            "lockfiles",
            defaults.lockfiles.clone(),
            file.lockfiles.map(|list| list.into_vec()),
            flags.lockfiles.clone(),
        )),
        genlock: resolver.scalar("genlock", false, file.genlock, flags.genlock),
        dir: resolver.scalar("dir", String::new(), file.dir, flags.dir.clone()),
        debug_options: flags.debug_options.unwrap_or(false),
    };

    let mut errors = resolver.errors;
    for raw in reporter {
        match raw.parse::<ReporterKind>() {
            Ok(kind) => options.reporter.push(kind),
            Err(error) => errors.push(error),
        }
    }
    for raw in ignore_deptypes {
        match raw.parse::<DependencyKind>() {
            Ok(kind) => options.ignore_deptypes.push(kind),
            Err(error) => errors.push(error.to_string()),
        }
    }
    options.reporter = unique(std::mem::take(&mut options.reporter));
    options.ignore_deptypes = unique(std::mem::take(&mut options.ignore_deptypes));
    options.loglevel = options.loglevel.trim().to_ascii_lowercase();

    errors.extend(validate::options(&options, scope));
    if !errors.is_empty() {
        return Err(CliError::Config(CliError::aggregate(
            "invalid configuration options/flags",
            &errors,
        )));
    }

    validate::transform(&mut options);
    Ok(options)
}

#[cfg(test)]
#[path = "../tests/config.rs"]
mod tests;
