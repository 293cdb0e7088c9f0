//! `lstn ci enable`: installs the jibril monitor and starts it with settings from the Core API.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use lstn_core::{find_executable, is_executable};
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{CiInfo, CoreClient};
use crate::config::Options;
use crate::error::CliError;
use crate::status::Status;

const MONITOR: &str = "jibril";
const LOCAL_ROOT: &str = "jibril";

/// Where the monitor reads its configuration from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorPaths {
    pub config: PathBuf,
    pub netpolicy: PathBuf,
    pub env_file: PathBuf,
}

impl MonitorPaths {
    pub fn system() -> Self {
        Self {
            config: PathBuf::from("/etc/jibril/config.yaml"),
            netpolicy: PathBuf::from("/etc/jibril/netpolicy.yaml"),
            env_file: PathBuf::from("/var/run/jibril/default"),
        }
    }

    /// Every file directly under `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            config: root.join("config.yaml"),
            netpolicy: root.join("netpolicy.yaml"),
            env_file: root.join("default"),
        }
    }

    /// System paths, or `<cwd>/jibril/` when talking to a local Core API.
    pub fn for_options(options: &Options, cwd: &Path) -> Self {
        if options.endpoint.is_local_core() {
            Self::under(&cwd.join(LOCAL_ROOT))
        } else {
            Self::system()
        }
    }
}

/// Finds the monitor in `dir`, or on the `PATH` when `dir` is empty.
pub fn locate_monitor(dir: &str) -> Result<PathBuf, CliError> {
    if dir.is_empty() {
        return find_executable(MONITOR).ok_or_else(|| {
            CliError::Input("couldn't find the jibril executable in the PATH".to_string())
        });
    }

    let file = Path::new(dir).join(MONITOR);
    if !file.exists() {
        return Err(CliError::Input(format!(
            "couldn't find the jibril binary in {dir}"
        )));
    }
    if !is_executable(&file) {
        return Err(CliError::Input(format!(
            "expecting {} to be an executable file",
            file.display()
        )));
    }
    Ok(file)
}

/// One `KEY=VALUE` per line: settings tokens, CI details, then the credentials.
pub fn env_file_contents(
    tokens: &std::collections::BTreeMap<String, String>,
    info: &CiInfo,
    jwt_token: &str,
    gh_token: &str,
) -> String {
    let mut lines = tokens
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>();
    let dump = info.dump();
    if !dump.is_empty() {
        lines.push(dump);
    }
    lines.push(format!("LISTENDEV_TOKEN={jwt_token}"));
    lines.push(format!("GITHUB_TOKEN={gh_token}"));
    let mut contents = lines.join("\n");
    contents.push('\n');
    contents
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("couldn't create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("couldn't write {}", path.display()))
}

fn to_yaml(value: &Value) -> Result<String, CliError> {
    serde_yaml::to_string(value)
        .map_err(|error| CliError::Decoding(format!("couldn't encode YAML: {error}")))
}

async fn run_monitor(
    token: &CancellationToken,
    monitor: &Path,
    args: &[&str],
) -> Result<String, CliError> {
    let mut command = Command::new(monitor);
    command.args(args).kill_on_drop(true);
    let rendered = format!("{} {}", monitor.display(), args.join(" "));
    tracing::debug!(command = %rendered, "running the monitor");

    let output = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(CliError::Cancelled),
        output = command.output() => output.map_err(|error| {
            CliError::ChildProcess(format!("couldn't run {rendered}: {error}"))
        })?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CliError::ChildProcess(format!(
            "{rendered} failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Everything `ci enable` needs to talk to and configure the monitor.
pub struct Enable<'a> {
    pub options: &'a Options,
    pub ci: &'a CiInfo,
    pub core: &'a CoreClient,
    pub paths: MonitorPaths,
    pub status: Status,
}

impl Enable<'_> {
    /// # Errors
    ///
    /// Fails when the monitor is missing or exits unsuccessfully, when a Core API call
    /// fails, or when a configuration file cannot be written.
    pub async fn run(&self, token: &CancellationToken) -> Result<(), CliError> {
        if self.ci.has_read_only_github_token() {
            self.status
                .warning("lstn ci does not run on fork pull requests at the moment");
            return Ok(());
        }

        let monitor = locate_monitor(&self.options.dir)?;
        self.status.info(&format!(
            "Installing the monitor from {}",
            monitor.display()
        ));
        run_monitor(token, &monitor, &["--systemd", "install"]).await?;

        self.status.progress("Fetching the monitor settings...");
        let query = self.ci.repository_params();
        let tokens = lstn_http::cancellable(token, self.core.settings()).await??;
        let config = lstn_http::cancellable(token, self.core.monitor_config()).await??;
        let policy = lstn_http::cancellable(token, self.core.network_policy(&query)).await??;
        self.status.success("Fetched settings");

        write_file(&self.paths.config, &to_yaml(&config)?)?;
        let mut wrapped = Map::new();
        wrapped.insert("network_policy".to_string(), policy);
        write_file(&self.paths.netpolicy, &to_yaml(&Value::Object(wrapped))?)?;
        write_file(
            &self.paths.env_file,
            &env_file_contents(
                &tokens,
                self.ci,
                &self.options.jwt_token,
                &self.options.gh_token,
            ),
        )?;
        for path in [&self.paths.config, &self.paths.netpolicy, &self.paths.env_file] {
            self.status
                .success(&format!("Wrote config {}", path.display()));
        }

        let output = run_monitor(token, &monitor, &["-s", "enable-now"]).await?;
        if !output.is_empty() {
            self.status.info(&output);
        }
        self.status.success("Enabled the monitor");
        Ok(())
    }
}
