//! Running the npm executable to produce lockfiles on the fly.

use crate::package_json::PACKAGE_JSON_FILE;
use crate::package_lock::PackageLockJson;
use lstn_core::{LockfileError, find_executable};
use semver::{Version, VersionReq};
use std::path::{Path, PathBuf};
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const PACKAGE_LOCK_ONLY: [&str; 4] = ["install", "--package-lock-only", "--no-audit", "--no-fund"];

#[derive(Debug, Error)]
pub enum NpmError {
    #[error("couldn't find the npm executable in the PATH")]
    NotFound,
    #[error("couldn't find the npm executable in any way: {0}")]
    NvmUnavailable(String),
    #[error("couldn't get the npm version")]
    VersionUnavailable,
    #[error("the npm version is not a valid semantic version")]
    InvalidVersion,
    #[error("the npm version is not >= 6.x")]
    Unsupported,
    #[error("couldn't generate the package-lock.json file: {0}")]
    Generation(String),
    #[error("couldn't prepare a scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
    #[error(transparent)]
    Lockfile(#[from] LockfileError),
    #[error("the operation was cancelled")]
    Cancelled,
}

/// How npm gets invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    Direct(PathBuf),
    /// npm is lazily loaded by nvm, so every call goes through a shell sourcing it.
    Nvm { bash: PathBuf, init: String },
}

#[derive(Debug, Clone)]
pub struct Npm {
    invocation: Invocation,
}

impl Npm {
    /// Finds npm on the `PATH`, falling back to an nvm installation.
    pub fn locate() -> Result<Self, NpmError> {
        if let Some(path) = find_executable("npm") {
            return Ok(Self {
                invocation: Invocation::Direct(path),
            });
        }

        let nvm_dir = std::env::var("NVM_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(NpmError::NotFound)?;
        let bash = find_executable("bash")
            .ok_or_else(|| NpmError::NvmUnavailable("couldn't find bash in the PATH".into()))?;

        let mut init = format!("source {nvm_dir}/nvm.sh");
        if std::env::var("NVM_NO_USE").is_ok_and(|value| value == "true") {
            init.push_str(" --no-use");
        }
        tracing::debug!(%init, "npm not in PATH, using nvm");

        Ok(Self {
            invocation: Invocation::Nvm { bash, init },
        })
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            invocation: Invocation::Direct(path.into()),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = match &self.invocation {
            Invocation::Direct(path) => {
                let mut command = Command::new(path);
                command.args(args);
                command
            }
            Invocation::Nvm { bash, init } => {
                let mut command = Command::new(bash);
                command
                    .arg("-c")
                    .arg(format!("{init} && npm {}", args.join(" ")));
                command
            }
        };
        command.kill_on_drop(true);
        command
    }

    async fn output(
        &self,
        token: &CancellationToken,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<Output, NpmError> {
        let mut command = self.command(args);
        if let Some(directory) = cwd {
            command.current_dir(directory);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(NpmError::Cancelled),
            output = command.output() => output.map_err(|error| NpmError::Generation(error.to_string())),
        }
    }

    /// The npm version as reported by `npm --version`.
    pub async fn version(&self, token: &CancellationToken) -> Result<String, NpmError> {
        let output = self
            .output(token, &["--version"], None)
            .await
            .map_err(|error| match error {
                NpmError::Cancelled => NpmError::Cancelled,
                _ => NpmError::VersionUnavailable,
            })?;
        if !output.status.success() {
            return Err(NpmError::VersionUnavailable);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Fails unless npm is at least version 6.
    pub async fn ensure_supported(&self, token: &CancellationToken) -> Result<Version, NpmError> {
        let raw = self.version(token).await?;
        check_version(&raw)
    }

    /// Generates a `package-lock.json` for the `package.json` found in `directory`.
    ///
    /// npm runs in a scratch directory so the project tree is never touched.
    pub async fn generate_lockfile(
        &self,
        token: &CancellationToken,
        directory: &Path,
    ) -> Result<PackageLockJson, NpmError> {
        let version = self.ensure_supported(token).await?;
        tracing::debug!(%version, directory = %directory.display(), "generating package-lock.json");

        let manifest = directory.join(PACKAGE_JSON_FILE);
        if !manifest.is_file() {
            return Err(LockfileError::MissingManifest {
                directory: directory.display().to_string(),
            }
            .into());
        }

        let scratch = tempfile::Builder::new()
            .prefix("lstn-")
            .tempdir()
            .map_err(NpmError::Scratch)?;
        std::fs::copy(&manifest, scratch.path().join(PACKAGE_JSON_FILE))
            .map_err(NpmError::Scratch)?;

        let output = self
            .output(token, &PACKAGE_LOCK_ONLY, Some(scratch.path()))
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NpmError::Generation(stderr.trim().to_string()));
        }

        Ok(PackageLockJson::from_dir(scratch.path())?)
    }
}

fn check_version(raw: &str) -> Result<Version, NpmError> {
    let version = Version::parse(raw.trim()).map_err(|_| NpmError::InvalidVersion)?;
    let minimum = VersionReq::parse(">=6").map_err(|_| NpmError::InvalidVersion)?;
    if !minimum.matches(&version) {
        return Err(NpmError::Unsupported);
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_version_enforces_minimum() {
        assert!(check_version("10.2.4\n").is_ok());
        assert!(check_version("6.0.0").is_ok());
        assert_eq!(
            check_version("5.10.0").expect_err("too old").to_string(),
            "the npm version is not >= 6.x"
        );
        assert_eq!(
            check_version("ten").expect_err("not semver").to_string(),
            "the npm version is not a valid semantic version"
        );
    }

    #[test]
    fn nvm_invocation_wraps_arguments_in_a_shell() {
        let npm = Npm {
            invocation: Invocation::Nvm {
                bash: PathBuf::from("/bin/bash"),
                init: "source /home/u/.nvm/nvm.sh".to_string(),
            },
        };
        let command = npm.command(&PACKAGE_LOCK_ONLY);
        let args = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            args,
            vec![
                "-c".to_string(),
                "source /home/u/.nvm/nvm.sh && npm install --package-lock-only --no-audit --no-fund"
                    .to_string()
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generate_lockfile_runs_in_a_scratch_directory() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().expect("tempdir");
        let fake_npm = root.path().join("npm");
        std::fs::write(
            &fake_npm,
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 9.6.7; exit 0; fi\n\
             printf '{\"lockfileVersion\":3,\"packages\":{\"node_modules/ms\":{\"version\":\"2.1.3\"}}}' > package-lock.json\n",
        )
        .expect("write fake npm");
        std::fs::set_permissions(&fake_npm, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        let project = root.path().join("project");
        std::fs::create_dir_all(&project).expect("project dir");
        std::fs::write(project.join("package.json"), r#"{"dependencies":{"ms":"^2"}}"#)
            .expect("write manifest");

        let lock = Npm::at(&fake_npm)
            .generate_lockfile(&CancellationToken::new(), &project)
            .await
            .expect("generated lockfile");
        assert_eq!(lock.lockfile_version(), 3);
        assert!(!project.join("package-lock.json").exists());
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_version_check() {
        let token = CancellationToken::new();
        token.cancel();
        let err = Npm::at("/nonexistent/npm")
            .version(&token)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, NpmError::Cancelled));
    }
}
