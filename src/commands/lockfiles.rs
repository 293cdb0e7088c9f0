//! `lstn in`: sends whole lockfiles to the verdict service.

use std::path::Path;

use lstn_core::{Lockfile, LockfileError, Response, resolve_directory};
use lstn_npm::{Npm, PACKAGE_LOCK_FILE, PackageLockJson};
use lstn_pypi::{POETRY_LOCK_FILE, PoetryLock};

use super::Session;
use crate::config::{FlagValues, Options, Scope};
use crate::error::CliError;
use crate::listen::{AnalysisContext, AnalysisRequest, VerdictClient};

/// # Errors
///
/// Fails when no configured lockfile can be loaded or a verdict request fails.
pub async fn run(session: &Session<'_>, flags: &FlagValues, path: Option<&str>) -> Result<(), CliError> {
    let Some(options) = session.options(Scope::In, flags)? else {
        return Ok(());
    };
    session.arm_deadline(options.timeout);

    let directory = resolve_directory(path)?;
    let mut context = AnalysisContext::collect(&[&directory], session.env);
    let (lockfiles, npm_version) = load_all(session, &options, &directory).await?;
    context = context.with_package_manager("npm", npm_version);

    let http = session.http("in")?;
    let client = VerdictClient::new(http.clone(), &options.endpoint, &options.jwt_token);
    let mut combined = Response::default();
    for lockfile in &lockfiles {
        session.status.progress(&format!(
            "Analyzing {}...",
            lockfile.file_name()
        ));
        let request = AnalysisRequest::new(lockfile.as_ref(), Some(context.clone()));
        let response = lstn_http::cancellable(
            &session.token,
            client.analysis(lockfile.ecosystem(), &request),
        )
        .await??;
        session.status.success(&format!(
            "Got verdicts for {} packages in {}",
            response.len(),
            lockfile.file_name()
        ));
        combined.extend(response);
    }

    session.publish(&options, &http, &combined).await
}

/// Loads every configured lockfile that exists, plus the npm version when npm ran.
async fn load_all(
    session: &Session<'_>,
    options: &Options,
    directory: &Path,
) -> Result<(Vec<Box<dyn Lockfile>>, Option<String>), CliError> {
    let mut loaded: Vec<Box<dyn Lockfile>> = Vec::new();
    let mut first_error = None;
    let mut npm_version = None;

    for name in &options.lockfiles {
        let generated = options.genlock && name == PACKAGE_LOCK_FILE;
        if !generated && !directory.join(name).is_file() {
            let error = LockfileError::MissingFile {
                directory: directory.display().to_string(),
                file_name: name.clone(),
            };
            tracing::debug!(lockfile = %name, %error, "skipping lockfile");
            first_error.get_or_insert(CliError::from(error));
            continue;
        }

        let lockfile = match name.as_str() {
            PACKAGE_LOCK_FILE => {
                load_package_lock(session, options.genlock, directory, &mut npm_version).await?
            }
            POETRY_LOCK_FILE => Box::new(PoetryLock::from_dir(directory)?) as Box<dyn Lockfile>,
            other => {
                tracing::warn!(lockfile = %other, "skipping unsupported lockfile");
                continue;
            }
        };
        loaded.push(lockfile);
    }

    if loaded.is_empty() {
        return Err(first_error.unwrap_or_else(|| {
            CliError::Input("no supported lockfile was configured".to_string())
        }));
    }
    Ok((loaded, npm_version))
}

/// Generation first when asked to, then the file on disk. The last error wins.
async fn load_package_lock(
    session: &Session<'_>,
    genlock: bool,
    directory: &Path,
    npm_version: &mut Option<String>,
) -> Result<Box<dyn Lockfile>, CliError> {
    if genlock {
        match generate(session, directory, npm_version).await {
            Ok(lock) => return Ok(Box::new(lock)),
            Err(CliError::Cancelled) => return Err(CliError::Cancelled),
            Err(error) => {
                tracing::warn!(%error, "couldn't generate the package-lock.json, reading it instead");
            }
        }
    }
    Ok(Box::new(PackageLockJson::from_dir(directory)?))
}

async fn generate(
    session: &Session<'_>,
    directory: &Path,
    npm_version: &mut Option<String>,
) -> Result<PackageLockJson, CliError> {
    let npm = Npm::locate()?;
    *npm_version = npm.version(&session.token).await.ok();
    session.status.progress("Generating package-lock.json...");
    let lock = npm.generate_lockfile(&session.token, directory).await?;
    session.status.success("Generated package-lock.json");
    Ok(lock)
}
