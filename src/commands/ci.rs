//! `lstn ci enable` and `lstn ci report`.

use crate::ci::enable::{Enable, MonitorPaths};
use crate::ci::report::Report;
use crate::ci::{CiInfo, CoreClient};
use crate::config::{FlagValues, Scope};
use crate::error::CliError;
use crate::reporter::github_client;

use super::Session;

fn ci_info(session: &Session<'_>) -> Result<CiInfo, CliError> {
    match session.ci {
        Some(info) => Ok(info.clone()),
        None => Ok(CiInfo::from_env(session.env)?),
    }
}

/// # Errors
///
/// Fails outside GitHub Actions, and whenever the monitor setup fails.
pub async fn enable(session: &Session<'_>, flags: &FlagValues) -> Result<(), CliError> {
    let Some(options) = session.options(Scope::CiEnable, flags)? else {
        return Ok(());
    };
    let info = ci_info(session)?;
    session.arm_deadline(options.timeout);

    let cwd = std::env::current_dir()?;
    let http = session.http("ci-enable")?;
    let core = CoreClient::new(http, &options.endpoint.core, &options.jwt_token);
    Enable {
        options: &options,
        ci: &info,
        core: &core,
        paths: MonitorPaths::for_options(&options, &cwd),
        status: session.status,
    }
    .run(&session.token)
    .await
}

/// # Errors
///
/// Fails outside GitHub Actions, or when the events cannot be fetched or reported.
pub async fn report(session: &Session<'_>, flags: &FlagValues) -> Result<(), CliError> {
    let Some(options) = session.options(Scope::CiReport, flags)? else {
        return Ok(());
    };
    let info = ci_info(session)?;
    session.arm_deadline(options.timeout);

    let http = session.http("ci-report")?;
    let core = CoreClient::new(http.clone(), &options.endpoint.core, &options.jwt_token);
    let comments = github_client(http, session.env, &options.gh_token);
    Report {
        options: &options,
        ci: &info,
        core: &core,
        comments: &comments,
        status: session.status,
    }
    .run(&session.token)
    .await
}
