//! `lstn scan`: verdicts for the direct dependencies declared in `package.json`.

use lstn_core::{Ecosystem, resolve_directory};
use lstn_npm::{NpmRegistryClient, PackageJson, ResolvedDependencies};

use super::Session;
use crate::config::{FlagValues, Options, Scope};
use crate::error::CliError;
use crate::listen::{AnalysisContext, VerdictClient, VerdictsRequest};
use crate::pipeline::{Job, Jobs, Retrieval, fan_out};

/// One job per resolved dependency, grouped by kind.
pub fn jobs(resolved: ResolvedDependencies) -> Jobs {
    resolved
        .into_iter()
        .map(|(kind, packages)| {
            let jobs = packages
                .into_iter()
                .map(|(name, version)| Job::new(name, Some(version.to_string())))
                .collect();
            (kind, jobs)
        })
        .collect()
}

/// Verdict retrieval shared by `scan` and `to`.
pub(super) fn retriever(
    client: VerdictClient,
    context: AnalysisContext,
    options: &Options,
) -> impl Fn(Job) -> Retrieval + Send + Sync + 'static {
    let select = options.select.clone();
    move |job: Job| {
        let client = client.clone();
        let mut request = VerdictsRequest::new(job.name).with_select(&select);
        request.version = job.version;
        request.context = Some(context.clone());
        Box::pin(async move { client.verdicts(Ecosystem::Npm, &request).await }) as Retrieval
    }
}

/// # Errors
///
/// Fails when `package.json` is missing or unreadable, or when nothing is left to process.
pub async fn run(session: &Session<'_>, flags: &FlagValues, path: Option<&str>) -> Result<(), CliError> {
    let Some(options) = session.options(Scope::Scan, flags)? else {
        return Ok(());
    };
    session.arm_deadline(options.timeout);

    let directory = resolve_directory(path)?;
    let mut manifest = PackageJson::from_dir(&directory)?;
    manifest.filter_out_by_kinds(&options.ignore_deptypes);
    manifest.filter_out_by_names(&options.ignore_packages);

    let http = session.http("scan")?;
    let registry = NpmRegistryClient::new(http.clone(), &options.npm_registry);
    session.status.progress("Resolving the dependencies versions...");
    let resolved = lstn_http::cancellable(&session.token, manifest.resolve(&registry)).await?;
    let jobs = jobs(resolved);
    if jobs.values().all(Vec::is_empty) {
        return Err(CliError::Input(
            "there are no dependencies to process".to_string(),
        ));
    }

    let context = AnalysisContext::collect(&[&directory], session.env);
    let client = VerdictClient::new(http.clone(), &options.endpoint, &options.jwt_token);
    let response = fan_out(
        &session.token,
        jobs,
        session.status,
        retriever(client, context, &options),
    )
    .await?;

    session.publish(&options, &http, &response).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use lstn_core::DependencyKind;
    use semver::Version;
    use std::collections::BTreeMap;

    #[test]
    fn jobs_keep_kinds_and_pin_versions() {
        let resolved = ResolvedDependencies::from([
            (
                DependencyKind::Dependencies,
                BTreeMap::from([("react".to_string(), Version::new(18, 2, 0))]),
            ),
            (
                DependencyKind::DevDependencies,
                BTreeMap::from([("vitest".to_string(), Version::new(1, 0, 4))]),
            ),
        ]);

        let jobs = jobs(resolved);
        assert_eq!(
            jobs[&DependencyKind::Dependencies],
            vec![Job::new("react", Some("18.2.0".to_string()))]
        );
        assert_eq!(
            jobs[&DependencyKind::DevDependencies],
            vec![Job::new("vitest", Some("1.0.4".to_string()))]
        );
    }
}
