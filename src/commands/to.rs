//! `lstn to`: verdicts for one package, a version of it, or every version matching a range.

use lstn_core::{DependencyKind, Ecosystem, RegistryClient, Response};
use lstn_npm::{NpmRegistryClient, VersionRange, exact_version};

use super::Session;
use super::scan::retriever;
use crate::config::{FlagValues, Scope};
use crate::error::CliError;
use crate::listen::{AnalysisContext, VerdictClient, VerdictsRequest};
use crate::pipeline::{Job, Jobs, fan_out};
use crate::validate::{is_npm_package_name, is_shasum};

/// What the positional arguments ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Package {
        name: String,
    },
    Version {
        name: String,
        version: String,
        shasum: Option<String>,
    },
    Range {
        name: String,
        range: VersionRange,
        raw: String,
    },
}

/// Runs before anything else prints, `--debug-options` excepted.
///
/// # Errors
///
/// Fails unless there are between 1 and 3 arguments.
pub fn check_arg_count(args: &[String]) -> Result<(), CliError> {
    if args.is_empty() {
        return Err(CliError::Input(
            "requires at least 1 arg (package name)".to_string(),
        ));
    }
    if args.len() > 3 {
        return Err(CliError::Input(format!(
            "accepts between 1 and 3 arg(s), received {}",
            args.len()
        )));
    }
    Ok(())
}

/// Checks `args` and classifies the request.
///
/// # Errors
///
/// Fails on a wrong argument count, or with every invalid argument listed.
pub fn parse_args(args: &[String]) -> Result<Target, CliError> {
    check_arg_count(args)?;

    let mut errors = Vec::new();
    let name = args[0].clone();
    if !is_npm_package_name(&name) {
        errors.push(format!("{name} is not a valid npm package name"));
    }

    let shasum = args.get(2).cloned();
    if let Some(shasum) = &shasum
        && !is_shasum(shasum)
    {
        errors.push(format!("{shasum} is not a valid shasum"));
    }

    let target = match args.get(1) {
        None => Some(Target::Package { name }),
        Some(raw) => match exact_version(raw) {
            Some(version) => Some(Target::Version {
                name,
                version: version.to_string(),
                shasum,
            }),
            None => match VersionRange::parse(raw) {
                Ok(range) => {
                    if shasum.is_some() {
                        tracing::warn!(constraint = %raw, "ignoring the shasum of a version constraint");
                    }
                    Some(Target::Range {
                        name,
                        range,
                        raw: raw.clone(),
                    })
                }
                Err(_) => {
                    errors.push(format!(
                        "{raw} is neither a valid version constraint nor an exact valid semantic version"
                    ));
                    None
                }
            },
        },
    };

    match target {
        Some(target) if errors.is_empty() => Ok(target),
        _ => Err(CliError::Input(CliError::aggregate(
            "invalid arguments",
            &errors,
        ))),
    }
}

/// # Errors
///
/// Fails on invalid arguments, registry failures, or a failed verdict request.
pub async fn run(session: &Session<'_>, flags: &FlagValues, args: &[String]) -> Result<(), CliError> {
    let Some(options) = session.options(Scope::To, flags)? else {
        return Ok(());
    };
    let target = parse_args(args)?;
    session.arm_deadline(options.timeout);

    let http = session.http("to")?;
    let context = AnalysisContext::collect(&[], session.env);
    let client = VerdictClient::new(http.clone(), &options.endpoint, &options.jwt_token);

    let response = match target {
        Target::Package { name } => {
            let request = single(name, None, None, &options.select, context);
            fetch_one(session, &client, &request).await?
        }
        Target::Version {
            name,
            version,
            shasum,
        } => {
            let request = single(name, Some(version), shasum, &options.select, context);
            fetch_one(session, &client, &request).await?
        }
        Target::Range { name, range, raw } => {
            let registry = NpmRegistryClient::new(http.clone(), &options.npm_registry);
            let versions =
                lstn_http::cancellable(&session.token, registry.fetch_versions(&name)).await??;
            let matching = versions.matching(|version| range.matches(version));
            if matching.is_empty() {
                return Err(CliError::Input(format!(
                    "no version of {name} satisfies {raw}"
                )));
            }
            tracing::debug!(package = %name, constraint = %raw, count = matching.len(), "expanded constraint");

            let jobs = Jobs::from([(
                DependencyKind::Dependencies,
                matching
                    .into_iter()
                    .map(|version| Job::new(name.clone(), Some(version.to_string())))
                    .collect(),
            )]);
            fan_out(
                &session.token,
                jobs,
                session.status,
                retriever(client, context, &options),
            )
            .await?
        }
    };

    session.publish(&options, &http, &response).await
}

fn single(
    name: String,
    version: Option<String>,
    shasum: Option<String>,
    select: &str,
    context: AnalysisContext,
) -> VerdictsRequest {
    let mut request = VerdictsRequest::new(name).with_select(select);
    request.version = version;
    request.digest = shasum;
    request.context = Some(context);
    request
}

async fn fetch_one(
    session: &Session<'_>,
    client: &VerdictClient,
    request: &VerdictsRequest,
) -> Result<Response, CliError> {
    session
        .status
        .progress(&format!("Retrieving verdicts for {}...", request.name));
    lstn_http::cancellable(&session.token, client.verdicts(Ecosystem::Npm, request)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn argument_count_is_checked_first() {
        assert!(check_arg_count(&args(&["react"])).is_ok());
        let err = parse_args(&[]).expect_err("no args");
        assert_eq!(err.to_string(), "requires at least 1 arg (package name)");

        let err = parse_args(&args(&["a", "1.0.0", "b", "c"])).expect_err("too many");
        assert_eq!(err.to_string(), "accepts between 1 and 3 arg(s), received 4");
    }

    #[test]
    fn classifies_versions_and_ranges() {
        assert_eq!(
            parse_args(&args(&["react"])).expect("name"),
            Target::Package {
                name: "react".to_string()
            }
        );
        assert_eq!(
            parse_args(&args(&["debug", "4.3.4"])).expect("version"),
            Target::Version {
                name: "debug".to_string(),
                version: "4.3.4".to_string(),
                shasum: None,
            }
        );
        assert!(matches!(
            parse_args(&args(&["react", "^18.0.0"])).expect("range"),
            Target::Range { raw, .. } if raw == "^18.0.0"
        ));
    }

    #[test]
    fn invalid_arguments_are_aggregated() {
        let err = parse_args(&args(&["Not Valid", "1.2.3.4.5", "abc"])).expect_err("invalid");
        assert_eq!(
            err.to_string(),
            "invalid arguments\n       Not Valid is not a valid npm package name\n       abc is not a valid shasum\n       1.2.3.4.5 is neither a valid version constraint nor an exact valid semantic version"
        );
    }

    #[test]
    fn shasum_accompanies_exact_versions() {
        let shasum = "a".repeat(40);
        assert_eq!(
            parse_args(&args(&["debug", "4.3.4", &shasum])).expect("pinned"),
            Target::Version {
                name: "debug".to_string(),
                version: "4.3.4".to_string(),
                shasum: Some(shasum),
            }
        );
    }
}
