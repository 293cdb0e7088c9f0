//! Reporters publishing verdicts outside the terminal.

mod github;
mod sticky;

use lstn_core::Response;
use reqwest::Client;

use crate::ci::CiInfo;
use crate::config::{Env, Options, ReporterKind};
use crate::error::CliError;
use crate::report::render_markdown;
use crate::status::Status;

pub use github::{DEFAULT_GITHUB_API_URL, GitHubClient, IssueComment, IssueComments, PullRequest};
pub use sticky::{STICKY_MARKER, sticky_body, upsert};

/// Why a reporter cannot run in the current environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unrunnable {
    #[error("the reporter is not running in a supported environment")]
    UnsupportedEnvironment,
    #[error("the reporter is not running against a GitHub pull request")]
    NotOnPullRequest,
    #[error("the GitHub token the reporter is running with is read-only")]
    ReadOnlyToken,
}

/// GitHub client authenticated with `token`. `GITHUB_API_URL` overrides the API base URL.
pub fn github_client(http: Client, env: &dyn Env, token: &str) -> GitHubClient {
    let base_url = env
        .var("GITHUB_API_URL")
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string());
    GitHubClient::new(http, base_url, token)
}

/// Where the pull request comment goes, or why it cannot be posted.
pub fn pull_request_target(options: &Options, ci: Option<&CiInfo>) -> Result<PullRequest, Unrunnable> {
    let ci = ci.ok_or(Unrunnable::UnsupportedEnvironment)?;
    let pull = PullRequest {
        owner: options.gh_owner.clone(),
        repo: options.gh_repo.clone(),
        number: options.gh_pull_id,
    };
    if !ci.is_github_pull_request() || pull.number == 0 || pull.owner.is_empty() || pull.repo.is_empty()
    {
        return Err(Unrunnable::NotOnPullRequest);
    }
    if ci.has_read_only_github_token() {
        return Err(Unrunnable::ReadOnlyToken);
    }
    Ok(pull)
}

pub struct Reporting<'a> {
    pub options: &'a Options,
    pub ci: Option<&'a CiInfo>,
    pub comments: &'a dyn IssueComments,
    pub status: Status,
}

impl Reporting<'_> {
    /// Runs every configured reporter in order.
    ///
    /// # Errors
    ///
    /// Fails when a runnable reporter could not publish its report.
    pub async fn run(&self, response: &Response) -> Result<(), CliError> {
        for kind in &self.options.reporter {
            self.status
                .info(&format!("Reporting using the \"{}\" reporter...", kind.id()));

            match kind {
                ReporterKind::GhPullComment => {
                    let pull = match pull_request_target(self.options, self.ci) {
                        Ok(pull) => pull,
                        Err(reason) => {
                            self.status.warning(&format!("Exiting: {reason}."));
                            continue;
                        }
                    };
                    upsert(self.comments, &pull, &render_markdown(response))
                        .await
                        .map_err(|error| match error {
                            CliError::Auth(_) | CliError::Cancelled => error,
                            other => CliError::Network(format!(
                                "error while executing the \"{}\" reporter: {other}",
                                kind.id()
                            )),
                        })?;
                    self.status.success(&format!(
                        "The report has been successfully sent using the \"{}\" reporter",
                        kind.id()
                    ));
                }
                ReporterKind::GhPullReview | ReporterKind::GhPullCheck => {
                    self.status.warning(&format!(
                        "The \"{}\" reporter is coming soon...",
                        kind.id()
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/reporter.rs"]
mod tests;
