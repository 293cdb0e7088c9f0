//! Continuous-integration environment detection and the `ci` subcommand flows.

mod core_api;
pub mod enable;
pub mod report;

use std::fs;

use serde::Deserialize;

use crate::config::Env;
use crate::error::CliError;

pub use core_api::CoreClient;

#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("couldn't find the GITHUB_EVENT_PATH environment variable")]
    MissingEventPath,
    #[error("couldn't decode the GITHUB_EVENT_PATH file")]
    UndecodableEvent,
    #[error("CI systems other than GitHub Actions are not supported yet")]
    Unsupported,
}

impl From<CiError> for CliError {
    fn from(error: CiError) -> Self {
        Self::Input(error.to_string())
    }
}

/// The webhook payload GitHub writes at `GITHUB_EVENT_PATH`, reduced to what is consumed.
#[derive(Debug, Default, Deserialize)]
struct EventPayload {
    repository: Option<RepositoryPayload>,
    pull_request: Option<PullRequestPayload>,
    head_commit: Option<HeadCommitPayload>,
    check_suite: Option<CheckSuitePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct RepositoryPayload {
    #[serde(default)]
    name: String,
    owner: Option<OwnerPayload>,
    #[serde(default)]
    fork: bool,
}

#[derive(Debug, Default, Deserialize)]
struct OwnerPayload {
    #[serde(default)]
    login: String,
}

#[derive(Debug, Default, Deserialize)]
struct PullRequestPayload {
    number: Option<u64>,
    head: Option<BranchPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct BranchPayload {
    #[serde(rename = "ref", default)]
    git_ref: String,
    #[serde(default)]
    sha: String,
    repo: Option<RepositoryPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct HeadCommitPayload {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct CheckSuitePayload {
    #[serde(default)]
    pull_requests: Vec<PullRequestPayload>,
}

/// The event that triggered the workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubEvent {
    PullRequest {
        number: u64,
        branch: String,
        sha: String,
        fork: bool,
    },
    Push {
        sha: String,
    },
    /// A check suite re-run attached to a pull request.
    ReRun {
        number: u64,
        branch: String,
        sha: String,
    },
}

impl GitHubEvent {
    fn from_payload(payload: &EventPayload) -> Option<Self> {
        if let Some(pull) = &payload.pull_request
            && let Some(number) = pull.number
        {
            let head = pull.head.as_ref();
            return Some(Self::PullRequest {
                number,
                branch: head.map(|head| head.git_ref.clone()).unwrap_or_default(),
                sha: head.map(|head| head.sha.clone()).unwrap_or_default(),
                fork: head
                    .and_then(|head| head.repo.as_ref())
                    .is_some_and(|repo| repo.fork),
            });
        }

        if let Some(suite) = &payload.check_suite
            && let Some(pull) = suite.pull_requests.first()
            && let Some(number) = pull.number
        {
            let head = pull.head.as_ref();
            return Some(Self::ReRun {
                number,
                branch: head.map(|head| head.git_ref.clone()).unwrap_or_default(),
                sha: head.map(|head| head.sha.clone()).unwrap_or_default(),
            });
        }

        payload
            .head_commit
            .as_ref()
            .filter(|commit| !commit.id.is_empty())
            .map(|commit| Self::Push {
                sha: commit.id.clone(),
            })
    }
}

/// Canonical description of the CI run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiInfo {
    pub owner: String,
    pub repo: String,
    pub sha: String,
    /// Pull request number, 0 outside pull requests.
    pub num: u64,
    pub branch: String,
    pub fork: bool,
    pub event_name: String,
    pub repository: String,
    pub repository_id: String,
    pub workflow: String,
    pub job: String,
    pub run_id: String,
    pub run_number: String,
    pub run_attempt: String,
    pub actor: String,
    pub git_ref: String,
    pub head_ref: String,
    pub base_ref: String,
    pub server_url: String,
    pub api_url: String,
}

/// Detects the CI the process runs in. `Ok(None)` outside of any CI.
///
/// # Errors
///
/// Fails inside a CI that is not GitHub Actions, or when the GitHub event is unusable.
pub fn detect(env: &dyn Env) -> Result<Option<CiInfo>, CiError> {
    if is_set(env, "GITHUB_ACTIONS") {
        return CiInfo::from_github(env).map(Some);
    }
    if is_set(env, "CI") {
        return Err(CiError::Unsupported);
    }
    Ok(None)
}

fn is_set(env: &dyn Env, key: &str) -> bool {
    env.var(key).is_some_and(|value| !value.is_empty())
}

impl CiInfo {
    /// Like [`detect`], but being outside a CI is an error too.
    pub fn from_env(env: &dyn Env) -> Result<Self, CiError> {
        detect(env)?.ok_or(CiError::Unsupported)
    }

    fn from_github(env: &dyn Env) -> Result<Self, CiError> {
        let event_path = env
            .var("GITHUB_EVENT_PATH")
            .filter(|path| !path.is_empty())
            .ok_or(CiError::MissingEventPath)?;
        let raw = fs::read(&event_path).map_err(|_| CiError::UndecodableEvent)?;
        let payload: EventPayload =
            serde_json::from_slice(&raw).map_err(|_| CiError::UndecodableEvent)?;

        let var = |key: &str| env.var(key).unwrap_or_default();
        let mut info = Self {
            event_name: var("GITHUB_EVENT_NAME"),
            repository: var("GITHUB_REPOSITORY"),
            repository_id: var("GITHUB_REPOSITORY_ID"),
            workflow: var("GITHUB_WORKFLOW"),
            job: var("GITHUB_JOB"),
            run_id: var("GITHUB_RUN_ID"),
            run_number: var("GITHUB_RUN_NUMBER"),
            run_attempt: var("GITHUB_RUN_ATTEMPT"),
            actor: var("GITHUB_ACTOR"),
            git_ref: var("GITHUB_REF"),
            head_ref: var("GITHUB_HEAD_REF"),
            base_ref: var("GITHUB_BASE_REF"),
            server_url: var("GITHUB_SERVER_URL"),
            api_url: var("GITHUB_API_URL"),
            sha: var("GITHUB_SHA"),
            ..Self::default()
        };

        if let Some(repository) = &payload.repository {
            info.repo = repository.name.clone();
            info.owner = repository
                .owner
                .as_ref()
                .map(|owner| owner.login.clone())
                .unwrap_or_default();
        }

        match GitHubEvent::from_payload(&payload) {
            Some(GitHubEvent::PullRequest {
                number,
                branch,
                sha,
                fork,
            }) => {
                info.num = number;
                info.branch = branch;
                info.fork = fork;
                if !sha.is_empty() {
                    info.sha = sha;
                }
            }
            Some(GitHubEvent::ReRun {
                number,
                branch,
                sha,
            }) => {
                info.num = number;
                info.branch = branch;
                if !sha.is_empty() {
                    info.sha = sha;
                }
            }
            Some(GitHubEvent::Push { sha }) => info.sha = sha,
            None => {}
        }

        tracing::debug!(
            owner = %info.owner,
            repo = %info.repo,
            num = info.num,
            event = %info.event_name,
            "detected GitHub Actions"
        );
        Ok(info)
    }

    pub fn is_github_pull_request(&self) -> bool {
        self.num != 0 && !self.owner.is_empty() && !self.repo.is_empty()
    }

    /// Pull requests from forks triggered by `pull_request_target` only get a read-only token.
    pub fn has_read_only_github_token(&self) -> bool {
        self.fork && self.event_name == "pull_request_target"
    }

    /// Sorted `KEY=VALUE` lines for every non-empty field.
    pub fn dump(&self) -> String {
        let num = if self.num == 0 {
            String::new()
        } else {
            self.num.to_string()
        };
        let fork = if self.fork { "true" } else { "" };

        let mut lines = [
            ("OWNER", self.owner.as_str()),
            ("REPO", self.repo.as_str()),
            ("GITHUB_SHA", self.sha.as_str()),
            ("NUM", num.as_str()),
            ("BRANCH", self.branch.as_str()),
            ("FORK", fork),
            ("GITHUB_EVENT_NAME", self.event_name.as_str()),
            ("GITHUB_REPOSITORY", self.repository.as_str()),
            ("GITHUB_REPOSITORY_ID", self.repository_id.as_str()),
            ("GITHUB_WORKFLOW", self.workflow.as_str()),
            ("GITHUB_JOB", self.job.as_str()),
            ("GITHUB_RUN_ID", self.run_id.as_str()),
            ("GITHUB_RUN_NUMBER", self.run_number.as_str()),
            ("GITHUB_RUN_ATTEMPT", self.run_attempt.as_str()),
            ("GITHUB_ACTOR", self.actor.as_str()),
            ("GITHUB_REF", self.git_ref.as_str()),
            ("GITHUB_HEAD_REF", self.head_ref.as_str()),
            ("GITHUB_BASE_REF", self.base_ref.as_str()),
            ("GITHUB_SERVER_URL", self.server_url.as_str()),
            ("GITHUB_API_URL", self.api_url.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>();
        lines.sort();
        lines.join("\n")
    }

    /// The repository alone, as the network policy is per repository.
    pub fn repository_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("repository", self.repository.clone()),
            ("repository_id", self.repository_id.clone()),
        ];
        params.retain(|(_, value)| !value.is_empty());
        params
    }

    /// Query parameters identifying this run on the Core API.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("repository", self.repository.clone()),
            ("repository_id", self.repository_id.clone()),
            ("workflow", self.workflow.clone()),
            ("job", self.job.clone()),
            ("run_id", self.run_id.clone()),
            ("run_number", self.run_number.clone()),
            ("run_attempt", self.run_attempt.clone()),
            ("sha", self.sha.clone()),
        ];
        if self.num != 0 {
            params.push(("pull_request", self.num.to_string()));
        }
        params.retain(|(_, value)| !value.is_empty());
        params
    }
}

#[cfg(test)]
#[path = "../tests/ci.rs"]
mod tests;
