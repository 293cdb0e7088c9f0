use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// Coordinates of a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
}

/// The issue comment operations a sticky comment needs.
#[async_trait]
pub trait IssueComments: Send + Sync {
    async fn list(&self, pull: &PullRequest) -> Result<Vec<IssueComment>, CliError>;
    async fn create(&self, pull: &PullRequest, body: &str) -> Result<IssueComment, CliError>;
    async fn update(
        &self,
        pull: &PullRequest,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment, CliError>;
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// GitHub REST client for issue comments.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(http: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
        url: &str,
        expected: StatusCode,
    ) -> Result<T, CliError> {
        let response = self.authorize(request).send().await.map_err(|error| {
            CliError::from(lstn_http::reqwest_transport_error(
                "GitHub request failed",
                url,
                error,
            ))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CliError::Auth(format!(
                "GitHub rejected the token ({} on {url})",
                status.as_u16()
            )));
        }
        if status != expected {
            return Err(CliError::Network(format!(
                "unexpected status code: {}",
                status.as_u16()
            )));
        }

        response.json::<T>().await.map_err(|error| {
            CliError::Decoding(format!("couldn't decode the GitHub response: {error}"))
        })
    }
}

#[async_trait]
impl IssueComments for GitHubClient {
    async fn list(&self, pull: &PullRequest) -> Result<Vec<IssueComment>, CliError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.base_url, pull.owner, pull.repo, pull.number
        );
        let mut comments = Vec::new();
        for page in 1usize.. {
            let request = self
                .http
                .get(&url)
                .query(&[("per_page", PER_PAGE), ("page", page)]);
            let batch: Vec<IssueComment> = self.send(request, &url, StatusCode::OK).await?;
            let last = batch.len() < PER_PAGE;
            comments.extend(batch);
            if last {
                break;
            }
        }
        Ok(comments)
    }

    async fn create(&self, pull: &PullRequest, body: &str) -> Result<IssueComment, CliError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.base_url, pull.owner, pull.repo, pull.number
        );
        let request = self.http.post(&url).json(&CommentBody { body });
        self.send(request, &url, StatusCode::CREATED).await
    }

    async fn update(
        &self,
        pull: &PullRequest,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment, CliError> {
        let url = format!(
            "{}/repos/{}/{}/issues/comments/{comment_id}",
            self.base_url, pull.owner, pull.repo
        );
        let request = self.http.patch(&url).json(&CommentBody { body });
        self.send(request, &url, StatusCode::OK).await
    }
}
