//! HTTP plumbing shared by the registry crates and the CLI.

mod os;

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use lstn_core::RegistryError;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use os::OsInfo;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Version of the running tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolVersion {
    pub short: String,
    pub long: String,
}

impl ToolVersion {
    pub fn current() -> Self {
        let short = env!("CARGO_PKG_VERSION").to_string();
        let long = match option_env!("LSTN_GIT_COMMIT") {
            Some(commit) if !commit.is_empty() => format!("{short}-{commit}"),
            _ => short.clone(),
        };
        Self { short, long }
    }

    /// Release tag, as published on the changelog.
    pub fn tag(&self) -> String {
        format!("v{}", self.short)
    }
}

/// Builds the User-Agent sent with every request.
///
/// `caller` names the component issuing the request. With `with_os` the operating
/// system details are appended after the product comment.
pub fn user_agent(caller: &str, comments: &[&str], with_os: bool) -> String {
    let version = ToolVersion::current();
    let mut ua = format!("lstn/{} ({}; {caller}", version.short, version.long);
    for comment in comments {
        ua.push_str("; ");
        ua.push_str(comment);
    }
    ua.push(')');

    if with_os {
        let formatted = OsInfo::detect().format_as_user_agent();
        if !formatted.is_empty() {
            ua.push(' ');
            ua.push_str(&formatted);
        }
    }

    ua
}

/// Creates a client that identifies itself with `user_agent`.
///
/// # Errors
///
/// Returns an error when the TLS backend cannot be initialized.
pub fn build_client(user_agent: &str) -> Result<Client, RegistryError> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|error| RegistryError::Transport {
            message: format!("unable to build the HTTP client: {error}"),
        })
}

/// Raised when a [`CancellationToken`] fires before the wrapped future completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Drives `future` unless `token` is cancelled first.
pub async fn cancellable<F>(token: &CancellationToken, future: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Cancelled),
        output = future => Ok(output),
    }
}

/// Describes a failed request, including the underlying error chain.
pub fn reqwest_transport_error(
    context: &str,
    request_url: &str,
    error: reqwest::Error,
) -> RegistryError {
    let mut details = Vec::new();

    let effective_url = error
        .url()
        .map(|url| url.as_str().to_string())
        .unwrap_or_else(|| request_url.to_string());
    details.push(format!("request_url={effective_url}"));

    let mut kinds = Vec::new();
    if error.is_timeout() {
        kinds.push("timeout");
    }
    if error.is_connect() {
        kinds.push("connect");
    }
    if error.is_request() {
        kinds.push("request");
    }
    if error.is_body() {
        kinds.push("body");
    }
    if error.is_decode() {
        kinds.push("decode");
    }
    if let Some(status) = error.status() {
        kinds.push(if status.is_client_error() {
            "http4xx"
        } else if status.is_server_error() {
            "http5xx"
        } else {
            "http"
        });
        details.push(format!("http_status={status}"));
    }
    if kinds.is_empty() {
        kinds.push("unknown");
    }
    details.push(format!("kinds={}", kinds.join(",")));

    let mut sources = Vec::new();
    let mut current = error.source();
    while let Some(source) = current {
        sources.push(source.to_string());
        if sources.len() >= 4 {
            break;
        }
        current = source.source();
    }
    if !sources.is_empty() {
        details.push(format!("source_chain={}", sources.join(" | ")));
    }

    tracing::debug!(context, url = %effective_url, "request failed");

    RegistryError::Transport {
        message: format!("{context}: {error}; {}", details.join("; ")),
    }
}
