//! Subcommand bodies. Each one resolves its options, then does its work.

pub mod ci;
pub mod lockfiles;
pub mod scan;
pub mod to;
pub mod topics;
pub mod version;

use std::time::Duration;

use lstn_core::Response;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::ci::CiInfo;
use crate::config::{ConfigSource, Env, FlagValues, Options, Scope, resolve};
use crate::error::CliError;
use crate::report::{render_json, render_table, stdout_uses_color};
use crate::reporter::{Reporting, github_client};
use crate::status::Status;

/// What every subcommand shares for the lifetime of one invocation.
pub struct Session<'a> {
    pub source: &'a ConfigSource,
    pub env: &'a dyn Env,
    pub ci: Option<&'a CiInfo>,
    pub token: CancellationToken,
    pub status: Status,
}

impl Session<'_> {
    /// Resolves the options of `scope`.
    ///
    /// Returns `None` after printing them when `--debug-options` is set.
    pub fn options(&self, scope: Scope, flags: &FlagValues) -> Result<Option<Options>, CliError> {
        let options = resolve(scope, flags, self.source, self.env, self.ci)?;
        if options.debug_options {
            println!("{}", options.debug_json(scope)?);
            return Ok(None);
        }
        tracing::debug!(?scope, timeout = options.timeout, "resolved options");
        Ok(Some(options))
    }

    /// Cancels the session once `seconds` elapsed.
    pub fn arm_deadline(&self, seconds: u64) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {
                    tracing::debug!(seconds, "deadline exceeded");
                    token.cancel();
                }
            }
        });
    }

    /// HTTP client identifying `caller` in its User-Agent.
    pub fn http(&self, caller: &str) -> Result<Client, CliError> {
        let user_agent = lstn_http::user_agent(caller, &[], true);
        Ok(lstn_http::build_client(&user_agent)?)
    }

    /// Prints `response` as JSON or as a table, then runs the configured reporters.
    pub async fn publish(
        &self,
        options: &Options,
        http: &Client,
        response: &Response,
    ) -> Result<(), CliError> {
        if options.json {
            print!("{}", render_json(response, &options.jq)?);
        } else {
            print!("{}", render_table(&response.sorted(), stdout_uses_color()));
        }

        if options.reporter.is_empty() {
            return Ok(());
        }
        let comments = github_client(http.clone(), self.env, &options.gh_token);
        let reporting = Reporting {
            options,
            ci: self.ci,
            comments: &comments,
            status: self.status,
        };
        lstn_http::cancellable(&self.token, reporting.run(response)).await?
    }
}
