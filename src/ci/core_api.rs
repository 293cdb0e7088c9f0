use std::collections::BTreeMap;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CliError;

/// Client of the listen.dev Core API, authenticated with the JWT token.
#[derive(Debug, Clone)]
pub struct CoreClient {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    tokens: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardLink {
    #[serde(default)]
    link: String,
}

impl CoreClient {
    pub fn new(http: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, CliError> {
        let url = format!("{}{path}", self.base_url);
        request
            .send()
            .await
            .map_err(|error| lstn_http::reqwest_transport_error("Core API request failed", &url, error).into())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, CliError> {
        let response = self
            .send(self.request(Method::GET, path).query(query), path)
            .await?;
        let response = expect_ok(response, path)?;
        response
            .json::<T>()
            .await
            .map_err(|error| CliError::Decoding(format!("couldn't decode the {path} response: {error}")))
    }

    /// Tokens handed to the monitor through its environment file.
    pub async fn settings(&self) -> Result<BTreeMap<String, String>, CliError> {
        let settings: Option<Settings> = self.get_json("/api/v1/settings", &[]).await?;
        match settings {
            Some(settings) if !settings.tokens.is_empty() => Ok(settings.tokens),
            _ => Err(CliError::Network(
                "got empty settings from the Core API".to_string(),
            )),
        }
    }

    pub async fn monitor_config(&self) -> Result<Value, CliError> {
        self.get_json("/config", &[]).await
    }

    pub async fn network_policy(&self, query: &[(&'static str, String)]) -> Result<Value, CliError> {
        self.get_json("/netpolicy", query).await
    }

    pub async fn network_events(
        &self,
        query: &[(&'static str, String)],
    ) -> Result<Vec<Value>, CliError> {
        let events: Option<Vec<Value>> = self.get_json("/api/v1/network_events", query).await?;
        Ok(events.unwrap_or_default())
    }

    /// Forwards `payload` to the webhook. Only 202 and 204 count as accepted.
    pub async fn webhook(&self, payload: &Value) -> Result<(), CliError> {
        let path = "/api/v1/webhook";
        let response = self
            .send(self.request(Method::POST, path).json(payload), path)
            .await?;
        match response.status() {
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(()),
            status => Err(CliError::Network(format!(
                "unexpected status code: {}",
                status.as_u16()
            ))),
        }
    }

    pub async fn dashboard_link(&self, query: &[(&'static str, String)]) -> Result<String, CliError> {
        let link: DashboardLink = self.get_json("/api/v1/dashboard/link", query).await?;
        Ok(link.link)
    }
}

fn expect_ok(response: Response, path: &str) -> Result<Response, CliError> {
    match response.status() {
        StatusCode::OK => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CliError::Auth(format!(
            "the Core API rejected the JWT token ({} on {path})",
            response.status().as_u16()
        ))),
        status => Err(CliError::Network(format!(
            "unexpected status code: {}",
            status.as_u16()
        ))),
    }
}
