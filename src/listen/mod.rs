//! Client of the listen.dev verdict service.

mod context;
mod git;

use lstn_core::{Ecosystem, Lockfile, Response};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::config::Endpoints;
use crate::error::CliError;

pub use context::AnalysisContext;

/// Verdicts about one package, optionally pinned to a version and digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictsRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AnalysisContext>,
}

impl VerdictsRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            digest: None,
            select: None,
            context: None,
        }
    }

    /// Server-side filter. The expression is wrapped as a JSONPath filter over the verdicts.
    pub fn with_select(mut self, expression: &str) -> Self {
        if !expression.trim().is_empty() {
            self.select = Some(format!("$[?({})]", expression.trim()));
        }
        self
    }
}

/// A whole lockfile, sent base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub manifest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AnalysisContext>,
}

impl AnalysisRequest {
    pub fn new(lockfile: &dyn Lockfile, context: Option<AnalysisContext>) -> Self {
        Self {
            manifest: lockfile.encode(),
            context,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerdictClient {
    http: Client,
    npm_endpoint: String,
    pypi_endpoint: String,
    token: Option<String>,
}

impl VerdictClient {
    pub fn new(http: Client, endpoints: &Endpoints, token: &str) -> Self {
        Self {
            http,
            npm_endpoint: endpoints.npm.trim_end_matches('/').to_string(),
            pypi_endpoint: endpoints.pypi.trim_end_matches('/').to_string(),
            token: (!token.is_empty()).then(|| token.to_string()),
        }
    }

    fn url(&self, ecosystem: Ecosystem, operation: &str) -> String {
        let base = match ecosystem {
            Ecosystem::Npm => &self.npm_endpoint,
            Ecosystem::Pypi => &self.pypi_endpoint,
        };
        format!("{base}/api/{}/{operation}", ecosystem.as_str())
    }

    pub async fn verdicts(
        &self,
        ecosystem: Ecosystem,
        request: &VerdictsRequest,
    ) -> Result<Response, CliError> {
        self.post(self.url(ecosystem, "verdicts"), request).await
    }

    pub async fn analysis(
        &self,
        ecosystem: Ecosystem,
        request: &AnalysisRequest,
    ) -> Result<Response, CliError> {
        self.post(self.url(ecosystem, "analysis"), request).await
    }

    async fn post<T: Serialize>(&self, url: String, body: &T) -> Result<Response, CliError> {
        let mut request = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|error| {
            CliError::from(lstn_http::reqwest_transport_error(
                "verdict request failed",
                &url,
                error,
            ))
        })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(CliError::Auth(format!(
                    "the verdict service rejected the request ({})",
                    response.status().as_u16()
                )));
            }
            status => {
                return Err(CliError::Network(format!(
                    "unexpected status code: {}",
                    status.as_u16()
                )));
            }
        }

        let body = response.bytes().await.map_err(|error| {
            CliError::from(lstn_http::reqwest_transport_error(
                "couldn't read the verdict response",
                &url,
                error,
            ))
        })?;
        tracing::debug!(url = %url, bytes = body.len(), "received verdicts");
        serde_json::from_slice(&body).map_err(|error| {
            CliError::Decoding(format!("couldn't decode the verdict response: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoints(server: &MockServer) -> Endpoints {
        Endpoints {
            npm: format!("{}/", server.uri()),
            pypi: server.uri(),
            core: server.uri(),
        }
    }

    #[test]
    fn select_is_wrapped_as_a_filter() {
        let request = VerdictsRequest::new("react").with_select("@.severity == \"high\"");
        assert_eq!(
            request.select.as_deref(),
            Some("$[?(@.severity == \"high\")]")
        );
        assert_eq!(VerdictsRequest::new("react").with_select("  ").select, None);
    }

    #[tokio::test]
    async fn verdicts_are_posted_with_the_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/npm/verdicts"))
            .and(header("authorization", "Bearer jwt"))
            .and(header("accept", "application/json"))
            .and(body_partial_json(json!({"name": "react", "version": "18.2.0"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "react", "version": "18.2.0", "verdicts": []}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = VerdictClient::new(Client::new(), &endpoints(&server), "jwt");
        let mut request = VerdictsRequest::new("react");
        request.version = Some("18.2.0".to_string());
        let response = client
            .verdicts(Ecosystem::Npm, &request)
            .await
            .expect("verdicts");
        assert_eq!(response.len(), 1);
    }

    #[tokio::test]
    async fn pinned_requests_send_the_digest() {
        let server = MockServer::start().await;
        let digest = "555bd98592883255fa00de14f1151a917b5d77d5";
        Mock::given(method("POST"))
            .and(path("/api/npm/verdicts"))
            .and(body_partial_json(json!({
                "name": "react",
                "version": "18.2.0",
                "digest": digest
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = VerdictClient::new(Client::new(), &endpoints(&server), "");
        let mut request = VerdictsRequest::new("react");
        request.version = Some("18.2.0".to_string());
        request.digest = Some(digest.to_string());

        let body = serde_json::to_value(&request).expect("serialize");
        assert!(body.get("shasum").is_none());
        client
            .verdicts(Ecosystem::Npm, &request)
            .await
            .expect("verdicts");
    }

    #[tokio::test]
    async fn non_ok_statuses_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pypi/analysis"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/npm/analysis"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = VerdictClient::new(Client::new(), &endpoints(&server), "");
        let request = AnalysisRequest {
            manifest: "e30=".to_string(),
            context: None,
        };

        let err = client
            .analysis(Ecosystem::Pypi, &request)
            .await
            .expect_err("503");
        assert_eq!(err.to_string(), "unexpected status code: 503");

        let err = client
            .analysis(Ecosystem::Npm, &request)
            .await
            .expect_err("401");
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn malformed_bodies_are_decoding_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/npm/verdicts"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{oops"))
            .mount(&server)
            .await;

        let client = VerdictClient::new(Client::new(), &endpoints(&server), "");
        let err = client
            .verdicts(Ecosystem::Npm, &VerdictsRequest::new("x"))
            .await
            .expect_err("bad body");
        assert!(matches!(err, CliError::Decoding(_)));
    }
}
