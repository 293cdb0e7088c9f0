use async_trait::async_trait;
use lstn_core::{Ecosystem, PackageVersions, RegistryClient, RegistryError};
use lstn_http::reqwest_transport_error;
use reqwest::{Client, StatusCode};
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const DEFAULT_NPM_REGISTRY_URL: &str = "https://registry.npmjs.org";

#[derive(Clone)]
pub struct NpmRegistryClient {
    http: Client,
    base_url: String,
}

impl NpmRegistryClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn encode_package_name(package: &str) -> String {
        package.replace('@', "%40").replace('/', "%2f")
    }

    async fn get<T>(&self, package: &str, url: String) -> Result<T, RegistryError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| reqwest_transport_error("unable to query the npm registry", &url, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound {
                registry: "npm",
                package: package.to_string(),
            });
        }
        if response.status() != StatusCode::OK {
            return Err(RegistryError::NotOk {
                registry: "NPM",
                url,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse {
                message: format!("couldn't decode the NPM registry response: {e}"),
            })
    }
}

#[async_trait]
impl RegistryClient for NpmRegistryClient {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    async fn fetch_versions(&self, package: &str) -> Result<PackageVersions, RegistryError> {
        let url = format!("{}/{}", self.base_url, Self::encode_package_name(package));
        let body: NpmPackageResponse = self.get(package, url).await?;

        let mut versions = Vec::with_capacity(body.versions.len());
        for raw in body.versions.keys() {
            match Version::parse(raw) {
                Ok(version) => versions.push(version),
                Err(error) => {
                    tracing::debug!(package, version = %raw, %error, "skipping unparseable version");
                }
            }
        }
        versions.sort();

        Ok(PackageVersions {
            name: body.name.unwrap_or_else(|| package.to_string()),
            latest: body
                .dist_tags
                .get("latest")
                .and_then(|latest| Version::parse(latest).ok()),
            versions,
        })
    }
}

#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "dist-tags")]
    dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> NpmRegistryClient {
        NpmRegistryClient::new(Client::new(), format!("{}/", server.uri()))
    }

    #[test]
    fn scoped_names_are_encoded() {
        assert_eq!(
            NpmRegistryClient::encode_package_name("@types/node"),
            "%40types%2fnode"
        );
        assert_eq!(NpmRegistryClient::encode_package_name("react"), "react");
    }

    #[tokio::test]
    async fn fetch_versions_sorts_and_reads_latest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/react"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "react",
                "dist-tags": {"latest": "18.2.0"},
                "versions": {"18.2.0": {}, "0.14.0": {}, "17.0.2": {}, "not-semver": {}}
            })))
            .mount(&server)
            .await;

        let versions = client(&server)
            .fetch_versions("react")
            .await
            .expect("versions");
        assert_eq!(versions.latest, Version::parse("18.2.0").ok());
        assert_eq!(
            versions
                .versions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["0.14.0", "17.0.2", "18.2.0"]
        );
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let registry = client(&server);
        let err = registry.fetch_versions("missing").await.expect_err("404");
        assert!(matches!(err, RegistryError::NotFound { .. }));

        let err = registry.fetch_versions("broken").await.expect_err("500");
        assert_eq!(
            err.to_string(),
            format!("the NPM registry response for {}/broken was not ok", server.uri())
        );
    }
}
