//! `lstn ci report`: turns the monitor's network events into a pull request comment.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::{CiInfo, CoreClient};
use crate::config::Options;
use crate::error::CliError;
use crate::reporter::{IssueComments, pull_request_target, upsert};
use crate::status::Status;

pub const ALL_CLEAR: &str = "✅ No network policy violations detected.";

/// The domain an event is about: the dropped remote, else the resolved name.
pub fn event_domain(event: &Value) -> Option<&str> {
    event
        .pointer("/data/body/dropped/remote/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .or_else(|| {
            event
                .pointer("/data/body/resolve")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
        })
}

/// Blocked domains and how many events mention each.
pub fn blocked_domains(events: &[Value]) -> BTreeMap<String, usize> {
    let mut domains = BTreeMap::new();
    for event in events {
        match event_domain(event) {
            Some(domain) => *domains.entry(domain.to_string()).or_insert(0) += 1,
            None => tracing::warn!(%event, "skipping network event without a domain"),
        }
    }
    domains
}

pub fn render_violations(domains: &BTreeMap<String, usize>, dashboard: &str) -> String {
    let mut out = String::from("## 🚨 Network policy violations\n\n");
    out.push_str("| Domain | Events |\n| --- | ---: |\n");
    for (domain, count) in domains {
        let _ = writeln!(out, "| `{domain}` | {count} |");
    }
    if !dashboard.is_empty() {
        let _ = write!(out, "\n[Review in dashboard]({dashboard})\n");
    }
    out
}

fn webhook_payload(ci: &CiInfo, domains: &BTreeMap<String, usize>) -> Value {
    let mut payload = ci
        .query_params()
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(value)))
        .collect::<Map<_, _>>();
    payload.insert(
        "domains".to_string(),
        Value::Array(domains.keys().cloned().map(Value::String).collect()),
    );
    Value::Object(payload)
}

pub struct Report<'a> {
    pub options: &'a Options,
    pub ci: &'a CiInfo,
    pub core: &'a CoreClient,
    pub comments: &'a dyn IssueComments,
    pub status: Status,
}

impl Report<'_> {
    /// # Errors
    ///
    /// Fails when the Core API or GitHub calls fail. A rejected webhook only warns.
    pub async fn run(&self, token: &CancellationToken) -> Result<(), CliError> {
        let pull = match pull_request_target(self.options, Some(self.ci)) {
            Ok(pull) => pull,
            Err(reason) => {
                self.status.warning(&format!("Exiting: {reason}."));
                return Ok(());
            }
        };

        let query = self.ci.query_params();
        self.status.progress("Fetching the network events...");
        let events = lstn_http::cancellable(token, self.core.network_events(&query)).await??;
        let domains = blocked_domains(&events);
        tracing::debug!(events = events.len(), domains = domains.len(), "collected network events");

        let body = if events.is_empty() {
            ALL_CLEAR.to_string()
        } else {
            let payload = webhook_payload(self.ci, &domains);
            match lstn_http::cancellable(token, self.core.webhook(&payload)).await? {
                Ok(()) => {}
                Err(CliError::Cancelled) => return Err(CliError::Cancelled),
                Err(error) => tracing::warn!(%error, "the webhook did not accept the events"),
            }
            let dashboard =
                lstn_http::cancellable(token, self.core.dashboard_link(&query)).await??;
            render_violations(&domains, &dashboard)
        };

        lstn_http::cancellable(token, upsert(self.comments, &pull, &body)).await??;
        self.status.success(&format!(
            "Reported {} blocked domain(s) on {}/{}#{}",
            domains.len(),
            pull.owner,
            pull.repo,
            pull.number
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{GitHubClient, STICKY_MARKER};
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ci_info() -> CiInfo {
        CiInfo {
            owner: "listendev".to_string(),
            repo: "lstn".to_string(),
            repository: "listendev/lstn".to_string(),
            run_id: "77".to_string(),
            num: 9,
            event_name: "pull_request".to_string(),
            ..CiInfo::default()
        }
    }

    async fn github_without_comments() -> MockServer {
        let github = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/listendev/lstn/issues/9/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&github)
            .await;
        github
    }

    #[test]
    fn domains_come_from_dropped_remotes_or_resolutions() {
        let events = vec![
            json!({"data": {"body": {"dropped": {"remote": {"name": "evil.example"}}}}}),
            json!({"data": {"body": {"resolve": "tracker.example"}}}),
            json!({"data": {"body": {"resolve": "evil.example"}}}),
            json!({"data": {"body": {}}}),
        ];
        let domains = blocked_domains(&events);
        assert_eq!(
            domains,
            BTreeMap::from([
                ("evil.example".to_string(), 2),
                ("tracker.example".to_string(), 1)
            ])
        );
    }

    #[test]
    fn violations_table_links_the_dashboard() {
        let domains = BTreeMap::from([("evil.example".to_string(), 2)]);
        let rendered = render_violations(&domains, "https://dashboard.listen.dev/runs/1");
        assert!(rendered.contains("| `evil.example` | 2 |\n"));
        assert!(rendered.ends_with("[Review in dashboard](https://dashboard.listen.dev/runs/1)\n"));
    }

    #[tokio::test]
    async fn no_events_posts_all_clear() {
        let core = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/network_events"))
            .and(query_param("repository", "listendev/lstn"))
            .and(query_param("pull_request", "9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&core)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/webhook"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&core)
            .await;

        let github = github_without_comments().await;
        Mock::given(method("POST"))
            .and(path("/repos/listendev/lstn/issues/9/comments"))
            .and(body_partial_json(json!({"body": format!("{STICKY_MARKER}\n\n{ALL_CLEAR}")})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1, "body": ""})))
            .expect(1)
            .mount(&github)
            .await;

        let options = Options::defaults(Some(&ci_info()));
        let info = ci_info();
        let core_client = CoreClient::new(Client::new(), core.uri(), "jwt");
        let comments = GitHubClient::new(Client::new(), github.uri(), "gh");

        Report {
            options: &options,
            ci: &info,
            core: &core_client,
            comments: &comments,
            status: Status::quiet(),
        }
        .run(&CancellationToken::new())
        .await
        .expect("report");
    }

    #[tokio::test]
    async fn violations_survive_a_rejected_webhook() {
        let core = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/network_events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"data": {"body": {"dropped": {"remote": {"name": "evil.example"}}}}}
            ])))
            .mount(&core)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/webhook"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&core)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/link"))
            .and(query_param("run_id", "77"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"link": "https://dashboard.listen.dev/r/77"})),
            )
            .mount(&core)
            .await;

        let github = github_without_comments().await;
        Mock::given(method("POST"))
            .and(path("/repos/listendev/lstn/issues/9/comments"))
            .and(body_string_contains("evil.example"))
            .and(body_string_contains("Review in dashboard"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 2, "body": ""})))
            .expect(1)
            .mount(&github)
            .await;

        let options = Options::defaults(Some(&ci_info()));
        let info = ci_info();
        let core_client = CoreClient::new(Client::new(), core.uri(), "jwt");
        let comments = GitHubClient::new(Client::new(), github.uri(), "gh");

        Report {
            options: &options,
            ci: &info,
            core: &core_client,
            comments: &comments,
            status: Status::quiet(),
        }
        .run(&CancellationToken::new())
        .await
        .expect("report");
    }

    #[tokio::test]
    async fn events_without_domains_are_not_all_clear() {
        let core = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/network_events"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"data": {"body": {}}}])),
            )
            .mount(&core)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/webhook"))
            .and(body_partial_json(json!({"domains": []})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&core)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/link"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"link": ""})))
            .mount(&core)
            .await;

        let github = github_without_comments().await;
        Mock::given(method("POST"))
            .and(path("/repos/listendev/lstn/issues/9/comments"))
            .and(body_string_contains("Network policy violations"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 3, "body": ""})))
            .expect(1)
            .mount(&github)
            .await;

        let options = Options::defaults(Some(&ci_info()));
        let info = ci_info();
        let core_client = CoreClient::new(Client::new(), core.uri(), "jwt");
        let comments = GitHubClient::new(Client::new(), github.uri(), "gh");

        Report {
            options: &options,
            ci: &info,
            core: &core_client,
            comments: &comments,
            status: Status::quiet(),
        }
        .run(&CancellationToken::new())
        .await
        .expect("report");
    }

    #[tokio::test]
    async fn rejected_jwt_is_an_auth_failure() {
        let core = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/network_events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&core)
            .await;

        let options = Options::defaults(Some(&ci_info()));
        let info = ci_info();
        let core_client = CoreClient::new(Client::new(), core.uri(), "bad");
        let comments = GitHubClient::new(Client::new(), "http://127.0.0.1:9", "gh");

        let err = Report {
            options: &options,
            ci: &info,
            core: &core_client,
            comments: &comments,
            status: Status::quiet(),
        }
        .run(&CancellationToken::new())
        .await
        .expect_err("unauthorized");
        assert_eq!(err.exit_code(), 4);
    }
}
