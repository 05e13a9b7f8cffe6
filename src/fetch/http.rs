use std::time::Duration;

use reqwest::header::{ACCEPT, RETRY_AFTER};
use url::Url;

use super::rate_limit::{self, Attempt};
use super::{FetchError, SnapshotSource};
use crate::error::{Error, Result};
use crate::metrics::types::DateWindow;
use crate::scope::Scope;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const API_URL_ENV: &str = "COPILOT_API_URL";
/// Checked in order; the first one set wins.
pub const TOKEN_ENV_VARS: &[&str] = &["COPILOT_API_TOKEN", "GITHUB_TOKEN"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches raw metrics payloads over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    backoff: Vec<Duration>,
}

impl HttpSource {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::Config(format!("invalid API URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("invalid API URL: {base_url}")));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("copilotstats/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            token,
            backoff: rate_limit::DEFAULT_BACKOFF.to_vec(),
        })
    }

    /// Build from `COPILOT_API_URL` and the first token variable that is set.
    pub fn from_env() -> Result<Self> {
        let token = TOKEN_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                Error::Config(format!(
                    "no API token found; set one of {}",
                    TOKEN_ENV_VARS.join(", ")
                ))
            })?;
        let base_url = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(&base_url, Some(token))
    }

    pub fn with_backoff(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff = schedule;
        self
    }

    /// Metrics endpoint for a scope, with the window as `since`/`until`.
    pub fn endpoint(&self, scope: &Scope, window: Option<&DateWindow>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config(format!("invalid API URL: {}", self.base_url)))?;
            segments.pop_if_empty();
            match scope {
                Scope::Organization { org } => {
                    segments.extend(["orgs", org.as_str(), "copilot", "metrics"]);
                }
                Scope::Team { org, team } => {
                    segments.extend(["orgs", org.as_str(), "team", team.as_str(), "copilot", "metrics"]);
                }
            }
        }
        if let Some(window) = window {
            url.query_pairs_mut()
                .append_pair("since", &window.start.to_string())
                .append_pair("until", &window.end.to_string());
        }
        Ok(url)
    }

    async fn get_once(&self, url: &Url) -> std::result::Result<serde_json::Value, Attempt> {
        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::new(None, e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            return response.json::<serde_json::Value>().await.map_err(|e| {
                Attempt::from(FetchError::new(
                    Some(status.as_u16()),
                    format!("invalid response body: {e}"),
                ))
            });
        }

        let retry_after = rate_limit::parse_retry_after(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body = response.text().await.unwrap_or_default();
        Err(Attempt {
            error: FetchError::new(Some(status.as_u16()), error_message(status, &body)),
            retry_after,
        })
    }
}

/// The `message` field of a JSON error body, else the raw body, else the
/// status reason phrase.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    if let Some(message) = from_json {
        return message;
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

impl SnapshotSource for HttpSource {
    async fn fetch_snapshot(
        &self,
        scope: &Scope,
        window: Option<&DateWindow>,
    ) -> std::result::Result<serde_json::Value, FetchError> {
        let url = self
            .endpoint(scope, window)
            .map_err(|e| FetchError::new(None, e.to_string()))?;
        log::info!("Fetching metrics for {scope} from {}", url.path());
        let url = &url;
        rate_limit::retry_rate_limited(&self.backoff, move || self.get_once(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_endpoint_paths() {
        let source = HttpSource::new("https://ghe.example.com/api/v3/", None).unwrap();
        let org = Scope::organization("acme").unwrap();
        assert_eq!(
            source.endpoint(&org, None).unwrap().as_str(),
            "https://ghe.example.com/api/v3/orgs/acme/copilot/metrics"
        );

        let team = Scope::team("acme", "web").unwrap();
        let window = DateWindow::new(d(2025, 1, 1), d(2025, 1, 28)).unwrap();
        assert_eq!(
            source.endpoint(&team, Some(&window)).unwrap().as_str(),
            "https://ghe.example.com/api/v3/orgs/acme/team/web/copilot/metrics?since=2025-01-01&until=2025-01-28"
        );
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(HttpSource::new("not a url", None).is_err());
        assert!(HttpSource::new("mailto:someone@example.com", None).is_err());
    }

    #[test]
    fn test_error_message() {
        let status = reqwest::StatusCode::NOT_FOUND;
        assert_eq!(error_message(status, r#"{"message":"Not Found"}"#), "Not Found");
        assert_eq!(error_message(status, "plain text"), "plain text");
        assert_eq!(error_message(status, ""), "Not Found");
    }

    #[tokio::test]
    async fn test_fetch_org_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/copilot/metrics"))
            .and(query_param("since", "2025-01-01"))
            .and(query_param("until", "2025-01-28"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"total_completions_count": 42})),
            )
            .mount(&server)
            .await;

        let source = HttpSource::new(&server.uri(), Some("t0ken".into())).unwrap();
        let window = DateWindow::new(d(2025, 1, 1), d(2025, 1, 28)).unwrap();
        let payload = source
            .fetch_snapshot(&Scope::organization("acme").unwrap(), Some(&window))
            .await
            .unwrap();
        assert_eq!(payload["total_completions_count"], 42);
    }

    #[tokio::test]
    async fn test_non_success_becomes_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/team/ghost/copilot/metrics"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let source = HttpSource::new(&server.uri(), None).unwrap();
        let err = source
            .fetch_snapshot(&Scope::team("acme", "ghost").unwrap(), None)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(404));
        assert_eq!(err.message, "Not Found");
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/copilot/metrics"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/copilot/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let source = HttpSource::new(&server.uri(), None)
            .unwrap()
            .with_backoff(vec![Duration::ZERO]);
        let payload = source
            .fetch_snapshot(&Scope::organization("acme").unwrap(), None)
            .await
            .unwrap();
        assert_eq!(payload, json!({"data": {}}));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(2)
            .mount(&server)
            .await;

        let source = HttpSource::new(&server.uri(), None)
            .unwrap()
            .with_backoff(vec![Duration::ZERO]);
        let err = source
            .fetch_snapshot(&Scope::organization("acme").unwrap(), None)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(429));
        assert_eq!(err.message, "slow down");
    }
}
