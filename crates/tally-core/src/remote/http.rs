//! HTTP client for the remote voting API.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::{RemoteAuthority, RemoteError};
use crate::error::{Error, Result};
use crate::models::{CachedCompetition, CachedSubmission, Rejection, VoteSubmission};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
const PROBE_TIMEOUT_SECS: u64 = 3;

/// Competition as returned by `GET /v1/competitions`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteCompetition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

impl RemoteCompetition {
    /// Cache entry stamped with the current time
    pub fn into_cached(self) -> CachedCompetition {
        CachedCompetition::new(self.id, self.title, self.description, self.category)
    }
}

/// Submission as returned by `GET /v1/competitions/{id}/submissions`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteSubmission {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
}

impl RemoteSubmission {
    pub fn into_cached(self, competition_id: &str) -> CachedSubmission {
        CachedSubmission::new(self.id, competition_id, self.title, self.author)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

/// `RemoteAuthority` backed by the voting REST API.
#[derive(Clone)]
pub struct HttpRemoteAuthority {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteAuthority {
    /// Build a client for `base_url`; every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::InvalidInput(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Remote read operation: current competitions.
    pub async fn fetch_competitions(
        &self,
    ) -> std::result::Result<Vec<RemoteCompetition>, RemoteError> {
        let url = format!("{}/v1/competitions", self.base_url);
        self.get_json(&url).await
    }

    /// Remote read operation: submissions of one competition.
    pub async fn fetch_submissions(
        &self,
        competition_id: &str,
    ) -> std::result::Result<Vec<RemoteSubmission>, RemoteError> {
        let url = format!(
            "{}/v1/competitions/{}/submissions",
            self.base_url,
            urlencoding::encode(competition_id)
        );
        self.get_json(&url).await
    }

    /// Whether the API answers its health check.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!("Health probe failed: {error}");
                false
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> std::result::Result<T, RemoteError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| RemoteError::transient(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|error| RemoteError::transient(format!("invalid response payload: {error}")))
    }
}

impl RemoteAuthority for HttpRemoteAuthority {
    async fn submit_vote(
        &self,
        submission: &VoteSubmission,
    ) -> std::result::Result<(), RemoteError> {
        let url = format!("{}/v1/votes", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_HEADER, submission.idempotency_key.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(submission)
            .send()
            .await
            .map_err(|error| RemoteError::transient(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

/// Map a non-success HTTP response to a classified remote error.
fn classify_failure(status: StatusCode, body: &str) -> RemoteError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|payload| payload.code.clone().or_else(|| payload.error.clone()))
        .map(|code| code.trim().to_ascii_lowercase());
    let message = parsed
        .and_then(|payload| payload.message)
        .map_or_else(|| describe(status, body), |message| compact_text(&message));

    match code.as_deref() {
        Some("competition_ended") => {
            return RemoteError::rejected(Rejection::CompetitionEnded, message);
        }
        Some("already_voted") => return RemoteError::rejected(Rejection::AlreadyVoted, message),
        _ => {}
    }

    if is_retryable_status(status) {
        return RemoteError::transient(message);
    }

    let rejection = match status {
        StatusCode::GONE => Rejection::CompetitionEnded,
        StatusCode::CONFLICT => Rejection::AlreadyVoted,
        _ => Rejection::Refused,
    };
    RemoteError::rejected(rejection, message)
}

/// Statuses that say nothing about the vote itself.
///
/// 401/403 come from an expired session and 404 from a misrouted
/// deployment; the same vote may succeed once those clear up.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
    ) || status.is_server_error()
}

fn describe(status: StatusCode, body: &str) -> String {
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("API base URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn submission() -> VoteSubmission {
        VoteSubmission {
            submission_id: "sub-1".to_string(),
            rating: 7,
            idempotency_key: "0190a0d4-0000-7000-8000-000000000001".to_string(),
        }
    }

    fn client(server: &MockServer) -> HttpRemoteAuthority {
        HttpRemoteAuthority::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    async fn respond_to_vote(status: u16, body: serde_json::Value) -> RemoteError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/votes"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;

        client(&server).submit_vote(&submission()).await.unwrap_err()
    }

    #[test]
    fn test_new_rejects_invalid_base_urls() {
        assert!(HttpRemoteAuthority::new("  ", Duration::from_secs(1)).is_err());
        assert!(HttpRemoteAuthority::new("votes.example.com", Duration::from_secs(1)).is_err());
        let client =
            HttpRemoteAuthority::new("https://votes.example.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "https://votes.example.com");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_vote_sends_idempotency_key() {
        let server = MockServer::start().await;
        let vote = submission();
        Mock::given(method("POST"))
            .and(path("/v1/votes"))
            .and(header(IDEMPOTENCY_HEADER, vote.idempotency_key.as_str()))
            .and(body_json(json!({
                "submission_id": "sub-1",
                "rating": 7,
                "idempotency_key": vote.idempotency_key,
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).submit_vote(&vote).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_is_already_voted() {
        let error = respond_to_vote(409, json!({ "code": "already_voted" })).await;
        assert_eq!(error.rejection(), Some(Rejection::AlreadyVoted));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ended_competition_is_permanent() {
        let error = respond_to_vote(
            409,
            json!({ "code": "competition_ended", "message": "Voting closed" }),
        )
        .await;
        assert_eq!(error.rejection(), Some(Rejection::CompetitionEnded));
        assert!(error.to_string().contains("Voting closed"));

        let gone = respond_to_vote(410, json!({})).await;
        assert_eq!(gone.rejection(), Some(Rejection::CompetitionEnded));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_errors_are_transient() {
        assert!(respond_to_vote(503, json!({ "error": "maintenance" }))
            .await
            .is_transient());
        assert!(respond_to_vote(429, json!({})).await.is_transient());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_other_client_errors_are_refused() {
        let error = respond_to_vote(400, json!({ "message": "rating out of range" })).await;
        assert_eq!(error.rejection(), Some(Rejection::Refused));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_auth_and_routing_errors_are_transient() {
        for status in [401, 403, 404] {
            let error = respond_to_vote(status, json!({ "error": "unauthorized" })).await;
            assert!(error.is_transient(), "status {status} should be retried");
            assert_eq!(error.rejection(), None);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_code_wins_over_status() {
        let error = respond_to_vote(403, json!({ "code": "already_voted" })).await;
        assert_eq!(error.rejection(), Some(Rejection::AlreadyVoted));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_server_is_transient() {
        let server = MockServer::start().await;
        let remote = client(&server);
        drop(server);

        let error = remote.submit_vote(&submission()).await.unwrap_err();
        assert!(error.is_transient());
        assert!(!remote.probe().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetches_competitions_and_submissions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/competitions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "c1", "title": "Sunsets", "description": "Golden hour", "category": "photo" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/competitions/c1/submissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "s1", "title": "Beach", "author": "mo" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let remote = client(&server);
        let competitions = remote.fetch_competitions().await.unwrap();
        assert_eq!(competitions.len(), 1);
        let cached = competitions[0].clone().into_cached();
        assert_eq!(cached.title, "Sunsets");

        let submissions = remote.fetch_submissions("c1").await.unwrap();
        assert_eq!(submissions[0].clone().into_cached("c1").competition_id, "c1");
        assert!(remote.probe().await);
    }
}
