//! [`DocumentApi`] over the GitHub Gists REST API.
//!
//! The logical document is the JSON text of one file inside a private gist.
//! Reads are `GET /gists/{id}`, writes are full-content `PATCH /gists/{id}`,
//! and creation is `POST /gists`.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use demoday_core::document::{encode_document_pretty, parse_document};
use demoday_core::{Document, RemoteCredentials};
use http::header::{ACCEPT, RETRY_AFTER};
use http::{HeaderMap, Method, StatusCode};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DocumentApi;
use crate::config::RemoteApiConfig;
use crate::error::RemoteError;
use crate::metrics::record_remote_request;

const GITHUB_JSON: &str = "application/vnd.github.v3+json";

static RATE_LIMIT_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brate limit").expect("rate limit pattern is valid"));

#[derive(Debug, Deserialize)]
struct GistBody {
    #[serde(default)]
    files: HashMap<String, Option<GistFile>>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedGist {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct GistWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public: Option<bool>,
    files: HashMap<&'a str, FileContent<'a>>,
}

#[derive(Debug, Serialize)]
struct FileContent<'a> {
    content: &'a str,
}

/// HTTP client for the gist-backed document store.
#[derive(Debug, Clone)]
pub struct GistClient {
    http: reqwest::Client,
    config: RemoteApiConfig,
}

impl GistClient {
    /// Builds a client with the configured user agent and request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: RemoteApiConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn collection_url(&self) -> String {
        format!("{}/gists", self.config.base_url.trim_end_matches('/'))
    }

    fn document_url(&self, document_id: &str) -> String {
        format!("{}/{}", self.collection_url(), document_id)
    }

    fn request(&self, method: Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(token)
            .header(ACCEPT, GITHUB_JSON)
    }

    fn write_body<'a>(&'a self, content: &'a str) -> GistWrite<'a> {
        let mut files = HashMap::new();
        files.insert(self.config.file_name.as_str(), FileContent { content });
        GistWrite {
            description: None,
            public: None,
            files,
        }
    }

    async fn fetch(&self, creds: &RemoteCredentials) -> Result<Document, RemoteError> {
        let url = self.document_url(&creds.document_id);
        let response = self
            .request(Method::GET, &url, &creds.token)
            .send()
            .await?;
        let body: GistBody = check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        let Some(file) = body.files.get(&self.config.file_name).and_then(Option::as_ref) else {
            tracing::debug!(document_id = %creds.document_id, "remote document has no data file yet");
            return Ok(Document::new());
        };

        let content = match (&file.content, file.truncated, &file.raw_url) {
            (_, true, Some(raw_url)) => {
                tracing::debug!(document_id = %creds.document_id, "data file truncated; fetching raw content");
                let raw = self
                    .request(Method::GET, raw_url, &creds.token)
                    .send()
                    .await?;
                check(raw).await?.text().await?
            }
            (Some(content), _, _) => content.clone(),
            (None, _, _) => return Ok(Document::new()),
        };

        if content.trim().is_empty() {
            return Ok(Document::new());
        }
        // Unparseable content is an error, never an empty base to write over.
        parse_document(&content).map_err(|e| {
            tracing::error!(document_id = %creds.document_id, error = %e, "remote document is not a JSON object");
            RemoteError::Decode(e.to_string())
        })
    }

    async fn replace(&self, creds: &RemoteCredentials, doc: &Document) -> Result<(), RemoteError> {
        let content = encode_document_pretty(doc).map_err(|e| RemoteError::Decode(e.to_string()))?;
        let url = self.document_url(&creds.document_id);
        let response = self
            .request(Method::PATCH, &url, &creds.token)
            .json(&self.write_body(&content))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn create(&self, token: &str) -> Result<String, RemoteError> {
        let empty = encode_document_pretty(&Document::new())
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let mut body = self.write_body(&empty);
        body.description = Some(self.config.description.as_str());
        body.public = Some(false);

        let response = self
            .request(Method::POST, &self.collection_url(), token)
            .json(&body)
            .send()
            .await?;
        let created: CreatedGist = check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(created.id)
    }
}

#[async_trait]
impl DocumentApi for GistClient {
    async fn fetch_document(&self, creds: &RemoteCredentials) -> Result<Document, RemoteError> {
        let result = self.fetch(creds).await;
        record_remote_request("fetch", &result);
        result
    }

    async fn replace_document(
        &self,
        creds: &RemoteCredentials,
        doc: &Document,
    ) -> Result<(), RemoteError> {
        let result = self.replace(creds, doc).await;
        record_remote_request("replace", &result);
        result
    }

    async fn create_document(&self, token: &str) -> Result<String, RemoteError> {
        let result = self.create(token).await;
        record_remote_request("create", &result);
        result
    }
}

/// Passes successful responses through and classifies everything else.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(classify(status, &headers, message))
}

/// Maps a failed response onto the error taxonomy.
///
/// A 403 is a rate limit when its message says so or when the remaining
/// request budget header is zero; otherwise it is a permission problem.
fn classify(status: StatusCode, headers: &HeaderMap, message: String) -> RemoteError {
    let budget_exhausted = header_str(headers, "x-ratelimit-remaining") == Some("0");
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::FORBIDDEN if budget_exhausted || RATE_LIMIT_MESSAGE.is_match(&message) => {
            RemoteError::RateLimited {
                retry_after: retry_after(headers),
            }
        }
        StatusCode::FORBIDDEN => RemoteError::Forbidden { message },
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        status => RemoteError::Status { status, message },
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reads `Retry-After` (seconds), falling back to the rate-limit reset epoch.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }
    let reset = header_str(headers, "x-ratelimit-reset")?.trim().parse::<u64>().ok()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(Duration::from_secs(reset.saturating_sub(now)))
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn unauthorized_is_permanent() {
        let err = classify(StatusCode::UNAUTHORIZED, &HeaderMap::new(), "Bad credentials".into());
        assert!(matches!(err, RemoteError::Unauthorized));
        assert!(!err.is_retryable());
    }

    #[test]
    fn forbidden_with_rate_limit_message_is_rate_limited() {
        let err = classify(
            StatusCode::FORBIDDEN,
            &headers(&[("retry-after", "60")]),
            "API rate limit exceeded for user ID 1.".into(),
        );
        match err {
            RemoteError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(60)));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn secondary_rate_limit_message_is_rate_limited() {
        let err = classify(
            StatusCode::FORBIDDEN,
            &HeaderMap::new(),
            "You have exceeded a secondary rate limit.".into(),
        );
        assert!(err.is_rate_limited());
    }

    #[test]
    fn forbidden_with_exhausted_budget_is_rate_limited() {
        let err = classify(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0")]),
            String::new(),
        );
        assert!(err.is_rate_limited());
    }

    #[test]
    fn plain_forbidden_is_permission_error() {
        let err = classify(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "4999")]),
            "Resource not accessible by personal access token".into(),
        );
        assert!(matches!(err, RemoteError::Forbidden { .. }));
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), String::new())
            .is_rate_limited());
    }

    #[test]
    fn not_found_and_server_errors() {
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, &HeaderMap::new(), String::new()),
            RemoteError::NotFound
        ));
        let err = classify(StatusCode::BAD_GATEWAY, &HeaderMap::new(), "upstream".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn retry_after_from_reset_epoch() {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let reset = (now + 120).to_string();
        let wait = retry_after(&headers(&[("x-ratelimit-reset", &reset)])).unwrap();
        assert!(wait <= Duration::from_secs(120));
        assert!(wait >= Duration::from_secs(110));
    }

    #[test]
    fn urls_tolerate_trailing_slash() {
        let client = GistClient::new(RemoteApiConfig {
            base_url: "http://localhost:9999/".into(),
            ..RemoteApiConfig::default()
        })
        .unwrap();
        assert_eq!(client.collection_url(), "http://localhost:9999/gists");
        assert_eq!(client.document_url("abc"), "http://localhost:9999/gists/abc");
    }

    #[test]
    fn write_body_layout() {
        let client = GistClient::new(RemoteApiConfig::default()).unwrap();
        let body = serde_json::to_value(client.write_body("{}")).unwrap();
        assert_eq!(body, serde_json::json!({"files": {"database.json": {"content": "{}"}}}));
    }
}
