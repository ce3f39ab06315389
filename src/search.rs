//! Client for the backend search endpoint.
//!
//! One POST per query. Whatever comes back (a success body, a warning body, an
//! error body, a non-2xx status, or no response at all) is folded into a single
//! [`SearchOutcome`] here, so nothing past this module inspects raw JSON.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::constants;

/// A submitted search: trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
  /// Trim `raw`; `None` when nothing is left.
  pub fn parse(raw: &str) -> Option<Self> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { None } else { Some(Self(trimmed.to_string())) }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Query {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A single video as returned by the backend. `url` identifies it within a result set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
  pub url: String,
  #[serde(default)]
  pub title: String,
  #[serde(default, deserialize_with = "non_empty")]
  pub thumbnail: Option<String>,
  #[serde(default, deserialize_with = "non_empty")]
  pub channel_title: Option<String>,
  #[serde(default, deserialize_with = "non_empty")]
  pub snippet: Option<String>,
  /// Length in seconds, when the backend knows it.
  #[serde(default)]
  pub duration: Option<u64>,
  #[serde(default, deserialize_with = "non_empty")]
  pub published_at: Option<String>,
  #[serde(default)]
  pub score: Option<f64>,
}

/// The backend sends `""` for missing text fields; treat those as absent.
fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
  let value = Option::<String>::deserialize(deserializer)?;
  Ok(value.filter(|s| !s.trim().is_empty()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
  Success { best_video: Option<VideoResult>, videos: Vec<VideoResult> },
  Warning { message: String },
  Failure { message: String, details: Option<String> },
}

impl SearchOutcome {
  fn fallback_failure(details: Option<String>) -> Self {
    SearchOutcome::Failure { message: constants().fetch_error_message.clone(), details }
  }

  /// The text shown to the user for a warning or failure.
  /// Failure details go on their own line after a `Details: ` prefix.
  pub fn user_message(&self) -> Option<String> {
    match self {
      SearchOutcome::Success { .. } => None,
      SearchOutcome::Warning { message } => Some(message.clone()),
      SearchOutcome::Failure { message, details: Some(details) } => Some(format!("{}\nDetails: {}", message, details)),
      SearchOutcome::Failure { message, details: None } => Some(message.clone()),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      SearchOutcome::Success { .. } => "success",
      SearchOutcome::Warning { .. } => "warning",
      SearchOutcome::Failure { .. } => "failure",
    }
  }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
  query: &'a str,
}

#[derive(Deserialize)]
struct SuccessBody {
  #[serde(default)]
  best_video: Option<VideoResult>,
  #[serde(default)]
  videos: Option<Vec<VideoResult>>,
}

/// A field counts as present under the same rules the web client used:
/// `null`, `false`, `0` and `""` do not.
fn present(body: &Value, field: &str) -> Option<String> {
  let value = body.get(field)?;
  let truthy = match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  };
  if !truthy {
    return None;
  }
  Some(match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  })
}

/// Turn a raw HTTP response into a [`SearchOutcome`].
///
/// Precedence on a 2xx body: an `error` field wins, then `status == "warning"`,
/// then the body is read as a result set. Any non-2xx status is a failure whose
/// message comes from the body's `error` field when it has one.
pub fn interpret(status: StatusCode, body: &[u8]) -> SearchOutcome {
  let parsed: Option<Value> = serde_json::from_slice(body).ok();

  if !status.is_success() {
    let Some(body) = parsed else { return SearchOutcome::fallback_failure(None) };
    let details = present(&body, "details");
    return match present(&body, "error") {
      Some(message) => SearchOutcome::Failure { message, details },
      None => SearchOutcome::fallback_failure(details),
    };
  }

  let Some(body) = parsed.filter(Value::is_object) else {
    return SearchOutcome::fallback_failure(None);
  };

  // Details are only reported alongside an error status.
  if let Some(message) = present(&body, "error") {
    return SearchOutcome::Failure { message, details: None };
  }

  if body.get("status").and_then(Value::as_str) == Some("warning") {
    let message = body.get("error").and_then(Value::as_str).unwrap_or_default().to_string();
    return SearchOutcome::Warning { message };
  }

  match serde_json::from_value::<SuccessBody>(body) {
    Ok(success) => {
      SearchOutcome::Success { best_video: success.best_video, videos: success.videos.unwrap_or_default() }
    }
    Err(e) => {
      warn!(err = %e, "search: malformed success body");
      SearchOutcome::fallback_failure(None)
    }
  }
}

/// Issues search requests against one fixed endpoint.
#[derive(Debug, Clone)]
pub struct SearchClient {
  http: Client,
  endpoint: String,
}

impl SearchClient {
  /// `timeout` of `None` leaves requests unbounded.
  pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let http = builder.build().context("Failed to build HTTP client")?;
    Ok(Self { http, endpoint: endpoint.into() })
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub async fn search(&self, query: &Query) -> SearchOutcome {
    let outcome = match self.exchange(query).await {
      Ok((status, body)) => interpret(status, &body),
      Err(e) => {
        warn!(err = %format!("{:#}", e), endpoint = %self.endpoint, "search: transport failure");
        SearchOutcome::fallback_failure(None)
      }
    };
    info!(query = %query, outcome = outcome.kind(), "search settled");
    outcome
  }

  async fn exchange(&self, query: &Query) -> Result<(StatusCode, Vec<u8>)> {
    let response = self
      .http
      .post(&self.endpoint)
      .json(&SearchRequest { query: query.as_str() })
      .send()
      .await
      .with_context(|| format!("Failed to reach search endpoint {}", self.endpoint))?;
    let status = response.status();
    let body = response.bytes().await.context("Failed to read search response body")?;
    Ok((status, body.to_vec()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  fn ok(body: &str) -> SearchOutcome {
    interpret(StatusCode::OK, body.as_bytes())
  }

  // --- Query ---

  #[test]
  fn query_is_trimmed() {
    assert_eq!(Query::parse("  lofi beats \n").map(|q| q.to_string()), Some("lofi beats".to_string()));
  }

  #[test]
  fn blank_query_is_rejected() {
    assert_eq!(Query::parse(""), None);
    assert_eq!(Query::parse("   \t"), None);
  }

  // --- interpret ---

  #[test]
  fn success_with_best_video() {
    let outcome = ok(r#"{
      "best_video": {"url": "u1", "title": "One"},
      "videos": [{"url": "u1", "title": "One"}, {"url": "u2", "title": "Two"}],
      "status": "success"
    }"#);
    let SearchOutcome::Success { best_video, videos } = outcome else { panic!("expected success") };
    assert_eq!(best_video.map(|v| v.url), Some("u1".to_string()));
    assert_eq!(videos.iter().map(|v| v.url.as_str()).collect::<Vec<_>>(), ["u1", "u2"]);
  }

  #[test]
  fn success_with_null_best_and_missing_videos() {
    assert_eq!(ok(r#"{"best_video": null}"#), SearchOutcome::Success { best_video: None, videos: Vec::new() });
  }

  #[test]
  fn video_fields_are_mapped_and_blanks_dropped() {
    let outcome = ok(r#"{"videos": [{
      "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
      "title": "Song",
      "thumbnail": "",
      "channelTitle": "Rick",
      "snippet": "  ",
      "duration": 213,
      "publishedAt": "2009-10-25T06:57:33Z",
      "priority": 3
    }]}"#);
    let SearchOutcome::Success { videos, .. } = outcome else { panic!("expected success") };
    let video = &videos[0];
    assert_eq!(video.channel_title.as_deref(), Some("Rick"));
    assert_eq!(video.thumbnail, None);
    assert_eq!(video.snippet, None);
    assert_eq!(video.duration, Some(213));
    assert_eq!(video.published_at.as_deref(), Some("2009-10-25T06:57:33Z"));
  }

  #[test]
  fn error_field_wins_on_success_status() {
    assert_eq!(
      ok(r#"{"error": "quota exceeded", "status": "error"}"#),
      SearchOutcome::Failure { message: "quota exceeded".to_string(), details: None }
    );
  }

  #[test]
  fn details_ignored_on_success_status() {
    let outcome = ok(r#"{"error": "quota exceeded", "details": "daily limit"}"#);
    assert_eq!(outcome, SearchOutcome::Failure { message: "quota exceeded".to_string(), details: None });
    assert_eq!(outcome.user_message().as_deref(), Some("quota exceeded"));
  }

  #[test]
  fn error_field_checked_before_warning_status() {
    let outcome = ok(r#"{"status": "warning", "error": "No results found"}"#);
    assert_eq!(outcome, SearchOutcome::Failure { message: "No results found".to_string(), details: None });
  }

  #[test]
  fn warning_status_without_error_text() {
    assert_eq!(ok(r#"{"status": "warning", "error": ""}"#), SearchOutcome::Warning { message: String::new() });
    assert_eq!(ok(r#"{"status": "warning"}"#), SearchOutcome::Warning { message: String::new() });
  }

  #[test]
  fn non_2xx_with_error_and_details() {
    let outcome = interpret(StatusCode::BAD_REQUEST, br#"{"error": "Bad request", "details": "query too short"}"#);
    assert_eq!(outcome.user_message().as_deref(), Some("Bad request\nDetails: query too short"));
  }

  #[test]
  fn non_2xx_without_error_uses_fallback() {
    let outcome = interpret(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>");
    assert_eq!(outcome.user_message().as_deref(), Some("Error fetching videos"));

    let outcome = interpret(StatusCode::BAD_GATEWAY, br#"{"details": "upstream down"}"#);
    assert_eq!(outcome.user_message().as_deref(), Some("Error fetching videos\nDetails: upstream down"));
  }

  #[test]
  fn non_2xx_warning_body_is_still_a_failure() {
    let outcome = interpret(StatusCode::NOT_FOUND, br#"{"status": "warning"}"#);
    assert_eq!(outcome.kind(), "failure");
  }

  #[test]
  fn non_string_error_is_stringified() {
    let outcome = ok(r#"{"error": {"code": 403}}"#);
    assert_eq!(outcome.user_message().as_deref(), Some(r#"{"code":403}"#));
  }

  #[test]
  fn unparseable_success_body_is_a_failure() {
    assert_eq!(ok("not json").user_message().as_deref(), Some("Error fetching videos"));
    assert_eq!(ok("[1, 2]").user_message().as_deref(), Some("Error fetching videos"));
    assert_eq!(ok(r#"{"videos": "nope"}"#).kind(), "failure");
  }

  // --- SearchClient over a local socket ---

  /// Serve exactly one canned HTTP response; returns the endpoint and a handle yielding the raw request.
  async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut request = Vec::new();
      let mut buf = [0u8; 1024];
      loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
          break;
        }
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
          let length = text
            .lines()
            .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
          if request.len() >= header_end + 4 + length {
            break;
          }
        }
      }
      let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
      );
      socket.write_all(response.as_bytes()).await.unwrap();
      socket.shutdown().await.unwrap();
      String::from_utf8_lossy(&request).to_string()
    });
    (format!("http://{}/api/search", addr), handle)
  }

  #[tokio::test]
  async fn client_posts_json_query() {
    let (endpoint, server) = serve_once("200 OK", r#"{"best_video": null, "videos": []}"#).await;
    let client = SearchClient::new(endpoint, None).unwrap();
    let outcome = client.search(&Query::parse(" lofi beats ").unwrap()).await;
    assert_eq!(outcome, SearchOutcome::Success { best_video: None, videos: Vec::new() });

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/search"));
    assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
    assert!(request.contains(r#"{"query":"lofi beats"}"#));
  }

  #[tokio::test]
  async fn client_reports_error_body_on_bad_status() {
    let (endpoint, server) =
      serve_once("400 Bad Request", r#"{"error": "Bad request", "details": "query too short"}"#).await;
    let client = SearchClient::new(endpoint, None).unwrap();
    let outcome = client.search(&Query::parse("a").unwrap()).await;
    assert_eq!(outcome.user_message().as_deref(), Some("Bad request\nDetails: query too short"));
    server.await.unwrap();
  }

  #[tokio::test]
  async fn client_reports_fallback_when_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = SearchClient::new(format!("http://{}/api/search", addr), Some(Duration::from_secs(2))).unwrap();
    let outcome = client.search(&Query::parse("lofi").unwrap()).await;
    assert_eq!(outcome, SearchOutcome::Failure { message: "Error fetching videos".to_string(), details: None });
  }
}
