//! Search lifecycle state for one running session.
//!
//! `Session` is the only owner of the loading flag, the visible error and the
//! current result set. It moves `Idle -> Loading -> Idle` once per search:
//! [`Session::begin`] enters `Loading`, and exactly one of [`Session::settle`]
//! or [`Session::abandon`] leaves it, whatever the outcome.

use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::results::secondary_results;
use crate::search::{Query, SearchOutcome, VideoResult};

/// An urgent notice the user must acknowledge before doing anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
  pub title: &'static str,
  pub message: String,
}

#[derive(Debug, Default)]
pub struct Session {
  pub loading: bool,
  /// Empty when there is nothing to report.
  pub error_message: String,
  pub best_video: Option<VideoResult>,
  pub videos: Vec<VideoResult>,
}

impl Session {
  /// Enter `Loading` for `query`. Returns `false` (and changes nothing) if a
  /// search is already in flight.
  pub fn begin(&mut self, query: &Query) -> bool {
    if self.loading {
      debug!(query = %query, "search ignored: another search is in flight");
      return false;
    }
    info!(query = %query, "search started");
    self.loading = true;
    self.error_message.clear();
    true
  }

  /// Apply the result of the in-flight search and return to `Idle`.
  ///
  /// Warnings and failures leave the previous result set untouched.
  pub fn settle(&mut self, outcome: SearchOutcome) -> Option<Alert> {
    self.loading = false;
    let message = outcome.user_message();
    match outcome {
      SearchOutcome::Success { best_video, videos } => {
        self.best_video = best_video;
        self.videos = videos;
        self.error_message.clear();
        info!(
          count = self.videos.len(),
          best = self.best_video.is_some(),
          others = self.secondary().len(),
          "search results stored"
        );
        None
      }
      SearchOutcome::Warning { .. } => {
        let message = message.unwrap_or_default();
        warn!(msg = %message, "search warning");
        self.error_message = message.clone();
        Some(Alert { title: "Warning", message })
      }
      SearchOutcome::Failure { .. } => {
        let message = message.unwrap_or_default();
        warn!(msg = %message, "search failed");
        self.error_message = message.clone();
        Some(Alert { title: "Error", message })
      }
    }
  }

  /// Settle a search whose task went away without reporting an outcome.
  pub fn abandon(&mut self) -> Alert {
    let message = constants().fetch_error_message.clone();
    warn!("search task ended without an outcome");
    self.loading = false;
    self.error_message = message.clone();
    Alert { title: "Error", message }
  }

  /// The results shown under "Other Top Results".
  pub fn secondary(&self) -> Vec<&VideoResult> {
    secondary_results(self.best_video.as_ref(), &self.videos)
  }

  pub fn has_results(&self) -> bool {
    self.best_video.is_some() || !self.videos.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn video(url: &str) -> VideoResult {
    VideoResult {
      url: url.to_string(),
      title: url.to_uppercase(),
      thumbnail: None,
      channel_title: None,
      snippet: None,
      duration: None,
      published_at: None,
      score: None,
    }
  }

  fn query(s: &str) -> Query {
    Query::parse(s).unwrap()
  }

  fn success(best: Option<&str>, urls: &[&str]) -> SearchOutcome {
    SearchOutcome::Success { best_video: best.map(video), videos: urls.iter().map(|u| video(u)).collect() }
  }

  fn secondary_urls(session: &Session) -> Vec<String> {
    session.secondary().iter().map(|v| v.url.clone()).collect()
  }

  #[test]
  fn loading_spans_exactly_one_search() {
    let outcomes = [
      success(None, &["u1"]),
      SearchOutcome::Warning { message: "No results found".to_string() },
      SearchOutcome::Failure { message: "boom".to_string(), details: None },
    ];
    for outcome in outcomes {
      let mut session = Session::default();
      assert!(session.begin(&query("lofi beats")));
      assert!(session.loading);
      session.settle(outcome);
      assert!(!session.loading);
    }
  }

  #[test]
  fn begin_clears_previous_error() {
    let mut session = Session { error_message: "old".to_string(), ..Session::default() };
    session.begin(&query("x"));
    assert!(session.error_message.is_empty());
  }

  #[test]
  fn reentrant_begin_is_rejected() {
    let mut session = Session::default();
    assert!(session.begin(&query("first")));
    session.error_message = "kept".to_string();
    assert!(!session.begin(&query("second")));
    assert!(session.loading);
    assert_eq!(session.error_message, "kept");
  }

  #[test]
  fn scenario_best_match_is_highlighted_once() {
    let mut session = Session::default();
    session.begin(&query("lofi beats"));
    assert_eq!(session.settle(success(Some("u1"), &["u1", "u2", "u3"])), None);
    assert_eq!(session.best_video.as_ref().map(|v| v.url.as_str()), Some("u1"));
    assert_eq!(secondary_urls(&session), ["u2", "u3"]);
    assert!(session.error_message.is_empty());
  }

  #[test]
  fn success_without_best_shows_everything() {
    let mut session = Session::default();
    session.begin(&query("q"));
    session.settle(success(None, &["a", "b"]));
    assert_eq!(secondary_urls(&session), ["a", "b"]);
  }

  #[test]
  fn warning_keeps_previous_results() {
    let mut session = Session::default();
    session.begin(&query("first"));
    session.settle(success(Some("u1"), &["u1", "u2"]));

    session.begin(&query("second"));
    let alert = session.settle(SearchOutcome::Warning { message: "No results found".to_string() });
    assert_eq!(alert, Some(Alert { title: "Warning", message: "No results found".to_string() }));
    assert_eq!(session.error_message, "No results found");
    assert_eq!(session.best_video.as_ref().map(|v| v.url.as_str()), Some("u1"));
    assert_eq!(secondary_urls(&session), ["u2"]);
  }

  #[test]
  fn failure_keeps_previous_results() {
    let mut session = Session::default();
    session.begin(&query("first"));
    session.settle(success(Some("u1"), &["u1", "u2", "u3"]));

    session.begin(&query("second"));
    let alert = session.settle(SearchOutcome::Failure { message: "Bad request".to_string(), details: None });
    assert_eq!(alert.map(|a| a.title), Some("Error"));
    assert_eq!(session.error_message, "Bad request");
    assert_eq!(session.best_video.as_ref().map(|v| v.url.as_str()), Some("u1"));
    assert_eq!(session.videos.iter().map(|v| v.url.as_str()).collect::<Vec<_>>(), ["u1", "u2", "u3"]);
    assert_eq!(secondary_urls(&session), ["u2", "u3"]);
  }

  #[test]
  fn abandoned_search_keeps_previous_results() {
    let mut session = Session::default();
    session.begin(&query("first"));
    session.settle(success(Some("a"), &["a", "b", "c"]));

    session.begin(&query("second"));
    session.abandon();
    assert_eq!(session.best_video.as_ref().map(|v| v.url.as_str()), Some("a"));
    assert_eq!(session.videos.len(), 3);
    assert_eq!(secondary_urls(&session), ["b", "c"]);
  }

  #[test]
  fn failure_message_includes_details() {
    let mut session = Session::default();
    session.begin(&query("a"));
    let alert = session.settle(SearchOutcome::Failure {
      message: "Bad request".to_string(),
      details: Some("query too short".to_string()),
    });
    assert_eq!(session.error_message, "Bad request\nDetails: query too short");
    assert_eq!(alert.map(|a| a.message), Some("Bad request\nDetails: query too short".to_string()));
    assert!(!session.has_results());
  }

  #[test]
  fn abandoned_search_still_settles() {
    let mut session = Session::default();
    session.begin(&query("a"));
    let alert = session.abandon();
    assert!(!session.loading);
    assert_eq!(alert.message, "Error fetching videos");
    assert_eq!(session.error_message, "Error fetching videos");
  }

  #[test]
  fn new_search_allowed_after_failure() {
    let mut session = Session::default();
    session.begin(&query("a"));
    session.settle(SearchOutcome::Failure { message: "x".to_string(), details: None });
    assert!(session.begin(&query("b")));
  }
}
