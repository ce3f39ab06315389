use image::DynamicImage;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::constants;
use crate::display::DisplayMode;
use crate::player::VideoPlayer;
use crate::results::{self, Activation, Section, Selection};
use crate::search::{Query, SearchClient, SearchOutcome, VideoResult};
use crate::session::{Alert, Session};
use crate::theme::{THEMES, Theme};
use crate::voice::{VoiceCapture, VoiceEvent};
use crate::youtube::{fetch_thumbnail, open_external};

/// Maximum number of thumbnails downloaded at once.
const THUMBNAIL_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Input,
  Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
  Success,
  Error,
}

/// A short-lived, non-blocking message in the status line.
#[derive(Debug, Clone)]
pub struct Notice {
  pub text: String,
  pub kind: NoticeKind,
  shown_at: Instant,
}

/// Thumbnails for the current result set, keyed by thumbnail URL.
#[derive(Default)]
pub struct ThumbnailCache {
  pub images: HashMap<String, DynamicImage>,
  /// Resized copies keyed by (url, width, height) of the cell area.
  pub resized: HashMap<(String, u16, u16), DynamicImage>,
  rx: Option<mpsc::Receiver<(String, DynamicImage)>>,
  handle: Option<JoinHandle<()>>,
}

impl ThumbnailCache {
  fn cancel(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
    self.rx = None;
  }
}

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub theme_index: usize,
  pub display_mode: DisplayMode,
  pub session: Session,
  pub selection: Selection,
  /// Blocking notice; every key but acknowledge is swallowed while set.
  pub alert: Option<Alert>,
  pub notice: Option<Notice>,
  /// Progress of the running voice capture, if any.
  pub voice_status: Option<String>,
  pub player: VideoPlayer,
  pub thumbnails: ThumbnailCache,
  pub should_quit: bool,
  pub started_at: Instant,
  client: SearchClient,
  http: Client,
  voice: VoiceCapture,
  search_rx: Option<oneshot::Receiver<SearchOutcome>>,
  voice_rx: Option<mpsc::UnboundedReceiver<VoiceEvent>>,
  config: Config,
}

impl App {
  pub fn new(client: SearchClient, voice: VoiceCapture, display_mode: DisplayMode, config: Config) -> Self {
    let theme_index =
      config.theme_name.as_deref().and_then(|name| THEMES.iter().position(|t| t.name == name)).unwrap_or(0);
    Self {
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      mode: AppMode::Input,
      theme_index,
      display_mode,
      session: Session::default(),
      selection: Selection::default(),
      alert: None,
      notice: None,
      voice_status: None,
      player: VideoPlayer::new(),
      thumbnails: ThumbnailCache::default(),
      should_quit: false,
      started_at: Instant::now(),
      client,
      http: Client::new(),
      voice,
      search_rx: None,
      voice_rx: None,
      config,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    // theme_index only moves by modular arithmetic in next_theme().
    &THEMES[self.theme_index % THEMES.len()]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.config.theme_name = Some(self.theme().name.to_string());
    self.config.save();
  }

  pub fn endpoint(&self) -> &str {
    self.client.endpoint()
  }

  // --- Notices ---

  pub fn notify(&mut self, text: impl Into<String>, kind: NoticeKind) {
    self.notice = Some(Notice { text: text.into(), kind, shown_at: Instant::now() });
  }

  /// Drop the transient notice once it has been visible long enough.
  pub fn expire_notice(&mut self) {
    if let Some(notice) = &self.notice
      && notice.shown_at.elapsed() >= Duration::from_secs(constants().notice_secs)
    {
      self.notice = None;
    }
  }

  pub fn acknowledge_alert(&mut self) {
    if let Some(alert) = self.alert.take() {
      debug!(title = alert.title, "alert acknowledged");
    }
  }

  // --- Results ---

  pub fn entries(&self) -> Vec<(Section, &VideoResult)> {
    results::entries(self.session.best_video.as_ref(), &self.session.videos)
  }

  pub fn entry_count(&self) -> usize {
    self.entries().len()
  }

  pub fn selected_video(&self) -> Option<&VideoResult> {
    let index = self.selection.get()?;
    self.entries().get(index).map(|(_, v)| *v)
  }

  // --- Search ---

  /// Submission path shared by typed and spoken queries.
  pub fn submit(&mut self, raw: &str) {
    let Some(query) = Query::parse(raw) else { return };
    if !self.session.begin(&query) {
      return;
    }
    let client = self.client.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(client.search(&query).await);
    });
    self.search_rx = Some(rx);
  }

  pub fn trigger_search(&mut self) {
    let input = self.input.clone();
    self.submit(&input);
  }

  fn apply_outcome(&mut self, outcome: SearchOutcome) {
    let succeeded = matches!(outcome, SearchOutcome::Success { .. });
    self.alert = self.session.settle(outcome);
    if succeeded {
      self.selection.reset(self.entry_count());
      self.thumbnails.resized.clear();
      self.trigger_thumbnails();
      if self.session.has_results() {
        self.mode = AppMode::Results;
      }
    }
  }

  fn trigger_thumbnails(&mut self) {
    use futures::stream::{self, StreamExt};

    self.thumbnails.cancel();
    let wanted: HashSet<String> = self
      .session
      .videos
      .iter()
      .chain(self.session.best_video.iter())
      .filter_map(|v| v.thumbnail.clone())
      .collect();
    self.thumbnails.images.retain(|url, _| wanted.contains(url));
    let missing: Vec<String> = wanted.into_iter().filter(|url| !self.thumbnails.images.contains_key(url)).collect();
    if missing.is_empty() || self.display_mode == DisplayMode::Off {
      return;
    }

    let (tx, rx) = mpsc::channel(32);
    let client = self.http.clone();
    let handle = tokio::spawn(async move {
      stream::iter(missing)
        .map(|url| {
          let client = client.clone();
          let tx = tx.clone();
          async move {
            match fetch_thumbnail(&client, &url).await {
              Ok(image) => {
                let _ = tx.send((url, image)).await;
              }
              Err(e) => debug!(err = %format!("{:#}", e), "thumbnail unavailable"),
            }
          }
        })
        .buffer_unordered(THUMBNAIL_CONCURRENCY)
        .collect::<()>()
        .await;
    });
    self.thumbnails.rx = Some(rx);
    self.thumbnails.handle = Some(handle);
  }

  // --- Voice ---

  pub fn start_voice(&mut self) {
    match self.voice.start() {
      Ok(Some(rx)) => {
        self.voice_rx = Some(rx);
        self.voice_status = Some("Listening…".to_string());
      }
      Ok(None) => {}
      Err(e) => self.notify(e.to_string(), NoticeKind::Error),
    }
  }

  fn apply_voice_event(&mut self, event: VoiceEvent) {
    match event {
      VoiceEvent::ModelDownload(done, total) => {
        let percent = if total > 0 { done * 100 / total } else { 0 };
        self.voice_status = Some(format!("Downloading speech model… {}%", percent));
      }
      VoiceEvent::Transcribing => {
        self.voice_status = Some("Recognizing…".to_string());
      }
      VoiceEvent::Heard(transcript) => {
        self.voice_status = None;
        self.voice_rx = None;
        self.notify(format!("Heard: \"{}\"", transcript), NoticeKind::Success);
        self.input = transcript.clone();
        self.cursor_position = self.input.chars().count();
        if self.session.loading {
          // Left in the input line for the user to resubmit.
          info!(transcript = %transcript, "voice: transcript arrived mid-search, not submitted");
        } else {
          self.submit(&transcript);
        }
      }
      VoiceEvent::Failed(e) => {
        self.voice_status = None;
        self.voice_rx = None;
        self.notify(e.to_string(), NoticeKind::Error);
      }
    }
  }

  // --- Player ---

  pub async fn activate_selected(&mut self) {
    let Some(video) = self.selected_video() else { return };
    match results::activate(video) {
      Activation::Play(target) => {
        if let Err(e) = self.player.open(target).await {
          warn!(err = %format!("{:#}", e), "player: failed to open");
          self.notify(format!("Playback error: {}", e), NoticeKind::Error);
          let _ = self.player.close().await;
        }
      }
      Activation::OpenExternal(url) => self.open_in_browser(&url),
    }
  }

  pub fn open_in_browser(&mut self, url: &str) {
    info!(url = %url, "opening in browser");
    if let Err(e) = open_external(url) {
      self.notify(format!("Failed to open browser: {:#}", e), NoticeKind::Error);
    }
  }

  pub async fn close_player(&mut self) {
    if let Err(e) = self.player.close().await {
      self.notify(format!("{:#}", e), NoticeKind::Error);
    }
  }

  // --- Polling ---

  pub async fn check_pending(&mut self) {
    if let Some(mut rx) = self.search_rx.take() {
      match rx.try_recv() {
        Ok(outcome) => self.apply_outcome(outcome),
        Err(oneshot::error::TryRecvError::Empty) => {
          self.search_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.alert = Some(self.session.abandon());
        }
      }
    }

    let mut voice_events = Vec::new();
    if let Some(rx) = &mut self.voice_rx {
      while let Ok(event) = rx.try_recv() {
        voice_events.push(event);
      }
    }
    for event in voice_events {
      self.apply_voice_event(event);
    }

    if let Some(rx) = &mut self.thumbnails.rx {
      while let Ok((url, image)) = rx.try_recv() {
        self.thumbnails.images.insert(url, image);
      }
    }

    self.player.check_status();
    if self.player.is_open() && !self.player.is_playing() {
      info!("player: mpv exited");
      self.close_player().await;
    }
    self.expire_notice();
  }

  pub async fn shutdown(&mut self) {
    self.voice.cancel();
    self.thumbnails.cancel();
    self.close_player().await;
  }
}
