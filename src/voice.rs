use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::constants::constants;

// --- Voice capture ---

/// Why a capture produced no transcript. The display text is what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
  #[error("Voice search needs ffmpeg and a microphone input (macOS or Linux).")]
  Unsupported,
  #[error("Microphone permission denied.")]
  PermissionDenied,
  #[error("No speech detected. Try again.")]
  NoSpeechDetected,
  #[error("Speech recognition error.")]
  Other,
  #[error("Voice search failed to start.")]
  StartupFailure,
}

/// Platform audio source handed to ffmpeg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioInput {
  AvFoundation,
  Pulse,
}

impl AudioInput {
  fn ffmpeg_args(self) -> [&'static str; 4] {
    match self {
      AudioInput::AvFoundation => ["-f", "avfoundation", "-i", ":0"],
      AudioInput::Pulse => ["-f", "pulse", "-i", "default"],
    }
  }

  fn for_platform() -> Option<Self> {
    if cfg!(target_os = "macos") {
      Some(AudioInput::AvFoundation)
    } else if cfg!(target_os = "linux") {
      Some(AudioInput::Pulse)
    } else {
      None
    }
  }
}

/// Whether speech capture can run here at all. Being unsupported is a normal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
  Available(AudioInput),
  Unsupported,
}

impl Capability {
  pub fn detect() -> Self {
    let capability = Self::from_parts(AudioInput::for_platform(), on_path("ffmpeg", std::env::var_os("PATH")));
    info!(?capability, "voice: capability detected");
    capability
  }

  fn from_parts(input: Option<AudioInput>, has_ffmpeg: bool) -> Self {
    match input {
      Some(input) if has_ffmpeg => Capability::Available(input),
      _ => Capability::Unsupported,
    }
  }
}

fn on_path(binary: &str, path: Option<OsString>) -> bool {
  path.is_some_and(|p| std::env::split_paths(&p).any(|dir| dir.join(binary).is_file()))
}

/// Events from one capture session, in order. The session ends with `Heard` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
  /// Whisper model download progress (downloaded bytes, total bytes).
  ModelDownload(u64, u64),
  /// Recording finished; transcription running.
  Transcribing,
  Heard(String),
  Failed(CaptureError),
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
  /// BCP-47 tag of the expected speech, e.g. `en-IN`.
  pub locale: String,
  pub capture_secs: u32,
}

impl Default for CaptureSettings {
  fn default() -> Self {
    Self { locale: constants().default_locale.clone(), capture_secs: constants().capture_secs }
  }
}

/// The loaded model and the language code it was built for.
type WhisperCache = Arc<StdMutex<Option<(&'static str, whisper_cli::Whisper)>>>;

/// Single-shot speech-to-text: record a short clip, transcribe it once.
pub struct VoiceCapture {
  capability: Capability,
  settings: CaptureSettings,
  /// Loaded once, reused across captures.
  whisper_cache: WhisperCache,
  pending: Option<JoinHandle<()>>,
}

impl VoiceCapture {
  pub fn new(capability: Capability, settings: CaptureSettings) -> Self {
    Self { capability, settings, whisper_cache: Arc::new(StdMutex::new(None)), pending: None }
  }

  pub fn is_pending(&self) -> bool {
    self.pending.as_ref().is_some_and(|h| !h.is_finished())
  }

  /// Start a capture session.
  ///
  /// Fails immediately with [`CaptureError::Unsupported`] when the capability is
  /// absent, and with [`CaptureError::StartupFailure`] when no async runtime is
  /// available. Returns `Ok(None)` when a session is already running; the new
  /// request is dropped.
  pub fn start(&mut self) -> Result<Option<mpsc::UnboundedReceiver<VoiceEvent>>, CaptureError> {
    let Capability::Available(input) = self.capability else {
      return Err(CaptureError::Unsupported);
    };
    if self.is_pending() {
      info!("voice: capture already running, ignoring");
      return Ok(None);
    }
    let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
      warn!(err = %e, "voice: no runtime to run capture on");
      CaptureError::StartupFailure
    })?;

    let (tx, rx) = mpsc::unbounded_channel();
    let settings = self.settings.clone();
    let cache = Arc::clone(&self.whisper_cache);
    info!(
      locale = %settings.locale,
      language = speech_language(&settings.locale),
      secs = settings.capture_secs,
      "voice: capture started"
    );
    self.pending = Some(runtime.spawn(async move {
      let event = match capture(&tx, input, &settings, cache).await {
        Ok(transcript) => VoiceEvent::Heard(transcript),
        Err(e) => VoiceEvent::Failed(e),
      };
      let _ = tx.send(event);
    }));
    Ok(Some(rx))
  }

  pub fn cancel(&mut self) {
    if let Some(handle) = self.pending.take() {
      info!("voice: cancelling capture");
      handle.abort();
    }
  }
}

/// Record, then transcribe. The clip file is always removed afterwards.
async fn capture(
  tx: &mpsc::UnboundedSender<VoiceEvent>,
  input: AudioInput,
  settings: &CaptureSettings,
  cache: WhisperCache,
) -> Result<String, CaptureError> {
  let model_path = whisper_cli::Size::Small.get_path();
  if !model_path.exists() {
    info!("voice: whisper model not found, downloading");
    if let Err(e) = download_whisper_model(tx, &model_path).await {
      warn!(err = %format!("{:#}", e), "voice: model download failed");
      return Err(CaptureError::StartupFailure);
    }
  }

  let clip = std::env::temp_dir().join(format!("vidfind-voice-{}.wav", std::process::id()));
  let result = record_and_transcribe(tx, input, settings, cache, &clip).await;
  let _ = std::fs::remove_file(&clip);
  result
}

async fn record_and_transcribe(
  tx: &mpsc::UnboundedSender<VoiceEvent>,
  input: AudioInput,
  settings: &CaptureSettings,
  cache: WhisperCache,
  clip: &Path,
) -> Result<String, CaptureError> {
  record_clip(input, settings.capture_secs, clip).await?;

  // WAV header is 44 bytes; anything under about a second of 16kHz mono is not worth transcribing.
  let size = std::fs::metadata(clip).map(|m| m.len()).unwrap_or(0);
  if size <= 44 || size < constants().min_capture_bytes {
    info!(size, "voice: clip too short");
    return Err(CaptureError::NoSpeechDetected);
  }

  let _ = tx.send(VoiceEvent::Transcribing);
  let clip = clip.to_path_buf();
  let language = speech_language(&settings.locale);
  let transcribed = tokio::task::spawn_blocking(move || transcribe_clip(&cache, language, &clip)).await;

  let raw = match transcribed {
    Ok(Ok(text)) => text,
    Ok(Err(e)) => {
      warn!(err = %format!("{:#}", e), "voice: transcription failed");
      return Err(CaptureError::Other);
    }
    Err(e) => {
      // whisper.cpp can crash on odd input.
      warn!(err = %e, "voice: transcription task panicked");
      return Err(CaptureError::Other);
    }
  };

  let transcript = clean_transcript(&raw);
  info!(transcript = %transcript, "voice: transcribed");
  if transcript.is_empty() { Err(CaptureError::NoSpeechDetected) } else { Ok(transcript) }
}

/// A recording process that dies with its capture task, releasing the microphone on cancel.
fn recorder(program: &str) -> tokio::process::Command {
  let mut cmd = tokio::process::Command::new(program);
  cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped()).kill_on_drop(true);
  cmd
}

async fn record_clip(input: AudioInput, secs: u32, clip: &Path) -> Result<(), CaptureError> {
  let clip_str = clip.to_str().ok_or(CaptureError::StartupFailure)?;
  let duration = secs.to_string();
  let output = recorder("ffmpeg")
    .args(["-y", "-loglevel", "error"])
    .args(input.ffmpeg_args())
    .args(["-t", &duration, "-ar", "16000", "-ac", "1", "-f", "wav", clip_str])
    .output()
    .await
    .map_err(|e| {
      warn!(err = %e, "voice: failed to spawn ffmpeg");
      CaptureError::StartupFailure
    })?;

  if output.status.success() {
    return Ok(());
  }
  let stderr = String::from_utf8_lossy(&output.stderr);
  warn!(code = ?output.status.code(), stderr = %stderr.trim(), "voice: ffmpeg recording failed");
  Err(classify_recording_failure(&stderr))
}

/// Map ffmpeg's complaint about the audio device onto the capture taxonomy.
fn classify_recording_failure(stderr: &str) -> CaptureError {
  let lower = stderr.to_lowercase();
  let denied = ["permission denied", "operation not permitted", "not authorized", "access denied"];
  if denied.iter().any(|needle| lower.contains(needle)) { CaptureError::PermissionDenied } else { CaptureError::Other }
}

/// Whisper language codes a locale can select. Anything else is auto-detected.
const SPEECH_LANGUAGES: [&str; 10] = ["en", "hi", "es", "fr", "de", "it", "pt", "ja", "ko", "zh"];

/// The whisper language code for a BCP-47 locale, by primary subtag: `en-IN` is `en`.
fn speech_language(locale: &str) -> &'static str {
  let primary = locale.split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase();
  SPEECH_LANGUAGES.into_iter().find(|code| *code == primary).unwrap_or("auto")
}

fn whisper_language(code: &str) -> whisper_cli::Language {
  use whisper_cli::Language;
  match code {
    "en" => Language::English,
    "hi" => Language::Hindi,
    "es" => Language::Spanish,
    "fr" => Language::French,
    "de" => Language::German,
    "it" => Language::Italian,
    "pt" => Language::Portuguese,
    "ja" => Language::Japanese,
    "ko" => Language::Korean,
    "zh" => Language::Chinese,
    _ => Language::Auto,
  }
}

fn transcribe_clip(
  cache: &StdMutex<Option<(&'static str, whisper_cli::Whisper)>>,
  language: &'static str,
  clip: &Path,
) -> Result<String> {
  // Suppress whisper.cpp C library logging (writes directly to stderr)
  let _guard = SuppressStdio::new();

  let mut lock = cache.lock().map_err(|_| anyhow::anyhow!("whisper cache mutex poisoned"))?;
  // The loaded model is bound to one language; reload when it changes.
  if lock.as_ref().is_none_or(|(loaded, _)| *loaded != language) {
    info!(language, "voice: loading whisper model (Small), will be cached");
    let model = whisper_cli::Model::new(whisper_cli::Size::Small);
    let rt = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context("Failed to create tokio runtime for model init")?;
    *lock = Some((language, rt.block_on(whisper_cli::Whisper::new(model, Some(whisper_language(language))))));
  }
  let (_, whisper) = lock.as_mut().context("whisper model missing after load")?;
  let transcript = whisper.transcribe(clip, false, false).context("Whisper transcription failed")?;
  Ok(transcript.utterances.iter().map(|u| u.text.trim()).collect::<Vec<_>>().join(" "))
}

/// Drop whisper's non-speech markers (`[BLANK_AUDIO]`, `(wind blowing)`) and collapse whitespace.
fn clean_transcript(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut depth = 0usize;
  for c in raw.chars() {
    match c {
      '[' | '(' => depth += 1,
      ']' | ')' if depth > 0 => depth -= 1,
      _ if depth == 0 => out.push(c),
      _ => {}
    }
  }
  out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Download the whisper model ourselves so progress can be shown in the TUI.
async fn download_whisper_model(tx: &mpsc::UnboundedSender<VoiceEvent>, model_path: &Path) -> Result<()> {
  use futures::StreamExt;

  let url = format!("https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-{}.bin", whisper_cli::Size::Small);
  info!(url = %url, "voice: downloading whisper model");

  let response = reqwest::get(&url).await.context("Failed to download whisper model")?;
  let response = response.error_for_status().context("Whisper model download refused")?;
  let total = response.content_length().unwrap_or(0);
  let mut downloaded: u64 = 0;

  if let Some(parent) = model_path.parent() {
    std::fs::create_dir_all(parent).context("Failed to create model cache directory")?;
  }

  // Write to a temp file, then rename
  let tmp_path = model_path.with_extension("bin.part");
  let mut file = tokio::fs::File::create(&tmp_path).await.context("Failed to create model file")?;
  let mut stream = response.bytes_stream();
  let mut last_progress = std::time::Instant::now();

  while let Some(chunk) = stream.next().await {
    let chunk = chunk.context("Error downloading model chunk")?;
    tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await.context("Error writing model file")?;
    downloaded += chunk.len() as u64;
    if last_progress.elapsed() >= Duration::from_millis(100) || downloaded >= total {
      let _ = tx.send(VoiceEvent::ModelDownload(downloaded, total));
      last_progress = std::time::Instant::now();
    }
  }

  tokio::io::AsyncWriteExt::flush(&mut file).await.context("Error flushing model file")?;
  drop(file);
  tokio::fs::rename(&tmp_path, model_path).await.context("Failed to finalize model file")?;
  info!(path = %model_path.display(), "voice: whisper model downloaded");
  Ok(())
}

/// RAII guard that redirects stderr to /dev/null while alive.
/// Restores original file descriptor on drop.
struct SuppressStdio {
  saved_stderr: libc::c_int,
}

impl SuppressStdio {
  fn new() -> Self {
    // Safety: dup() and dup2() are plain POSIX calls on fd 2. stdout is left
    // alone because the TUI draws to it.
    unsafe {
      let saved_stderr = libc::dup(2);
      let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
      if devnull >= 0 {
        libc::dup2(devnull, 2);
        libc::close(devnull);
      } else {
        warn!("voice: failed to open /dev/null for stdio suppression");
      }
      Self { saved_stderr }
    }
  }
}

impl Drop for SuppressStdio {
  fn drop(&mut self) {
    // Safety: restoring the saved file descriptor to its original value.
    unsafe {
      if self.saved_stderr >= 0 {
        libc::dup2(self.saved_stderr, 2);
        libc::close(self.saved_stderr);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_match_taxonomy() {
    assert_eq!(CaptureError::PermissionDenied.to_string(), "Microphone permission denied.");
    assert_eq!(CaptureError::NoSpeechDetected.to_string(), "No speech detected. Try again.");
    assert_eq!(CaptureError::Other.to_string(), "Speech recognition error.");
    assert_eq!(CaptureError::StartupFailure.to_string(), "Voice search failed to start.");
    assert!(CaptureError::Unsupported.to_string().contains("ffmpeg"));
  }

  #[test]
  fn capability_needs_input_and_ffmpeg() {
    assert_eq!(Capability::from_parts(Some(AudioInput::Pulse), true), Capability::Available(AudioInput::Pulse));
    assert_eq!(Capability::from_parts(Some(AudioInput::Pulse), false), Capability::Unsupported);
    assert_eq!(Capability::from_parts(None, true), Capability::Unsupported);
  }

  #[test]
  fn on_path_finds_binaries() {
    let dir = std::env::temp_dir().join(format!("vidfind-path-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("ffmpeg"), b"").unwrap();
    let path = std::env::join_paths([dir.clone()]).unwrap();
    assert!(on_path("ffmpeg", Some(path.clone())));
    assert!(!on_path("mpv", Some(path)));
    assert!(!on_path("ffmpeg", None));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn unsupported_capture_fails_immediately() {
    let mut voice = VoiceCapture::new(Capability::Unsupported, CaptureSettings::default());
    assert_eq!(voice.start().err(), Some(CaptureError::Unsupported));
    assert!(!voice.is_pending());
  }

  #[test]
  fn capture_without_runtime_fails_to_start() {
    let mut voice = VoiceCapture::new(Capability::Available(AudioInput::Pulse), CaptureSettings::default());
    assert_eq!(voice.start().err(), Some(CaptureError::StartupFailure));
  }

  #[test]
  fn recording_failures_are_classified() {
    assert_eq!(
      classify_recording_failure("[avfoundation] Failed to open device: Operation not permitted"),
      CaptureError::PermissionDenied
    );
    assert_eq!(classify_recording_failure("default: Permission denied"), CaptureError::PermissionDenied);
    assert_eq!(classify_recording_failure("default: No such process"), CaptureError::Other);
  }

  #[test]
  fn transcript_markers_are_stripped() {
    assert_eq!(clean_transcript(" [BLANK_AUDIO] "), "");
    assert_eq!(clean_transcript("(wind blowing)  lofi   beats [music]"), "lofi beats");
    assert_eq!(clean_transcript("lo-fi hip hop"), "lo-fi hip hop");
  }

  #[cfg(target_os = "linux")]
  #[tokio::test]
  async fn dropped_recorder_is_killed() {
    let child = recorder("sleep").arg("30").spawn().unwrap();
    let pid = child.id().unwrap();
    drop(child);
    tokio::time::sleep(Duration::from_millis(200)).await;
    // Gone, or a zombie awaiting reaping; either way no longer recording.
    let state = std::fs::read_to_string(format!("/proc/{}/stat", pid))
      .ok()
      .and_then(|stat| stat.rsplit(')').next().and_then(|rest| rest.split_whitespace().next()).map(str::to_string));
    assert!(matches!(state.as_deref(), None | Some("Z") | Some("X")), "recorder still alive: {:?}", state);
  }

  #[test]
  fn locale_selects_speech_language() {
    assert_eq!(speech_language("en-IN"), "en");
    assert_eq!(speech_language("hi-IN"), "hi");
    assert_eq!(speech_language("pt_BR"), "pt");
    assert_eq!(speech_language("FR"), "fr");
    assert_eq!(speech_language("sw-KE"), "auto");
    assert_eq!(speech_language(""), "auto");
  }

  #[test]
  fn default_settings_use_constants() {
    let settings = CaptureSettings::default();
    assert_eq!(settings.locale, "en-IN");
    assert_eq!(settings.capture_secs, 5);
  }
}
