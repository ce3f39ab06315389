use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use reqwest::Client;
use std::process::Stdio;

use crate::constants::constants;

/// Length of a canonical YouTube video identifier.
const VIDEO_ID_LEN: usize = 11;

/// URL fragments that directly precede a video identifier.
const ID_MARKERS: [&str; 5] = ["v=", "/embed/", "youtu.be/", "/v/", "/shorts/"];

fn is_id_byte(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Resolve the 11-character video identifier from the usual YouTube URL shapes.
///
/// Scans left to right; at each position every marker is tried in turn, and the
/// first one followed by 11 identifier characters wins. Anything after those 11
/// characters is ignored.
pub fn extract_id(url: &str) -> Option<String> {
  let bytes = url.as_bytes();
  for start in 0..bytes.len() {
    for marker in ID_MARKERS {
      if !bytes[start..].starts_with(marker.as_bytes()) {
        continue;
      }
      let id_start = start + marker.len();
      let Some(candidate) = bytes.get(id_start..id_start + VIDEO_ID_LEN) else { continue };
      if candidate.iter().copied().all(is_id_byte) {
        // All bytes are ASCII, so this slice is on char boundaries.
        return Some(url[id_start..id_start + VIDEO_ID_LEN].to_string());
      }
    }
  }
  None
}

/// Embeddable player URL for `video_id`, with autoplay on.
pub fn embed_url(video_id: &str) -> String {
  format!("{}{}?autoplay=1", constants().embed_base_url, video_id)
}

pub async fn fetch_thumbnail(client: &Client, url: &str) -> Result<DynamicImage> {
  let response = client.get(url).send().await.with_context(|| format!("Failed to request thumbnail {}", url))?;
  if !response.status().is_success() {
    return Err(anyhow!("Thumbnail request for {} returned {}", url, response.status()));
  }
  let image_bytes = response.bytes().await.with_context(|| format!("Failed to read image bytes from {}", url))?;
  image::load_from_memory(&image_bytes).with_context(|| format!("Failed to decode image from memory (URL: {})", url))
}

/// Open `url` in the system's default browser.
pub fn open_external(url: &str) -> Result<()> {
  #[cfg(target_os = "macos")]
  let cmd = "open";
  #[cfg(not(target_os = "macos"))]
  let cmd = "xdg-open";

  let mut child = std::process::Command::new(cmd)
    .arg(url)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()
    .with_context(|| format!("Failed to run {}", cmd))?;
  // Reap the child in a background thread to avoid zombie processes.
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const ID: &str = "dQw4w9WgXcQ";

  #[test]
  fn watch_url() {
    assert_eq!(extract_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(), Some(ID));
    assert_eq!(extract_id("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42").as_deref(), Some(ID));
  }

  #[test]
  fn short_link() {
    assert_eq!(extract_id("https://youtu.be/dQw4w9WgXcQ").as_deref(), Some(ID));
    assert_eq!(extract_id("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(), Some(ID));
  }

  #[test]
  fn shorts_embed_and_v_paths() {
    assert_eq!(extract_id("https://www.youtube.com/shorts/dQw4w9WgXcQ").as_deref(), Some(ID));
    assert_eq!(extract_id("https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1").as_deref(), Some(ID));
    assert_eq!(extract_id("https://www.youtube.com/v/dQw4w9WgXcQ").as_deref(), Some(ID));
  }

  #[test]
  fn ids_with_dash_and_underscore() {
    assert_eq!(extract_id("https://youtu.be/a-b_c-d_e-f").as_deref(), Some("a-b_c-d_e-f"));
  }

  #[test]
  fn longer_tail_keeps_first_eleven() {
    assert_eq!(extract_id("https://youtu.be/dQw4w9WgXcQXYZ").as_deref(), Some(ID));
  }

  #[test]
  fn unresolvable_urls() {
    assert_eq!(extract_id("https://example.com/video"), None);
    assert_eq!(extract_id("https://www.youtube.com/watch?v=short"), None);
    assert_eq!(extract_id(""), None);
  }

  #[test]
  fn non_ascii_urls_do_not_panic() {
    assert_eq!(extract_id("https://例え.jp/動画?v=dQw4w9WgXcQ").as_deref(), Some(ID));
    assert_eq!(extract_id("https://例え.jp/動画"), None);
  }

  #[test]
  fn embed_url_has_autoplay() {
    assert_eq!(embed_url(ID), "https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1");
  }
}
