use crate::search::VideoResult;
use crate::youtube::{embed_url, extract_id};

/// The one video the player overlay shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTarget {
  pub video_id: String,
  pub title: String,
  pub embed_url: String,
}

/// What activating a result does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
  Play(PlayerTarget),
  /// No identifier could be resolved; hand the raw URL to the browser.
  OpenExternal(String),
}

pub fn activate(video: &VideoResult) -> Activation {
  match extract_id(&video.url) {
    Some(video_id) => {
      let embed_url = embed_url(&video_id);
      Activation::Play(PlayerTarget { video_id, title: video.title.clone(), embed_url })
    }
    None => Activation::OpenExternal(video.url.clone()),
  }
}

/// `videos` minus any entry whose url equals the best video's url, order preserved.
pub fn secondary_results<'a>(best: Option<&VideoResult>, videos: &'a [VideoResult]) -> Vec<&'a VideoResult> {
  match best {
    Some(best) => videos.iter().filter(|v| v.url != best.url).collect(),
    None => videos.iter().collect(),
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
  Best,
  Other,
}

/// Every selectable entry in display order: the best video first, then the secondary grid.
pub fn entries<'a>(best: Option<&'a VideoResult>, videos: &'a [VideoResult]) -> Vec<(Section, &'a VideoResult)> {
  let mut out: Vec<(Section, &VideoResult)> = best.map(|b| (Section::Best, b)).into_iter().collect();
  out.extend(secondary_results(best, videos).into_iter().map(|v| (Section::Other, v)));
  out
}

/// The entries of one section, each paired with its position in the full entry list.
pub fn in_section<'a>(entries: &[(Section, &'a VideoResult)], section: Section) -> Vec<(usize, &'a VideoResult)> {
  entries.iter().enumerate().filter(|(_, (s, _))| *s == section).map(|(i, (_, v))| (i, *v)).collect()
}

/// Cursor over the result entries. Wraps at both ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
  index: Option<usize>,
}

impl Selection {
  pub fn get(&self) -> Option<usize> {
    self.index
  }

  pub fn reset(&mut self, count: usize) {
    self.index = if count == 0 { None } else { Some(0) };
  }

  pub fn next(&mut self, count: usize) {
    if count > 0 {
      self.index = Some(self.index.map_or(0, |i| (i + 1) % count));
    }
  }

  pub fn prev(&mut self, count: usize) {
    if count > 0 {
      self.index = Some(self.index.map_or(0, |i| if i == 0 { count - 1 } else { i - 1 }));
    }
  }
}
