use chrono::{DateTime, NaiveDate};
use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Flex, Layout, Rect},
  style::{Modifier, Style},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, Padding, Paragraph, Wrap},
};

use crate::app::{App, AppMode, NoticeKind};
use crate::display::DisplayMode;
use crate::graphics::{ThumbnailWidget, fit_to_area};
use crate::results::{Section, in_section};
use crate::search::VideoResult;
use crate::theme::Theme;

const BEST_CARD_HEIGHT: u16 = 9;
const CARD_HEIGHT: u16 = 5;
const SPINNER: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Seconds as `m:ss`, or `h:mm:ss` past the hour.
fn format_duration(secs: u64) -> String {
  let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
  if h > 0 { format!("{}:{:02}:{:02}", h, m, s) } else { format!("{}:{:02}", m, s) }
}

/// Render a publish date as e.g. "Mar 4, 2024". Unrecognized formats are shown as-is.
fn format_published(raw: &str) -> String {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return dt.format("%b %-d, %Y").to_string();
  }
  if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    return date.format("%b %-d, %Y").to_string();
  }
  raw.to_string()
}

/// "4:13 · Mar 4, 2024", skipping whatever the backend left out.
fn meta_line(video: &VideoResult) -> String {
  let parts: Vec<String> =
    [video.duration.map(format_duration), video.published_at.as_deref().map(format_published)]
      .into_iter()
      .flatten()
      .collect();
  parts.join(" · ")
}

/// Horizontal scroll that keeps the cursor column inside a `width`-column box.
fn scroll_to_cursor(scroll: usize, cursor_col: usize, width: usize) -> usize {
  if width == 0 || cursor_col < scroll {
    cursor_col
  } else if cursor_col >= scroll + width {
    cursor_col + 1 - width
  } else {
    scroll
  }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
  let [area] = Layout::horizontal([Constraint::Length(width.min(area.width))]).flex(Flex::Center).areas(area);
  let [area] = Layout::vertical([Constraint::Length(height.min(area.height))]).flex(Flex::Center).areas(area);
  area
}

fn card_block(theme: &Theme, title: &str, selected: bool) -> Block<'static> {
  let border = if selected { theme.accent } else { theme.border };
  Block::bordered()
    .title(title.to_string())
    .title_style(Style::default().fg(theme.secondary).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border))
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let banner_height = if app.session.error_message.is_empty() {
    0
  } else {
    (app.session.error_message.lines().count() as u16 + 2).min(5)
  };
  let [header_area, banner_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(banner_height),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  if banner_height > 0 {
    render_error_banner(frame, app, banner_area);
  }
  if app.session.has_results() {
    render_results(frame, app, main_area);
  } else {
    render_welcome(frame, theme, main_area);
  }
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);

  if app.player.is_open() {
    render_player(frame, app, main_area);
  }
  if app.alert.is_some() {
    render_alert(frame, app);
  }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let left = Line::from(Span::styled(" ▶ vidfind ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let right_text = format!("{}  v{} ", app.endpoint(), env!("CARGO_PKG_VERSION"));
  let width = (right_text.chars().count() as u16).min(area.width);
  let right = Line::from(Span::styled(right_text, Style::default().fg(theme.muted)));
  let right_area = Rect { x: area.x + area.width.saturating_sub(width), width, ..area };
  frame.render_widget(right, right_area);
}

fn render_error_banner(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let paragraph = Paragraph::new(app.session.error_message.as_str())
    .style(Style::default().fg(theme.error).bg(theme.error_bg))
    .wrap(Wrap { trim: true })
    .block(Block::default().padding(Padding::uniform(1)));
  frame.render_widget(paragraph, area);
}

fn render_welcome(frame: &mut Frame, theme: &Theme, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("▶  vidfind", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled("Find the best YouTube video for anything.", Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled(
      "Type a query below and press Enter, or press ^v to say it.",
      Style::default().fg(theme.muted),
    )),
  ];
  let paragraph = Paragraph::new(text)
    .alignment(Alignment::Center)
    .block(Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border)));
  frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  if app.session.best_video.is_some() {
    let [best_area, grid_area] =
      Layout::vertical([Constraint::Length(BEST_CARD_HEIGHT), Constraint::Min(0)]).areas(area);
    render_best_card(frame, app, best_area);
    render_grid(frame, app, grid_area);
  } else {
    render_grid(frame, app, area);
  }
}

fn render_best_card(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let entries = app.entries();
  let Some((best_index, best)) = in_section(&entries, Section::Best).first().map(|(i, v)| (*i, (*v).clone())) else {
    return;
  };
  let selected = app.mode == AppMode::Results && app.selection.get() == Some(best_index);

  let block = card_block(theme, " Best Video ", selected).padding(Padding::horizontal(1));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let info_area = match best.thumbnail.as_deref() {
    Some(url) if app.display_mode != DisplayMode::Off => {
      let thumb_w = (inner.height * 32 / 9).min(inner.width / 2);
      let [thumb_area, _, info_area] =
        Layout::horizontal([Constraint::Length(thumb_w), Constraint::Length(2), Constraint::Min(0)]).areas(inner);
      render_thumbnail(frame, app, url, thumb_area);
      info_area
    }
    _ => inner,
  };

  let title_style = if selected {
    Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD)
  } else {
    Style::default().fg(theme.fg).add_modifier(Modifier::BOLD)
  };
  let mut lines = vec![Line::from(Span::styled(best.title.clone(), title_style))];
  if let Some(channel) = &best.channel_title {
    lines.push(Line::from(vec![
      Span::styled("Channel: ", Style::default().fg(theme.muted)),
      Span::styled(channel.clone(), Style::default().fg(theme.fg)),
    ]));
  }
  let mut meta = meta_line(&best);
  if let Some(score) = best.score {
    let sep = if meta.is_empty() { "" } else { " · " };
    meta = format!("{}{}relevance {:.2}", meta, sep, score);
  }
  if !meta.is_empty() {
    lines.push(Line::from(Span::styled(meta, Style::default().fg(theme.muted))));
  }
  if let Some(snippet) = &best.snippet {
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(snippet.clone(), Style::default().fg(theme.muted))));
  }
  frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), info_area);
}

/// Draws the cached thumbnail for `url`, resizing once per cell area.
fn render_thumbnail(frame: &mut Frame, app: &mut App, url: &str, area: Rect) {
  let key = (url.to_string(), area.width, area.height);
  if !app.thumbnails.resized.contains_key(&key) {
    let Some(image) = app.thumbnails.images.get(url) else {
      let theme = app.theme();
      let placeholder = Paragraph::new(vec![Line::from(""), Line::from("▶")])
        .alignment(Alignment::Center)
        .style(Style::default().fg(theme.muted).bg(theme.border));
      frame.render_widget(placeholder, area);
      return;
    };
    let resized = fit_to_area(image, area, app.display_mode);
    app.thumbnails.resized.insert(key.clone(), resized);
  }
  if let Some(image) = app.thumbnails.resized.get(&key) {
    frame.render_widget(ThumbnailWidget { image, display_mode: app.display_mode }, area);
  }
}

fn render_grid(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let entries = app.entries();
  let others = in_section(&entries, Section::Other);

  let block = Block::bordered()
    .title(" Other Top Results ")
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  if others.is_empty() {
    frame.render_widget(Paragraph::new("No other results.").style(Style::default().fg(theme.muted)), inner);
    return;
  }

  // Keep the selected row on screen.
  let visible_rows = usize::from(inner.height / CARD_HEIGHT).max(1);
  let selected = app.selection.get();
  let selected_row = others.iter().position(|(i, _)| Some(*i) == selected).map_or(0, |p| p / 2);
  let first_row = selected_row.saturating_sub(visible_rows - 1);

  for (row, pair) in others.chunks(2).enumerate().skip(first_row).take(visible_rows) {
    let y = inner.y + ((row - first_row) as u16) * CARD_HEIGHT;
    let row_area = Rect { y, height: CARD_HEIGHT.min(inner.bottom().saturating_sub(y)), ..inner };
    let [left, right] = Layout::horizontal([Constraint::Percentage(50); 2]).areas(row_area);
    for (col, (index, video)) in pair.iter().enumerate() {
      let is_selected = app.mode == AppMode::Results && selected == Some(*index);
      render_card(frame, theme, video, is_selected, if col == 0 { left } else { right });
    }
  }
}

fn render_card(frame: &mut Frame, theme: &Theme, video: &VideoResult, selected: bool, area: Rect) {
  let block = card_block(theme, "", selected).padding(Padding::horizontal(1));
  let inner_w = block.inner(area).width as usize;

  let title_style = if selected {
    Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD)
  } else {
    Style::default().fg(theme.fg)
  };
  let mut lines = vec![Line::from(Span::styled(truncate_str(&video.title, inner_w), title_style))];
  if let Some(channel) = &video.channel_title {
    lines.push(Line::from(Span::styled(truncate_str(channel, inner_w), Style::default().fg(theme.muted))));
  }
  let meta = meta_line(video);
  if !meta.is_empty() {
    lines.push(Line::from(Span::styled(truncate_str(&meta, inner_w), Style::default().fg(theme.muted))));
  }
  frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_player(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let Some(target) = &app.player.current else { return };
  let popup = centered(area, area.width.saturating_sub(8).min(90), 9);
  let inner_w = popup.width.saturating_sub(4) as usize;

  let state = if app.player.paused { "Paused" } else { "Playing" };
  let block = Block::bordered()
    .title(format!(" Now {} ", state))
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.accent))
    .padding(Padding::horizontal(1))
    .style(Style::default().bg(theme.bg));

  let status = app.player.last_status().unwrap_or("Starting mpv…");
  let lines = vec![
    Line::from(""),
    Line::from(Span::styled(
      truncate_str(&target.title, inner_w),
      Style::default().fg(theme.fg).add_modifier(Modifier::BOLD),
    )),
    Line::from(Span::styled(
      truncate_str(&target.embed_url, inner_w),
      Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
    )),
    Line::from(""),
    Line::from(Span::styled(
      format!("♪ {}", truncate_str(status, inner_w.saturating_sub(2))),
      Style::default().fg(theme.status),
    )),
  ];
  frame.render_widget(Clear, popup);
  frame.render_widget(Paragraph::new(lines).block(block), popup);
}

fn render_alert(frame: &mut Frame, app: &App) {
  let theme = app.theme();
  let Some(alert) = &app.alert else { return };
  let area = frame.area();
  let width = area.width.saturating_sub(8).min(64);
  let text_w = width.saturating_sub(4).max(1) as usize;
  let wrapped: usize = alert.message.lines().map(|l| l.chars().count().div_ceil(text_w).max(1)).sum();
  let popup = centered(area, width, wrapped as u16 + 6);

  let color = if alert.title == "Warning" { theme.status } else { theme.error };
  let block = Block::bordered()
    .title(format!(" {} ", alert.title))
    .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Double)
    .border_style(Style::default().fg(color))
    .padding(Padding::new(1, 1, 1, 0))
    .style(Style::default().bg(theme.bg));

  let mut lines: Vec<Line> =
    alert.message.lines().map(|l| Line::from(Span::styled(l, Style::default().fg(theme.fg)))).collect();
  lines.push(Line::from(""));
  lines.push(
    Line::from(Span::styled(" OK ", Style::default().fg(theme.key_fg).bg(theme.key_bg).add_modifier(Modifier::BOLD)))
      .alignment(Alignment::Center),
  );
  frame.render_widget(Clear, popup);
  frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }).block(block), popup);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(notice) = &app.notice {
    let color = if notice.kind == NoticeKind::Success { theme.success } else { theme.error };
    (format!(" {}", notice.text), Style::default().fg(color))
  } else if let Some(status) = &app.voice_status {
    (format!(" 🎤 {}", status), Style::default().fg(theme.status))
  } else if app.session.loading {
    let frame_idx = (app.started_at.elapsed().as_millis() / 100) as usize % SPINNER.len();
    (format!(" {} Searching…", SPINNER[frame_idx]), Style::default().fg(theme.status))
  } else if let Some(status) = app.player.last_status() {
    (format!(" ♪ {}", status), Style::default().fg(theme.status))
  } else if app.session.has_results() {
    (format!(" {} results", app.entry_count()), Style::default().fg(theme.muted))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let focused = app.mode == AppMode::Input && !app.player.is_open() && app.alert.is_none();
  let border_color = if app.session.loading {
    theme.muted
  } else if focused {
    theme.accent
  } else {
    theme.border
  };
  let title = if app.session.loading { " Searching… " } else { " Search YouTube " };
  let input_block = Block::bordered()
    .title(title)
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  app.input_scroll = scroll_to_cursor(app.input_scroll, cursor_col, inner_w);

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let fg = if app.session.loading { theme.muted } else { theme.fg };
  let paragraph = Paragraph::new(visible).style(Style::default().fg(fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if focused && !app.session.loading && inner_w > 0 {
    let cursor_x = area.x + 2 + cursor_col.saturating_sub(app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn footer_keys(app: &App) -> Vec<(&'static str, &'static str)> {
  if app.alert.is_some() {
    return vec![("Enter", "OK")];
  }
  if app.player.is_open() {
    let pause_label = if app.player.paused { "Resume" } else { "Pause" };
    return vec![("Space", pause_label), ("o", "Browser"), ("Esc", "Close"), ("^t", "Theme")];
  }
  let has_results = app.session.has_results();
  match app.mode {
    AppMode::Input => {
      let mut k = vec![("Enter", "Search"), ("^v", "Voice"), ("^t", "Theme")];
      if has_results {
        k.push(("↓", "Results"));
      } else {
        k.push(("Esc", "Quit"));
      }
      k
    }
    AppMode::Results => {
      vec![("Enter", "Play"), ("j/k", "Navigate"), ("o", "Browser"), ("^v", "Voice"), ("Esc", "Search")]
    }
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let keys = footer_keys(app);

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let label = format!("{} · {} ", theme.name, app.display_mode.label());
  let width = (label.chars().count() as u16).min(area.width);
  let right = Line::from(Span::styled(label, Style::default().fg(theme.muted)));
  let right_area = Rect { x: area.x + area.width.saturating_sub(width), width, ..area };
  frame.render_widget(right, right_area);
}

#[cfg(test)]
mod tests {
  use super::*;

  fn video() -> VideoResult {
    VideoResult {
      url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
      title: "Never Gonna Give You Up".to_string(),
      thumbnail: None,
      channel_title: Some("Rick Astley".to_string()),
      snippet: None,
      duration: None,
      published_at: None,
      score: None,
    }
  }

  #[test]
  fn display_width_counts_wide_chars() {
    assert_eq!(display_width("ab日本", 4), 6);
    assert_eq!(display_width("ab日本", 2), 2);
  }

  #[test]
  fn truncate_appends_ellipsis() {
    assert_eq!(truncate_str("hello", 10), "hello");
    assert_eq!(truncate_str("hello world", 6), "hello…");
  }

  #[test]
  fn durations_switch_to_hours() {
    assert_eq!(format_duration(59), "0:59");
    assert_eq!(format_duration(213), "3:33");
    assert_eq!(format_duration(3725), "1:02:05");
  }

  #[test]
  fn published_dates_are_humanized() {
    assert_eq!(format_published("2024-03-04T10:00:00Z"), "Mar 4, 2024");
    assert_eq!(format_published("2009-10-25"), "Oct 25, 2009");
    assert_eq!(format_published("last week"), "last week");
  }

  #[test]
  fn meta_line_skips_missing_fields() {
    let mut v = video();
    assert_eq!(meta_line(&v), "");
    v.duration = Some(213);
    assert_eq!(meta_line(&v), "3:33");
    v.published_at = Some("2009-10-25".to_string());
    assert_eq!(meta_line(&v), "3:33 · Oct 25, 2009");
  }

  #[test]
  fn input_scroll_follows_cursor() {
    assert_eq!(scroll_to_cursor(0, 5, 10), 0);
    assert_eq!(scroll_to_cursor(0, 12, 10), 3);
    assert_eq!(scroll_to_cursor(8, 2, 10), 2);
  }

  #[test]
  fn input_scroll_on_zero_width_box() {
    let scroll = scroll_to_cursor(0, 7, 0);
    assert!(scroll <= 7);
    assert_eq!(7usize.saturating_sub(scroll), 0);
  }

  #[test]
  fn centered_rect_fits_inside() {
    let area = Rect::new(0, 0, 100, 40);
    let popup = centered(area, 60, 10);
    assert_eq!((popup.x, popup.y, popup.width, popup.height), (20, 15, 60, 10));
    let clamped = centered(Rect::new(0, 0, 30, 5), 60, 10);
    assert_eq!((clamped.width, clamped.height), (30, 5));
  }
}
