use anyhow::Result;
use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, AppMode, NoticeKind};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event Handling ---

pub async fn handle_key_event(app: &mut App, key: event::KeyEvent) -> Result<()> {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return Ok(());
  }

  // The alert blocks everything until acknowledged.
  if app.alert.is_some() {
    if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
      app.acknowledge_alert();
    }
    return Ok(());
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('t') {
    app.next_theme();
    return Ok(());
  }

  if app.player.is_open() {
    handle_player_key(app, key).await;
    return Ok(());
  }

  if (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('v')) || key.code == KeyCode::F(2) {
    app.start_voice();
    return Ok(());
  }

  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Results => handle_results_key(app, key).await,
  }
  Ok(())
}

async fn handle_player_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Esc | KeyCode::Char('q') => {
      app.close_player().await;
    }
    KeyCode::Char(' ') => {
      if let Err(e) = app.player.toggle_pause().await {
        app.notify(format!("{:#}", e), NoticeKind::Error);
      }
    }
    KeyCode::Char('o') => {
      if let Some(url) = app.player.current.as_ref().map(|t| t.embed_url.clone()) {
        app.open_in_browser(&url);
      }
    }
    _ => {}
  }
}

fn handle_input_key(app: &mut App, key: event::KeyEvent) {
  // The search box is disabled while a search is in flight.
  if app.session.loading {
    if key.code == KeyCode::Tab && app.session.has_results() {
      app.mode = AppMode::Results;
    }
    return;
  }
  match key.code {
    KeyCode::Enter => {
      app.trigger_search();
    }
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Esc => {
      if !app.input.is_empty() {
        app.input.clear();
        app.cursor_position = 0;
        app.input_scroll = 0;
      } else if app.session.has_results() {
        app.mode = AppMode::Results;
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Down | KeyCode::Tab => {
      if app.session.has_results() {
        app.mode = AppMode::Results;
      }
    }
    _ => {}
  }
}

async fn handle_results_key(app: &mut App, key: event::KeyEvent) {
  let count = app.entry_count();
  match key.code {
    KeyCode::Enter => {
      app.activate_selected().await;
    }
    KeyCode::Char('o') => {
      if let Some(url) = app.selected_video().map(|v| v.url.clone()) {
        app.open_in_browser(&url);
      }
    }
    KeyCode::Down | KeyCode::Char('j') | KeyCode::Right | KeyCode::Char('l') => {
      app.selection.next(count);
    }
    KeyCode::Up | KeyCode::Char('k') | KeyCode::Left | KeyCode::Char('h') => {
      app.selection.prev(count);
    }
    KeyCode::Esc | KeyCode::Tab | KeyCode::Char('/') => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}
