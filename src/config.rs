use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User preferences persisted to `prefs.toml` in the platform config dir.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub theme_name: Option<String>,
  /// Search endpoint override.
  pub endpoint: Option<String>,
  /// Speech locale for voice search.
  pub locale: Option<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "vidfind")
}

/// Where log files go.
pub fn log_dir() -> PathBuf {
  project_dirs().map(|d| d.data_local_dir().to_path_buf()).unwrap_or_else(std::env::temp_dir)
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs()
      && let Ok(content) = std::fs::read_to_string(proj_dirs.config_dir().join("prefs.toml"))
    {
      return Self::parse(&content);
    }
    Self::default()
  }

  /// Unreadable preferences fall back to defaults.
  fn parse(content: &str) -> Self {
    toml::from_str(content).unwrap_or_default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = project_dirs() {
      let config_dir = proj_dirs.config_dir();
      if std::fs::create_dir_all(config_dir).is_ok()
        && let Ok(content) = toml::to_string(self)
      {
        let _ = std::fs::write(config_dir.join("prefs.toml"), content);
      }
    }
  }
}
