use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::notifications::NotificationPreferences;
use crate::widget::WidgetConfig;
use crate::DEFAULT_BASE_URL;

/// Environment variable that points the shell at a different HackMD host.
pub const BASE_URL_ENV: &str = "HACKMD_URL";

/// Application settings, persisted to `<config dir>/hackmd/settings.json`.
///
/// The `#[serde(default)]` on the struct ensures that any fields missing from
/// an existing settings file are filled in with their `Default` values, making
/// it safe to add new fields without breaking old config files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    // ── Document host ────────────────────────────────────────────────────
    pub base_url: String,

    // ── Window ───────────────────────────────────────────────────────────
    pub window_width: i32,
    pub window_height: i32,

    // ── Appearance ───────────────────────────────────────────────────────
    pub dark_mode: bool,

    // ── Notifications ────────────────────────────────────────────────────
    pub notifications: NotificationPreferences,

    // ── Widget ───────────────────────────────────────────────────────────
    pub widget_note_count: usize,
    pub widget_show_collaborators: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: String::from(DEFAULT_BASE_URL),

            window_width: 1200,
            window_height: 800,

            dark_mode: false,

            notifications: NotificationPreferences::default(),

            widget_note_count: 3,
            widget_show_collaborators: true,
        }
    }
}

impl Settings {
    /// Parsed base URL; an unparsable value falls back to the default host.
    pub fn base_url(&self) -> Result<Url, String> {
        match Url::parse(&self.base_url) {
            Ok(url) if url.has_host() => Ok(url),
            _ => {
                log::warn!(
                    "Invalid base URL '{}', using {}",
                    self.base_url,
                    DEFAULT_BASE_URL
                );
                default_base_url()
            }
        }
    }

    pub fn widget_config(&self) -> WidgetConfig {
        let config = WidgetConfig {
            note_count: self.widget_note_count,
            show_collaborators: self.widget_show_collaborators,
        };
        WidgetConfig {
            note_count: config.effective_note_count(),
            ..config
        }
    }

    /// Replace `base_url` when an override is present and non-empty.
    pub fn with_base_url_override(mut self, override_url: Option<String>) -> Self {
        if let Some(url) = override_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        self
    }
}

pub fn default_base_url() -> Result<Url, String> {
    Url::parse(DEFAULT_BASE_URL).map_err(|e| format!("Invalid default base URL: {}", e))
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hackmd").join("settings.json"))
}

/// Load settings from the default location, then apply `HACKMD_URL`.
pub fn load() -> Settings {
    let settings = match settings_path() {
        Some(path) => load_from(&path),
        None => Settings::default(),
    };
    settings.with_base_url_override(std::env::var(BASE_URL_ENV).ok())
}

/// Load settings from `path`. Missing or invalid files yield defaults.
pub fn load_from(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Invalid settings at {}: {}", path.display(), e);
            Settings::default()
        }),
        Err(_) => Settings::default(),
    }
}

pub fn save(settings: &Settings) -> Result<(), String> {
    let path = settings_path().ok_or_else(|| "Cannot determine config directory".to_string())?;
    save_to(settings, &path)
}

pub fn save_to(settings: &Settings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    crate::storage::write_atomic(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationKind;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("nope.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.base_url().unwrap().as_str(), "https://hackmd.io/");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"dark_mode": true}"#).unwrap();

        let settings = load_from(&path);
        assert!(settings.dark_mode);
        assert_eq!(settings.window_width, 1200);
        assert!(settings.notifications.is_enabled(NotificationKind::Reminder));
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{{{").unwrap();
        assert_eq!(load_from(&path), Settings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hackmd").join("settings.json");

        let mut settings = Settings::default();
        settings.dark_mode = true;
        settings.base_url = "https://md.example.org".to_string();
        settings
            .notifications
            .set_enabled(NotificationKind::Mention, false);
        save_to(&settings, &path).unwrap();

        assert_eq!(load_from(&path), settings);
    }

    #[test]
    fn invalid_base_url_falls_back() {
        let settings = Settings {
            base_url: "not a url".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.base_url(), default_base_url());
        assert_eq!(settings.base_url().unwrap().as_str(), "https://hackmd.io/");

        let hostless = Settings {
            base_url: "mailto:team@hackmd.io".to_string(),
            ..Settings::default()
        };
        assert_eq!(hostless.base_url().unwrap().as_str(), "https://hackmd.io/");
    }

    #[test]
    fn base_url_override() {
        let settings =
            Settings::default().with_base_url_override(Some(" https://md.example.org ".into()));
        assert_eq!(settings.base_url, "https://md.example.org");

        let untouched = Settings::default().with_base_url_override(Some("".into()));
        assert_eq!(untouched.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn widget_config_is_clamped() {
        let settings = Settings {
            widget_note_count: 12,
            ..Settings::default()
        };
        assert_eq!(settings.widget_config().note_count, 5);
    }
}
