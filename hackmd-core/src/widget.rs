//! Data exchanged with the home-screen widget.
//!
//! The recents store is the only writer of the projection blob; the widget
//! process only reads it and must cope with stale or missing data by
//! showing placeholder notes.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::history::HistoryItem;
use crate::storage::KeyValueStore;

/// Storage key of the projection blob in the widget storage area.
pub const RECENT_NOTES_KEY: &str = "recent_notes";

/// Number of history items mirrored to the widget.
pub const WIDGET_NOTE_LIMIT: usize = 5;

/// Preview text used for mirrored notes; note bodies are not available to
/// the shell.
pub const DEFAULT_PREVIEW_TEXT: &str = "HackMD note";

/// How often the widget asks for a fresh timeline.
pub const REFRESH_INTERVAL_HOURS: i64 = 1;

/// One note as rendered by the widget.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetNote {
    pub id: String,
    pub title: String,
    pub last_edited: DateTime<Utc>,
    pub preview_text: String,
    pub collaborators: u32,
}

impl From<&HistoryItem> for WidgetNote {
    fn from(item: &HistoryItem) -> Self {
        WidgetNote {
            id: item.note_id.clone(),
            title: item.title.clone(),
            last_edited: item.last_visited,
            preview_text: DEFAULT_PREVIEW_TEXT.to_string(),
            collaborators: 0,
        }
    }
}

/// User-facing widget options.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub note_count: usize,
    pub show_collaborators: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            note_count: 3,
            show_collaborators: true,
        }
    }
}

impl WidgetConfig {
    /// Note count clamped to what the projection can hold.
    pub fn effective_note_count(&self) -> usize {
        self.note_count.clamp(1, WIDGET_NOTE_LIMIT)
    }
}

/// A note in a timeline entry, with its age relative to the entry date.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryNote {
    #[serde(flatten)]
    pub note: WidgetNote,
    pub time_ago: String,
}

/// One timeline entry handed to the widget renderer.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetEntry {
    pub date: DateTime<Utc>,
    pub notes: Vec<EntryNote>,
    pub show_collaborators: bool,
    pub next_refresh: DateTime<Utc>,
}

/// Write the top of `items` to the widget storage area. Failures are
/// logged and ignored.
pub fn publish_recent_notes(store: &dyn KeyValueStore, items: &[HistoryItem]) {
    let notes: Vec<WidgetNote> = items
        .iter()
        .take(WIDGET_NOTE_LIMIT)
        .map(WidgetNote::from)
        .collect();

    let bytes = match serde_json::to_vec(&notes) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("Failed to serialize widget notes: {}", e);
            return;
        }
    };
    if let Err(e) = store.set(RECENT_NOTES_KEY, &bytes) {
        log::warn!("Failed to publish widget notes: {}", e);
    }
}

/// Read the projection blob. Falls back to placeholders when the blob is
/// missing, malformed, or empty, so the widget never renders blank.
pub fn read_recent_notes(store: &dyn KeyValueStore, now: DateTime<Utc>) -> Vec<WidgetNote> {
    let bytes = match store.get(RECENT_NOTES_KEY) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return placeholders(now),
        Err(e) => {
            log::debug!("Widget notes unavailable: {}", e);
            return placeholders(now);
        }
    };

    match serde_json::from_slice::<Vec<WidgetNote>>(&bytes) {
        Ok(notes) if !notes.is_empty() => notes,
        Ok(_) => placeholders(now),
        Err(e) => {
            log::debug!("Malformed widget notes: {}", e);
            placeholders(now)
        }
    }
}

/// Sample notes shown before any history exists.
pub fn placeholders(now: DateTime<Utc>) -> Vec<WidgetNote> {
    vec![
        WidgetNote {
            id: "note1".to_string(),
            title: "Project meeting".to_string(),
            last_edited: now - Duration::hours(1),
            preview_text: "Agenda: 1. Progress review, 2. Sprint planning, 3. Questions"
                .to_string(),
            collaborators: 3,
        },
        WidgetNote {
            id: "note2".to_string(),
            title: "Lecture notes".to_string(),
            last_edited: now - Duration::days(1),
            preview_text: "Key points: application architecture, design patterns, examples"
                .to_string(),
            collaborators: 1,
        },
        WidgetNote {
            id: "note3".to_string(),
            title: "Task list".to_string(),
            last_edited: now - Duration::days(2),
            preview_text: "- Implement widgets, - Add PDF export, - Improve notifications"
                .to_string(),
            collaborators: 0,
        },
    ]
}

pub fn next_refresh(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(REFRESH_INTERVAL_HOURS)
}

/// Build the entry the widget should display right now.
pub fn timeline_entry(
    store: &dyn KeyValueStore,
    config: &WidgetConfig,
    now: DateTime<Utc>,
) -> WidgetEntry {
    let notes = read_recent_notes(store, now)
        .into_iter()
        .take(config.effective_note_count())
        .map(|note| EntryNote {
            time_ago: format_time_ago(note.last_edited, now),
            note,
        })
        .collect();
    WidgetEntry {
        date: now,
        notes,
        show_collaborators: config.show_collaborators,
        next_refresh: next_refresh(now),
    }
}

/// Abbreviated relative time, e.g. "5m ago" or "2d ago".
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let minutes = secs / 60;
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{}d ago", days);
    }
    format!("{}w ago", days / 7)
}

/// JSON Schema of the projection blob, published for the widget side.
pub fn projection_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(Vec<WidgetNote>);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
