use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::events::{EventSink, HistoryEvent, Observers};
use crate::storage::KeyValueStore;
use crate::widget;

/// Upper bound on remembered notes; the oldest are evicted first.
pub const MAX_HISTORY_ITEMS: usize = 100;

/// Storage key of the full history blob.
pub const HISTORY_KEY: &str = "note_history";

const HISTORY_FORMAT_VERSION: u32 = 1;

/// A visited note with recency and frequency metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub note_id: String,
    pub title: String,
    pub url: Url,
    pub last_visited: DateTime<Utc>,
    pub visit_count: u32,
}

#[derive(Serialize)]
struct HistoryBlob<'a> {
    version: u32,
    items: &'a [HistoryItem],
}

#[derive(Deserialize)]
struct StoredHistory {
    version: u32,
    items: Vec<HistoryItem>,
}

/// Bounded, deduplicated, most-recent-first list of visited notes.
///
/// Every mutation is persisted to `storage` and a top-N projection is
/// republished to the widget storage area. Both writes are best-effort:
/// failures are logged and the in-memory list stays authoritative.
pub struct RecentsStore {
    items: Vec<HistoryItem>,
    storage: Box<dyn KeyValueStore>,
    widget_storage: Box<dyn KeyValueStore>,
    observers: Observers<HistoryEvent>,
}

impl RecentsStore {
    /// Load persisted history from `storage`. Missing or unreadable data
    /// yields an empty store.
    pub fn load(storage: Box<dyn KeyValueStore>, widget_storage: Box<dyn KeyValueStore>) -> Self {
        let items = match storage.get(HISTORY_KEY) {
            Ok(Some(bytes)) => decode_history(&bytes),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Failed to read note history, starting empty: {}", e);
                Vec::new()
            }
        };
        log::debug!("Loaded {} history items", items.len());

        Self {
            items,
            storage,
            widget_storage,
            observers: Observers::default(),
        }
    }

    pub fn subscribe(&mut self, sink: impl EventSink<HistoryEvent>) {
        self.observers.subscribe(sink);
    }

    /// Record a visit to `note_id`. Repeat visits bump the count, refresh
    /// the title and timestamp, and move the item to the front.
    pub fn record_visit(&mut self, note_id: &str, title: &str, url: Url) {
        let now = Utc::now();

        if let Some(index) = self.items.iter().position(|i| i.note_id == note_id) {
            let mut item = self.items.remove(index);
            item.title = title.to_string();
            item.url = url;
            item.last_visited = now;
            item.visit_count = item.visit_count.saturating_add(1);
            self.items.insert(0, item);
        } else {
            self.items.insert(
                0,
                HistoryItem {
                    note_id: note_id.to_string(),
                    title: title.to_string(),
                    url,
                    last_visited: now,
                    visit_count: 1,
                },
            );
            self.items.truncate(MAX_HISTORY_ITEMS);
        }

        log::debug!("Recorded visit to note {}", note_id);
        self.commit();
    }

    /// Full history, most recent first.
    pub fn history(&self) -> Vec<HistoryItem> {
        self.items.clone()
    }

    pub fn recent_notes(&self, limit: usize) -> Vec<HistoryItem> {
        self.items.iter().take(limit).cloned().collect()
    }

    /// Items ordered by visit count, highest first. Ties keep their
    /// recency order. Stored order is not touched.
    pub fn frequent_notes(&self, limit: usize) -> Vec<HistoryItem> {
        let mut sorted = self.items.clone();
        sorted.sort_by(|a, b| b.visit_count.cmp(&a.visit_count));
        sorted.truncate(limit);
        sorted
    }

    pub fn remove_from_history(&mut self, note_id: &str) {
        self.items.retain(|i| i.note_id != note_id);
        self.commit();
    }

    pub fn clear_history(&mut self) {
        self.items.clear();
        self.commit();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn commit(&self) {
        self.save();
        widget::publish_recent_notes(self.widget_storage.as_ref(), &self.items);
        self.observers.emit(HistoryEvent::HistoryChanged);
    }

    fn save(&self) {
        let blob = HistoryBlob {
            version: HISTORY_FORMAT_VERSION,
            items: &self.items,
        };
        let bytes = match serde_json::to_vec(&blob) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Failed to serialize note history: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set(HISTORY_KEY, &bytes) {
            log::warn!("Failed to persist note history: {}", e);
        }
    }
}

fn decode_history(bytes: &[u8]) -> Vec<HistoryItem> {
    let items = match serde_json::from_slice::<StoredHistory>(bytes) {
        Ok(stored) if stored.version == HISTORY_FORMAT_VERSION => stored.items,
        Ok(stored) => {
            log::warn!(
                "Unsupported note history version {}, starting empty",
                stored.version
            );
            return Vec::new();
        }
        Err(e) => {
            log::warn!("Corrupt note history, starting empty: {}", e);
            return Vec::new();
        }
    };

    // Re-establish the invariants in case the blob was edited by hand.
    let mut seen = std::collections::HashSet::new();
    let mut items: Vec<HistoryItem> = items
        .into_iter()
        .filter(|i| seen.insert(i.note_id.clone()))
        .map(|mut i| {
            i.visit_count = i.visit_count.max(1);
            i
        })
        .collect();
    items.truncate(MAX_HISTORY_ITEMS);
    items
}
