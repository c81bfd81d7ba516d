use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::events::{EventSink, Observers, SessionEvent};

/// One open document context (a tab).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Session {
    pub id: String,
    pub url: Url,
    pub title: String,
}

/// Ordered collection of open sessions plus the active selection.
///
/// Single-owner: every mutator takes `&mut self`. Callers that share the
/// registry across threads must wrap it in one lock (see `crate::app::App`).
///
/// Unknown ids are silently ignored everywhere; UI code may race ahead of
/// registry state and is not expected to pre-check existence.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    active_index: usize,
    observers: Observers<SessionEvent>,
}

impl SessionRegistry {
    /// Create an empty registry. The application shell opens its default
    /// session right after construction.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: impl EventSink<SessionEvent>) {
        self.observers.subscribe(sink);
    }

    /// Append a new session with a fresh id. The first session in an empty
    /// registry becomes active.
    pub fn create_session(&mut self, url: Url, title: &str) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            url,
            title: title.to_string(),
        };
        self.sessions.push(session.clone());

        if self.sessions.len() == 1 {
            self.active_index = 0;
        }

        log::debug!("Created session {} ({})", session.id, session.url);
        self.observers.emit(SessionEvent::SessionsChanged);
        session
    }

    /// Remove the session with `id`. The active index is clamped back into
    /// range; with no sessions left it stays at 0 and points at nothing.
    pub fn close_session(&mut self, id: &str) {
        let Some(index) = self.position(id) else {
            return;
        };

        self.sessions.remove(index);

        if self.active_index >= self.sessions.len() {
            self.active_index = self.sessions.len().saturating_sub(1);
        }

        log::debug!("Closed session {} ({} remaining)", id, self.sessions.len());
        self.observers.emit(SessionEvent::SessionsChanged);
        self.observers.emit(SessionEvent::ActiveSessionChanged);
    }

    pub fn set_active_session(&mut self, id: &str) {
        let Some(index) = self.position(id) else {
            return;
        };
        self.active_index = index;
        self.observers.emit(SessionEvent::ActiveSessionChanged);
    }

    pub fn update_title(&mut self, id: &str, title: &str) {
        let Some(index) = self.position(id) else {
            return;
        };
        self.sessions[index].title = title.to_string();
        self.observers.emit(SessionEvent::SessionsChanged);
    }

    pub fn update_url(&mut self, id: &str, url: Url) {
        let Some(index) = self.position(id) else {
            return;
        };
        self.sessions[index].url = url;
        self.observers.emit(SessionEvent::SessionsChanged);
    }

    pub fn active_session(&self) -> Option<Session> {
        self.sessions.get(self.active_index).cloned()
    }

    /// Snapshot of all sessions in tab-strip order.
    pub fn all_sessions(&self) -> Vec<Session> {
        self.sessions.clone()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Activate the following session, wrapping past the end.
    pub fn next_session(&mut self) -> Option<Session> {
        if self.sessions.is_empty() {
            return None;
        }
        self.active_index = (self.active_index + 1) % self.sessions.len();
        self.observers.emit(SessionEvent::ActiveSessionChanged);
        self.active_session()
    }

    /// Activate the preceding session, wrapping past the start.
    pub fn previous_session(&mut self) -> Option<Session> {
        if self.sessions.is_empty() {
            return None;
        }
        let count = self.sessions.len();
        self.active_index = (self.active_index + count - 1) % count;
        self.observers.emit(SessionEvent::ActiveSessionChanged);
        self.active_session()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == id)
    }
}
