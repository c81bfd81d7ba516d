use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use url::Url;

use crate::events::{EventRelay, EventSink, HistoryEvent, SessionEvent};
use crate::history::RecentsStore;
use crate::navigation::{is_same_host, note_id_from_url, note_url};
use crate::notifications::{
    resolve_notification_target, Notification, NotificationCenter, NotificationRequest, Notifier,
};
use crate::sessions::{Session, SessionRegistry};
use crate::settings::Settings;
use crate::storage::KeyValueStore;
use crate::widget::WidgetConfig;
use crate::DEFAULT_TITLE;

/// Shared application state handed to the frontend.
///
/// Each manager sits behind its own lock, so session and history traffic
/// never contend with each other. Never hold two guards at once except in
/// the order sessions -> history.
///
/// Manager events are queued while a lock is held and delivered to
/// subscribers after it is released, so subscribers may read the app
/// again from inside `send`.
pub struct App {
    settings: Mutex<Settings>,
    base_url: Mutex<Url>,
    sessions: Mutex<SessionRegistry>,
    history: Mutex<RecentsStore>,
    notifier: Mutex<Notifier>,
    session_events: EventRelay<SessionEvent>,
    history_events: EventRelay<HistoryEvent>,
}

impl App {
    /// Build the app and open the home session.
    pub fn new(
        settings: Settings,
        history_storage: Box<dyn KeyValueStore>,
        widget_storage: Box<dyn KeyValueStore>,
    ) -> Result<Self, String> {
        let base_url = settings.base_url()?;
        let session_events = EventRelay::default();
        let history_events = EventRelay::default();

        let mut sessions = SessionRegistry::new();
        sessions.subscribe(session_events.sender());
        sessions.create_session(base_url.clone(), DEFAULT_TITLE);
        session_events.discard();

        let mut history = RecentsStore::load(history_storage, widget_storage);
        history.subscribe(history_events.sender());

        Ok(Self {
            settings: Mutex::new(settings),
            base_url: Mutex::new(base_url),
            sessions: Mutex::new(sessions),
            history: Mutex::new(history),
            notifier: Mutex::new(Notifier::default()),
            session_events,
            history_events,
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().clone()
    }

    /// Replace the settings. A base URL that no longer resolves keeps the
    /// previous host.
    pub fn set_settings(&self, settings: Settings) {
        match settings.base_url() {
            Ok(url) => *self.base_url.lock() = url,
            Err(e) => log::error!("Keeping previous base URL: {}", e),
        }
        *self.settings.lock() = settings;
    }

    pub fn base_url(&self) -> Url {
        self.base_url.lock().clone()
    }

    pub fn widget_config(&self) -> WidgetConfig {
        self.settings.lock().widget_config()
    }

    /// Read the session registry under its lock.
    pub fn with_sessions<R>(&self, f: impl FnOnce(&SessionRegistry) -> R) -> R {
        f(&*self.sessions.lock())
    }

    /// Mutate the session registry, then deliver the resulting events.
    pub fn update_sessions<R>(&self, f: impl FnOnce(&mut SessionRegistry) -> R) -> R {
        let result = f(&mut *self.sessions.lock());
        self.session_events.flush();
        result
    }

    /// Read the recents store under its lock.
    pub fn with_history<R>(&self, f: impl FnOnce(&RecentsStore) -> R) -> R {
        f(&*self.history.lock())
    }

    /// Mutate the recents store, then deliver the resulting events.
    pub fn update_history<R>(&self, f: impl FnOnce(&mut RecentsStore) -> R) -> R {
        let result = f(&mut *self.history.lock());
        self.history_events.flush();
        result
    }

    pub fn subscribe_sessions(&self, sink: impl EventSink<SessionEvent>) {
        self.session_events.subscribe(sink);
    }

    pub fn subscribe_history(&self, sink: impl EventSink<HistoryEvent>) {
        self.history_events.subscribe(sink);
    }

    /// Open `note_id` in a new session and make it active.
    pub fn open_note(&self, note_id: &str) -> Result<Session, String> {
        let url = note_url(&self.base_url(), note_id)?;
        Ok(self.update_sessions(|sessions| {
            let session = sessions.create_session(url, DEFAULT_TITLE);
            sessions.set_active_session(&session.id);
            session
        }))
    }

    /// A session finished loading `url`. Updates the session and, for
    /// notes on the configured host, records the visit. Returns whether a
    /// visit was recorded.
    pub fn page_loaded(&self, session_id: &str, url: Url, title: &str) -> bool {
        let title = match title.trim() {
            "" => DEFAULT_TITLE,
            t => t,
        };

        let known = self.update_sessions(|sessions| {
            if sessions.get(session_id).is_none() {
                return false;
            }
            sessions.update_url(session_id, url.clone());
            sessions.update_title(session_id, title);
            true
        });
        if !known || !is_same_host(&url, &self.base_url()) {
            return false;
        }
        let Some(note_id) = note_id_from_url(&url) else {
            return false;
        };
        self.update_history(|history| history.record_visit(&note_id, title, url));
        true
    }

    /// Close a session. Closing the last one opens a fresh home session so
    /// the window always has something to show.
    pub fn close_session(&self, id: &str) {
        let home = self.base_url();
        self.update_sessions(|sessions| {
            sessions.close_session(id);
            if sessions.is_empty() {
                let session = sessions.create_session(home, DEFAULT_TITLE);
                sessions.set_active_session(&session.id);
            }
        });
    }

    /// The user clicked a notification. Points the active session at the
    /// note it refers to and returns the URL to load.
    pub fn handle_notification_response(&self, user_info: &BTreeMap<String, String>) -> Option<Url> {
        let url = resolve_notification_target(user_info, &self.base_url())?;
        self.update_sessions(|sessions| match sessions.active_session() {
            Some(active) => sessions.update_url(&active.id, url.clone()),
            None => {
                let session = sessions.create_session(url.clone(), DEFAULT_TITLE);
                sessions.set_active_session(&session.id);
            }
        });
        Some(url)
    }

    pub fn set_notification_center(&self, center: Box<dyn NotificationCenter>) {
        *self.notifier.lock() = Notifier::new(center);
    }

    /// Send a notification if the platform allows it and the user has the
    /// kind enabled.
    pub fn notify(&self, notification: &Notification) -> Option<NotificationRequest> {
        let preferences = self.settings.lock().notifications.clone();
        self.notifier
            .lock()
            .send(&preferences, notification, Utc::now())
    }

    pub fn cancel_notification(&self, identifier: &str) {
        self.notifier.lock().cancel(identifier);
    }

    pub fn cancel_all_notifications(&self) {
        self.notifier.lock().cancel_all();
    }
}
