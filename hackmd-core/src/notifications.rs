//! System notification routing.
//!
//! Delivery, permission prompts and presentation belong to the platform;
//! this module decides whether a notification may be sent, builds the
//! request the platform center receives, and maps a clicked notification
//! back to the note it refers to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::navigation::note_url;

/// User-info key carrying the note a notification refers to.
pub const NOTE_ID_KEY: &str = "noteId";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    NoteUpdate,
    Collaboration,
    Comment,
    Mention,
    Reminder,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::NoteUpdate,
        NotificationKind::Collaboration,
        NotificationKind::Comment,
        NotificationKind::Mention,
        NotificationKind::Reminder,
    ];

    /// Label shown in the preferences panel.
    pub fn display_name(&self) -> &'static str {
        match self {
            NotificationKind::NoteUpdate => "Note Updates",
            NotificationKind::Collaboration => "Collaboration Invites",
            NotificationKind::Comment => "Comments",
            NotificationKind::Mention => "Mentions",
            NotificationKind::Reminder => "Reminders",
        }
    }

    pub fn category(&self) -> NotificationCategory {
        match self {
            NotificationKind::NoteUpdate => NotificationCategory::NoteUpdate,
            NotificationKind::Collaboration => NotificationCategory::Collaboration,
            NotificationKind::Comment => NotificationCategory::Comment,
            NotificationKind::Mention => NotificationCategory::Mention,
            NotificationKind::Reminder => NotificationCategory::Reminder,
        }
    }

    fn identifier_prefix(&self) -> &'static str {
        match self {
            NotificationKind::NoteUpdate => "noteUpdate",
            NotificationKind::Collaboration => "collaboration",
            NotificationKind::Comment => "comment",
            NotificationKind::Mention => "mention",
            NotificationKind::Reminder => "reminder",
        }
    }
}

/// Platform notification categories and the actions they offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationCategory {
    NoteUpdate,
    Collaboration,
    Reminder,
    Mention,
    Comment,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    pub identifier: &'static str,
    pub title: &'static str,
    pub foreground: bool,
    pub destructive: bool,
    pub requires_authentication: bool,
}

const fn open_action(identifier: &'static str, title: &'static str) -> NotificationAction {
    NotificationAction {
        identifier,
        title,
        foreground: true,
        destructive: false,
        requires_authentication: false,
    }
}

const fn reply_action(identifier: &'static str) -> NotificationAction {
    NotificationAction {
        identifier,
        title: "Reply",
        foreground: true,
        destructive: false,
        requires_authentication: true,
    }
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 5] = [
        NotificationCategory::NoteUpdate,
        NotificationCategory::Collaboration,
        NotificationCategory::Reminder,
        NotificationCategory::Mention,
        NotificationCategory::Comment,
    ];

    pub fn identifier(&self) -> &'static str {
        match self {
            NotificationCategory::NoteUpdate => "NOTE_UPDATE",
            NotificationCategory::Collaboration => "COLLABORATION",
            NotificationCategory::Reminder => "REMINDER",
            NotificationCategory::Mention => "MENTION",
            NotificationCategory::Comment => "COMMENT",
        }
    }

    pub fn actions(&self) -> Vec<NotificationAction> {
        match self {
            NotificationCategory::NoteUpdate => vec![open_action("VIEW_NOTE", "View Note")],
            NotificationCategory::Collaboration => {
                vec![open_action("VIEW_COLLABORATION", "View Changes")]
            }
            NotificationCategory::Reminder => vec![
                open_action("OPEN_REMINDER", "Open"),
                NotificationAction {
                    identifier: "DISMISS_REMINDER",
                    title: "Dismiss",
                    foreground: false,
                    destructive: true,
                    requires_authentication: false,
                },
            ],
            NotificationCategory::Mention => vec![
                open_action("VIEW_MENTION", "View Mention"),
                reply_action("REPLY_MENTION"),
            ],
            NotificationCategory::Comment => vec![
                open_action("VIEW_COMMENT", "View Comment"),
                reply_action("REPLY_COMMENT"),
            ],
        }
    }
}

/// Per-kind enable switches, stored in the settings file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NotificationPreferences {
    pub note_updates: bool,
    pub collaboration: bool,
    pub comments: bool,
    pub mentions: bool,
    pub reminders: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            note_updates: true,
            collaboration: true,
            comments: true,
            mentions: true,
            reminders: true,
        }
    }
}

impl NotificationPreferences {
    pub fn is_enabled(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::NoteUpdate => self.note_updates,
            NotificationKind::Collaboration => self.collaboration,
            NotificationKind::Comment => self.comments,
            NotificationKind::Mention => self.mentions,
            NotificationKind::Reminder => self.reminders,
        }
    }

    pub fn set_enabled(&mut self, kind: NotificationKind, enabled: bool) {
        let flag = match kind {
            NotificationKind::NoteUpdate => &mut self.note_updates,
            NotificationKind::Collaboration => &mut self.collaboration,
            NotificationKind::Comment => &mut self.comments,
            NotificationKind::Mention => &mut self.mentions,
            NotificationKind::Reminder => &mut self.reminders,
        };
        *flag = enabled;
    }
}

/// Something the app wants to tell the user about.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    NoteUpdate {
        title: String,
        body: String,
        note_id: String,
    },
    Collaboration {
        title: String,
        body: String,
        collaborator: String,
        note_id: String,
    },
    Comment {
        title: String,
        body: String,
        from_user: String,
        note_id: String,
        comment_id: String,
    },
    Mention {
        title: String,
        body: String,
        from_user: String,
        note_id: String,
    },
    Reminder {
        title: String,
        body: String,
        fire_at: DateTime<Utc>,
        note_id: Option<String>,
    },
}

/// Fully built request handed to the platform notification center.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub identifier: String,
    pub title: String,
    pub body: String,
    pub category: &'static str,
    pub user_info: BTreeMap<String, String>,
    /// `None` delivers immediately.
    pub fire_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::NoteUpdate { .. } => NotificationKind::NoteUpdate,
            Notification::Collaboration { .. } => NotificationKind::Collaboration,
            Notification::Comment { .. } => NotificationKind::Comment,
            Notification::Mention { .. } => NotificationKind::Mention,
            Notification::Reminder { .. } => NotificationKind::Reminder,
        }
    }

    /// Build the platform request. `now` makes the identifier unique per send.
    pub fn to_request(&self, now: DateTime<Utc>) -> NotificationRequest {
        let kind = self.kind();
        let prefix = kind.identifier_prefix();
        let secs = now.timestamp();
        let mut user_info = BTreeMap::new();

        let (identifier, title, body, fire_at) = match self {
            Notification::NoteUpdate {
                title,
                body,
                note_id,
            } => {
                user_info.insert(NOTE_ID_KEY.to_string(), note_id.clone());
                (format!("{}-{}-{}", prefix, note_id, secs), title, body, None)
            }
            Notification::Collaboration {
                title,
                body,
                collaborator,
                note_id,
            } => {
                user_info.insert(NOTE_ID_KEY.to_string(), note_id.clone());
                user_info.insert("collaborator".to_string(), collaborator.clone());
                (format!("{}-{}-{}", prefix, note_id, secs), title, body, None)
            }
            Notification::Comment {
                title,
                body,
                from_user,
                note_id,
                comment_id,
            } => {
                user_info.insert(NOTE_ID_KEY.to_string(), note_id.clone());
                user_info.insert("fromUser".to_string(), from_user.clone());
                user_info.insert("commentId".to_string(), comment_id.clone());
                // One notification per comment, so resends replace it.
                (
                    format!("{}-{}-{}", prefix, note_id, comment_id),
                    title,
                    body,
                    None,
                )
            }
            Notification::Mention {
                title,
                body,
                from_user,
                note_id,
            } => {
                user_info.insert(NOTE_ID_KEY.to_string(), note_id.clone());
                user_info.insert("fromUser".to_string(), from_user.clone());
                (format!("{}-{}-{}", prefix, note_id, secs), title, body, None)
            }
            Notification::Reminder {
                title,
                body,
                fire_at,
                note_id,
            } => {
                if let Some(id) = note_id {
                    user_info.insert(NOTE_ID_KEY.to_string(), id.clone());
                }
                let target = note_id.as_deref().unwrap_or("general");
                (
                    format!("{}-{}-{}", prefix, target, secs),
                    title,
                    body,
                    Some(*fire_at),
                )
            }
        };

        NotificationRequest {
            identifier,
            title: title.clone(),
            body: body.clone(),
            category: kind.category().identifier(),
            user_info,
            fire_at,
        }
    }
}

/// Platform notification service.
pub trait NotificationCenter: Send + Sync {
    fn is_authorized(&self) -> bool;
    fn deliver(&self, request: &NotificationRequest) -> Result<(), String>;
    fn cancel(&self, identifier: &str);
    fn cancel_all(&self);
}

/// Center used until the platform registers one: nothing is authorized.
pub struct DisabledNotificationCenter;

impl NotificationCenter for DisabledNotificationCenter {
    fn is_authorized(&self) -> bool {
        false
    }

    fn deliver(&self, _request: &NotificationRequest) -> Result<(), String> {
        Err("Notifications are not available".to_string())
    }

    fn cancel(&self, _identifier: &str) {}

    fn cancel_all(&self) {}
}

/// Gates notifications on platform authorization and user preferences.
pub struct Notifier {
    center: Box<dyn NotificationCenter>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Box::new(DisabledNotificationCenter))
    }
}

impl Notifier {
    pub fn new(center: Box<dyn NotificationCenter>) -> Self {
        Self { center }
    }

    /// Send `notification` if allowed. Returns the delivered request, or
    /// `None` when it was suppressed or delivery failed.
    pub fn send(
        &self,
        preferences: &NotificationPreferences,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Option<NotificationRequest> {
        let kind = notification.kind();
        if !self.center.is_authorized() || !preferences.is_enabled(kind) {
            log::debug!("Suppressed {} notification", kind.display_name());
            return None;
        }

        let request = notification.to_request(now);
        match self.center.deliver(&request) {
            Ok(()) => Some(request),
            Err(e) => {
                log::warn!("Failed to deliver notification {}: {}", request.identifier, e);
                None
            }
        }
    }

    pub fn cancel(&self, identifier: &str) {
        self.center.cancel(identifier);
    }

    pub fn cancel_all(&self) {
        self.center.cancel_all();
    }
}

/// Map the user info of a clicked notification to the note to open.
pub fn resolve_notification_target(
    user_info: &BTreeMap<String, String>,
    base_url: &Url,
) -> Option<Url> {
    let note_id = user_info.get(NOTE_ID_KEY)?;
    note_url(base_url, note_id).ok()
}
