pub mod app;
pub mod events;
pub mod history;
pub mod navigation;
pub mod notifications;
pub mod sessions;
pub mod settings;
pub mod storage;
pub mod widget;

/// Default document host loaded by a fresh session.
pub const DEFAULT_BASE_URL: &str = "https://hackmd.io";

/// Title given to sessions that show the home page.
pub const DEFAULT_TITLE: &str = "HackMD";
