//! C-compatible FFI wrappers around hackmd-core and hackmd-web.
//!
//! All functions use C strings for input/output and JSON encoding for
//! complex types. Callers must free returned strings with `hackmd_free_string`
//! unless the function documents a static return.
//!
//! All extern "C" functions are wrapped in `ffi_catch` so Rust panics never
//! cross the FFI boundary. Panic payloads are logged before returning the
//! fallback value.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::collections::{BTreeMap, HashMap};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use url::Url;

use hackmd_core::app::App;
use hackmd_core::events::{FnSink, HistoryEvent, SessionEvent};
use hackmd_core::navigation::{navigation_policy, window_title, NavigationPolicy};
use hackmd_core::notifications::{
    Notification, NotificationCategory, NotificationCenter, NotificationRequest,
};
use hackmd_core::settings::{self, Settings};
use hackmd_core::storage::{self, FileStore, KeyValueStore};
use hackmd_core::widget;
use hackmd_web::bridge::{bridge_script, LoadedDocument};
use hackmd_web::export::{self, ExportFormat};
use hackmd_web::protocol::{PageEvent, ShellCommand};

/// Maximum number of app events buffered for `hackmd_app_poll_event`.
const EVENT_CHANNEL_CAPACITY: usize = 1_000;

/// Run `f` inside `catch_unwind`, logging the panic payload before returning the
/// fallback value.
fn ffi_catch<T>(fallback: T, f: impl FnOnce() -> T + std::panic::UnwindSafe) -> T {
    match catch_unwind(f) {
        Ok(v) => v,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            log::error!("FFI panic caught: {}", msg);
            fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_rust_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees `ptr` is a valid, null-terminated C string
    // whose memory remains valid for the duration of this call.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(String::from)
}

fn to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            log::warn!(
                "String contains interior NUL bytes, sanitizing ({} chars)",
                s.len()
            );
            let sanitized: String = s.chars().filter(|&c| c != '\0').collect();
            CString::new(sanitized).unwrap_or_default().into_raw()
        }
    }
}

fn to_json_c_string<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => to_c_string(&json),
        Err(e) => error_json(&format!("Failed to serialize response: {}", e)),
    }
}

fn error_json(message: &str) -> *mut c_char {
    to_c_string(&serde_json::json!({ "error": message }).to_string())
}

fn parse_url(ptr: *const c_char) -> Result<Url, String> {
    let raw = to_rust_str(ptr).ok_or_else(|| "URL is null or not UTF-8".to_string())?;
    Url::parse(&raw).map_err(|e| format!("Invalid URL '{}': {}", raw, e))
}

// ---------------------------------------------------------------------------
// Logging and memory management
// ---------------------------------------------------------------------------

/// Install the `env_logger` backend. `RUST_LOG` controls filtering. Safe to
/// call more than once.
#[no_mangle]
pub extern "C" fn hackmd_init_logging() {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let _ = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("warn"),
            )
            .try_init();
        }),
    );
}

/// Free a string previously returned by a `hackmd_*` function.
#[no_mangle]
pub extern "C" fn hackmd_free_string(s: *mut c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if !s.is_null() {
                // SAFETY: `s` was previously returned by `CString::into_raw` from
                // one of the `hackmd_*` functions, so it is valid to reclaim it.
                unsafe {
                    drop(CString::from_raw(s));
                }
            }
        }),
    );
}

// ---------------------------------------------------------------------------
// App handle
// ---------------------------------------------------------------------------

/// Session and history events, flattened for JSON polling.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(untagged)]
enum AppEvent {
    Session(SessionEvent),
    History(HistoryEvent),
}

/// Inner data for an app handle, stored in the global registry.
struct AppInner {
    app: App,
    events: Receiver<AppEvent>,
    settings_path: Option<PathBuf>,
}

/// Global registry mapping handle addresses to their inner data, so the
/// handle pointer is only ever used as an opaque key.
fn app_registry() -> &'static parking_lot::Mutex<HashMap<usize, Arc<AppInner>>> {
    static REGISTRY: OnceLock<parking_lot::Mutex<HashMap<usize, Arc<AppInner>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| parking_lot::Mutex::new(HashMap::new()))
}

/// Look up a handle in the global registry and run `f` with the inner data.
/// Returns `default` if the handle is null or freed.
fn with_app<T>(handle: *mut AppHandle, default: T, f: impl FnOnce(&AppInner) -> T) -> T {
    if handle.is_null() {
        return default;
    }
    let key = handle as usize;
    let guard = app_registry().lock();
    match guard.get(&key) {
        Some(inner) => {
            let inner = Arc::clone(inner);
            drop(guard); // Release lock before calling f
            f(&inner)
        }
        None => {
            log::warn!("Attempted to use invalid or freed app handle");
            default
        }
    }
}

/// Like `with_app`, but reports an invalid handle as `{"error": ...}`.
fn with_app_json(handle: *mut AppHandle, f: impl FnOnce(&AppInner) -> *mut c_char) -> *mut c_char {
    with_app(handle, None, |inner| Some(f(inner))).unwrap_or_else(|| error_json("invalid handle"))
}

/// Opaque handle token for the C API. Never dereferenced, only used as a key.
/// Not zero-sized, so every boxed handle gets a distinct address.
pub struct AppHandle {
    _private: u8,
}

fn forward_event(tx: &Sender<AppEvent>, event: AppEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            log::warn!(
                "App event channel full ({} capacity), dropping event",
                EVENT_CHANNEL_CAPACITY
            );
        }
        // Handle freed; nobody is polling anymore.
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Storage layout under an explicit data root.
fn rooted_store(root: &Path, name: &str) -> Box<dyn KeyValueStore> {
    storage::open_or_memory(Some(root.join(name)))
}

/// Create the app. With a null `data_root` the platform config and data
/// directories are used; otherwise settings, history, and the widget area
/// all live under `data_root`.
///
/// Returns an opaque handle. The caller must free it with `hackmd_app_free`.
#[no_mangle]
pub extern "C" fn hackmd_app_new(data_root: *const c_char) -> *mut AppHandle {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let (settings, settings_path, history_store, widget_store) =
                match to_rust_str(data_root) {
                    Some(root) => {
                        let root = PathBuf::from(root);
                        let path = root.join("settings.json");
                        let settings = settings::load_from(&path).with_base_url_override(
                            std::env::var(settings::BASE_URL_ENV).ok(),
                        );
                        (
                            settings,
                            Some(path),
                            rooted_store(&root, "history"),
                            rooted_store(&root, "widget"),
                        )
                    }
                    None => (
                        settings::load(),
                        settings::settings_path(),
                        storage::open_or_memory(storage::default_history_dir()),
                        storage::open_or_memory(storage::default_widget_dir()),
                    ),
                };

            let app = match App::new(settings, history_store, widget_store) {
                Ok(app) => app,
                Err(e) => {
                    log::error!("Failed to create app: {}", e);
                    return std::ptr::null_mut();
                }
            };

            let (tx, rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
            let session_tx = tx.clone();
            app.subscribe_sessions(FnSink(move |e| {
                forward_event(&session_tx, AppEvent::Session(e))
            }));
            app.subscribe_history(FnSink(move |e| forward_event(&tx, AppEvent::History(e))));

            let inner = Arc::new(AppInner {
                app,
                events: rx,
                settings_path,
            });

            // Allocate a stable address to use as an opaque handle key
            let handle = Box::into_raw(Box::new(AppHandle { _private: 0 }));
            app_registry().lock().insert(handle as usize, inner);
            log::info!("HackMD app created");
            handle
        }),
    )
}

/// Free an app handle.
#[no_mangle]
pub extern "C" fn hackmd_app_free(handle: *mut AppHandle) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if handle.is_null() {
                return;
            }
            let key = handle as usize;
            // The Arc keeps the app alive if another thread is inside with_app.
            let removed = app_registry().lock().remove(&key);
            if removed.is_none() {
                log::warn!("hackmd_app_free called on already-freed handle");
                return; // Don't double-free
            }
            // SAFETY: `handle` was allocated by `Box::into_raw` in `hackmd_app_new`.
            // The registry removal above ensures this only happens once per handle.
            unsafe {
                drop(Box::from_raw(handle));
            }
        }),
    );
}

/// Return the next pending app event as JSON (`{"type":"SessionsChanged"}`,
/// `{"type":"ActiveSessionChanged"}`, `{"type":"HistoryChanged"}`), or null
/// if none are pending.
#[no_mangle]
pub extern "C" fn hackmd_app_poll_event(handle: *mut AppHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app(handle, std::ptr::null_mut(), |inner| {
                match inner.events.try_recv() {
                    Ok(event) => to_json_c_string(&event),
                    Err(_) => std::ptr::null_mut(),
                }
            })
        }),
    )
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Current settings as JSON.
#[no_mangle]
pub extern "C" fn hackmd_app_settings(handle: *mut AppHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app_json(handle, |inner| {
                to_json_c_string(&inner.app.settings())
            })
        }),
    )
}

/// Replace the settings with `json` and persist them.
///
/// Returns 0 on success, 1 if applied but not saved, -1 on invalid input.
#[no_mangle]
pub extern "C" fn hackmd_app_update_settings(handle: *mut AppHandle, json: *const c_char) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(json) = to_rust_str(json) else {
                return -1;
            };
            let updated: Settings = match serde_json::from_str(&json) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("Rejected settings update: {}", e);
                    return -1;
                }
            };
            with_app(handle, -1, |inner| {
                inner.app.set_settings(updated.clone());
                let Some(path) = inner.settings_path.as_deref() else {
                    return 1;
                };
                match settings::save_to(&updated, path) {
                    Ok(()) => 0,
                    Err(e) => {
                        log::warn!("{}", e);
                        1
                    }
                }
            })
        }),
    )
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Create a session. A null `url` opens the home page, a null `title` uses
/// the default title.
///
/// Returns the session as JSON, or `{"error": ...}`.
#[no_mangle]
pub extern "C" fn hackmd_app_create_session(
    handle: *mut AppHandle,
    url: *const c_char,
    title: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app_json(handle, |inner| {
                let url = if url.is_null() {
                    inner.app.base_url()
                } else {
                    match parse_url(url) {
                        Ok(u) => u,
                        Err(e) => return error_json(&e),
                    }
                };
                let title =
                    to_rust_str(title).unwrap_or_else(|| hackmd_core::DEFAULT_TITLE.to_string());
                let session = inner.app.update_sessions(|s| s.create_session(url, &title));
                to_json_c_string(&session)
            })
        }),
    )
}

/// Close a session. Closing the last one opens a new home session.
#[no_mangle]
pub extern "C" fn hackmd_app_close_session(handle: *mut AppHandle, session_id: *const c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let Some(id) = to_rust_str(session_id) else {
                return;
            };
            with_app(handle, (), |inner| inner.app.close_session(&id));
        }),
    );
}

#[no_mangle]
pub extern "C" fn hackmd_app_activate_session(handle: *mut AppHandle, session_id: *const c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let Some(id) = to_rust_str(session_id) else {
                return;
            };
            with_app(handle, (), |inner| {
                inner.app.update_sessions(|s| s.set_active_session(&id))
            });
        }),
    );
}

#[no_mangle]
pub extern "C" fn hackmd_app_update_session_title(
    handle: *mut AppHandle,
    session_id: *const c_char,
    title: *const c_char,
) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let (Some(id), Some(title)) = (to_rust_str(session_id), to_rust_str(title)) else {
                return;
            };
            with_app(handle, (), |inner| {
                inner.app.update_sessions(|s| s.update_title(&id, &title))
            });
        }),
    );
}

/// Returns 0 on success, -1 if the URL is invalid.
#[no_mangle]
pub extern "C" fn hackmd_app_update_session_url(
    handle: *mut AppHandle,
    session_id: *const c_char,
    url: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(id) = to_rust_str(session_id) else {
                return -1;
            };
            let url = match parse_url(url) {
                Ok(u) => u,
                Err(e) => {
                    log::warn!("{}", e);
                    return -1;
                }
            };
            with_app(handle, -1, |inner| {
                inner.app.update_sessions(|s| s.update_url(&id, url));
                0
            })
        }),
    )
}

/// Active session as JSON, or null when there is none.
#[no_mangle]
pub extern "C" fn hackmd_app_active_session(handle: *mut AppHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app(handle, std::ptr::null_mut(), |inner| {
                match inner.app.with_sessions(|s| s.active_session()) {
                    Some(s) => to_json_c_string(&s),
                    None => std::ptr::null_mut(),
                }
            })
        }),
    )
}

/// All sessions in tab order as a JSON array.
#[no_mangle]
pub extern "C" fn hackmd_app_sessions(handle: *mut AppHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app_json(handle, |inner| {
                to_json_c_string(&inner.app.with_sessions(|s| s.all_sessions()))
            })
        }),
    )
}

/// Activate the next session (wrapping) and return it as JSON.
#[no_mangle]
pub extern "C" fn hackmd_app_next_session(handle: *mut AppHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app(handle, std::ptr::null_mut(), |inner| {
                match inner.app.update_sessions(|s| s.next_session()) {
                    Some(s) => to_json_c_string(&s),
                    None => std::ptr::null_mut(),
                }
            })
        }),
    )
}

/// Activate the previous session (wrapping) and return it as JSON.
#[no_mangle]
pub extern "C" fn hackmd_app_previous_session(handle: *mut AppHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app(handle, std::ptr::null_mut(), |inner| {
                match inner.app.update_sessions(|s| s.previous_session()) {
                    Some(s) => to_json_c_string(&s),
                    None => std::ptr::null_mut(),
                }
            })
        }),
    )
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Returns 0 on success, -1 on invalid input.
#[no_mangle]
pub extern "C" fn hackmd_app_record_visit(
    handle: *mut AppHandle,
    note_id: *const c_char,
    title: *const c_char,
    url: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let (Some(note_id), Some(title)) = (to_rust_str(note_id), to_rust_str(title)) else {
                return -1;
            };
            let url = match parse_url(url) {
                Ok(u) => u,
                Err(e) => {
                    log::warn!("{}", e);
                    return -1;
                }
            };
            with_app(handle, -1, |inner| {
                inner.app
                    .update_history(|h| h.record_visit(&note_id, &title, url));
                0
            })
        }),
    )
}

#[no_mangle]
pub extern "C" fn hackmd_app_remove_from_history(handle: *mut AppHandle, note_id: *const c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let Some(note_id) = to_rust_str(note_id) else {
                return;
            };
            with_app(handle, (), |inner| {
                inner.app.update_history(|h| h.remove_from_history(&note_id))
            });
        }),
    );
}

#[no_mangle]
pub extern "C" fn hackmd_app_clear_history(handle: *mut AppHandle) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            with_app(handle, (), |inner| inner.app.update_history(|h| h.clear_history()));
        }),
    );
}

/// Full history, most recent first, as a JSON array.
#[no_mangle]
pub extern "C" fn hackmd_app_history(handle: *mut AppHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app_json(handle, |inner| {
                to_json_c_string(&inner.app.with_history(|h| h.history()))
            })
        }),
    )
}

#[no_mangle]
pub extern "C" fn hackmd_app_recent_notes(handle: *mut AppHandle, limit: u32) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app_json(handle, |inner| {
                to_json_c_string(&inner.app.with_history(|h| h.recent_notes(limit as usize)))
            })
        }),
    )
}

#[no_mangle]
pub extern "C" fn hackmd_app_frequent_notes(handle: *mut AppHandle, limit: u32) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_app_json(handle, |inner| {
                to_json_c_string(&inner.app.with_history(|h| h.frequent_notes(limit as usize)))
            })
        }),
    )
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Report a finished page load in a session.
///
/// Returns 1 if a visit was recorded, 0 if not, -1 on invalid input.
#[no_mangle]
pub extern "C" fn hackmd_app_page_loaded(
    handle: *mut AppHandle,
    session_id: *const c_char,
    url: *const c_char,
    title: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(id) = to_rust_str(session_id) else {
                return -1;
            };
            let url = match parse_url(url) {
                Ok(u) => u,
                Err(e) => {
                    log::warn!("{}", e);
                    return -1;
                }
            };
            let title = to_rust_str(title).unwrap_or_default();
            with_app(handle, -1, |inner| {
                i32::from(inner.app.page_loaded(&id, url, &title))
            })
        }),
    )
}

/// Open a note in a new, active session. Returns the session as JSON, or
/// `{"error": ...}`.
#[no_mangle]
pub extern "C" fn hackmd_app_open_note(handle: *mut AppHandle, note_id: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let Some(note_id) = to_rust_str(note_id) else {
                return error_json("note id is null");
            };
            with_app_json(handle, |inner| {
                match inner.app.open_note(&note_id) {
                    Ok(session) => to_json_c_string(&session),
                    Err(e) => error_json(&e),
                }
            })
        }),
    )
}

/// Decide how to handle a link. Returns 0 to load in place, 1 to open in
/// the system browser, -1 on invalid input.
#[no_mangle]
pub extern "C" fn hackmd_app_navigation_policy(handle: *mut AppHandle, url: *const c_char) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Ok(target) = parse_url(url) else {
                return -1;
            };
            with_app(handle, -1, |inner| {
                match navigation_policy(&target, &inner.app.base_url()) {
                    NavigationPolicy::LoadInPlace => 0,
                    NavigationPolicy::OpenExternally => 1,
                }
            })
        }),
    )
}

/// Handle a clicked notification. `user_info_json` is the notification's
/// user info as a JSON object; non-string values are ignored.
///
/// Returns the URL the active session should load, or null.
#[no_mangle]
pub extern "C" fn hackmd_app_notification_target(
    handle: *mut AppHandle,
    user_info_json: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let Some(json) = to_rust_str(user_info_json) else {
                return std::ptr::null_mut();
            };
            let user_info: BTreeMap<String, String> =
                match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&json) {
                    Ok(map) => map
                        .into_iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                        .collect(),
                    Err(e) => {
                        log::warn!("Invalid notification user info: {}", e);
                        return std::ptr::null_mut();
                    }
                };
            with_app(handle, std::ptr::null_mut(), |inner| {
                match inner.app.handle_notification_response(&user_info) {
                    Some(url) => to_c_string(url.as_str()),
                    None => std::ptr::null_mut(),
                }
            })
        }),
    )
}

/// Apply a message posted by the bridge script in `session_id`.
///
/// `NavigationFinished` goes through the page-load path (session update and
/// history), `TitleChanged` retitles the session. Returns the parsed event
/// as JSON so the host can act on the rest, or `{"error": ...}`.
#[no_mangle]
pub extern "C" fn hackmd_app_handle_page_event(
    handle: *mut AppHandle,
    session_id: *const c_char,
    json: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let (Some(id), Some(json)) = (to_rust_str(session_id), to_rust_str(json)) else {
                return error_json("session id and event are required");
            };
            let event = match PageEvent::parse(&json) {
                Ok(event) => event,
                Err(e) => return error_json(&e),
            };
            with_app_json(handle, |inner| {
                match &event {
                    PageEvent::NavigationFinished { url, title } => match Url::parse(url) {
                        Ok(url) => {
                            inner.app.page_loaded(&id, url, title);
                        }
                        Err(e) => log::warn!("Page reported invalid URL '{}': {}", url, e),
                    },
                    PageEvent::TitleChanged { title } => {
                        let title = match title.trim() {
                            "" => hackmd_core::DEFAULT_TITLE,
                            t => t,
                        };
                        inner.app.update_sessions(|s| s.update_title(&id, title));
                    }
                    _ => {}
                }
                to_json_c_string(&event)
            })
        }),
    )
}

/// Window title for a page title; null or blank gives the app name.
#[no_mangle]
pub extern "C" fn hackmd_window_title(page_title: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| to_c_string(&window_title(to_rust_str(page_title).as_deref()))),
    )
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Host callback that delivers one request (JSON). Returns false on failure.
pub type DeliverCallback = extern "C" fn(request_json: *const c_char) -> bool;

/// Host callback that cancels a request by identifier, or all requests when
/// the identifier is null.
pub type CancelCallback = extern "C" fn(identifier: *const c_char);

struct CallbackCenter {
    authorized: bool,
    deliver: DeliverCallback,
    cancel: Option<CancelCallback>,
}

impl NotificationCenter for CallbackCenter {
    fn is_authorized(&self) -> bool {
        self.authorized
    }

    fn deliver(&self, request: &NotificationRequest) -> Result<(), String> {
        let json = serde_json::to_string(request)
            .map_err(|e| format!("Failed to serialize notification: {}", e))?;
        let json = CString::new(json).map_err(|e| format!("Invalid notification text: {}", e))?;
        if (self.deliver)(json.as_ptr()) {
            Ok(())
        } else {
            Err("Host rejected notification".to_string())
        }
    }

    fn cancel(&self, identifier: &str) {
        if let (Some(cancel), Ok(id)) = (self.cancel, CString::new(identifier)) {
            cancel(id.as_ptr());
        }
    }

    fn cancel_all(&self) {
        if let Some(cancel) = self.cancel {
            cancel(std::ptr::null());
        }
    }
}

/// Install the host notification center. Call again whenever the user's
/// authorization changes.
#[no_mangle]
pub extern "C" fn hackmd_app_set_notification_handler(
    handle: *mut AppHandle,
    authorized: bool,
    deliver: Option<DeliverCallback>,
    cancel: Option<CancelCallback>,
) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let Some(deliver) = deliver else {
                log::warn!("Notification handler without deliver callback ignored");
                return;
            };
            with_app(handle, (), |inner| {
                inner.app.set_notification_center(Box::new(CallbackCenter {
                    authorized,
                    deliver,
                    cancel,
                }))
            });
        }),
    );
}

/// Send a notification described by `json` (`{"kind": "mention", ...}`).
///
/// Returns the delivered request as JSON, or null when it was suppressed,
/// rejected, or invalid.
#[no_mangle]
pub extern "C" fn hackmd_app_notify(handle: *mut AppHandle, json: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let Some(json) = to_rust_str(json) else {
                return std::ptr::null_mut();
            };
            let notification: Notification = match serde_json::from_str(&json) {
                Ok(n) => n,
                Err(e) => {
                    log::warn!("Invalid notification: {}", e);
                    return std::ptr::null_mut();
                }
            };
            with_app(handle, std::ptr::null_mut(), |inner| {
                match inner.app.notify(&notification) {
                    Some(request) => to_json_c_string(&request),
                    None => std::ptr::null_mut(),
                }
            })
        }),
    )
}

#[no_mangle]
pub extern "C" fn hackmd_app_cancel_notification(handle: *mut AppHandle, identifier: *const c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let Some(identifier) = to_rust_str(identifier) else {
                return;
            };
            with_app(handle, (), |inner| inner.app.cancel_notification(&identifier));
        }),
    );
}

#[no_mangle]
pub extern "C" fn hackmd_app_cancel_all_notifications(handle: *mut AppHandle) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            with_app(handle, (), |inner| inner.app.cancel_all_notifications());
        }),
    );
}

/// Notification categories and their actions, as a JSON array of
/// `{"identifier": ..., "actions": [...]}`. Registered by the host at
/// launch.
#[no_mangle]
pub extern "C" fn hackmd_notification_categories() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let categories: Vec<serde_json::Value> = NotificationCategory::ALL
                .iter()
                .map(|category| {
                    serde_json::json!({
                        "identifier": category.identifier(),
                        "actions": category.actions(),
                    })
                })
                .collect();
            to_json_c_string(&categories)
        }),
    )
}

// ---------------------------------------------------------------------------
// Widget
// ---------------------------------------------------------------------------

/// Timeline entry for the home-screen widget, as JSON.
///
/// Reads the shared widget area (under `data_root` when non-null).
/// `note_count <= 0` uses the count from settings.
#[no_mangle]
pub extern "C" fn hackmd_widget_entry(data_root: *const c_char, note_count: i32) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let (settings, dir) = match to_rust_str(data_root) {
                Some(root) => {
                    let root = PathBuf::from(root);
                    (
                        settings::load_from(&root.join("settings.json")),
                        Some(root.join("widget")),
                    )
                }
                None => (settings::load(), storage::default_widget_dir()),
            };

            let mut config = settings.widget_config();
            if note_count > 0 {
                config.note_count = note_count as usize;
            }

            let now = Utc::now();
            let entry = match dir.map(FileStore::open) {
                Some(Ok(store)) => widget::timeline_entry(&store, &config, now),
                Some(Err(e)) => {
                    log::debug!("Widget area unavailable: {}", e);
                    widget::timeline_entry(&storage::MemoryStore::new(), &config, now)
                }
                None => widget::timeline_entry(&storage::MemoryStore::new(), &config, now),
            };
            to_json_c_string(&entry)
        }),
    )
}

/// JSON Schema of the recent-notes blob the widget reads.
#[no_mangle]
pub extern "C" fn hackmd_widget_projection_schema() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| to_json_c_string(&widget::projection_schema())),
    )
}

// ---------------------------------------------------------------------------
// Web bridge and export
// ---------------------------------------------------------------------------

/// Return the bridge user script as a static string.
///
/// The returned pointer is valid for the lifetime of the process and must
/// NOT be freed.
#[no_mangle]
pub extern "C" fn hackmd_bridge_script() -> *const c_char {
    ffi_catch(
        std::ptr::null(),
        AssertUnwindSafe(|| {
            static CACHED: OnceLock<Option<CString>> = OnceLock::new();
            CACHED
                .get_or_init(|| bridge_script().and_then(|js| CString::new(js).ok()))
                .as_ref()
                .map_or(std::ptr::null(), |s| s.as_ptr())
        }),
    )
}

/// Script delivering the command in `json` to the page, or an
/// `"ERROR:"`-prefixed message.
#[no_mangle]
pub extern "C" fn hackmd_shell_command_script(json: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let Some(json) = to_rust_str(json) else {
                return std::ptr::null_mut();
            };
            let script = serde_json::from_str::<ShellCommand>(&json)
                .map_err(|e| format!("Invalid shell command: {}", e))
                .and_then(|cmd| cmd.to_script());
            match script {
                Ok(s) => to_c_string(&s),
                Err(e) => to_c_string(&format!("ERROR:{}", e)),
            }
        }),
    )
}

fn parse_format(format: *const c_char) -> Result<ExportFormat, String> {
    let name = to_rust_str(format).unwrap_or_default();
    ExportFormat::from_name(&name).ok_or_else(|| format!("Unknown export format '{}'", name))
}

/// Supported export formats with their save-panel metadata, as a JSON
/// array.
#[no_mangle]
pub extern "C" fn hackmd_export_formats() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let formats: Vec<serde_json::Value> = ExportFormat::ALL
                .iter()
                .map(|format| {
                    serde_json::json!({
                        "name": format.name(),
                        "extension": format.file_extension(),
                        "displayName": format.display_name(),
                        "mimeType": format.mime_type(),
                        "savePanelTitle": format.save_panel_title(),
                    })
                })
                .collect();
            to_json_c_string(&formats)
        }),
    )
}

/// Suggested file name for saving a note titled `title` as `format`
/// (`pdf`, `markdown`, `html`). Returns null on an unknown format.
#[no_mangle]
pub extern "C" fn hackmd_export_file_name(
    title: *const c_char,
    format: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let title = to_rust_str(title).unwrap_or_default();
            match parse_format(format) {
                Ok(f) => to_c_string(&export::suggested_file_name(&title, f)),
                Err(_) => std::ptr::null_mut(),
            }
        }),
    )
}

/// Styled standalone HTML for a note, ready to save or hand to the web
/// engine for PDF rendering.
#[no_mangle]
pub extern "C" fn hackmd_render_export_html(
    title: *const c_char,
    markdown: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let title = to_rust_str(title).unwrap_or_default();
            let Some(markdown) = to_rust_str(markdown) else {
                return std::ptr::null_mut();
            };
            to_c_string(&export::render_export_html(&title, &markdown))
        }),
    )
}

/// Write a note as Markdown or HTML to `dest`. PDF needs the host web
/// engine and is rendered on the host side from `hackmd_render_export_html`.
///
/// Returns the written path, or an `"ERROR:"`-prefixed message.
#[no_mangle]
pub extern "C" fn hackmd_export_document(
    title: *const c_char,
    markdown: *const c_char,
    format: *const c_char,
    dest: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let (Some(markdown), Some(dest)) = (to_rust_str(markdown), to_rust_str(dest)) else {
                return to_c_string("ERROR:markdown and destination are required");
            };
            let format = match parse_format(format) {
                Ok(f) => f,
                Err(e) => return to_c_string(&format!("ERROR:{}", e)),
            };
            let document = LoadedDocument {
                title: to_rust_str(title).unwrap_or_default(),
                markdown,
                html: None,
            };
            match export::export_document(&document, format, None, Path::new(&dest)) {
                Ok(path) => to_c_string(&path.to_string_lossy()),
                Err(e) => to_c_string(&format!("ERROR:{}", e)),
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    /// Take ownership of a returned string.
    fn take(ptr: *mut c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let s = to_rust_str(ptr);
        hackmd_free_string(ptr);
        s
    }

    fn json(ptr: *mut c_char) -> serde_json::Value {
        serde_json::from_str(&take(ptr).unwrap()).unwrap()
    }

    fn new_app(dir: &tempfile::TempDir) -> *mut AppHandle {
        let root = c(dir.path().to_str().unwrap());
        let handle = hackmd_app_new(root.as_ptr());
        assert!(!handle.is_null());
        handle
    }

    fn drain_events(handle: *mut AppHandle) -> Vec<String> {
        let mut events = Vec::new();
        while let Some(e) = take(hackmd_app_poll_event(handle)) {
            events.push(e);
        }
        events
    }

    #[test]
    fn app_starts_with_home_session() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);

        let sessions = json(hackmd_app_sessions(handle));
        assert_eq!(sessions.as_array().unwrap().len(), 1);
        let active = json(hackmd_app_active_session(handle));
        assert_eq!(active["title"], "HackMD");

        hackmd_app_free(handle);
    }

    #[test]
    fn session_lifecycle_emits_events() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);

        let url = c("https://hackmd.io/abc");
        let title = c("Notes");
        let created = json(hackmd_app_create_session(handle, url.as_ptr(), title.as_ptr()));
        let id = c(created["id"].as_str().unwrap());
        assert_eq!(
            drain_events(handle),
            vec![r#"{"type":"SessionsChanged"}"#.to_string()]
        );

        hackmd_app_activate_session(handle, id.as_ptr());
        assert_eq!(json(hackmd_app_active_session(handle))["id"], created["id"]);
        assert_eq!(
            drain_events(handle),
            vec![r#"{"type":"ActiveSessionChanged"}"#.to_string()]
        );

        let next = json(hackmd_app_next_session(handle));
        assert_ne!(next["id"], created["id"]);
        let prev = json(hackmd_app_previous_session(handle));
        assert_eq!(prev["id"], created["id"]);

        drain_events(handle);
        hackmd_app_close_session(handle, id.as_ptr());
        assert_eq!(
            drain_events(handle),
            vec![
                r#"{"type":"SessionsChanged"}"#.to_string(),
                r#"{"type":"ActiveSessionChanged"}"#.to_string()
            ]
        );

        hackmd_app_free(handle);
    }

    #[test]
    fn invalid_url_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);
        let bad = c("not a url");
        let result = json(hackmd_app_create_session(handle, bad.as_ptr(), std::ptr::null()));
        assert!(result.get("error").is_some());
        hackmd_app_free(handle);
    }

    #[test]
    fn page_loads_feed_history_and_widget() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);

        let active = json(hackmd_app_active_session(handle));
        let id = c(active["id"].as_str().unwrap());
        let url = c("https://hackmd.io/abc");
        let title = c("Plan");
        assert_eq!(hackmd_app_page_loaded(handle, id.as_ptr(), url.as_ptr(), title.as_ptr()), 1);

        let history = json(hackmd_app_history(handle));
        assert_eq!(history[0]["noteId"], "abc");
        assert_eq!(history[0]["visitCount"], 1);
        assert!(drain_events(handle).contains(&r#"{"type":"HistoryChanged"}"#.to_string()));

        let root = c(dir.path().to_str().unwrap());
        let entry = json(hackmd_widget_entry(root.as_ptr(), 0));
        assert_eq!(entry["notes"][0]["id"], "abc");
        assert_eq!(entry["notes"].as_array().unwrap().len(), 1);

        hackmd_app_free(handle);
    }

    #[test]
    fn history_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);
        let (note, title, url) = (c("n1"), c("One"), c("https://hackmd.io/n1"));
        assert_eq!(
            hackmd_app_record_visit(handle, note.as_ptr(), title.as_ptr(), url.as_ptr()),
            0
        );
        hackmd_app_free(handle);

        let handle = new_app(&dir);
        let recent = json(hackmd_app_recent_notes(handle, 5));
        assert_eq!(recent[0]["noteId"], "n1");

        hackmd_app_remove_from_history(handle, note.as_ptr());
        assert_eq!(json(hackmd_app_frequent_notes(handle, 5)), serde_json::json!([]));
        hackmd_app_free(handle);
    }

    #[test]
    fn widget_without_history_shows_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let root = c(dir.path().to_str().unwrap());
        let entry = json(hackmd_widget_entry(root.as_ptr(), 2));
        assert_eq!(entry["notes"].as_array().unwrap().len(), 2);
        assert_eq!(entry["notes"][0]["id"], "note1");
        assert_eq!(entry["notes"][0]["timeAgo"], "1h ago");
    }

    #[test]
    fn widget_schema_describes_notes() {
        let schema = json(hackmd_widget_projection_schema());
        assert_eq!(schema["type"], "array");
        let note = serde_json::to_string(&schema).unwrap();
        assert!(note.contains("lastEdited"));
        assert!(note.contains("previewText"));
    }

    #[test]
    fn page_events_update_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);
        let active = json(hackmd_app_active_session(handle));
        let id = c(active["id"].as_str().unwrap());

        let finished =
            c(r#"{"type":"NavigationFinished","url":"https://hackmd.io/abc","title":"Plan"}"#);
        let echoed = json(hackmd_app_handle_page_event(handle, id.as_ptr(), finished.as_ptr()));
        assert_eq!(echoed["type"], "NavigationFinished");
        assert_eq!(json(hackmd_app_history(handle))[0]["noteId"], "abc");

        let renamed = c(r#"{"type":"TitleChanged","title":"Plan v2"}"#);
        take(hackmd_app_handle_page_event(handle, id.as_ptr(), renamed.as_ptr()));
        assert_eq!(json(hackmd_app_active_session(handle))["title"], "Plan v2");

        let extracted = c(r##"{"type":"DocumentExtracted","request_id":4,"content":"# Plan"}"##);
        let event = json(hackmd_app_handle_page_event(handle, id.as_ptr(), extracted.as_ptr()));
        assert_eq!(event["request_id"], 4);
        assert_eq!(event["title"], "");

        let bad = c(r#"{"type":"Nope"}"#);
        let err = json(hackmd_app_handle_page_event(handle, id.as_ptr(), bad.as_ptr()));
        assert!(err.get("error").is_some());
        hackmd_app_free(handle);
    }

    #[test]
    fn window_title_names_the_page() {
        let page = c("Plan");
        assert_eq!(
            take(hackmd_window_title(page.as_ptr())).as_deref(),
            Some("HackMD - Plan")
        );
        assert_eq!(take(hackmd_window_title(std::ptr::null())).as_deref(), Some("HackMD"));
    }

    #[test]
    fn notification_target_points_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);
        let info = c(r#"{"noteId":"xyz","badge":3}"#);
        assert_eq!(
            take(hackmd_app_notification_target(handle, info.as_ptr())).as_deref(),
            Some("https://hackmd.io/xyz")
        );
        let empty = c("{}");
        assert!(hackmd_app_notification_target(handle, empty.as_ptr()).is_null());
        hackmd_app_free(handle);
    }

    extern "C" fn accept_all(_request: *const c_char) -> bool {
        true
    }

    #[test]
    fn notify_goes_through_host_callback() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);
        let note = c(r#"{"kind":"noteUpdate","title":"t","body":"b","noteId":"abc"}"#);

        assert!(hackmd_app_notify(handle, note.as_ptr()).is_null());

        hackmd_app_set_notification_handler(handle, true, Some(accept_all), None);
        let request = json(hackmd_app_notify(handle, note.as_ptr()));
        assert_eq!(request["category"], "NOTE_UPDATE");
        assert_eq!(request["userInfo"]["noteId"], "abc");
        hackmd_app_free(handle);
    }

    fn cancelled() -> &'static parking_lot::Mutex<Vec<Option<String>>> {
        static CANCELLED: OnceLock<parking_lot::Mutex<Vec<Option<String>>>> = OnceLock::new();
        CANCELLED.get_or_init(|| parking_lot::Mutex::new(Vec::new()))
    }

    extern "C" fn record_cancel(identifier: *const c_char) {
        cancelled().lock().push(to_rust_str(identifier));
    }

    #[test]
    fn cancellation_goes_through_host_callback() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);
        hackmd_app_set_notification_handler(handle, true, Some(accept_all), Some(record_cancel));

        let id = c("note-update-abc");
        hackmd_app_cancel_notification(handle, id.as_ptr());
        hackmd_app_cancel_all_notifications(handle);
        assert_eq!(
            *cancelled().lock(),
            vec![Some("note-update-abc".to_string()), None]
        );
        hackmd_app_free(handle);
    }

    #[test]
    fn categories_list_their_actions() {
        let categories = json(hackmd_notification_categories());
        let categories = categories.as_array().unwrap();
        assert_eq!(categories.len(), NotificationCategory::ALL.len());
        let note_update = categories
            .iter()
            .find(|c| c["identifier"] == "NOTE_UPDATE")
            .unwrap();
        assert_eq!(note_update["actions"][0]["identifier"], "VIEW_NOTE");
        assert!(categories
            .iter()
            .all(|c| !c["actions"].as_array().unwrap().is_empty()));
    }

    #[test]
    fn settings_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let handle = new_app(&dir);
        let mut settings = json(hackmd_app_settings(handle));
        settings["dark_mode"] = serde_json::json!(true);
        let body = c(&settings.to_string());
        assert_eq!(hackmd_app_update_settings(handle, body.as_ptr()), 0);
        assert!(settings::load_from(&dir.path().join("settings.json")).dark_mode);

        let bad = c("{");
        assert_eq!(hackmd_app_update_settings(handle, bad.as_ptr()), -1);
        hackmd_app_free(handle);
    }

    #[test]
    fn null_handle_is_rejected() {
        let handle = std::ptr::null_mut();
        assert!(hackmd_app_active_session(handle).is_null());
        assert!(json(hackmd_app_sessions(handle)).get("error").is_some());
        assert_eq!(hackmd_app_page_loaded(handle, std::ptr::null(), std::ptr::null(), std::ptr::null()), -1);
        hackmd_app_free(handle);
    }

    #[test]
    fn web_helpers() {
        assert!(!hackmd_bridge_script().is_null());

        let cmd = c(r#"{"type":"SetTheme","dark":false}"#);
        let script = take(hackmd_shell_command_script(cmd.as_ptr())).unwrap();
        assert!(script.starts_with("hackmdReceiveCommand("));
        let bad = c(r#"{"type":"Explode"}"#);
        assert!(take(hackmd_shell_command_script(bad.as_ptr()))
            .unwrap()
            .starts_with("ERROR:"));

        let (title, md) = (c("A/B"), c("markdown"));
        assert_eq!(
            take(hackmd_export_file_name(title.as_ptr(), md.as_ptr())).as_deref(),
            Some("A B.md")
        );

        let formats = json(hackmd_export_formats());
        assert_eq!(formats.as_array().unwrap().len(), 3);
        assert_eq!(formats[0]["name"], "pdf");
        assert_eq!(formats[0]["mimeType"], "application/pdf");
        assert_eq!(formats[0]["savePanelTitle"], "Save as PDF Document");
        assert_eq!(formats[1]["extension"], "md");
    }

    #[test]
    fn export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.html");
        let (title, body, format, path) = (
            c("Doc"),
            c("# Doc\n\ntext"),
            c("html"),
            c(dest.to_str().unwrap()),
        );
        let written = take(hackmd_export_document(
            title.as_ptr(),
            body.as_ptr(),
            format.as_ptr(),
            path.as_ptr(),
        ))
        .unwrap();
        assert_eq!(written, dest.to_string_lossy());
        assert!(std::fs::read_to_string(&dest).unwrap().contains("<h1>Doc</h1>"));

        let pdf = c("pdf");
        let err = take(hackmd_export_document(
            title.as_ptr(),
            body.as_ptr(),
            pdf.as_ptr(),
            path.as_ptr(),
        ))
        .unwrap();
        assert!(err.starts_with("ERROR:"));
    }
}
