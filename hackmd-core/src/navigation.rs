use url::Url;

use crate::DEFAULT_TITLE;

/// What the webview should do with a link the page tries to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPolicy {
    /// Same host as the configured base URL: load in the current session.
    LoadInPlace,
    /// Anything else goes to the system browser.
    OpenExternally,
}

/// Derive a note id from a document URL: the path with leading and
/// trailing slashes stripped, used verbatim. Returns `None` for an empty
/// path (the home page), which is never recorded as a note.
pub fn note_id_from_url(url: &Url) -> Option<String> {
    let id = url.path().trim_matches('/');
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Build `<base>/<note_id>`.
pub fn note_url(base_url: &Url, note_id: &str) -> Result<Url, String> {
    let base = base_url.as_str().trim_end_matches('/');
    let id = note_id.trim_matches('/');
    if id.is_empty() {
        return Err("Note id is empty".to_string());
    }
    Url::parse(&format!("{}/{}", base, id))
        .map_err(|e| format!("Invalid note URL for '{}': {}", note_id, e))
}

/// Whether `url` is served by the same host as `base_url`.
pub fn is_same_host(url: &Url, base_url: &Url) -> bool {
    match (url.host_str(), base_url.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

pub fn navigation_policy(target: &Url, base_url: &Url) -> NavigationPolicy {
    if is_same_host(target, base_url) {
        NavigationPolicy::LoadInPlace
    } else {
        NavigationPolicy::OpenExternally
    }
}

/// Window title for a loaded page.
pub fn window_title(page_title: Option<&str>) -> String {
    match page_title.map(str::trim) {
        Some(t) if !t.is_empty() => format!("{} - {}", DEFAULT_TITLE, t),
        _ => DEFAULT_TITLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn note_id_strips_slashes() {
        assert_eq!(
            note_id_from_url(&url("https://hackmd.io/abc123")),
            Some("abc123".to_string())
        );
        assert_eq!(
            note_id_from_url(&url("https://hackmd.io/abc123/")),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn note_id_keeps_inner_path_verbatim() {
        assert_eq!(
            note_id_from_url(&url("https://hackmd.io/@team/notes?edit#top")),
            Some("@team/notes".to_string())
        );
    }

    #[test]
    fn note_id_empty_path_is_none() {
        assert_eq!(note_id_from_url(&url("https://hackmd.io")), None);
        assert_eq!(note_id_from_url(&url("https://hackmd.io/")), None);
    }

    #[test]
    fn note_url_joins_with_single_slash() {
        let base = url("https://hackmd.io");
        assert_eq!(
            note_url(&base, "abc").unwrap().as_str(),
            "https://hackmd.io/abc"
        );
        let base_slash = url("https://hackmd.io/");
        assert_eq!(
            note_url(&base_slash, "/abc/").unwrap().as_str(),
            "https://hackmd.io/abc"
        );
        assert!(note_url(&base, "").is_err());
    }

    #[test]
    fn policy_by_host() {
        let base = url("https://hackmd.io");
        assert_eq!(
            navigation_policy(&url("https://hackmd.io/xyz"), &base),
            NavigationPolicy::LoadInPlace
        );
        assert_eq!(
            navigation_policy(&url("https://HACKMD.io/xyz"), &base),
            NavigationPolicy::LoadInPlace
        );
        assert_eq!(
            navigation_policy(&url("https://github.com/hackmdio"), &base),
            NavigationPolicy::OpenExternally
        );
        assert_eq!(
            navigation_policy(&url("mailto:someone@example.com"), &base),
            NavigationPolicy::OpenExternally
        );
    }

    #[test]
    fn window_title_formats() {
        assert_eq!(window_title(Some("My Note")), "HackMD - My Note");
        assert_eq!(window_title(Some("  ")), "HackMD");
        assert_eq!(window_title(None), "HackMD");
    }
}
