use crate::protocol::{ContentFormat, MESSAGE_HANDLER, RECEIVE_FUNCTION};

/// User script injected at document end into every HackMD page. Installs
/// the command receiver and posts page events back to the shell.
pub const BRIDGE_JS: &str = include_str!("../web/bridge.js");

/// Access to the document shown in a session. Implemented by the host on
/// top of its web view; each call usually round-trips through
/// `ShellCommand::ExtractDocument`.
pub trait DocumentSource {
    fn extract_document_content(&self, format: ContentFormat) -> Result<String, String>;
    fn extract_document_title(&self) -> Result<String, String>;
}

/// Document already held in memory, e.g. one received in a
/// `PageEvent::DocumentExtracted`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub title: String,
    pub markdown: String,
    /// Rendered view, when the page sent one.
    pub html: Option<String>,
}

impl DocumentSource for LoadedDocument {
    fn extract_document_content(&self, format: ContentFormat) -> Result<String, String> {
        match format {
            ContentFormat::Markdown => Ok(self.markdown.clone()),
            ContentFormat::Html => self
                .html
                .clone()
                .ok_or_else(|| "Rendered HTML not available".to_string()),
        }
    }

    fn extract_document_title(&self) -> Result<String, String> {
        Ok(self.title.clone())
    }
}

/// Whether the bridge script agrees with the protocol constants.
fn script_matches_protocol() -> bool {
    BRIDGE_JS.contains(&format!("window.{}", RECEIVE_FUNCTION))
        && BRIDGE_JS.contains(&format!("messageHandlers.{}", MESSAGE_HANDLER))
}

/// Bridge script to inject, or `None` if it was built out of sync with the
/// protocol.
pub fn bridge_script() -> Option<&'static str> {
    if script_matches_protocol() {
        Some(BRIDGE_JS)
    } else {
        log::error!("Bridge script does not match the shell protocol");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_installs_receiver_and_handler() {
        assert!(bridge_script().is_some());
    }

    #[test]
    fn script_handles_every_command() {
        for command in ["SetTheme", "ExtractDocument", "Reload"] {
            assert!(BRIDGE_JS.contains(&format!("'{}'", command)), "{}", command);
        }
        assert!(BRIDGE_JS.contains("nightMode"));
    }

    #[test]
    fn loaded_document_serves_content() {
        let doc = LoadedDocument {
            title: "Notes".into(),
            markdown: "# Notes".into(),
            html: None,
        };
        assert_eq!(doc.extract_document_title().unwrap(), "Notes");
        assert_eq!(
            doc.extract_document_content(ContentFormat::Markdown).unwrap(),
            "# Notes"
        );
        assert!(doc.extract_document_content(ContentFormat::Html).is_err());
    }
}
