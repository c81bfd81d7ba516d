use serde::{Deserialize, Serialize};

/// Name of the script message handler the page posts events to
/// (`window.webkit.messageHandlers.hackmd`).
pub const MESSAGE_HANDLER: &str = "hackmd";

/// Global function installed by the bridge script that receives commands.
pub const RECEIVE_FUNCTION: &str = "hackmdReceiveCommand";

// ---------------------------------------------------------------------------
// Commands: Rust → page (sent via evaluate_javascript)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShellCommand {
    SetTheme {
        dark: bool,
    },
    /// Ask the page for the current document. Answered with
    /// `DocumentExtracted` or `ExtractionFailed` carrying the same id.
    ExtractDocument {
        request_id: u64,
        format: ContentFormat,
    },
    Reload,
}

/// Representation requested from the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Editor source.
    Markdown,
    /// Rendered view.
    Html,
}

impl ShellCommand {
    /// Script that delivers this command to the page.
    pub fn to_script(&self) -> Result<String, String> {
        let json = serde_json::to_string(self)
            .map_err(|e| format!("Failed to serialize ShellCommand: {}", e))?;
        // Escape for embedding in a JS string literal
        let escaped = json
            .replace('\\', "\\\\")
            .replace('\'', "\\'")
            .replace('\u{2028}', "\\u2028")
            .replace('\u{2029}', "\\u2029");
        Ok(format!("{}('{}')", RECEIVE_FUNCTION, escaped))
    }
}

// ---------------------------------------------------------------------------
// Events: page → Rust (sent via postMessage)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageEvent {
    Ready,
    NavigationFinished {
        url: String,
        #[serde(default)]
        title: String,
    },
    TitleChanged {
        title: String,
    },
    DocumentExtracted {
        request_id: u64,
        #[serde(default)]
        title: String,
        content: String,
    },
    ExtractionFailed {
        request_id: u64,
        message: String,
    },
}

impl PageEvent {
    pub fn parse(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid page event: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_tagged() {
        let json = serde_json::to_value(ShellCommand::ExtractDocument {
            request_id: 7,
            format: ContentFormat::Markdown,
        })
        .unwrap();
        assert_eq!(json["type"], "ExtractDocument");
        assert_eq!(json["request_id"], 7);
        assert_eq!(json["format"], "markdown");
    }

    #[test]
    fn script_calls_receiver() {
        let script = ShellCommand::SetTheme { dark: true }.to_script().unwrap();
        assert_eq!(
            script,
            r#"hackmdReceiveCommand('{"type":"SetTheme","dark":true}')"#
        );
        assert_eq!(
            ShellCommand::Reload.to_script().unwrap(),
            r#"hackmdReceiveCommand('{"type":"Reload"}')"#
        );
    }

    #[test]
    fn parses_page_events() {
        assert_eq!(
            PageEvent::parse(r#"{"type":"Ready"}"#).unwrap(),
            PageEvent::Ready
        );
        assert_eq!(
            PageEvent::parse(r#"{"type":"NavigationFinished","url":"https://hackmd.io/a"}"#)
                .unwrap(),
            PageEvent::NavigationFinished {
                url: "https://hackmd.io/a".into(),
                title: String::new(),
            }
        );
        match PageEvent::parse(
            r##"{"type":"DocumentExtracted","request_id":3,"title":"T","content":"# T"}"##,
        )
        .unwrap()
        {
            PageEvent::DocumentExtracted {
                request_id,
                content,
                ..
            } => {
                assert_eq!(request_id, 3);
                assert_eq!(content, "# T");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_events() {
        assert!(PageEvent::parse(r#"{"type":"Nope"}"#).is_err());
        assert!(PageEvent::parse("not json").is_err());
    }
}
