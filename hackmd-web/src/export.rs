use std::path::{Path, PathBuf};

use hackmd_core::storage::write_atomic;

use crate::bridge::DocumentSource;
use crate::markdown::{extract_title, render_markdown};
use crate::protocol::ContentFormat;

/// Fallback file name stem for documents without a usable title.
pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    Markdown,
    Html,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Pdf, ExportFormat::Markdown, ExportFormat::Html];

    /// Name accepted by `from_name`.
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Html => "html",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "PDF Document",
            ExportFormat::Markdown => "Markdown",
            ExportFormat::Html => "HTML",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::Html => "text/html",
        }
    }

    pub fn save_panel_title(&self) -> String {
        format!("Save as {}", self.display_name())
    }

    /// Parse the lowercase name or extension used by the host
    /// (`pdf`, `markdown`/`md`, `html`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pdf" => Some(ExportFormat::Pdf),
            "markdown" | "md" => Some(ExportFormat::Markdown),
            "html" | "htm" => Some(ExportFormat::Html),
            _ => None,
        }
    }
}

/// Renders a standalone HTML document to PDF. Backed by the host web
/// engine.
pub trait PdfRenderer {
    fn render_pdf(&self, html: &str) -> Result<Vec<u8>, String>;
}

/// Default file name for saving `title` as `format`.
pub fn suggested_file_name(title: &str, format: ExportFormat) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let stem = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let stem = stem.trim_matches('.');
    let stem = if stem.is_empty() { UNTITLED } else { stem };
    format!("{}.{}", stem, format.file_extension())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Wrap rendered note HTML in a print-friendly standalone document.
pub fn styled_document(title: &str, body_html: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
    line-height: 1.6;
    padding: 20px;
    max-width: 800px;
    margin: 0 auto;
}}
h1, h2, h3, h4, h5, h6 {{
    margin-top: 24px;
    margin-bottom: 16px;
    font-weight: 600;
    line-height: 1.25;
}}
h1 {{ font-size: 2em; margin-top: 0; }}
h2 {{ font-size: 1.5em; }}
h3 {{ font-size: 1.25em; }}
a {{ color: #0366d6; text-decoration: none; }}
img {{ max-width: 100%; }}
pre, code {{
    font-family: SFMono-Regular, Consolas, "Liberation Mono", Menlo, Courier, monospace;
    background-color: #f6f8fa;
    border-radius: 3px;
    padding: 0.2em 0.4em;
    font-size: 85%;
}}
pre {{ padding: 16px; overflow: auto; line-height: 1.45; }}
pre code {{ background-color: transparent; padding: 0; }}
blockquote {{ border-left: 0.25em solid #dfe2e5; padding: 0 1em; color: #6a737d; }}
table {{ border-collapse: collapse; width: 100%; margin-bottom: 16px; }}
table th, table td {{ padding: 6px 13px; border: 1px solid #dfe2e5; }}
table tr:nth-child(2n) {{ background-color: #f6f8fa; }}
@media print {{
    body {{ padding: 0; max-width: none; }}
    pre {{ white-space: pre-wrap; }}
}}
</style>
</head>
<body>
{body}
</body>
</html>"#,
        title = escape_html(title),
        body = body_html,
    )
}

/// Styled HTML export of a markdown note.
pub fn render_export_html(title: &str, markdown: &str) -> String {
    styled_document(title, &render_markdown(markdown))
}

/// Export the document behind `source` to `dest` and return the path
/// written.
///
/// The title comes from the page, falling back to the note source and
/// then to "Untitled". A `renderer` is only required for PDF.
pub fn export_document(
    source: &dyn DocumentSource,
    format: ExportFormat,
    renderer: Option<&dyn PdfRenderer>,
    dest: &Path,
) -> Result<PathBuf, String> {
    let markdown = source.extract_document_content(ContentFormat::Markdown)?;
    let title = match source.extract_document_title() {
        Ok(t) if !t.trim().is_empty() => t.trim().to_string(),
        Ok(_) => extract_title(&markdown).unwrap_or_else(|| UNTITLED.to_string()),
        Err(e) => {
            log::debug!("No page title, deriving from content: {}", e);
            extract_title(&markdown).unwrap_or_else(|| UNTITLED.to_string())
        }
    };

    let bytes = match format {
        ExportFormat::Markdown => markdown.into_bytes(),
        ExportFormat::Html => render_export_html(&title, &markdown).into_bytes(),
        ExportFormat::Pdf => {
            let renderer =
                renderer.ok_or_else(|| "PDF export is not available".to_string())?;
            renderer.render_pdf(&render_export_html(&title, &markdown))?
        }
    };

    write_atomic(dest, &bytes)?;
    log::info!(
        "Exported '{}' as {} to {}",
        title,
        format.display_name(),
        dest.display()
    );
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LoadedDocument;

    struct EchoRenderer;

    impl PdfRenderer for EchoRenderer {
        fn render_pdf(&self, html: &str) -> Result<Vec<u8>, String> {
            let mut out = b"%PDF-".to_vec();
            out.extend_from_slice(html.as_bytes());
            Ok(out)
        }
    }

    fn doc(title: &str) -> LoadedDocument {
        LoadedDocument {
            title: title.into(),
            markdown: "# Plan\n\n- [ ] ship\n".into(),
            html: None,
        }
    }

    #[test]
    fn format_metadata() {
        assert_eq!(ExportFormat::Markdown.file_extension(), "md");
        assert_eq!(ExportFormat::Pdf.display_name(), "PDF Document");
        assert_eq!(ExportFormat::Html.mime_type(), "text/html");
        assert_eq!(ExportFormat::Pdf.save_panel_title(), "Save as PDF Document");
        assert_eq!(ExportFormat::from_name("MD"), Some(ExportFormat::Markdown));
        assert_eq!(ExportFormat::from_name("docx"), None);
        for format in ExportFormat::ALL {
            assert_eq!(ExportFormat::from_name(format.name()), Some(format));
        }
    }

    #[test]
    fn file_names_are_cleaned() {
        assert_eq!(
            suggested_file_name("Plan: Q3/Q4  draft", ExportFormat::Markdown),
            "Plan Q3 Q4 draft.md"
        );
        assert_eq!(suggested_file_name("   ", ExportFormat::Pdf), "Untitled.pdf");
        assert_eq!(suggested_file_name("..", ExportFormat::Html), "Untitled.html");
    }

    #[test]
    fn styled_document_escapes_title() {
        let html = styled_document("<b>x</b>", "<p>body</p>");
        assert!(html.contains("<title>&lt;b&gt;x&lt;/b&gt;</title>"));
        assert!(html.contains("<p>body</p>"));
    }

    #[test]
    fn exports_markdown_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("plan.md");
        let written =
            export_document(&doc("Plan"), ExportFormat::Markdown, None, &dest).unwrap();
        assert_eq!(written, dest);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "# Plan\n\n- [ ] ship\n");
    }

    #[test]
    fn exports_html_with_fallback_title() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("plan.html");
        export_document(&doc(""), ExportFormat::Html, None, &dest).unwrap();
        let html = std::fs::read_to_string(&dest).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Plan</title>"));
        assert!(html.contains("<h1>Plan</h1>"));
    }

    #[test]
    fn pdf_needs_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("plan.pdf");
        assert!(export_document(&doc("Plan"), ExportFormat::Pdf, None, &dest).is_err());
        assert!(!dest.exists());

        export_document(&doc("Plan"), ExportFormat::Pdf, Some(&EchoRenderer), &dest).unwrap();
        assert!(std::fs::read(&dest).unwrap().starts_with(b"%PDF-"));
    }
}
