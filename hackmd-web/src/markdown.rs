use pulldown_cmark::{Options, Parser};
use regex::Regex;
use std::sync::OnceLock;

/// Render note markdown to sanitized HTML.
///
/// Enables the GitHub-flavoured extensions HackMD notes rely on (tables,
/// strikethrough, task lists). Raw HTML in the source passes through
/// ammonia, so scripts and event handlers never reach exported files.
pub fn render_markdown(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(source, options);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);

    ammonia::Builder::default()
        .add_tags(&["input"])
        .add_tag_attributes("input", &["type", "checked", "disabled"])
        .clean(&html)
        .to_string()
}

fn front_matter_title() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^title:\s*(.+?)\s*$").ok())
        .as_ref()
}

fn first_heading() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t#]*$").ok())
        .as_ref()
}

/// Title of a note: the YAML front matter `title:` if present, otherwise
/// the first level-one heading.
pub fn extract_title(source: &str) -> Option<String> {
    if let Some(rest) = source.strip_prefix("---\n") {
        if let Some(end) = rest.find("\n---") {
            let front = &rest[..end];
            if let Some(caps) = front_matter_title()?.captures(front) {
                let title = caps[1].trim_matches(|c: char| c == '"' || c == '\'').trim();
                if !title.is_empty() {
                    return Some(title.to_string());
                }
            }
        }
    }

    first_heading()?
        .captures(source)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty())
}
