//! Markdown to HTML conversion with diagram extraction.
//!
//! Fenced ```` ```mermaid ```` blocks are pulled out before the Markdown pass
//! and replaced by an inert token, so the converter never escapes or reflows
//! the diagram source.  After conversion each token becomes a diagram
//! container that [`DiagramRenderer`](crate::diagram::DiagramRenderer) picks
//! up later:
//!
//! ```text
//! <div class="mermaid" data-diagram-source="BASE64">escaped source</div>
//! ```

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream, html};
use regex::Regex;

/// Class carried by every diagram container.
pub const DIAGRAM_CLASS: &str = "mermaid";

/// Attribute holding the base64 diagram source.
pub const SOURCE_ATTRIBUTE: &str = "data-diagram-source";

static DIAGRAM_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```mermaid[ \t]*\r?\n(.*?)```").expect("diagram fence pattern is valid")
});

static RAW_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(/?)a(?:\s[^>]*)?>").expect("anchor pattern is valid")
});

static BARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://|www\.)[^\s<>]+").expect("url pattern is valid")
});

fn placeholder(index: usize) -> String {
    format!("ARIADIAGRAMBLOCK{index}PLACEHOLDER")
}

/// Diagram sources pulled out of a message, in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Text with every diagram block replaced by its token.
    pub text: String,
    /// Trimmed diagram sources; index `n` belongs to token `n`.
    pub diagrams: Vec<String>,
}

/// Replace every fenced diagram block with a positional token.
pub fn extract_diagrams(text: &str) -> Extracted {
    let mut diagrams = Vec::new();
    let text = DIAGRAM_FENCE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let index = diagrams.len();
            diagrams.push(caps[1].trim().to_string());
            // Blank lines on both sides make the token a paragraph of its own.
            format!("\n\n{}\n\n", placeholder(index))
        })
        .into_owned();
    Extracted { text, diagrams }
}

/// Render message text to an HTML fragment.
///
/// Raw HTML passes through, single newlines become `<br />`, and bare
/// `http(s)://` and `www.` URLs outside code and links become anchors.
pub fn render(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let extracted = extract_diagrams(text);
    let mut out = markdown_to_html(&extracted.text);
    for (index, source) in extracted.diagrams.iter().enumerate() {
        let token = placeholder(index);
        let container = diagram_container(source);
        let wrapped = format!("<p>{token}</p>");
        if out.contains(&wrapped) {
            out = out.replace(&wrapped, &container);
        } else {
            out = out.replace(&token, &container);
        }
    }
    out
}

/// The container element for one diagram source.
pub fn diagram_container(source: &str) -> String {
    format!(
        r#"<div class="{DIAGRAM_CLASS}" {SOURCE_ATTRIBUTE}="{}">{}</div>"#,
        BASE64.encode(source.as_bytes()),
        escape_html(source)
    )
}

fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = TextMergeStream::new(Parser::new_ext(text, options));
    let mut events = Vec::new();
    let mut link_depth = 0usize;
    let mut in_code_block = false;

    for event in parser {
        match event {
            Event::Start(Tag::Link { .. }) | Event::Start(Tag::Image { .. }) => {
                link_depth += 1;
                events.push(event);
            }
            Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
                link_depth = link_depth.saturating_sub(1);
                events.push(event);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
                events.push(event);
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                events.push(event);
            }
            Event::Html(ref raw) | Event::InlineHtml(ref raw) => {
                for tag in RAW_ANCHOR.captures_iter(raw) {
                    if tag[1].is_empty() {
                        link_depth += 1;
                    } else {
                        link_depth = link_depth.saturating_sub(1);
                    }
                }
                events.push(event);
            }
            Event::SoftBreak => events.push(Event::HardBreak),
            Event::Text(text) if link_depth == 0 && !in_code_block => {
                autolink(text, &mut events);
            }
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

fn autolink<'a>(text: CowStr<'a>, events: &mut Vec<Event<'a>>) {
    if !BARE_URL.is_match(&text) {
        events.push(Event::Text(text));
        return;
    }
    let mut last = 0;
    for found in BARE_URL.find_iter(&text) {
        let url = found
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\'', '"']);
        if url.is_empty() {
            continue;
        }
        let start = found.start();
        let end = start + url.len();
        if start > last {
            events.push(Event::Text(CowStr::from(text[last..start].to_string())));
        }
        let href = if url.starts_with("www.") {
            format!("http://{url}")
        } else {
            url.to_string()
        };
        events.push(Event::InlineHtml(CowStr::from(format!(
            r#"<a href="{}">{}</a>"#,
            escape_html(&href),
            escape_html(url)
        ))));
        last = end;
    }
    if last < text.len() {
        events.push(Event::Text(CowStr::from(text[last..].to_string())));
    }
}

/// Escape text for use in HTML content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
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

/// Reverse [`escape_html`], plus the common named and numeric entities.
pub fn unescape_html(text: &str) -> String {
    static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("entity pattern is valid")
    });
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ if name.starts_with('#') => name[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Decode the source carried by a container's `data-diagram-source` value.
pub fn decode_source(attribute: &str) -> Option<String> {
    let bytes = BASE64.decode(attribute.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW: &str = "graph TD\n  A[Start] --> B{Is it?}\n  B -->|Yes| C[OK]";

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(render(""), "");
        assert_eq!(render("  \n "), "");
    }

    #[test]
    fn extracts_blocks_in_order() {
        let text = format!("Intro\n```mermaid\n{FLOW}\n```\nmiddle\n```mermaid\npie\n  \"a\" : 1\n```\n");
        let extracted = extract_diagrams(&text);
        assert_eq!(extracted.diagrams.len(), 2);
        assert_eq!(extracted.diagrams[0], FLOW);
        assert!(extracted.diagrams[1].starts_with("pie"));
        assert!(extracted.text.contains("ARIADIAGRAMBLOCK0PLACEHOLDER"));
        assert!(extracted.text.contains("ARIADIAGRAMBLOCK1PLACEHOLDER"));
        assert!(!extracted.text.contains("```"));
    }

    #[test]
    fn diagram_becomes_container_with_recoverable_source() {
        let html = render(&format!("Look:\n\n```mermaid\n{FLOW}\n```\n\nDone."));
        assert!(!html.contains("PLACEHOLDER"));
        assert!(!html.contains("<p><div"));
        assert_eq!(html.matches(r#"<div class="mermaid""#).count(), 1);
        // The arrow and braces survive as escaped text, not Markdown.
        assert!(html.contains("A[Start] --&gt; B{Is it?}"));

        let start = html.find(r#"data-diagram-source=""#).unwrap() + r#"data-diagram-source=""#.len();
        let end = start + html[start..].find('"').unwrap();
        assert_eq!(decode_source(&html[start..end]).unwrap(), FLOW);
    }

    #[test]
    fn diagram_without_blank_lines_is_still_extracted() {
        let html = render(&format!("text before\n```mermaid\n{FLOW}\n```\ntext after"));
        assert_eq!(html.matches(r#"class="mermaid""#).count(), 1);
        assert!(html.contains("text before"));
        assert!(html.contains("text after"));
    }

    #[test]
    fn newlines_become_breaks() {
        assert_eq!(render("one\ntwo"), "<p>one<br />\ntwo</p>\n");
    }

    #[test]
    fn raw_html_passes_through() {
        let html = render("<kbd>Ctrl</kbd> + C");
        assert!(html.contains("<kbd>Ctrl</kbd>"));
    }

    #[test]
    fn bare_urls_are_linked() {
        let html = render("See https://example.com/docs. Or www.rust-lang.org");
        assert!(html.contains(r#"<a href="https://example.com/docs">https://example.com/docs</a>."#));
        assert!(html.contains(r#"<a href="http://www.rust-lang.org">www.rust-lang.org</a>"#));
    }

    #[test]
    fn urls_in_code_and_links_are_left_alone() {
        let html = render("`https://a.example` and [site](https://b.example)\n\n```\nhttps://c.example\n```");
        assert!(html.contains("<code>https://a.example</code>"));
        assert_eq!(html.matches("<a ").count(), 1);
        assert!(html.contains("https://c.example\n</code></pre>"));
    }

    #[test]
    fn urls_inside_raw_anchors_are_left_alone() {
        let html = render(r#"<a href="https://x.io">https://x.io</a> then https://y.io"#);
        assert_eq!(html.matches("<a ").count(), 2);
        assert!(html.contains(r#"<a href="https://x.io">https://x.io</a>"#));
        assert!(html.contains(r#"<a href="https://y.io">https://y.io</a>"#));
        assert!(!html.contains("</a></a>"));
    }

    #[test]
    fn other_fences_are_code_blocks() {
        let html = render("```rust\nfn main() {}\n```");
        assert!(html.contains(r#"<pre><code class="language-rust">"#));
        assert!(!html.contains("mermaid"));
    }

    #[test]
    fn tables_render() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>2</td>"));
    }

    #[test]
    fn escape_round_trip() {
        let text = r#"<a href="x">'&'</a>"#;
        assert_eq!(unescape_html(&escape_html(text)), text);
        assert_eq!(unescape_html("&#65;&#x42;&bogus;"), "AB&bogus;");
    }
}
