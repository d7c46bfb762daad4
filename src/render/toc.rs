//! Table of contents extraction from rendered HTML.

use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;

/// One heading of the rendered document, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub level: u8,
    pub id: String,
    pub text: String,
}

/// Collects headings carrying an `id` attribute from rendered HTML.
///
/// Nested markup is flattened to plain text; the `#` anchor affordance
/// injected by the heading renderer is not part of the text.
pub fn extract_table_of_contents(html: &str) -> Vec<TocEntry> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("h1[id], h2[id], h3[id], h4[id], h5[id], h6[id]")
        .expect("heading selector is valid");

    fragment
        .select(&selector)
        .map(|heading| {
            let name = heading.value().name();
            let level = name.as_bytes()[1] - b'0';
            let id = heading.value().attr("id").unwrap_or_default().to_string();
            TocEntry {
                level,
                id,
                text: heading_text(heading),
            }
        })
        .collect()
}

/// Text content of a heading, skipping the anchor-link element.
fn heading_text(heading: ElementRef) -> String {
    let mut out = String::new();
    for child in heading.children() {
        if let Some(element) = ElementRef::wrap(child) {
            let is_anchor = element
                .value()
                .attr("class")
                .is_some_and(|classes| classes.split_whitespace().any(|c| c == "anchor-link"));
            if is_anchor {
                continue;
            }
            for text in element.text() {
                out.push_str(text);
            }
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
    out.trim().to_string()
}
