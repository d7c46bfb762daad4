//! Markdown to HTML conversion with presentation-oriented rewrites.
//!
//! The conversion runs pulldown-cmark and rewrites its event stream in
//! passes: soft breaks, links, tables, code blocks, headings. Each pass
//! replaces the affected events with raw [`Event::Html`] so the final
//! `push_html` emits the customized markup.

use maud::html;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use pulldown_cmark_escape::{escape_href, escape_html};
use url::Url;

use crate::config::MarkdownConfig;

/// Languages the client-side highlighter is known to handle. Anything
/// else is left unclassed so the highlighter falls back to auto-detection.
const KNOWN_LANGUAGES: &[&str] = &[
    "bash", "c", "cpp", "csharp", "css", "diff", "dockerfile", "go", "haskell", "html", "ini",
    "java", "javascript", "js", "json", "kotlin", "lua", "makefile", "markdown", "perl", "php",
    "plaintext", "python", "r", "ruby", "rust", "scala", "sh", "shell", "sql", "swift", "toml",
    "ts", "typescript", "xml", "yaml",
];

pub fn markdown_to_html(markdown: &str, config: &MarkdownConfig) -> String {
    let events: Vec<Event> = Parser::new_ext(markdown, parser_options(config)).collect();
    let events = rewrite_breaks(events, config);
    let events = rewrite_links(events);
    let events = rewrite_tables(events);
    let events = rewrite_code_blocks(events);
    let events = if config.heading_anchors {
        rewrite_headings(events)
    } else {
        events
    };

    let mut out = String::new();
    pulldown_cmark::html::push_html(&mut out, events.into_iter());
    out
}

fn parser_options(config: &MarkdownConfig) -> Options {
    let mut opts = Options::empty();
    if config.gfm {
        opts.insert(Options::ENABLE_TABLES);
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        opts.insert(Options::ENABLE_TASKLISTS);
        opts.insert(Options::ENABLE_FOOTNOTES);
    }
    opts.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    opts
}

fn rewrite_breaks<'a>(events: Vec<Event<'a>>, config: &MarkdownConfig) -> Vec<Event<'a>> {
    if !config.breaks {
        return events;
    }
    events
        .into_iter()
        .map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        })
        .collect()
}

/// Absolute URLs open in a new window and carry an external-link marker;
/// everything else is an internal link.
fn rewrite_links(events: Vec<Event>) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len());
    // matching end tags pop their entry
    let mut stack: Vec<bool> = Vec::new();
    for event in events {
        match event {
            Event::Start(Tag::Link {
                dest_url, title, ..
            }) => {
                let external = is_external(&dest_url);
                let mut tag = String::from("<a href=\"");
                let _ = escape_href(&mut tag, &dest_url);
                tag.push('"');
                if !title.is_empty() {
                    tag.push_str(" title=\"");
                    let _ = escape_html(&mut tag, &title);
                    tag.push('"');
                }
                if external {
                    tag.push_str(
                        " target=\"_blank\" rel=\"noopener noreferrer\" class=\"external-link\"",
                    );
                } else {
                    tag.push_str(" class=\"internal-link\"");
                }
                tag.push('>');
                stack.push(external);
                out.push(Event::Html(tag.into()));
            }
            Event::End(TagEnd::Link) => {
                let external = stack.pop().unwrap_or(false);
                let close = if external {
                    "<span class=\"external-link-icon\">\u{2197}</span></a>"
                } else {
                    "</a>"
                };
                out.push(Event::Html(close.into()));
            }
            other => out.push(other),
        }
    }
    out
}

fn is_external(dest: &str) -> bool {
    if dest.starts_with("//") {
        return true;
    }
    match Url::parse(dest) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

fn rewrite_tables(events: Vec<Event>) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len());
    for event in events {
        match event {
            Event::Start(Tag::Table(_)) => {
                out.push(Event::Html("<div class=\"table-wrapper\">".into()));
                out.push(event);
            }
            Event::End(TagEnd::Table) => {
                out.push(event);
                out.push(Event::Html("</div>".into()));
            }
            other => out.push(other),
        }
    }
    out
}

fn rewrite_code_blocks(events: Vec<Event>) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len());
    let mut iter = events.into_iter();
    while let Some(event) = iter.next() {
        let Event::Start(Tag::CodeBlock(kind)) = event else {
            out.push(event);
            continue;
        };
        let lang = match &kind {
            CodeBlockKind::Fenced(info) => {
                info.split(' ').next().unwrap_or_default().to_string()
            }
            CodeBlockKind::Indented => String::new(),
        };
        let mut code = String::new();
        for inner in iter.by_ref() {
            match inner {
                Event::End(TagEnd::CodeBlock) => break,
                Event::Text(text) => code.push_str(&text),
                _ => {}
            }
        }
        out.push(Event::Html(code_block_html(&lang, &code).into()));
    }
    out
}

fn code_block_html(lang: &str, code: &str) -> String {
    let label = if lang.is_empty() { "text" } else { lang };
    let language_class = recognized_language(lang).map(|l| format!("language-{l}"));
    html! {
        div class="code-block" {
            div class="code-header" {
                span class="language-tag" { (label) }
                button class="copy-btn" type="button" title="Copy code" { "Copy" }
            }
            pre {
                code class=[language_class] { (code) }
            }
        }
    }
    .into_string()
}

fn recognized_language(lang: &str) -> Option<&'static str> {
    KNOWN_LANGUAGES
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(lang))
}

/// Headings get a slugified `id` and an anchor link ahead of their text.
/// An explicit `{#id}` attribute wins over the derived slug.
fn rewrite_headings(events: Vec<Event>) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len());
    let mut iter = events.into_iter();
    while let Some(event) = iter.next() {
        let Event::Start(Tag::Heading { level, id, .. }) = event else {
            out.push(event);
            continue;
        };
        let mut inner = Vec::new();
        for e in iter.by_ref() {
            if matches!(e, Event::End(TagEnd::Heading(_))) {
                break;
            }
            inner.push(e);
        }
        let text: String = inner
            .iter()
            .filter_map(|e| match e {
                Event::Text(t) | Event::Code(t) => Some(t.as_ref()),
                _ => None,
            })
            .collect();
        let anchor = match id {
            Some(explicit) => explicit.to_string(),
            None => slugify(&text),
        };
        let n = level as usize;

        let mut open = format!("<h{n} id=\"");
        let _ = escape_html(&mut open, &anchor);
        open.push_str("\" class=\"heading-with-anchor\"><a href=\"#");
        let _ = escape_href(&mut open, &anchor);
        open.push_str(
            "\" class=\"anchor-link\" aria-label=\"Link to section\">\
             <span class=\"anchor-icon\">#</span></a>",
        );
        out.push(Event::Html(open.into()));
        out.extend(inner);
        out.push(Event::Html(format!("</h{n}>").into()));
    }
    out
}

/// Slugifies heading text for use as an anchor id: lower-cases, drops
/// characters outside letters/digits/hyphen/underscore, and collapses
/// whitespace runs to single hyphens.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
