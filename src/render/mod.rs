//! Markdown rendering and the per-file render cache.
//!
//! Rendered HTML is cached per relative path and revalidated against the
//! source file's modification time: a cached entry whose stored mtime is
//! at least the file's current mtime is served unchanged.

pub mod html;
pub mod toc;

pub use toc::{TocEntry, extract_table_of_contents};

use std::fs;
use std::sync::{Arc, Mutex};

use maud::{Markup, PreEscaped, html};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::cache::BoundedCache;
use crate::config::Config;
use crate::error::{Error, Result};

/// Characters escaped in breadcrumb href path segments.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// Owns the per-file render cache; all reads and writes go through the
/// public operations below.
pub struct Renderer {
    config: Arc<Config>,
    cache: Mutex<BoundedCache<String>>,
}

impl Renderer {
    pub fn new(config: Arc<Config>) -> Self {
        let cache = Mutex::new(BoundedCache::new(config.cache.max_size));
        Self { config, cache }
    }

    /// Renders the markdown file at `rel_path` (relative to the root) to
    /// HTML wrapped with breadcrumb navigation.
    ///
    /// Stat and read errors propagate to the caller; there is no retry.
    /// A file that exists but is not valid UTF-8 renders as an inline
    /// error fragment instead of failing the request.
    pub fn render_file(&self, rel_path: &str) -> Result<String> {
        let full = self.config.root_path.join(rel_path);
        let metadata = fs::metadata(&full).map_err(|e| Error::from_io(&full, e))?;
        let mtime = metadata.modified().map_err(|e| Error::from_io(&full, e))?;

        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(rel_path) {
                if entry.stamp >= mtime {
                    return Ok(entry.value.clone());
                }
            }
        }

        let bytes = fs::read(&full).map_err(|e| Error::from_io(&full, e))?;
        let body = match String::from_utf8(bytes) {
            Ok(text) => html::markdown_to_html(&text, &self.config.markdown),
            Err(_) => error_fragment("file is not valid UTF-8 text").into_string(),
        };
        let page = wrap_with_breadcrumbs(&body, rel_path).into_string();

        let mut cache = self.cache.lock().unwrap();
        cache.insert(rel_path.to_string(), page.clone(), mtime);
        Ok(page)
    }

    /// Drops one cache entry by relative path, or everything.
    pub fn invalidate(&self, rel_path: Option<&str>) {
        let mut cache = self.cache.lock().unwrap();
        match rel_path {
            Some(path) => {
                cache.remove(path);
            }
            None => cache.clear(),
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

/// Wraps rendered content with the breadcrumb trail and file metadata
/// hooks the browser UI relies on.
fn wrap_with_breadcrumbs(body: &str, rel_path: &str) -> Markup {
    html! {
        div class="markdown-content" data-file-path=(rel_path) {
            nav class="breadcrumbs" aria-label="File location" {
                (breadcrumbs(rel_path))
            }
            div class="content-body" {
                (PreEscaped(body))
            }
        }
    }
}

/// Each path segment is a link except the last, which is the current file.
fn breadcrumbs(rel_path: &str) -> Markup {
    let segments: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
    html! {
        a class="breadcrumb-link" href="/" { "Home" }
        @for (i, segment) in segments.iter().enumerate() {
            span class="breadcrumb-separator" { "/" }
            @if i + 1 == segments.len() {
                span class="breadcrumb-item current" { (segment) }
            } @else {
                a class="breadcrumb-link" href=(segment_href(&segments[..=i])) { (segment) }
            }
        }
    }
}

fn segment_href(segments: &[&str]) -> String {
    let encoded: Vec<String> = segments
        .iter()
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect();
    format!("/api/file/{}", encoded.join("/"))
}

fn error_fragment(message: &str) -> Markup {
    html! {
        div class="error" { "Error rendering markdown: " (message) }
    }
}
