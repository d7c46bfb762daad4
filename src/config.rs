//! Process-wide configuration.
//!
//! Configuration is static for the lifetime of the process: it is resolved
//! once at startup (defaults, optionally overlaid with a YAML file and CLI
//! flags) and passed by reference into the components that need it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Markdown conversion toggles, passed through to the renderer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    /// Enable GitHub-flavoured extensions (tables, strikethrough, task
    /// lists, footnotes).
    pub gfm: bool,
    /// Render soft line breaks as `<br>`.
    pub breaks: bool,
    /// Attach slugified `id` attributes and anchor links to headings.
    pub heading_anchors: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            gfm: true,
            breaks: true,
            heading_anchors: true,
        }
    }
}

/// Limits shared by the tree cache and the render cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a cached directory tree stays valid, in seconds.
    pub max_age_secs: u64,
    /// Maximum number of entries per cache before oldest-first eviction.
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 300,
            max_size: 100,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory tree the server is allowed to browse.
    pub root_path: PathBuf,
    /// Port to listen on.
    pub port: u16,
    /// File extensions recognised as markdown, matched case-insensitively.
    pub extensions: Vec<String>,
    /// Entry names skipped during scanning, in addition to dot-prefixed
    /// entries which are always skipped.
    pub ignored_names: Vec<String>,
    /// Regex of paths the change watcher ignores.
    pub watch_ignore: String,
    /// Directory of static assets served for non-API routes, if any.
    pub static_dir: Option<PathBuf>,
    pub markdown: MarkdownConfig,
    pub cache: CacheConfig,
    /// Requests allowed per client address within one rate-limit window.
    pub rate_limit: u32,
    /// Width of the fixed rate-limit window, in seconds.
    pub rate_limit_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            port: 5001,
            extensions: [".md", ".markdown", ".mdown", ".mkd"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignored_names: vec!["node_modules".to_string()],
            watch_ignore: r"(^|/)(\.git|node_modules)(/|$)".to_string(),
            static_dir: Some(PathBuf::from("public")),
            markdown: MarkdownConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: 1000,
            rate_limit_window_secs: 900,
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file. Omitted fields fall back to
    /// their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Whether a file name carries one of the supported markdown extensions.
    pub fn is_markdown(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
