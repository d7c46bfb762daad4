//! Directory scanning, the tree cache, and filename search.
//!
//! The scanner walks the configured root, keeps the resulting tree in a
//! time-gated cache, and answers substring searches against the cached
//! tree. The tree is rebuilt wholesale on every cache-expiry scan and
//! never mutated in place.

use std::cmp::Ordering;
use std::fs;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;

use crate::cache::BoundedCache;
use crate::config::Config;

/// Maximum number of results returned by [`Scanner::search`].
const SEARCH_RESULT_LIMIT: usize = 50;

/// Cache key under which the scanned tree is stored.
const TREE_CACHE_KEY: &str = "directory-tree";

/// One entry in the scanned hierarchy. Directories own their children.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TreeNode {
    #[serde(rename = "directory", rename_all = "camelCase")]
    Directory {
        name: String,
        /// Root-relative path, always `/`-separated.
        path: String,
        last_modified: u64,
        /// Whether this directory or any descendant holds a markdown file.
        has_markdown: bool,
        children: Vec<TreeNode>,
    },
    #[serde(rename = "file", rename_all = "camelCase")]
    File {
        name: String,
        path: String,
        last_modified: u64,
        size: u64,
    },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name, .. } | Self::File { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Directory { path, .. } | Self::File { path, .. } => path,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Directory { .. } => 0,
            Self::File { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
}

/// A matching entry from [`Scanner::search`], identifying a node without
/// carrying its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    pub path: String,
}

/// Owns the directory-tree cache; all reads and writes go through the
/// public operations below.
pub struct Scanner {
    config: Arc<Config>,
    cache: Mutex<BoundedCache<Arc<Vec<TreeNode>>>>,
}

impl Scanner {
    pub fn new(config: Arc<Config>) -> Self {
        let cache = Mutex::new(BoundedCache::new(config.cache.max_size));
        Self { config, cache }
    }

    /// Whether a file name carries one of the supported markdown extensions.
    pub fn is_markdown_supported(&self, filename: &str) -> bool {
        self.config.is_markdown(filename)
    }

    /// Scans the configured root from scratch, bypassing the cache.
    pub fn scan(&self) -> Vec<TreeNode> {
        scan_directory(&self.config, "")
    }

    /// Returns the cached tree while its age is below the configured
    /// maximum, otherwise rescans and replaces the cache entry.
    ///
    /// The lookup and the insert are separate critical sections: two
    /// concurrent misses may both scan and populate, which is accepted —
    /// both results are equivalent.
    pub fn tree(&self) -> Arc<Vec<TreeNode>> {
        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(TREE_CACHE_KEY) {
                let age = entry.stamp.elapsed().unwrap_or(Duration::MAX);
                if age < self.config.cache.max_age() {
                    return Arc::clone(&entry.value);
                }
            }
        }

        let tree = Arc::new(self.scan());
        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            TREE_CACHE_KEY.to_string(),
            Arc::clone(&tree),
            SystemTime::now(),
        );
        tree
    }

    /// Case-insensitive substring search over entry names in the cached
    /// tree, depth-first in encounter order. Queries shorter than two
    /// characters after trimming return nothing.
    ///
    /// A matching directory is emitted without its children, and its
    /// children are still searched.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        let trimmed = query.trim();
        if trimmed.chars().count() < 2 {
            return Vec::new();
        }
        let needle = trimmed.to_lowercase();
        let tree = self.tree();
        let mut results = Vec::new();
        search_in_tree(&tree, &needle, &mut results);
        results
    }

    /// Clears the tree cache entirely.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

fn search_in_tree(nodes: &[TreeNode], needle: &str, results: &mut Vec<SearchResult>) {
    for node in nodes {
        if results.len() >= SEARCH_RESULT_LIMIT {
            return;
        }
        match node {
            TreeNode::File { name, path, .. } => {
                if name.to_lowercase().contains(needle) {
                    results.push(SearchResult {
                        kind: NodeKind::File,
                        name: name.clone(),
                        path: path.clone(),
                    });
                }
            }
            TreeNode::Directory {
                name,
                path,
                children,
                ..
            } => {
                if name.to_lowercase().contains(needle) {
                    results.push(SearchResult {
                        kind: NodeKind::Directory,
                        name: name.clone(),
                        path: path.clone(),
                    });
                }
                search_in_tree(children, needle, results);
            }
        }
    }
}

/// Recursively lists `rel` under the configured root.
///
/// Dot-prefixed entries and names on the configured ignore list are
/// skipped. An unreadable directory yields an empty subtree instead of
/// failing the whole scan.
fn scan_directory(config: &Config, rel: &str) -> Vec<TreeNode> {
    let full = if rel.is_empty() {
        config.root_path.clone()
    } else {
        config.root_path.join(rel)
    };

    let entries = match fs::read_dir(&full) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("skipping unreadable directory {}: {err}", full.display());
            return Vec::new();
        }
    };

    let mut items = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry in {}: {err}", full.display());
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || config.ignored_names.iter().any(|ignored| ignored == &name) {
            continue;
        }

        let rel_path = if rel.is_empty() {
            name.clone()
        } else {
            format!("{rel}/{name}")
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("skipping {}: {err}", rel_path);
                continue;
            }
        };
        let last_modified = metadata.modified().map(unix_millis).unwrap_or_default();

        if metadata.is_dir() {
            let children = scan_directory(config, &rel_path);
            let has_markdown = subtree_has_markdown(&children);
            items.push(TreeNode::Directory {
                name,
                path: rel_path,
                last_modified,
                has_markdown,
                children,
            });
        } else if config.is_markdown(&name) {
            items.push(TreeNode::File {
                name,
                path: rel_path,
                last_modified,
                size: metadata.len(),
            });
        }
    }

    // Directories first, then numeric-aware alphabetical within each bucket
    items.sort_by(|a, b| {
        a.type_rank()
            .cmp(&b.type_rank())
            .then_with(|| natural_cmp(a.name(), b.name()))
    });
    items
}

fn subtree_has_markdown(children: &[TreeNode]) -> bool {
    children.iter().any(|node| match node {
        TreeNode::File { .. } => true,
        TreeNode::Directory { has_markdown, .. } => *has_markdown,
    })
}

pub(crate) fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Case-insensitive comparison with runs of digits compared numerically,
/// so "file2" sorts before "file10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let nx = take_number(&mut left);
                let ny = take_number(&mut right);
                match nx.cmp(&ny) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            (Some(x), Some(y)) => {
                let lx = x.to_ascii_lowercase();
                let ly = y.to_ascii_lowercase();
                match lx.cmp(&ly) {
                    Ordering::Equal => {
                        left.next();
                        right.next();
                    }
                    other => return other,
                }
            }
        }
    }
}

fn take_number(chars: &mut Peekable<Chars>) -> u128 {
    let mut value: u128 = 0;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = value.saturating_mul(10).saturating_add(u128::from(digit));
        chars.next();
    }
    value
}
