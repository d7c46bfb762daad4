//! Filesystem change watching.
//!
//! The watcher observes the root recursively on a dedicated thread with a
//! debounce, filters events down to markdown files, and delivers typed
//! events to registered listeners. Listener failures are logged and never
//! propagate to the watcher or to other listeners.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebouncedEventKind, Debouncer, new_debouncer};
use regex::Regex;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// What happened to a markdown file under the watched root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Changed,
    Removed,
}

impl WatchEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "fileAdded",
            Self::Changed => "fileChanged",
            Self::Removed => "fileDeleted",
        }
    }
}

/// Payload delivered to listeners. `path` is relative to the watched root.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

type Listener = Box<dyn Fn(&WatchEvent) -> Result<()> + Send + Sync>;

/// Handle returned by [`Watcher::add_listener`], used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub struct Watcher {
    config: Arc<Config>,
    listeners: Arc<Mutex<Vec<(ListenerId, Listener)>>>,
    next_listener_id: AtomicU64,
    active: Mutex<Option<Debouncer<RecommendedWatcher>>>,
}

impl Watcher {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    /// Begins recursive observation of the root. Calling while already
    /// active is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            return Ok(());
        }

        let ignore =
            Regex::new(&self.config.watch_ignore).map_err(|source| Error::IgnorePattern {
                pattern: self.config.watch_ignore.clone(),
                source,
            })?;

        // watch the canonical root so emitted paths strip back to
        // root-relative form
        let root = self
            .config
            .root_path
            .canonicalize()
            .unwrap_or_else(|_| self.config.root_path.clone());

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer =
            new_debouncer(DEBOUNCE, tx).map_err(|source| Error::Watch { source })?;
        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| Error::Watch { source })?;

        let config = Arc::clone(&self.config);
        let listeners = Arc::clone(&self.listeners);

        std::thread::spawn(move || {
            // Tracks markdown paths this watcher has observed, to tell
            // additions apart from changes.
            let mut seen: HashSet<PathBuf> = HashSet::new();
            loop {
                match rx.recv() {
                    Ok(Ok(events)) => {
                        for event in events {
                            if !matches!(event.kind, DebouncedEventKind::Any) {
                                continue;
                            }
                            if ignore.is_match(&event.path.to_string_lossy()) {
                                continue;
                            }
                            let Some(name) = event.path.file_name().and_then(|n| n.to_str())
                            else {
                                continue;
                            };
                            if !config.is_markdown(name) {
                                continue;
                            }
                            let Ok(rel) = event.path.strip_prefix(&root) else {
                                continue;
                            };
                            let rel = rel.to_path_buf();
                            let kind = if event.path.exists() {
                                if seen.insert(rel.clone()) {
                                    WatchEventKind::Added
                                } else {
                                    WatchEventKind::Changed
                                }
                            } else {
                                seen.remove(&rel);
                                WatchEventKind::Removed
                            };
                            notify_listeners(&listeners, &WatchEvent { kind, path: rel });
                        }
                    }
                    Ok(Err(err)) => warn!("watch error: {err:?}"),
                    Err(_) => break,
                }
            }
        });

        *active = Some(debouncer);
        info!("watching {} for changes", self.config.root_path.display());
        Ok(())
    }

    /// Tears down observation. The watcher thread exits once its channel
    /// closes. Idempotent.
    pub fn stop(&self) {
        if self.active.lock().unwrap().take().is_some() {
            info!("stopped watching {}", self.config.root_path.display());
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }
}

fn notify_listeners(listeners: &Mutex<Vec<(ListenerId, Listener)>>, event: &WatchEvent) {
    for (id, listener) in listeners.lock().unwrap().iter() {
        if let Err(err) = listener(event) {
            warn!("watch listener {id:?} failed: {err}");
        }
    }
}
