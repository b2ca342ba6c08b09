//! Detection of out-of-band configuration edits.
//!
//! The control loop only asks "did the file change since last time?". The
//! default answer comes from polling the modification time; [`FsWatcher`]
//! answers from filesystem notifications instead (inotify on Linux).

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use notify::{Event, EventHandler, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};

use crate::config::ConfigStore;

#[cfg(test)]
use mockall::automock;

/// Answers whether the configuration source changed since the last call.
#[cfg_attr(test, automock)]
pub trait ChangeDetector {
    fn poll_changed(&mut self) -> bool;
}

/// Modification-time poller. One `stat` per call.
#[derive(Debug)]
pub struct MtimePoller {
    store: ConfigStore,
    last_seen: Option<SystemTime>,
}

impl MtimePoller {
    /// Starts from the file's current modification time.
    pub fn new(store: ConfigStore) -> Self {
        let last_seen = store.modified();
        Self { store, last_seen }
    }
}

impl ChangeDetector for MtimePoller {
    fn poll_changed(&mut self) -> bool {
        self.store.poll_changed(&mut self.last_seen)
    }
}

/// Raises a flag for modify/create/remove events touching the config file.
#[derive(Debug)]
struct PendingFlag {
    config_path: PathBuf,
    pending: Arc<AtomicBool>,
}

impl EventHandler for PendingFlag {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        match event {
            Ok(event) => {
                let affects_config = event.paths.iter().any(|path| {
                    path == &self.config_path || path.file_name() == self.config_path.file_name()
                });
                let is_relevant = event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();

                if affects_config && is_relevant {
                    self.pending.store(true, Ordering::SeqCst);
                }
            }
            Err(e) => warn!("Filesystem watcher error: {e}"),
        }
    }
}

/// Filesystem-notification detector.
///
/// Watches the parent directory so that editors replacing the file through
/// rename are still noticed. The notify backend thread only sets a flag; the
/// control loop consumes it.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    pending: Arc<AtomicBool>,
}

impl FsWatcher {
    pub fn new(config_path: &Path) -> Result<Self> {
        let pending = Arc::new(AtomicBool::new(false));
        let handler = PendingFlag {
            config_path: config_path.to_path_buf(),
            pending: Arc::clone(&pending),
        };

        let mut watcher = recommended_watcher(handler).context("Failed to create file watcher")?;

        let watch_path = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(config_path);
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", watch_path.display()))?;
        info!("Watching directory: {}", watch_path.display());

        Ok(Self {
            _watcher: watcher,
            pending,
        })
    }
}

impl ChangeDetector for FsWatcher {
    fn poll_changed(&mut self) -> bool {
        let changed = self.pending.swap(false, Ordering::SeqCst);
        if changed {
            debug!("Filesystem event pending for config file");
        }
        changed
    }
}

/// Filesystem notifications when they can be set up, modification-time
/// polling otherwise (e.g. the configuration directory does not exist yet).
pub fn notify_or_poll(store: &ConfigStore) -> Box<dyn ChangeDetector> {
    match FsWatcher::new(store.path()) {
        Ok(watcher) => Box::new(watcher),
        Err(e) => {
            warn!("{e:#}; falling back to polling the modification time");
            Box::new(MtimePoller::new(store.clone()))
        }
    }
}
