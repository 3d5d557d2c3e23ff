//! Concurrent discovery of leftover files across several roots.
//!
//! One traversal thread per root walks its tree depth-first and publishes
//! every matching file into a shared unbounded channel as soon as it is seen.
//! [`Discovery`] is the consuming side: it yields paths while any traversal is
//! still running and ends once the channel is drained and every traversal has
//! finished.
//!
//! Failure containment:
//! - a root that is missing or not a directory is skipped before any thread starts
//! - a directory that cannot be listed skips only its own subtree
//! - an unreadable entry skips only that entry

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use serde::Serialize;

use crate::core::config::DiscoveryConfig;
use crate::core::errors::Result;
use crate::scanner::pattern::FilePattern;

/// Discovery parameters with the pattern already compiled.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub roots: Vec<PathBuf>,
    pub pattern: FilePattern,
    pub follow_symlinks: bool,
    pub max_depth: usize,
    /// How long the consumer blocks on an empty queue before re-checking.
    pub poll_interval: Duration,
}

impl DiscoveryOptions {
    /// Defaults for everything but roots and pattern.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, pattern: FilePattern) -> Self {
        let defaults = DiscoveryConfig::default();
        Self {
            roots,
            pattern,
            follow_symlinks: defaults.follow_symlinks,
            max_depth: defaults.max_depth,
            poll_interval: Duration::from_millis(defaults.poll_interval_ms),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        Ok(Self {
            roots: config.effective_roots(),
            pattern: FilePattern::new(&config.pattern, config.case_insensitive)?,
            follow_symlinks: config.follow_symlinks,
            max_depth: config.max_depth,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        })
    }
}

/// Counters shared by every traversal thread of one discovery run.
#[derive(Debug, Default)]
pub struct DiscoveryStats {
    roots_skipped: AtomicUsize,
    directories_visited: AtomicUsize,
    directories_skipped: AtomicUsize,
    files_matched: AtomicUsize,
}

/// Point-in-time copy of [`DiscoveryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryStatsSnapshot {
    pub roots_skipped: usize,
    pub directories_visited: usize,
    pub directories_skipped: usize,
    pub files_matched: usize,
}

impl DiscoveryStats {
    #[must_use]
    pub fn snapshot(&self) -> DiscoveryStatsSnapshot {
        DiscoveryStatsSnapshot {
            roots_skipped: self.roots_skipped.load(Ordering::Relaxed),
            directories_visited: self.directories_visited.load(Ordering::Relaxed),
            directories_skipped: self.directories_skipped.load(Ordering::Relaxed),
            files_matched: self.files_matched.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Walks a fixed set of roots for files matching one pattern.
#[derive(Debug, Clone)]
pub struct FileDiscoverer {
    options: DiscoveryOptions,
}

impl FileDiscoverer {
    #[must_use]
    pub fn new(options: DiscoveryOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        Ok(Self::new(DiscoveryOptions::from_config(config)?))
    }

    #[must_use]
    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Start one traversal thread per usable root and return the stream.
    ///
    /// Never fails: unusable roots are counted in
    /// [`DiscoveryStats`] and otherwise ignored.
    #[must_use]
    pub fn discover(&self) -> Discovery {
        let (tx, rx) = channel::unbounded::<PathBuf>();
        let stats = Arc::new(DiscoveryStats::default());
        let active = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for (index, root) in self.options.roots.iter().enumerate() {
            if !fs::metadata(root).is_ok_and(|meta| meta.is_dir()) {
                DiscoveryStats::bump(&stats.roots_skipped);
                continue;
            }

            let task = Traversal {
                pattern: self.options.pattern.clone(),
                follow_symlinks: self.options.follow_symlinks,
                max_depth: self.options.max_depth,
                tx: tx.clone(),
                stats: Arc::clone(&stats),
            };
            let root = root.clone();
            let thread_active = Arc::clone(&active);

            active.fetch_add(1, Ordering::AcqRel);
            let spawned = thread::Builder::new()
                .name(format!("wcff-discover-{index}"))
                .spawn(move || {
                    task.visit(&root, 0);
                    thread_active.fetch_sub(1, Ordering::AcqRel);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(_) => {
                    active.fetch_sub(1, Ordering::AcqRel);
                    DiscoveryStats::bump(&stats.roots_skipped);
                }
            }
        }

        // Only the traversal threads hold senders from here on, so the
        // channel disconnects exactly when the last traversal finishes.
        drop(tx);

        Discovery {
            rx,
            active,
            stats,
            handles,
            poll_interval: self.options.poll_interval,
            started: Instant::now(),
        }
    }
}

/// Discover `pattern` matches under `roots` with default options.
#[must_use]
pub fn discover(roots: &[PathBuf], pattern: &FilePattern) -> Discovery {
    FileDiscoverer::new(DiscoveryOptions::new(roots.to_vec(), pattern.clone())).discover()
}

/// Lazy stream of discovered paths.
///
/// Dropping it early stops the traversals at their next publish.
#[derive(Debug)]
pub struct Discovery {
    rx: channel::Receiver<PathBuf>,
    active: Arc<AtomicUsize>,
    stats: Arc<DiscoveryStats>,
    handles: Vec<JoinHandle<()>>,
    poll_interval: Duration,
    started: Instant,
}

impl Discovery {
    /// Live counters; keep reading after the stream ends for final totals.
    #[must_use]
    pub fn stats(&self) -> Arc<DiscoveryStats> {
        Arc::clone(&self.stats)
    }

    /// Traversal threads still running.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn finish(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Iterator for Discovery {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            match self.rx.recv_timeout(self.poll_interval) {
                Ok(path) => return Some(path),
                Err(channel::RecvTimeoutError::Timeout) => {
                    if self.active.load(Ordering::Acquire) == 0 && self.rx.is_empty() {
                        self.finish();
                        return None;
                    }
                }
                Err(channel::RecvTimeoutError::Disconnected) => {
                    self.finish();
                    return None;
                }
            }
        }
    }
}

/// State owned by one traversal thread.
struct Traversal {
    pattern: FilePattern,
    follow_symlinks: bool,
    max_depth: usize,
    tx: channel::Sender<PathBuf>,
    stats: Arc<DiscoveryStats>,
}

impl Traversal {
    /// Files of `dir` first, then its subdirectories depth-first.
    ///
    /// Returns `false` once the consumer is gone.
    fn visit(&self, dir: &Path, depth: usize) -> bool {
        let Ok(entries) = fs::read_dir(dir) else {
            DiscoveryStats::bump(&self.stats.directories_skipped);
            return true;
        };
        DiscoveryStats::bump(&self.stats.directories_visited);

        let mut subdirs = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else {
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();

            // Symlinked files always count; symlinked directories only when following.
            let (is_dir, is_file) = if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_dir() && !self.follow_symlinks => continue,
                    Ok(meta) => (meta.is_dir(), meta.is_file()),
                    Err(_) => continue,
                }
            } else {
                (file_type.is_dir(), file_type.is_file())
            };

            if is_dir {
                subdirs.push(path);
            } else if is_file && self.pattern.matches_path(&path) {
                DiscoveryStats::bump(&self.stats.files_matched);
                if self.tx.send(path).is_err() {
                    return false;
                }
            }
        }

        if depth >= self.max_depth {
            return true;
        }
        for subdir in subdirs {
            if !self.visit(&subdir, depth + 1) {
                return false;
            }
        }
        true
    }
}
