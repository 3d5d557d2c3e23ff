//! Background activity logger.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Discovery and recovery
//! workers send [`ActivityEvent`]s through a bounded crossbeam channel with
//! `try_send`, so a slow disk never stalls a copy.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, WcffError};
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum ActivityEvent {
    RecoveryStarted {
        version: String,
        config_hash: String,
        roots: Vec<PathBuf>,
    },
    DiscoveryCompleted {
        files_found: usize,
        directories_skipped: usize,
        duration_ms: u64,
    },
    FileRecovered {
        source: PathBuf,
        destination: PathBuf,
        extension: String,
        source_kind: String,
        size_bytes: u64,
        duration_ms: u64,
    },
    FileSkipped {
        source: PathBuf,
        destination: PathBuf,
        reason: String,
    },
    RecoveryFailed {
        path: PathBuf,
        error_code: String,
        error_message: String,
    },
    RecoveryCompleted {
        copied: usize,
        skipped: usize,
        failed: usize,
        duration_ms: u64,
    },
    Error {
        code: String,
        message: String,
    },
    /// Flush and stop the logger thread.
    Shutdown,
}

/// Cloneable, non-blocking sender side of the logger.
#[derive(Debug, Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Queue an event; drops it (and counts the drop) when the queue is full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only while the queue is full.
    ///
    /// Fails with `ChannelClosed` when the logger thread is already gone.
    pub fn shutdown(&self) -> Result<()> {
        self.tx
            .send(ActivityEvent::Shutdown)
            .map_err(|_| WcffError::ChannelClosed {
                component: "activity_logger",
            })
    }
}

#[derive(Debug, Clone)]
pub struct ActivityLoggerConfig {
    /// JSONL file; `None` discards every event.
    pub jsonl_path: Option<PathBuf>,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    #[must_use]
    pub fn new(jsonl_path: Option<PathBuf>) -> Self {
        Self {
            jsonl_path,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the logger thread.
///
/// It runs until [`ActivityLoggerHandle::shutdown`] or until every handle is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let thread_dropped = Arc::clone(&dropped);

    let join = thread::Builder::new()
        .name("wcff-logger".to_string())
        .spawn(move || {
            let writer = config
                .jsonl_path
                .map_or_else(JsonlWriter::discard, JsonlWriter::open);
            logger_thread_main(&rx, writer, &thread_dropped);
        })
        .map_err(|e| WcffError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((
        ActivityLoggerHandle {
            tx,
            dropped_events: dropped,
        },
        join,
    ))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, mut jsonl: JsonlWriter, dropped: &AtomicU64) {
    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{lost} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        let shutdown = matches!(event, ActivityEvent::Shutdown);
        jsonl.write_entry(&event_to_log_entry(&event));
        if shutdown {
            break;
        }
    }
    jsonl.flush();
}

fn display(path: &std::path::Path) -> Option<String> {
    Some(path.display().to_string())
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::RecoveryStarted {
            version,
            config_hash,
            roots,
        } => {
            let mut e = LogEntry::new(EventType::RecoveryStart, Severity::Info);
            let roots: Vec<String> = roots.iter().map(|r| r.display().to_string()).collect();
            e.details = Some(format!(
                "version={version} config_hash={config_hash} roots={}",
                roots.join(",")
            ));
            e
        }
        ActivityEvent::DiscoveryCompleted {
            files_found,
            directories_skipped,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::DiscoveryComplete, Severity::Info);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!(
                "files_found={files_found} directories_skipped={directories_skipped}"
            ));
            e
        }
        ActivityEvent::FileRecovered {
            source,
            destination,
            extension,
            source_kind,
            size_bytes,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::FileRecovered, Severity::Info);
            e.path = display(source);
            e.destination = display(destination);
            e.extension = Some(extension.clone());
            e.source = Some(source_kind.clone());
            e.size = Some(*size_bytes);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::FileSkipped {
            source,
            destination,
            reason,
        } => {
            let mut e = LogEntry::new(EventType::FileSkipped, Severity::Info);
            e.path = display(source);
            e.destination = display(destination);
            e.details = Some(reason.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::RecoveryFailed {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::RecoveryFailed, Severity::Warning);
            e.path = display(path);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::RecoveryCompleted {
            copied,
            skipped,
            failed,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::RecoveryComplete, Severity::Info);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("copied={copied} skipped={skipped} failed={failed}"));
            e.ok = Some(*failed == 0);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Error);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::Shutdown, Severity::Info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_events(path: &std::path::Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn spawn_log_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let (handle, join) = spawn_logger(ActivityLoggerConfig::new(Some(path.clone()))).unwrap();

        handle.send(ActivityEvent::RecoveryStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc".to_string(),
            roots: vec![PathBuf::from("/tmp")],
        });
        handle.send(ActivityEvent::FileRecovered {
            source: PathBuf::from("/tmp/1.WNCRYT"),
            destination: PathBuf::from("/out/1.pdf"),
            extension: ".pdf".to_string(),
            source_kind: "known_header".to_string(),
            size_bytes: 42,
            duration_ms: 1,
        });
        handle.send(ActivityEvent::RecoveryFailed {
            path: PathBuf::from("/tmp/2.WNCRYT"),
            error_code: "WCFF-3002".to_string(),
            error_message: "gone".to_string(),
        });
        handle.shutdown().unwrap();
        join.join().unwrap();

        let events = read_events(&path);
        let kinds: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
        assert_eq!(
            kinds,
            vec!["recovery_start", "file_recovered", "recovery_failed", "shutdown"]
        );
        assert_eq!(events[1]["destination"], "/out/1.pdf");
        assert_eq!(events[1]["source"], "known_header");
        assert_eq!(events[2]["error_code"], "WCFF-3002");
        assert_eq!(events[2]["severity"], "warning");
    }

    #[test]
    fn dropping_all_handles_stops_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        let (handle, join) = spawn_logger(ActivityLoggerConfig::new(Some(path.clone()))).unwrap();
        handle.send(ActivityEvent::Error {
            code: "WCFF-3900".to_string(),
            message: "boom".to_string(),
        });
        drop(handle);
        join.join().unwrap();
        assert_eq!(read_events(&path).len(), 1);
    }

    #[test]
    fn handle_is_cloneable_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mt.jsonl");
        let (handle, join) = spawn_logger(ActivityLoggerConfig::new(Some(path.clone()))).unwrap();

        std::thread::scope(|scope| {
            for i in 0..4 {
                let handle = handle.clone();
                scope.spawn(move || {
                    handle.send(ActivityEvent::FileSkipped {
                        source: PathBuf::from(format!("/tmp/{i}.WNCRYT")),
                        destination: PathBuf::from(format!("/out/{i}.txt")),
                        reason: "destination exists".to_string(),
                    });
                });
            }
        });
        handle.shutdown().unwrap();
        join.join().unwrap();

        assert_eq!(read_events(&path).len(), 5);
        assert_eq!(handle.dropped_events(), 0);
    }

    #[test]
    fn shutdown_after_logger_exit_reports_closed_channel() {
        let (handle, join) = spawn_logger(ActivityLoggerConfig::new(None)).unwrap();
        handle.shutdown().unwrap();
        join.join().unwrap();

        let err = handle.shutdown().unwrap_err();
        assert!(matches!(err, WcffError::ChannelClosed { .. }));
        assert_eq!(err.code(), "WCFF-3005");
    }

    #[test]
    fn discard_logger_accepts_events() {
        let (handle, join) = spawn_logger(ActivityLoggerConfig::new(None)).unwrap();
        handle.send(ActivityEvent::RecoveryCompleted {
            copied: 1,
            skipped: 0,
            failed: 0,
            duration_ms: 5,
        });
        handle.shutdown().unwrap();
        join.join().unwrap();
    }
}
