//! Follows the producer's append-only JSONL trace file.
//!
//! The tailer keeps a high-watermark of complete, non-blank lines it has
//! already consumed. Every change notification triggers a re-read of the
//! whole file and only lines past the watermark are ingested.
//!
//! Rotation policy: if the file shrinks, disappears, or holds fewer lines
//! than the watermark, it is treated as a new file and the watermark resets
//! to zero. A trailing line without its newline is left for the next scan.

use crate::error::TailerError;
use crate::relay::{Ingested, TraceRelay};
use crate::validation::parse_trace_line;
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tr_events::TraceSource;
use tracing::{debug, info, warn};

const WATCH_RETRY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub ingested: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

pub struct FileTailer {
    path: PathBuf,
    watermark: usize,
    last_len: usize,
}

impl FileTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            watermark: 0,
            last_len: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Reads the file once and ingests every line past the watermark.
    ///
    /// A missing file is not an error: the tailer resets and waits for the
    /// producer to create it.
    pub async fn scan(&mut self, relay: &TraceRelay) -> Result<ScanReport, TailerError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if self.watermark > 0 {
                    info!(path = %self.path.display(), "trace file removed");
                }
                self.reset();
                return Ok(ScanReport::default());
            }
            Err(source) => {
                return Err(TailerError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let content = String::from_utf8_lossy(&bytes);

        let mut report = ScanReport::default();
        for line in self.take_new_lines(&content, bytes.len()) {
            match parse_trace_line(line) {
                Ok(input) => match relay.ingest(input, TraceSource::File) {
                    Ingested::Accepted(_) => report.ingested += 1,
                    Ingested::Duplicate { .. } => report.duplicates += 1,
                },
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "skipping trace line");
                    report.skipped += 1;
                }
            }
        }
        if report != ScanReport::default() {
            debug!(
                ingested = report.ingested,
                duplicates = report.duplicates,
                skipped = report.skipped,
                watermark = self.watermark,
                "trace file scanned"
            );
        }
        Ok(report)
    }

    /// Watches the trace file until the task is aborted.
    ///
    /// With `poll_interval` set, the file's directory is polled instead of
    /// using the platform's native notifications. Polling hashes file contents
    /// because mtimes only resolve to whole seconds.
    pub async fn run(
        mut self,
        relay: TraceRelay,
        poll_interval: Option<Duration>,
    ) -> Result<(), TailerError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        };
        let mut watcher: Box<dyn Watcher + Send> = match poll_interval {
            Some(interval) => Box::new(PollWatcher::new(
                handler,
                notify::Config::default()
                    .with_poll_interval(interval)
                    .with_compare_contents(true),
            )?),
            None => Box::new(notify::recommended_watcher(handler)?),
        };

        let dir = watch_dir(&self.path);
        let mut waiting_logged = false;
        while let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            if !waiting_logged {
                info!(
                    dir = %dir.display(),
                    error = %err,
                    "trace directory not watchable yet, tailer idle"
                );
                waiting_logged = true;
            }
            tokio::time::sleep(poll_interval.unwrap_or(WATCH_RETRY)).await;
        }
        info!(path = %self.path.display(), "watching trace file");

        self.scan_logged(&relay).await;

        while let Some(res) = rx.recv().await {
            match res {
                Ok(event) if self.is_relevant(&event) => self.scan_logged(&relay).await,
                Ok(_) => {}
                Err(err) => warn!(error = %err, "trace file watch error"),
            }
        }
        Ok(())
    }

    async fn scan_logged(&mut self, relay: &TraceRelay) {
        if let Err(err) = self.scan(relay).await {
            warn!(error = %err, "trace file scan failed");
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        let kind_matches = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
        );
        let name = self.path.file_name();
        kind_matches && event.paths.iter().any(|path| path.file_name() == name)
    }

    fn reset(&mut self) {
        self.watermark = 0;
        self.last_len = 0;
    }

    /// `byte_len` is the raw file size; `content` may be longer after lossy
    /// decoding.
    fn take_new_lines<'a>(&mut self, content: &'a str, byte_len: usize) -> Vec<&'a str> {
        if byte_len < self.last_len {
            info!(path = %self.path.display(), "trace file shrank, rereading from start");
            self.watermark = 0;
        }
        self.last_len = byte_len;

        let complete = match content.rfind('\n') {
            Some(end) => &content[..end],
            None => "",
        };
        let lines: Vec<&str> = complete
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect();
        if lines.len() < self.watermark {
            info!(path = %self.path.display(), "trace file rewritten, rereading from start");
            self.watermark = 0;
        }
        let fresh = lines[self.watermark..].to_vec();
        self.watermark = lines.len();
        fresh
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
