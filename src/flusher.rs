//! Dedicated disk-flusher thread (§4.6).
//!
//! Drains the ring in batches on its own OS thread so a blocking syscall
//! never stalls a hot-path producer or the async runtime. Output rotates
//! to a new `{base}/{YYYY-MM-DD}/{feed}.jsonl` file on UTC date change and
//! is flushed after every non-empty drain.

use crate::ring::RingConsumer;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

pub const BATCH_SIZE: usize = 64;
pub const EMPTY_SLEEP_MICROS: u64 = 100;
const ROTATE_BUFFER_SIZE: usize = 64 * 1024;

/// Owns the currently open output file and flushes it on drop as a safety
/// net against panics unwinding past the run loop.
struct RotatingWriter {
    base_dir: PathBuf,
    feed: String,
    current_date: Option<String>,
    writer: Option<BufWriter<File>>,
}

impl RotatingWriter {
    fn new(base_dir: PathBuf, feed: String) -> Self {
        RotatingWriter { base_dir, feed, current_date: None, writer: None }
    }

    /// Rotates to `date`'s file if needed. On failure the writer is left
    /// pointing at the previous (stale) date so the next message retries
    /// the rotation; the caller drops the message that triggered this
    /// attempt (§4.15: "Disk rotate fails → drop message for current slot").
    fn ensure_rotated(&mut self, date: &str) -> bool {
        if self.current_date.as_deref() == Some(date) {
            return true;
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                error!(error = %e, "failed to flush before rotation");
            }
        }
        let dir = self.base_dir.join(date);
        if let Err(e) = fs::create_dir_all(&dir) {
            error!(error = %e, dir = %dir.display(), "failed to create rotation directory");
            return false;
        }
        let path = dir.join(format!("{}.jsonl", self.feed));
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                self.writer = Some(BufWriter::with_capacity(ROTATE_BUFFER_SIZE, file));
                self.current_date = Some(date.to_string());
                true
            }
            Err(e) => {
                error!(error = %e, path = %path.display(), "failed to open rotation file");
                false
            }
        }
    }

    fn write_message(&mut self, ts: &DateTime<Utc>, payload: &[u8]) {
        let date = ts.format("%Y-%m-%d").to_string();
        if !self.ensure_rotated(&date) {
            return;
        }
        let writer = self.writer.as_mut().expect("rotation succeeded");
        let rfc3339 = ts.to_rfc3339_opts(SecondsFormat::Nanos, true);
        if let Err(e) = write!(writer, "{{\"ts\":\"{rfc3339}\",\"data\":") {
            error!(error = %e, "failed to write record header");
            return;
        }
        if let Err(e) = writer.write_all(payload) {
            error!(error = %e, "failed to write record payload");
            return;
        }
        if let Err(e) = writer.write_all(b"}\n") {
            error!(error = %e, "failed to write record terminator");
        }
    }

    fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                error!(error = %e, "failed to flush disk flusher writer");
            }
        }
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Runs the flusher loop on the calling thread until `shutdown` is set and
/// the ring has been fully drained. Call this from a dedicated OS thread —
/// it blocks.
pub fn run(consumer: RingConsumer, base_dir: impl AsRef<Path>, feed: impl Into<String>, shutdown: Arc<AtomicBool>) {
    let mut writer = RotatingWriter::new(base_dir.as_ref().to_path_buf(), feed.into());

    loop {
        let mut drained = 0usize;
        while drained < BATCH_SIZE {
            match consumer.try_read() {
                Some(payload) => {
                    writer.write_message(&Utc::now(), &payload);
                    drained += 1;
                }
                None => break,
            }
        }

        if drained > 0 {
            writer.flush();
        } else if shutdown.load(Ordering::Relaxed) {
            break;
        } else {
            std::thread::sleep(Duration::from_micros(EMPTY_SLEEP_MICROS));
        }
    }

    // Final drain in case messages landed between the last empty check and
    // the shutdown flag being observed.
    while let Some(payload) = consumer.try_read() {
        writer.write_message(&Utc::now(), &payload);
    }
    writer.flush();
    info!("disk flusher drained and exited");
}

/// Spawns [`run`] on a dedicated OS thread.
pub fn spawn(
    consumer: RingConsumer,
    base_dir: impl AsRef<Path>,
    feed: impl Into<String>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let base_dir = base_dir.as_ref().to_path_buf();
    let feed = feed.into();
    std::thread::Builder::new()
        .name(format!("flusher-{feed}"))
        .spawn(move || run(consumer, base_dir, feed, shutdown))
        .expect("failed to spawn disk flusher thread")
}
