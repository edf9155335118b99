//! Progress tracking for a conversion run with atomic counters

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::parser::ParseStats;

/// Bytes consumed from the export, shared between the reader and the tracker
#[derive(Debug)]
pub struct ConvertProgress {
    /// Export size in bytes
    pub total_bytes: u64,
    bytes_read: Arc<AtomicU64>,
    /// Start time for ETA calculation
    pub start_time: Instant,
    interval: u64,
    next_report: AtomicU64,
}

impl ConvertProgress {
    /// Track progress through `total_bytes`, reporting every `interval` elements (0 = never)
    pub fn new(total_bytes: u64, interval: u64) -> Self {
        Self {
            total_bytes,
            bytes_read: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
            interval,
            next_report: AtomicU64::new(interval),
        }
    }

    /// Wrap `inner` so every byte read is counted here
    pub fn reader<R: Read>(&self, inner: R) -> CountingReader<R> {
        CountingReader {
            inner,
            counter: Arc::clone(&self.bytes_read),
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Completion percentage (0-100) by bytes
    pub fn percent(&self) -> u16 {
        if self.total_bytes == 0 {
            return 0;
        }
        let pct = (self.bytes_read() as f64 / self.total_bytes as f64) * 100.0;
        pct.min(100.0) as u16
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get elapsed time as formatted string
    pub fn elapsed_str(&self) -> String {
        format_elapsed(self.elapsed())
    }

    /// Estimate time remaining from the byte rate so far
    pub fn eta_str(&self) -> String {
        format_eta(self.elapsed(), self.bytes_read(), self.total_bytes)
    }

    /// Log a progress line once `stats` passes the next reporting threshold
    pub fn maybe_report(&self, stats: &ParseStats) {
        if self.interval == 0 {
            return;
        }
        let seen = stats.elements_seen() + stats.ignored;
        let next = self.next_report.load(Ordering::Relaxed);
        if seen < next {
            return;
        }
        self.next_report
            .store(seen - seen % self.interval + self.interval, Ordering::Relaxed);
        let rate = stats.rows_emitted() as f64 / self.elapsed().as_secs_f64().max(0.001);
        tracing::info!(
            "{} elements, {} rows ({} records, {} workouts), {} skipped | {:.0} rows/s | {}% | {} elapsed, {} remaining",
            seen,
            stats.rows_emitted(),
            stats.records_emitted,
            stats.workouts_emitted,
            stats.skipped,
            rate,
            self.percent(),
            self.elapsed_str(),
            self.eta_str()
        );
    }
}

/// `Read` adapter feeding a shared byte counter
pub struct CountingReader<R> {
    inner: R,
    counter: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let mins = secs / 60;
    let remaining_secs = secs % 60;

    if mins > 0 {
        format!("{}m {}s", mins, remaining_secs)
    } else {
        format!("{}s", secs)
    }
}

pub fn format_eta(elapsed: Duration, done: u64, total: u64) -> String {
    if done == 0 {
        return "calculating...".to_string();
    }

    let rate = done as f64 / elapsed.as_secs_f64().max(0.001);
    if rate < 0.01 {
        return "unknown".to_string();
    }

    let remaining = total.saturating_sub(done);
    let eta_secs = (remaining as f64 / rate) as u64;

    if eta_secs > 3600 {
        let hours = eta_secs / 3600;
        let mins = (eta_secs % 3600) / 60;
        format!("~{}h {}m", hours, mins)
    } else if eta_secs > 60 {
        let mins = eta_secs / 60;
        format!("~{} minutes", mins)
    } else {
        format!("~{} seconds", eta_secs)
    }
}
