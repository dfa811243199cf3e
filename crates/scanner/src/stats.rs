use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static GLOBAL_STATS: ScanStats = ScanStats::new();

/// Measures one operation and hands the elapsed time to its callback.
///
/// The callback runs at most once: either on the first call to [`Timer::stop`]
/// or when the timer is dropped, whichever happens first.
pub struct Timer<F: FnOnce(Duration)> {
    started: Instant,
    on_stop: Option<F>,
}

impl<F: FnOnce(Duration)> Timer<F> {
    pub fn start(on_stop: F) -> Self {
        Self {
            started: Instant::now(),
            on_stop: Some(on_stop),
        }
    }

    /// Stops the timer and reports the elapsed time. Returns `None` if the
    /// timer was already stopped.
    pub fn stop(&mut self) -> Option<Duration> {
        let on_stop = self.on_stop.take()?;
        let elapsed = self.started.elapsed();
        on_stop(elapsed);
        Some(elapsed)
    }

    pub fn is_stopped(&self) -> bool {
        self.on_stop.is_none()
    }
}

impl<F: FnOnce(Duration)> Drop for Timer<F> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Process-wide counters for scans and queries.
///
/// Counters only ever grow. Durations are accumulated in whole milliseconds,
/// truncating each recorded duration individually.
#[derive(Debug, Default)]
pub struct ScanStats {
    total_number_of_scans: AtomicU64,
    total_number_of_queries: AtomicU64,
    total_scan_time_ms: AtomicU64,
    total_query_time_ms: AtomicU64,
}

impl ScanStats {
    /// Creates an isolated set of counters, all zero.
    pub const fn new() -> Self {
        Self {
            total_number_of_scans: AtomicU64::new(0),
            total_number_of_queries: AtomicU64::new(0),
            total_scan_time_ms: AtomicU64::new(0),
            total_query_time_ms: AtomicU64::new(0),
        }
    }

    /// The counters shared by the whole process.
    pub fn global() -> &'static ScanStats {
        &GLOBAL_STATS
    }

    pub fn record_scan(&self, duration: Duration) {
        self.total_number_of_scans.fetch_add(1, Ordering::Relaxed);
        self.total_scan_time_ms
            .fetch_add(duration_millis(duration), Ordering::Relaxed);
    }

    pub fn record_query(&self, duration: Duration) {
        self.total_number_of_queries.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_ms
            .fetch_add(duration_millis(duration), Ordering::Relaxed);
    }

    pub fn time_scan(&self) -> Timer<impl FnOnce(Duration) + '_> {
        Timer::start(move |elapsed| self.record_scan(elapsed))
    }

    pub fn time_query(&self) -> Timer<impl FnOnce(Duration) + '_> {
        Timer::start(move |elapsed| self.record_query(elapsed))
    }

    pub fn total_number_of_scans(&self) -> u64 {
        self.total_number_of_scans.load(Ordering::Relaxed)
    }

    pub fn total_number_of_queries(&self) -> u64 {
        self.total_number_of_queries.load(Ordering::Relaxed)
    }

    pub fn total_scan_time_ms(&self) -> u64 {
        self.total_scan_time_ms.load(Ordering::Relaxed)
    }

    pub fn total_query_time_ms(&self) -> u64 {
        self.total_query_time_ms.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_number_of_scans: self.total_number_of_scans(),
            total_number_of_queries: self.total_number_of_queries(),
            total_scan_time_ms: self.total_scan_time_ms(),
            total_query_time_ms: self.total_query_time_ms(),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Point-in-time copy of the counters, for telemetry reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_number_of_scans: u64,
    pub total_number_of_queries: u64,
    pub total_scan_time_ms: u64,
    pub total_query_time_ms: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scans in {} ms, {} queries in {} ms",
            self.total_number_of_scans,
            self.total_scan_time_ms,
            self.total_number_of_queries,
            self.total_query_time_ms
        )
    }
}
