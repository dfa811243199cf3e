//! One pass over one container: enumerate, filter, resolve, visit.

use crate::adapters::MetadataAdapter;
use crate::metadata::{UnitMetadata, describe};
use crate::stats::ScanStats;
use crate::vfs::{Container, Entry};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An accepted entry that did not yield a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

/// Outcome of scanning one container.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub container: String,
    /// Entries enumerated, accepted or not.
    pub entries: usize,
    pub accepted: usize,
    pub resolved: usize,
    pub skipped: Vec<SkippedEntry>,
    /// Set when enumeration stopped before the container was exhausted.
    pub enumeration_error: Option<String>,
    pub elapsed: Duration,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.enumeration_error.is_none()
    }
}

pub struct Scanner<'a, A: MetadataAdapter + ?Sized> {
    adapter: &'a A,
    stats: &'a ScanStats,
}

impl<'a, A: MetadataAdapter + ?Sized> Scanner<'a, A> {
    pub fn new(adapter: &'a A, stats: &'a ScanStats) -> Self {
        Self { adapter, stats }
    }

    /// A scanner that reports into [`ScanStats::global`].
    pub fn with_global_stats(adapter: &'a A) -> Self {
        Self::new(adapter, ScanStats::global())
    }

    pub fn adapter(&self) -> &'a A {
        self.adapter
    }

    /// Resolves every accepted entry of `container` and hands it to `visit`.
    ///
    /// Entries that fail to resolve are skipped. An enumeration error ends
    /// the pass over this container only. The container is not closed.
    pub fn scan<C, F>(&self, container: &C, mut visit: F) -> ScanReport
    where
        C: Container + ?Sized,
        F: FnMut(&dyn Entry, &A::Unit),
    {
        let mut timer = self.stats.time_scan();
        let mut report = ScanReport {
            container: container.path().to_string(),
            ..ScanReport::default()
        };

        for entry in container.entries() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("Aborted scan of {}: {error}", report.container);
                    report.enumeration_error = Some(error.to_string());
                    break;
                }
            };
            report.entries += 1;

            if !self.adapter.accepts_input(entry.relative_path()) {
                continue;
            }
            report.accepted += 1;

            match self.adapter.resolve(entry.as_ref()) {
                Ok(unit) => {
                    report.resolved += 1;
                    visit(entry.as_ref(), &unit);
                }
                Err(error) => {
                    debug!("Skipping {entry}: {error}");
                    report.skipped.push(SkippedEntry {
                        path: entry.relative_path().to_string(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        report.elapsed = timer.stop().unwrap_or_default();
        info!(
            "Scanned {} in {:?}: {} entries, {} resolved, {} skipped",
            report.container,
            report.elapsed,
            report.entries,
            report.resolved,
            report.skipped.len()
        );
        report
    }

    /// Extracts the record set of one resolved unit, timed as a query.
    pub fn describe(&self, unit: &A::Unit) -> UnitMetadata {
        let _timer = self.stats.time_query();
        describe(self.adapter, unit)
    }

    /// Scans `container` and describes every resolved unit.
    pub fn collect<C>(&self, container: &C) -> (Vec<UnitMetadata>, ScanReport)
    where
        C: Container + ?Sized,
    {
        let mut units = Vec::new();
        let report = self.scan(container, |_, unit| units.push(self.describe(unit)));
        (units, report)
    }
}
