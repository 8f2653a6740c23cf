//! Interval-gated metadata cache.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::FlycamError;
use crate::pipeline::source::MetadataSource;
use crate::wire::{MetadataField, MetadataTable};

/// Camera readings shared by every packet built between refreshes.
///
/// The first call to [`refresh_if_due`](Self::refresh_if_due) always
/// queries the source. After that the source is asked again only once
/// `interval` has elapsed since the previous attempt.
pub struct MetadataCache {
    table: MetadataTable,
    interval: Duration,
    last_refresh: Option<Instant>,
    scratch: Vec<f32>,
    refreshes: u64,
    failures: u64,
}

impl MetadataCache {
    pub fn new(fields: Vec<MetadataField>, interval: Duration) -> Result<Self, FlycamError> {
        let table = MetadataTable::new(fields)?;
        let scratch = vec![0.0; table.len()];
        Ok(Self {
            table,
            interval,
            last_refresh: None,
            scratch,
            refreshes: 0,
            failures: 0,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn table(&self) -> &MetadataTable {
        &self.table
    }

    /// Whether a refresh would happen at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_refresh {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Query `source` if the interval has elapsed, then return the table.
    ///
    /// A failed query keeps the previous values and still counts as an
    /// attempt, so the next try waits a full interval.
    pub fn refresh_if_due<S>(&mut self, now: Instant, source: &mut S) -> &MetadataTable
    where
        S: MetadataSource + ?Sized,
    {
        if self.is_due(now) {
            self.last_refresh = Some(now);
            self.refreshes += 1;
            match source.read_metadata(self.table.fields(), &mut self.scratch) {
                Ok(()) => match self.table.set_all(&self.scratch) {
                    Ok(()) => debug!(fields = self.table.len(), "metadata refreshed"),
                    Err(e) => self.record_failure(&e),
                },
                Err(e) => self.record_failure(&e),
            }
        }
        &self.table
    }

    /// Refresh attempts so far, failed ones included.
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn record_failure(&mut self, e: &FlycamError) {
        self.failures += 1;
        // Restore the scratch buffer so a partial write never leaks out.
        self.scratch.copy_from_slice(self.table.values());
        warn!("metadata query failed, keeping previous values: {e}");
    }
}

// ── Tests ────────────────────────────────────────────────────────
