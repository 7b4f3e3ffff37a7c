//! Sink that counts entries and drops them.

use std::sync::atomic::{AtomicU64, Ordering};

use occubench_core::{BenchResult, Sink};
use occubench_types::GeneratedEntry;
use tracing::info;

#[derive(Debug, Default)]
pub struct DiscardSink {
    entries: AtomicU64,
    readings: AtomicU64,
}

impl DiscardSink {
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn readings(&self) -> u64 {
        self.readings.load(Ordering::Relaxed)
    }
}

impl Sink for DiscardSink {
    fn add(&self, entry: GeneratedEntry) -> BenchResult<()> {
        self.entries.fetch_add(1, Ordering::Relaxed);
        self.readings
            .fetch_add(entry.reading_count() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) -> BenchResult<()> {
        info!(entries = self.entries(), readings = self.readings(), "discard sink closed");
        Ok(())
    }
}
