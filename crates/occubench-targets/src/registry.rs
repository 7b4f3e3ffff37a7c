//! Backend selection by configured kind.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use occubench_config::{BackendKind, BenchConfig};
use occubench_core::{BackendRegistry, BenchResult, QueryAdapter, Sink};
use occubench_types::{Schema, Topology};

use crate::csv::{CsvSink, FILE_PREFIX};
use crate::discard::DiscardSink;
use crate::error::TargetError;
use crate::memory::MemoryStore;

/// Opens the reference backends.
///
/// Every memory instance shares one [`MemoryStore`], so data written by
/// any sink is visible to every query adapter of the same registry.
#[derive(Debug)]
pub struct TargetRegistry {
    memory: MemoryStore,
    schema: Schema,
    csv_dir: Option<PathBuf>,
    csv_files: AtomicUsize,
}

impl TargetRegistry {
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            memory: MemoryStore::new(config.generator.generation_interval_secs),
            schema: config.benchmark.schema,
            csv_dir: config.output.csv_dir.clone(),
            csv_files: AtomicUsize::new(0),
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }
}

impl BackendRegistry for TargetRegistry {
    fn open_sink(&self, kind: BackendKind, topology: &Topology) -> BenchResult<Arc<dyn Sink>> {
        Ok(match kind {
            BackendKind::Memory => {
                self.memory.register_topology(topology)?;
                Arc::new(self.memory.session())
            }
            BackendKind::Csv => {
                let dir = self.csv_dir.as_ref().ok_or(TargetError::MissingCsvDir)?;
                let n = self.csv_files.fetch_add(1, Ordering::Relaxed);
                let path = dir.join(format!("{FILE_PREFIX}{n:04}.csv"));
                Arc::new(CsvSink::create(path, self.schema, topology)?)
            }
            BackendKind::Discard => Arc::new(DiscardSink::default()),
        })
    }

    fn open_query_adapter(&self, kind: BackendKind) -> BenchResult<Arc<dyn QueryAdapter>> {
        match kind {
            BackendKind::Memory => Ok(Arc::new(self.memory.session())),
            backend => Err(TargetError::Unsupported {
                backend,
                operation: "queries",
            }
            .into()),
        }
    }
}
