//! # occubench-targets: Reference backends
//!
//! Implementations of the `occubench-core` backend traits:
//!
//! - [`MemoryStore`]: thread-safe in-memory store that ingests and answers
//!   every query type.
//! - [`CsvSink`]: writes readings to CSV files.
//! - [`DiscardSink`]: counts readings and drops them.
//!
//! [`TargetRegistry`] opens them by [`BackendKind`](occubench_config::BackendKind).

mod csv;
mod discard;
mod error;
mod memory;
mod registry;

pub use csv::CsvSink;
pub use discard::DiscardSink;
pub use error::{TargetError, TargetResult};
pub use memory::{MemorySession, MemoryStore};
pub use registry::TargetRegistry;
