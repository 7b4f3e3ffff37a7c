//! CSV file sink.
//!
//! Row entries become `timestamp,ap,clients` lines. Wide entries become one
//! line per tick with a column per access point, in topology order; an
//! access point without a reading leaves its cell empty.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use occubench_core::{BenchResult, Sink};
use occubench_types::{ApName, GeneratedEntry, Schema, Topology};
use tracing::{debug, info};

use crate::error::{TargetError, TargetResult};

pub const FILE_PREFIX: &str = "readings-";

#[derive(Debug)]
struct CsvState {
    writer: Option<BufWriter<File>>,
    rows: u64,
}

#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    columns: Vec<ApName>,
    state: Mutex<CsvState>,
}

impl CsvSink {
    /// Creates (or truncates) `path` and writes the header.
    pub fn create(path: impl Into<PathBuf>, schema: Schema, topology: &Topology) -> TargetResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TargetError::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| TargetError::io(&path, e))?;
        let mut writer = BufWriter::new(file);

        let columns = match schema {
            Schema::Row => {
                writeln!(writer, "timestamp,ap,clients").map_err(|e| TargetError::io(&path, e))?;
                Vec::new()
            }
            Schema::Wide => {
                let columns = topology.ap_names();
                write!(writer, "timestamp").map_err(|e| TargetError::io(&path, e))?;
                for ap in &columns {
                    write!(writer, ",{ap}").map_err(|e| TargetError::io(&path, e))?;
                }
                writeln!(writer).map_err(|e| TargetError::io(&path, e))?;
                columns
            }
        };

        debug!(path = %path.display(), ?schema, "csv sink opened");
        Ok(Self {
            path,
            columns,
            state: Mutex::new(CsvState {
                writer: Some(writer),
                rows: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_entry(&self, entry: &GeneratedEntry) -> TargetResult<()> {
        let mut state = self.state.lock().map_err(|_| TargetError::LockPoisoned)?;
        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| TargetError::Closed(self.path.clone()))?;
        let io = |e| TargetError::io(&self.path, e);

        match entry {
            GeneratedEntry::Row { time, ap, clients } => {
                writeln!(writer, "{time},{ap},{clients}").map_err(io)?;
            }
            GeneratedEntry::Wide { time, readings } => {
                write!(writer, "{time}").map_err(io)?;
                for ap in &self.columns {
                    match readings.get(ap) {
                        Some(clients) => write!(writer, ",{clients}").map_err(io)?,
                        None => write!(writer, ",").map_err(io)?,
                    }
                }
                writeln!(writer).map_err(io)?;
            }
        }
        state.rows += 1;
        Ok(())
    }

    /// Removes other `readings-*.csv` files next to this one.
    fn remove_siblings(&self) -> TargetResult<()> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        let entries = fs::read_dir(dir).map_err(|e| TargetError::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| TargetError::io(dir, e))?.path();
            let is_readings = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".csv"));
            if is_readings && path != self.path {
                fs::remove_file(&path).map_err(|e| TargetError::io(&path, e))?;
            }
        }
        Ok(())
    }
}

impl Sink for CsvSink {
    fn prepare(&self, recreate: bool) -> BenchResult<()> {
        if recreate {
            self.remove_siblings()?;
        }
        Ok(())
    }

    fn add(&self, entry: GeneratedEntry) -> BenchResult<()> {
        Ok(self.write_entry(&entry)?)
    }

    fn close(&self) -> BenchResult<()> {
        let mut state = self.state.lock().map_err(|_| TargetError::LockPoisoned)?;
        if let Some(mut writer) = state.writer.take() {
            writer.flush().map_err(|e| TargetError::io(&self.path, e))?;
        }
        info!(path = %self.path.display(), rows = state.rows, "csv sink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use occubench_types::{Floor, SensorId, SyntheticAccessPoint, Timestamp};
    use tempfile::tempdir;

    fn topology() -> Topology {
        let aps = ["AP-2", "AP-1"]
            .iter()
            .map(|n| SyntheticAccessPoint::new((*n).into(), SensorId::from("s"), 0, Default::default()))
            .collect();
        Topology::new(vec![Floor {
            number: 0,
            template: "ground".to_string(),
            aps,
        }])
    }

    #[test]
    fn wide_rows_follow_the_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("readings-0.csv");
        let sink = CsvSink::create(&path, Schema::Wide, &topology()).unwrap();
        let readings = [(ApName::from("AP-1"), 7)].into_iter().collect();
        sink.add(GeneratedEntry::Wide {
            time: Timestamp::from_secs(1),
            readings,
        })
        .unwrap();
        sink.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,AP-2,AP-1");
        assert_eq!(lines[1], "1970-01-01T00:00:01,,7");
    }

    #[test]
    fn writes_after_close_fail() {
        let dir = tempdir().unwrap();
        let sink = CsvSink::create(dir.path().join("readings-0.csv"), Schema::Row, &topology()).unwrap();
        sink.close().unwrap();
        let err = sink
            .add(GeneratedEntry::Row {
                time: Timestamp::EPOCH,
                ap: "AP-1".into(),
                clients: 1,
            })
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn recreate_removes_previous_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("readings-7.csv"), "old").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        let sink = CsvSink::create(dir.path().join("readings-0.csv"), Schema::Row, &topology()).unwrap();
        sink.prepare(true).unwrap();
        assert!(!dir.path().join("readings-7.csv").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(sink.path().exists());
    }
}
