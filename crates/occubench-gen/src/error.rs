//! Generator error types.

use std::path::PathBuf;

use chrono::NaiveDate;
use occubench_types::{ApName, LocationType, SensorId};

/// Result type for seed loading and generation.
pub type GenResult<T> = Result<T, GenError>;

/// Errors raised while loading seed data or building the synthetic topology.
///
/// Every variant is a configuration error in the sense that it is detected
/// before any ingestion or query thread starts, and is fatal to the run.
#[derive(Debug)]
pub enum GenError {
    /// I/O error while reading a seed or metadata file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed line in a seed or metadata file.
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Seed data references a sensor that no metadata file declares.
    UnknownSensor {
        path: PathBuf,
        line: usize,
        sensor: String,
    },

    /// Two seed files hold data for the same date.
    DuplicateSeedDate { path: PathBuf, date: NaiveDate },

    /// One seed file spans more than one date.
    MixedDates { path: PathBuf },

    /// Inconsistent combined-sensor metadata.
    InvalidCombined(String),

    /// Inconsistent partner metadata.
    InvalidPartners { sensor: SensorId, reason: String },

    /// Nothing to generate from.
    EmptySeed(String),

    /// More floors requested than non-repeatable floors exist, and none may repeat.
    NoRepeatableFloors { needed: usize, available: usize },

    /// The seed has too few floors for the floor-preservation rule.
    FloorMapping { floor: u32, seed_floors: usize },

    /// Floor-preservation points at a seed floor that does not exist.
    MissingSeedFloor(u32),

    /// No seed sensor has the location type of a synthetic access point.
    NoCandidates { location: LocationType },

    /// Two consecutive failed candidate searches for one access point.
    AssignmentExhausted {
        ap: ApName,
        floor: u32,
        location: LocationType,
    },

    /// Generation was requested for an access point that was never assigned.
    Unassigned(ApName),

    /// Sample rates that cannot be reconciled.
    MismatchedIntervals { generation: u32, source: u32 },
}

impl std::fmt::Display for GenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenError::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            GenError::Parse {
                path,
                line,
                message,
            } => write!(f, "{}:{line}: {message}", path.display()),
            GenError::UnknownSensor { path, line, sensor } => write!(
                f,
                "{}:{line}: sensor {sensor} is not in the floor map, combined file or ignore file",
                path.display()
            ),
            GenError::DuplicateSeedDate { path, date } => write!(
                f,
                "seed file {} holds data for {date}, which another file also covers",
                path.display()
            ),
            GenError::MixedDates { path } => write!(
                f,
                "seed file {} holds data for more than one date",
                path.display()
            ),
            GenError::InvalidCombined(msg) => write!(f, "invalid combined sensors: {msg}"),
            GenError::InvalidPartners { sensor, reason } => {
                write!(f, "invalid partner group for {sensor}: {reason}")
            }
            GenError::EmptySeed(msg) => write!(f, "seed data is empty: {msg}"),
            GenError::NoRepeatableFloors { needed, available } => write!(
                f,
                "{needed} floors requested but only {available} exist and none are repeatable"
            ),
            GenError::FloorMapping { floor, seed_floors } => write!(
                f,
                "cannot map floor {floor} onto a seed with {seed_floors} floor(s)"
            ),
            GenError::MissingSeedFloor(floor) => write!(f, "seed data has no floor numbered {floor}"),
            GenError::NoCandidates { location } => {
                write!(f, "no seed sensor has location type {location}")
            }
            GenError::AssignmentExhausted {
                ap,
                floor,
                location,
            } => write!(
                f,
                "failed to assign {ap} (floor {floor}, location {location}) after resetting its location; \
                 the generated topology is too large for the seed data"
            ),
            GenError::Unassigned(ap) => write!(f, "access point {ap} has no seed assignment"),
            GenError::MismatchedIntervals { generation, source } => write!(
                f,
                "mismatching intervals: generation {generation}s and seed {source}s must match or one must evenly divide the other"
            ),
        }
    }
}

// Implemented by hand rather than derived: thiserror treats any field named
// `source` as the error cause, which `MismatchedIntervals::source` is not.
impl std::error::Error for GenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl GenError {
    pub(crate) fn parse(path: &std::path::Path, line: usize, message: impl Into<String>) -> Self {
        GenError::Parse {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}
