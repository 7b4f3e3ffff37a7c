//! Seed dataset loading.
//!
//! The seed is a directory of per-date data files plus a handful of
//! separator-delimited metadata files. `#` starts a comment anywhere on a
//! line and blank lines are ignored in every file.
//!
//! Data files hold a sequence of entries:
//!
//! ```text
//! Time;2019-01-01T00:00:00Z
//! Total clients;412
//! sensor-a;0.031
//! sensor-b;0.007
//! Time;2019-01-01T00:01:00Z
//! NO DATA
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use occubench_config::GeneratorConfig;
use occubench_types::{FloorMetadata, LocationType, SeedEntry, SeedModel, SensorId, Timestamp};
use tracing::{debug, info};

use crate::error::{GenError, GenResult};

/// Locations of every file making up a seed dataset.
#[derive(Debug, Clone)]
pub struct SeedFiles {
    pub seed_dir: PathBuf,
    /// `floorKey;repeatable` per line, ground floor first.
    pub floors_file: PathBuf,
    /// `floorKey;sensor` per line.
    pub floor_map_file: PathBuf,
    /// One sensor per line.
    pub ignore_file: Option<PathBuf>,
    /// `kept;merged1;merged2…` per line.
    pub combined_file: Option<PathBuf>,
    /// `sensor;locationType` per line.
    pub locations_file: Option<PathBuf>,
    /// `primary;partner1;partner2…` per line.
    pub partners_file: Option<PathBuf>,
    pub separator: String,
}

impl From<&GeneratorConfig> for SeedFiles {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            seed_dir: config.seed_dir.clone(),
            floors_file: config.floors_file.clone(),
            floor_map_file: config.floor_map_file.clone(),
            ignore_file: config.ignore_file.clone(),
            combined_file: config.combined_file.clone(),
            locations_file: config.locations_file.clone(),
            partners_file: config.partners_file.clone(),
            separator: config.separator.clone(),
        }
    }
}

/// Loads and validates the full seed dataset.
pub fn load_seed(files: &SeedFiles) -> GenResult<SeedModel> {
    let metadata = load_metadata(files)?;
    let entries = load_entries(&files.seed_dir, &files.separator, &metadata)?;

    if entries.is_empty() {
        return Err(GenError::EmptySeed(format!(
            "no data files with entries in {}",
            files.seed_dir.display()
        )));
    }

    let model = SeedModel {
        floors: metadata.floors,
        locations: metadata.locations,
        partners: metadata.partners,
        combined: metadata.combined,
        entries,
    };

    info!(
        floors = model.floors.len(),
        sensors = model.all_sensors().count(),
        dates = model.entries.len(),
        entries = model.entry_count(),
        "loaded seed data"
    );
    Ok(model)
}

// ============================================================================
// Metadata
// ============================================================================

#[derive(Debug, Default)]
struct Metadata {
    floors: Vec<FloorMetadata>,
    ignored: HashSet<SensorId>,
    /// Every mapped sensor, including ones later merged away, and its floor index.
    sensor_floor: HashMap<SensorId, usize>,
    combined: HashMap<SensorId, Vec<SensorId>>,
    locations: HashMap<SensorId, LocationType>,
    partners: HashMap<SensorId, Vec<SensorId>>,
}

fn load_metadata(files: &SeedFiles) -> GenResult<Metadata> {
    let sep = files.separator.as_str();
    let mut meta = Metadata::default();

    if let Some(path) = &files.ignore_file {
        for (_, line) in read_lines(path)? {
            meta.ignored.insert(SensorId::new(line));
        }
    }

    load_floors(&files.floors_file, sep, &mut meta)?;
    if meta.floors.is_empty() {
        return Err(GenError::EmptySeed(format!(
            "no floors in {}",
            files.floors_file.display()
        )));
    }
    load_floor_map(&files.floor_map_file, sep, &mut meta)?;

    if let Some(path) = &files.combined_file {
        load_combined(path, sep, &mut meta)?;
    }
    if let Some(path) = &files.locations_file {
        load_locations(path, sep, &mut meta)?;
    }
    if let Some(path) = &files.partners_file {
        load_partners(path, sep, &mut meta)?;
    }
    Ok(meta)
}

/// Floor numbers follow file order: the first floor is 0, the rest start at 2.
fn floor_number(index: usize) -> u32 {
    if index == 0 { 0 } else { index as u32 + 1 }
}

fn load_floors(path: &Path, sep: &str, meta: &mut Metadata) -> GenResult<()> {
    for (line_no, line) in read_lines(path)? {
        let fields = split(&line, sep);
        let [key, repeatable] = fields.as_slice() else {
            return Err(GenError::parse(path, line_no, "expected `floorKey;true|false`"));
        };
        let repeatable = parse_bool(repeatable)
            .ok_or_else(|| GenError::parse(path, line_no, format!("not a boolean: {repeatable}")))?;
        if meta.floors.iter().any(|f| f.key == *key) {
            return Err(GenError::parse(path, line_no, format!("floor {key} listed twice")));
        }
        let number = floor_number(meta.floors.len());
        meta.floors.push(FloorMetadata {
            key: (*key).to_string(),
            number,
            repeatable,
            sensors: Vec::new(),
        });
    }
    Ok(())
}

fn load_floor_map(path: &Path, sep: &str, meta: &mut Metadata) -> GenResult<()> {
    for (line_no, line) in read_lines(path)? {
        let fields = split(&line, sep);
        let [key, sensor] = fields.as_slice() else {
            return Err(GenError::parse(path, line_no, "expected `floorKey;sensor`"));
        };
        let sensor = SensorId::from(*sensor);
        if meta.ignored.contains(&sensor) {
            debug!(%sensor, "skipping ignored sensor in floor map");
            continue;
        }
        let index = meta
            .floors
            .iter()
            .position(|f| f.key == *key)
            .ok_or_else(|| GenError::parse(path, line_no, format!("unknown floor {key}")))?;
        if meta.sensor_floor.insert(sensor.clone(), index).is_some() {
            return Err(GenError::parse(path, line_no, format!("sensor {sensor} mapped twice")));
        }
        meta.floors[index].sensors.push(sensor);
    }
    Ok(())
}

fn load_combined(path: &Path, sep: &str, meta: &mut Metadata) -> GenResult<()> {
    let mut seen: HashSet<SensorId> = HashSet::new();
    for (line_no, line) in read_lines(path)? {
        let members: Vec<SensorId> = split(&line, sep)
            .into_iter()
            .map(SensorId::from)
            .filter(|s| !meta.ignored.contains(s))
            .collect();
        if members.len() < 2 {
            debug!(line = line_no, "skipping combined line with a single sensor");
            continue;
        }

        let mut floor = None;
        for member in &members {
            if !seen.insert(member.clone()) {
                return Err(GenError::InvalidCombined(format!(
                    "{member} appears on more than one line"
                )));
            }
            let member_floor = *meta.sensor_floor.get(member).ok_or_else(|| {
                GenError::InvalidCombined(format!("{member} is not in the floor map"))
            })?;
            match floor {
                None => floor = Some(member_floor),
                Some(f) if f != member_floor => {
                    return Err(GenError::InvalidCombined(format!(
                        "{member} is not on the same floor as {}",
                        members[0]
                    )));
                }
                Some(_) => {}
            }
        }

        let (kept, merged) = members.split_at(1);
        if let Some(f) = floor {
            meta.floors[f].sensors.retain(|s| !merged.contains(s));
        }
        meta.combined.insert(kept[0].clone(), merged.to_vec());
    }
    Ok(())
}

fn load_locations(path: &Path, sep: &str, meta: &mut Metadata) -> GenResult<()> {
    for (line_no, line) in read_lines(path)? {
        let fields = split(&line, sep);
        let [sensor, kind] = fields.as_slice() else {
            return Err(GenError::parse(path, line_no, "expected `sensor;locationType`"));
        };
        let sensor = SensorId::from(*sensor);
        if meta.ignored.contains(&sensor) {
            continue;
        }
        if !meta.sensor_floor.contains_key(&sensor) {
            return Err(GenError::parse(path, line_no, format!("unknown sensor {sensor}")));
        }
        meta.locations.insert(sensor, LocationType::new(*kind));
    }
    Ok(())
}

fn load_partners(path: &Path, sep: &str, meta: &mut Metadata) -> GenResult<()> {
    let merged: HashSet<&SensorId> = meta.combined.values().flatten().collect();
    let mut grouped: HashSet<SensorId> = HashSet::new();
    let mut partners = HashMap::new();

    for (line_no, line) in read_lines(path)? {
        let members: Vec<SensorId> = split(&line, sep).into_iter().map(SensorId::from).collect();
        if members.len() < 2 {
            return Err(GenError::parse(path, line_no, "expected `primary;partner…`"));
        }
        let primary = &members[0];
        let primary_floor = meta.sensor_floor.get(primary).copied();

        for member in &members {
            let reason = if meta.ignored.contains(member) || merged.contains(member) {
                Some(format!("{member} is ignored or merged into another sensor"))
            } else if meta.sensor_floor.get(member).copied() != primary_floor
                || primary_floor.is_none()
            {
                Some(format!("{member} is not mapped to the same floor"))
            } else if !grouped.insert(member.clone()) {
                Some(format!("{member} belongs to more than one group"))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(GenError::InvalidPartners {
                    sensor: primary.clone(),
                    reason,
                });
            }
        }
        partners.insert(primary.clone(), members[1..].to_vec());
    }

    meta.partners = partners;
    Ok(())
}

// ============================================================================
// Data files
// ============================================================================

fn load_entries(
    dir: &Path,
    sep: &str,
    meta: &Metadata,
) -> GenResult<std::collections::BTreeMap<NaiveDate, Vec<SeedEntry>>> {
    let io = |source| GenError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut by_date = std::collections::BTreeMap::new();
    for path in paths {
        let Some((date, entries)) = parse_data_file(&path, sep, meta)? else {
            debug!(path = %path.display(), "skipping empty seed file");
            continue;
        };
        if by_date.insert(date, entries).is_some() {
            return Err(GenError::DuplicateSeedDate { path, date });
        }
    }
    Ok(by_date)
}

struct PendingEntry {
    time: Timestamp,
    total: u32,
    no_data: bool,
    probabilities: HashMap<SensorId, f64>,
}

impl PendingEntry {
    fn finish(self) -> SeedEntry {
        if self.no_data || self.probabilities.is_empty() {
            SeedEntry::hole(self.time)
        } else {
            SeedEntry::new(self.time, self.total, self.probabilities)
        }
    }
}

fn parse_data_file(
    path: &Path,
    sep: &str,
    meta: &Metadata,
) -> GenResult<Option<(NaiveDate, Vec<SeedEntry>)>> {
    let mut entries = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for (line_no, line) in read_lines(path)? {
        let fields = split(&line, sep);
        let Some(&head) = fields.first() else {
            continue;
        };

        if head.eq_ignore_ascii_case("Time") {
            let raw = fields
                .get(1)
                .ok_or_else(|| GenError::parse(path, line_no, "Time line without a value"))?;
            let time = parse_time(raw)
                .ok_or_else(|| GenError::parse(path, line_no, format!("bad timestamp {raw}")))?;
            entries.extend(pending.take().map(PendingEntry::finish));
            pending = Some(PendingEntry {
                time,
                total: 0,
                no_data: false,
                probabilities: HashMap::new(),
            });
            continue;
        }

        let current = pending
            .as_mut()
            .ok_or_else(|| GenError::parse(path, line_no, "data before the first Time line"))?;

        if head.eq_ignore_ascii_case("NO DATA") {
            current.no_data = true;
        } else if head.eq_ignore_ascii_case("Total clients") {
            current.total = fields
                .get(1)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| GenError::parse(path, line_no, "bad client total"))?;
        } else {
            let sensor = SensorId::from(head);
            if meta.ignored.contains(&sensor) {
                continue;
            }
            if !meta.sensor_floor.contains_key(&sensor) {
                return Err(GenError::UnknownSensor {
                    path: path.to_path_buf(),
                    line: line_no,
                    sensor: head.to_string(),
                });
            }
            let probability: f64 = fields
                .get(1)
                .and_then(|v| v.parse().ok())
                .filter(|p: &f64| p.is_finite() && *p >= 0.0)
                .ok_or_else(|| GenError::parse(path, line_no, "bad probability"))?;
            current.probabilities.insert(sensor, probability);
        }
    }
    entries.extend(pending.map(PendingEntry::finish));

    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let date = first.time.date();
    if entries.iter().any(|e| e.time.date() != date) {
        return Err(GenError::MixedDates {
            path: path.to_path_buf(),
        });
    }
    entries.sort_by_key(|e| e.time);
    Ok(Some((date, entries)))
}

fn parse_time(raw: &str) -> Option<Timestamp> {
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Some(Timestamp::from_datetime(time.naive_utc()));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(Timestamp::from_datetime)
}

// ============================================================================
// Line helpers
// ============================================================================

/// Non-empty, comment-stripped, trimmed lines with their 1-based line numbers.
fn read_lines(path: &Path) -> GenResult<Vec<(usize, String)>> {
    let content = fs::read_to_string(path).map_err(|source| GenError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.split('#').next().unwrap_or_default().trim();
            (!line.is_empty()).then(|| (i + 1, line.to_string()))
        })
        .collect())
}

fn split<'a>(line: &'a str, sep: &str) -> Vec<&'a str> {
    line.split(sep).map(str::trim).filter(|f| !f.is_empty()).collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        files: SeedFiles,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir(dir.path().join("data")).unwrap();
            let files = SeedFiles {
                seed_dir: dir.path().join("data"),
                floors_file: dir.path().join("floors.txt"),
                floor_map_file: dir.path().join("floormap.txt"),
                ignore_file: None,
                combined_file: None,
                locations_file: None,
                partners_file: None,
                separator: ";".to_string(),
            };
            fs::write(&files.floors_file, "# key;repeatable\nG;false\nF1;true\nF2;true\n").unwrap();
            fs::write(&files.floor_map_file, "G;a\nG;b\nF1;c\nF1;d\nF2;e\n").unwrap();
            fs::write(
                files.seed_dir.join("2019-01-01.txt"),
                "Time;2019-01-01T00:00:00Z\nTotal clients;10\na;0.5\nc;0.5\n\
                 Time;2019-01-01T00:01:00Z\nNO DATA\n",
            )
            .unwrap();
            Self { dir, files }
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }
    }

    #[test]
    fn loads_floors_in_file_order() {
        let fixture = Fixture::new();
        let model = load_seed(&fixture.files).unwrap();

        let numbers: Vec<u32> = model.floors.iter().map(|f| f.number).collect();
        assert_eq!(numbers, vec![0, 2, 3]);
        assert!(!model.floors[0].repeatable);
        assert_eq!(model.floors[1].sensors, vec![SensorId::from("c"), SensorId::from("d")]);
    }

    #[test]
    fn no_data_marks_a_hole() {
        let fixture = Fixture::new();
        let model = load_seed(&fixture.files).unwrap();

        let day = &model.entries[&NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()];
        assert_eq!(day.len(), 2);
        assert!(day[0].has_data());
        assert_eq!(day[0].total, 10);
        assert!(!day[1].has_data());
    }

    #[test]
    fn unknown_sensor_is_rejected() {
        let fixture = Fixture::new();
        fs::write(
            fixture.files.seed_dir.join("2019-01-02.txt"),
            "Time;2019-01-02T00:00:00Z\nTotal clients;5\nzzz;1.0\n",
        )
        .unwrap();
        let err = load_seed(&fixture.files).unwrap_err();
        assert!(matches!(err, GenError::UnknownSensor { .. }));
    }

    #[test]
    fn ignored_sensor_is_skipped() {
        let mut fixture = Fixture::new();
        fixture.files.ignore_file = Some(fixture.write("ignore.txt", "zzz\n"));
        fs::write(
            fixture.files.seed_dir.join("2019-01-02.txt"),
            "Time;2019-01-02T00:00:00Z\nTotal clients;5\nzzz;1.0\na;1.0\n",
        )
        .unwrap();
        let model = load_seed(&fixture.files).unwrap();
        let day = &model.entries[&NaiveDate::from_ymd_opt(2019, 1, 2).unwrap()];
        assert_eq!(day[0].probability(&SensorId::from("zzz")), None);
        assert_eq!(day[0].probability(&SensorId::from("a")), Some(1.0));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let fixture = Fixture::new();
        fs::write(
            fixture.files.seed_dir.join("copy.txt"),
            "Time;2019-01-01T05:00:00Z\nTotal clients;5\na;1.0\n",
        )
        .unwrap();
        let err = load_seed(&fixture.files).unwrap_err();
        assert!(matches!(err, GenError::DuplicateSeedDate { .. }));
    }

    #[test]
    fn mixed_dates_are_rejected() {
        let fixture = Fixture::new();
        fs::write(
            fixture.files.seed_dir.join("2019-01-03.txt"),
            "Time;2019-01-03T23:59:00Z\na;1.0\nTime;2019-01-04T00:00:00Z\na;1.0\n",
        )
        .unwrap();
        let err = load_seed(&fixture.files).unwrap_err();
        assert!(matches!(err, GenError::MixedDates { .. }));
    }

    #[test]
    fn empty_files_are_skipped() {
        let fixture = Fixture::new();
        fs::write(fixture.files.seed_dir.join("empty.txt"), "# nothing here\n\n").unwrap();
        let model = load_seed(&fixture.files).unwrap();
        assert_eq!(model.entries.len(), 1);
    }

    #[test]
    fn combined_members_leave_the_floor_list() {
        let mut fixture = Fixture::new();
        fixture.files.combined_file = Some(fixture.write("combined.txt", "c;d\nsolo\n"));
        let model = load_seed(&fixture.files).unwrap();

        assert_eq!(model.floors[1].sensors, vec![SensorId::from("c")]);
        assert_eq!(model.combined[&SensorId::from("c")], vec![SensorId::from("d")]);
    }

    #[test]
    fn combined_across_floors_is_rejected() {
        let mut fixture = Fixture::new();
        fixture.files.combined_file = Some(fixture.write("combined.txt", "a;c\n"));
        assert!(matches!(
            load_seed(&fixture.files).unwrap_err(),
            GenError::InvalidCombined(_)
        ));
    }

    #[test]
    fn combined_sensor_on_two_lines_is_rejected() {
        let mut fixture = Fixture::new();
        fixture.files.combined_file = Some(fixture.write("combined.txt", "c;d\nd;c\n"));
        assert!(matches!(
            load_seed(&fixture.files).unwrap_err(),
            GenError::InvalidCombined(_)
        ));
    }

    #[test]
    fn locations_and_partners() {
        let mut fixture = Fixture::new();
        fixture.files.locations_file = Some(fixture.write("locations.txt", "a;lecture\nb;lecture\n"));
        fixture.files.partners_file = Some(fixture.write("partners.txt", "a;b\n"));
        let model = load_seed(&fixture.files).unwrap();

        assert_eq!(model.location_of(&SensorId::from("a")), LocationType::new("lecture"));
        assert_eq!(model.location_of(&SensorId::from("c")), LocationType::default());
        assert_eq!(model.partners_of(&SensorId::from("a")), &[SensorId::from("b")]);
        assert!(model.secondary_partners().contains(&SensorId::from("b")));
    }

    #[test]
    fn partners_must_share_a_floor() {
        let mut fixture = Fixture::new();
        fixture.files.partners_file = Some(fixture.write("partners.txt", "a;c\n"));
        assert!(matches!(
            load_seed(&fixture.files).unwrap_err(),
            GenError::InvalidPartners { .. }
        ));
    }

    #[test]
    fn floor_map_with_unknown_floor_is_rejected() {
        let fixture = Fixture::new();
        fs::write(&fixture.files.floor_map_file, "G;a\nROOF;z\n").unwrap();
        assert!(matches!(
            load_seed(&fixture.files).unwrap_err(),
            GenError::Parse { line: 2, .. }
        ));
    }

    #[test]
    fn timestamps_accept_naive_forms() {
        assert_eq!(
            parse_time("2019-01-01T00:01:00"),
            parse_time("2019-01-01T00:01:00Z")
        );
        assert!(parse_time("2019-01-01 00:01:00.5").is_some());
        assert!(parse_time("yesterday").is_none());
    }
}
