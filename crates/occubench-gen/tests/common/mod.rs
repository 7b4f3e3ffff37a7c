//! Seed fixtures shared by the generator integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use chrono::NaiveDate;
use occubench_types::{FloorMetadata, SeedEntry, SeedModel, SensorId, Timestamp};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn entry(day: NaiveDate, secs: u64, total: u32, probs: &[(&str, f64)]) -> SeedEntry {
    let probabilities: HashMap<SensorId, f64> =
        probs.iter().map(|(s, p)| (SensorId::from(*s), *p)).collect();
    SeedEntry::new(Timestamp::from_date(day).saturating_add_secs(secs), total, probabilities)
}

pub fn hole(day: NaiveDate, secs: u64) -> SeedEntry {
    SeedEntry::hole(Timestamp::from_date(day).saturating_add_secs(secs))
}

/// A seed building from `(key, repeatable, sensors)` triples, numbered 0, 2, 3, ...
pub fn building(floors: &[(&str, bool, &[&str])]) -> SeedModel {
    let floors = floors
        .iter()
        .enumerate()
        .map(|(i, (key, repeatable, sensors))| FloorMetadata {
            key: (*key).to_string(),
            number: if i == 0 { 0 } else { i as u32 + 1 },
            repeatable: *repeatable,
            sensors: sensors.iter().map(|s| SensorId::from(*s)).collect(),
        })
        .collect();
    SeedModel {
        floors,
        ..SeedModel::default()
    }
}

/// Three floors, eight sensors, and two days of uneven probabilities with a hole.
pub fn campus() -> SeedModel {
    let mut seed = building(&[
        ("ground", false, &["g1", "g2"]),
        ("first", true, &["f1", "f2", "f3"]),
        ("second", true, &["s1", "s2", "s3"]),
    ]);
    let d1 = date(2019, 1, 1);
    let d2 = date(2019, 1, 2);
    seed.entries.insert(
        d1,
        vec![
            entry(d1, 0, 100, &[("g1", 0.1), ("g2", 0.05), ("f1", 0.2), ("f2", 0.1), ("s1", 0.3)]),
            entry(d1, 60, 120, &[("g1", 0.2), ("f3", 0.4), ("s2", 0.1), ("s3", 0.05)]),
            hole(d1, 120),
        ],
    );
    seed.entries.insert(
        d2,
        vec![
            entry(d2, 0, 80, &[("g2", 0.5), ("f1", 0.25), ("s3", 0.25)]),
            entry(d2, 60, 90, &[("g1", 0.0), ("f2", 0.3)]),
        ],
    );
    seed
}
