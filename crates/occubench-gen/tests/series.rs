//! End-to-end series generation: regimes, holes, wraparound and early stop.

mod common;

use std::convert::Infallible;

use common::{date, entry, hole};
use occubench_gen::{
    AssignedAp, BenchRng, EntryWriter, GenError, SeriesGenerator, SeriesSettings,
};
use occubench_types::{ApName, GeneratedEntry, Schema, SeedModel, SensorId, Timestamp};

fn ap(name: &str, sensor: &str) -> AssignedAp {
    AssignedAp {
        name: ApName::from(name),
        sensor: SensorId::from(sensor),
    }
}

fn settings(generation: u32, source: u32, schema: Schema) -> SeriesSettings {
    SeriesSettings {
        generation_interval_secs: generation,
        source_interval_secs: source,
        client_scale: 1.0,
        jitter_max: 0,
        schema,
    }
}

fn rows_for(out: &[GeneratedEntry], name: &str) -> Vec<(Timestamp, u32)> {
    out.iter()
        .filter_map(|e| match e {
            GeneratedEntry::Row { time, ap, clients } if ap.as_str() == name => {
                Some((*time, *clients))
            }
            _ => None,
        })
        .collect()
}

fn one_day(entries: Vec<occubench_types::SeedEntry>) -> SeedModel {
    let mut seed = SeedModel::default();
    seed.entries.insert(date(2019, 1, 1), entries);
    seed
}

fn run(seed: &SeedModel, settings: SeriesSettings, aps: &[AssignedAp], days: u64) -> Vec<GeneratedEntry> {
    let generator = SeriesGenerator::new(seed, settings).unwrap();
    let start = date(2019, 4, 1);
    let end = start + chrono::Days::new(days);
    let mut out = Vec::new();
    generator
        .generate(aps, start, end, &mut BenchRng::new(42), &mut out)
        .unwrap();
    out
}

#[test]
fn interpolation_inserts_k_minus_one_entries() {
    let d = date(2019, 1, 1);
    let seed = one_day(vec![
        entry(d, 0, 100, &[("a", 0.1), ("b", 0.5)]),
        entry(d, 60, 200, &[("a", 0.2)]),
        entry(d, 120, 300, &[("a", 0.3), ("b", 0.5)]),
    ]);
    let aps = [ap("AP-A", "a"), ap("AP-B", "b")];
    let out = run(&seed, settings(20, 60, Schema::Row), &aps, 1);

    let a = rows_for(&out, "AP-A");
    // e0 f f e1 f f e2, and nothing after the final entry
    assert_eq!(a.len(), 7);
    let clients: Vec<u32> = a.iter().map(|(_, c)| *c).collect();
    // ceil(lerp(total) * lerp(p)): 10, ceil(134*0.1333), ceil(167*0.1667), 40, ...
    assert_eq!(clients[0], 10);
    assert_eq!(clients[3], 40);
    assert_eq!(clients[6], 90);
    assert!(clients.windows(2).all(|w| w[0] <= w[1]));

    // "b" is missing from e1, so neither neighboring gap is filled
    let b = rows_for(&out, "AP-B");
    assert_eq!(b.len(), 2);
}

#[test]
fn interpolated_ticks_follow_the_generation_interval() {
    let d = date(2019, 1, 1);
    let seed = one_day(vec![
        entry(d, 0, 100, &[("a", 1.0)]),
        entry(d, 60, 100, &[("a", 1.0)]),
    ]);
    let out = run(&seed, settings(20, 60, Schema::Wide), &[ap("AP-A", "a")], 1);

    let secs: Vec<u64> = out.iter().map(|e| e.time().as_secs() % 86_400).collect();
    assert_eq!(secs.len(), 4);
    let base = secs[0];
    assert!((1..=10).contains(&base));
    assert_eq!(secs, vec![base, base + 20, base + 40, base + 60]);
}

#[test]
fn holes_suppress_interpolation() {
    let d = date(2019, 1, 1);
    let seed = one_day(vec![
        entry(d, 0, 100, &[("a", 0.5)]),
        hole(d, 60),
        entry(d, 120, 100, &[("a", 0.5)]),
    ]);
    let out = run(&seed, settings(20, 60, Schema::Row), &[ap("AP-A", "a")], 1);
    let a = rows_for(&out, "AP-A");
    assert_eq!(a.len(), 2);
    // The hole leaves two empty ticks plus their interpolation slots
    assert_eq!(a[1].0.as_secs() - a[0].0.as_secs(), 120);
}

#[test]
fn slower_generation_skips_entries_per_date() {
    let d1 = date(2019, 1, 1);
    let d2 = date(2019, 1, 2);
    let mut seed = SeedModel::default();
    seed.entries.insert(
        d1,
        (0..5).map(|i| entry(d1, i * 60, 10 + i as u32, &[("a", 1.0)])).collect(),
    );
    seed.entries.insert(
        d2,
        (0..5).map(|i| entry(d2, i * 60, 20 + i as u32, &[("a", 1.0)])).collect(),
    );
    let out = run(&seed, settings(120, 60, Schema::Row), &[ap("AP-A", "a")], 2);

    let clients: Vec<u32> = rows_for(&out, "AP-A").iter().map(|(_, c)| *c).collect();
    assert_eq!(clients, vec![10, 12, 14, 20, 22, 24]);
}

#[test]
fn wraparound_replays_seed_continuously() {
    let d1 = date(2019, 1, 1);
    let d2 = date(2019, 1, 2);
    let mut seed = SeedModel::default();
    seed.entries.insert(
        d1,
        vec![entry(d1, 0, 10, &[("a", 1.0)]), entry(d1, 60, 11, &[("a", 1.0)])],
    );
    seed.entries.insert(
        d2,
        vec![entry(d2, 0, 20, &[("a", 1.0)]), entry(d2, 60, 21, &[("a", 1.0)])],
    );
    let out = run(&seed, settings(60, 60, Schema::Row), &[ap("AP-A", "a")], 5);

    let rows = rows_for(&out, "AP-A");
    let clients: Vec<u32> = rows.iter().map(|(_, c)| *c).collect();
    assert_eq!(clients, vec![10, 11, 20, 21, 10, 11, 20, 21, 10, 11]);

    assert!(rows.windows(2).all(|w| w[0].0 < w[1].0));
    let days: Vec<_> = rows.iter().map(|(t, _)| t.date()).collect();
    let start = date(2019, 4, 1);
    for (i, day) in days.iter().enumerate() {
        assert_eq!(*day, start + chrono::Days::new(i as u64 / 2));
    }
    assert!(days.iter().all(|d| *d < date(2019, 4, 6)));
}

#[test]
fn identical_seeds_give_identical_output() {
    let seed = common::campus();
    let aps = [ap("AP-1", "g1"), ap("AP-2", "f1"), ap("AP-3", "s3")];
    let mut jittered = settings(20, 60, Schema::Row);
    jittered.jitter_max = 100;

    let first = run(&seed, jittered, &aps, 4);
    let second = run(&seed, jittered, &aps, 4);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn wide_schema_groups_readings_per_tick() {
    let d = date(2019, 1, 1);
    let seed = one_day(vec![
        entry(d, 0, 100, &[("a", 0.25), ("b", 0.75)]),
        entry(d, 60, 100, &[("b", 1.0)]),
        hole(d, 120),
    ]);
    let out = run(
        &seed,
        settings(60, 60, Schema::Wide),
        &[ap("AP-A", "a"), ap("AP-B", "b")],
        1,
    );
    assert_eq!(out.len(), 2);
    match &out[0] {
        GeneratedEntry::Wide { readings, .. } => {
            assert_eq!(readings[&ApName::from("AP-A")], 25);
            assert_eq!(readings[&ApName::from("AP-B")], 75);
        }
        other => panic!("expected a wide entry, got {other:?}"),
    }
    assert_eq!(out[1].reading_count(), 1);
}

struct StopAfter {
    limit: usize,
    seen: Vec<GeneratedEntry>,
}

impl EntryWriter for StopAfter {
    type Error = Infallible;

    fn write(&mut self, entry: GeneratedEntry) -> Result<(), Infallible> {
        self.seen.push(entry);
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.seen.len() >= self.limit
    }
}

#[test]
fn writer_can_stop_generation_early() {
    let seed = common::campus();
    let generator = SeriesGenerator::new(&seed, settings(60, 60, Schema::Wide)).unwrap();
    let mut out = StopAfter {
        limit: 3,
        seen: Vec::new(),
    };
    let summary = generator
        .generate(
            &[ap("AP-1", "g1")],
            date(2019, 4, 1),
            date(9999, 12, 31),
            &mut BenchRng::new(1),
            &mut out,
        )
        .unwrap();

    assert_eq!(out.seen.len(), 3);
    assert!(summary.stopped_early);
    assert_eq!(summary.entries, 3);
}

#[test]
fn mismatched_intervals_fail_construction() {
    let seed = common::campus();
    let err = SeriesGenerator::new(&seed, settings(45, 60, Schema::Row)).unwrap_err();
    assert!(matches!(err, GenError::MismatchedIntervals { generation: 45, source: 60 }));
}
