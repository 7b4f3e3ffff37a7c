//! Query semantics of the in-memory store.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use occubench_config::QueriesConfig;
use occubench_core::{QueryAdapter, Sink};
use occubench_types::{
    ApName, Floor, GeneratedEntry, LocationType, SensorId, SyntheticAccessPoint, Timestamp,
    Topology,
};
use occubench_targets::MemoryStore;
use test_case::test_case;

const DAY: u64 = 86_400;

fn day(d: u32) -> Timestamp {
    Timestamp::from_date(NaiveDate::from_ymd_opt(2019, 4, d).unwrap())
}

fn ap(name: &str, floor: u32) -> SyntheticAccessPoint {
    SyntheticAccessPoint::new(name.into(), SensorId::from("s"), floor, LocationType::default())
}

/// Floor 0 has "a" and "b", floor 2 has "c".
fn topology() -> Topology {
    Topology::new(vec![
        Floor {
            number: 0,
            template: "ground".to_string(),
            aps: vec![ap("a", 0), ap("b", 0)],
        },
        Floor {
            number: 2,
            template: "first".to_string(),
            aps: vec![ap("c", 2)],
        },
    ])
}

fn row(time: Timestamp, name: &str, clients: u32) -> GeneratedEntry {
    GeneratedEntry::Row {
        time,
        ap: name.into(),
        clients,
    }
}

/// Two days of hourly readings: `a` = hour, `b` = 2, `c` = 10.
fn loaded() -> occubench_targets::MemorySession {
    let session = MemoryStore::new(60).session();
    QueryAdapter::prepare(&session, &QueriesConfig::default(), &topology(), 7).unwrap();
    for d in [1, 2] {
        for hour in 0..24u64 {
            let t = day(d).saturating_add_secs(hour * 3_600);
            session.add(row(t, "a", hour as u32)).unwrap();
            session.add(row(t, "b", 2)).unwrap();
            session.add(row(t, "c", 10)).unwrap();
        }
    }
    session
}

#[test]
fn total_clients_per_day() {
    let session = loaded();
    let totals = session.total_clients(day(1), day(3)).unwrap();
    let a_sum: u64 = (0..24).sum();
    let expected = a_sum + 24 * 2 + 24 * 10;
    assert_eq!(totals.len(), 2);
    assert!(totals.iter().all(|t| t.total == expected));
    assert_eq!(totals[0].day, NaiveDate::from_ymd_opt(2019, 4, 1).unwrap());
}

#[test]
fn floor_totals_follow_topology_order() {
    let session = loaded();
    let totals = session
        .floor_totals(day(1), day(1).saturating_add_secs(DAY))
        .unwrap();
    let floors: Vec<u32> = totals.iter().map(|t| t.floor).collect();
    assert_eq!(floors, vec![0, 2]);
    assert_eq!(totals[0].total, (0..24).sum::<u64>() + 48);
    assert_eq!(totals[1].total, 240);
}

#[test_case(0, 24, 23; "whole day")]
#[test_case(0, 12, 11; "end is exclusive")]
#[test_case(5, 6, 5; "single reading")]
fn max_for_ap_within_range(from_hour: u64, to_hour: u64, expected: u32) {
    let session = loaded();
    let start = day(1).saturating_add_secs(from_hour * 3_600);
    let end = day(1).saturating_add_secs(to_hour * 3_600);
    let max = session.max_for_ap(start, end, &ApName::from("a")).unwrap();
    assert_eq!(max.len(), 1);
    assert_eq!(max[0].max, expected);
}

#[test]
fn avg_occupancy_compares_now_with_history() {
    let session = loaded();
    // 12:00 plus a minute on day 2: the current reading is the 12:00 one.
    let end = day(2).saturating_add_secs(12 * 3_600 + 60);
    let start = end.saturating_sub_secs(DAY);
    let rows = session.avg_occupancy(start, end, 120).unwrap();

    let a = rows.iter().find(|r| r.ap.as_str() == "a").unwrap();
    assert_eq!(a.current, 12);
    // [10:01, 12:01) holds 11 and 12 on both days.
    assert!((a.historical_now - 11.5).abs() < 1e-9);
    // [12:01, 14:01) holds 13 and 14.
    assert!((a.historical_soon - 13.5).abs() < 1e-9);

    let c = rows.iter().find(|r| r.ap.as_str() == "c").unwrap();
    assert_eq!(c.current, 10);
    assert!((c.historical_now - 10.0).abs() < 1e-9);
}

#[test]
fn avg_occupancy_skips_aps_without_a_current_reading() {
    let session = loaded();
    let end = day(2).saturating_add_secs(12 * 3_600 + 600);
    let rows = session.avg_occupancy(end.saturating_sub_secs(DAY), end, 60).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn kmeans_partitions_every_access_point() {
    let session = loaded();
    let clusters = session.kmeans(day(1), day(3), 2, 5).unwrap();
    assert_eq!(clusters.len(), 2);

    let union: BTreeSet<ApName> = clusters.iter().flat_map(|c| c.aps.iter().cloned()).collect();
    let total: usize = clusters.iter().map(|c| c.aps.len()).sum();
    assert_eq!(total, 3);
    assert_eq!(union.len(), 3);
}

#[test]
fn newest_timestamp_tracks_ingestion() {
    let session = loaded();
    let newest = day(2).saturating_add_secs(23 * 3_600);
    assert_eq!(session.newest_timestamp(Timestamp::EPOCH).unwrap(), newest);
    assert_eq!(session.newest_timestamp(day(9)).unwrap(), day(9));
}
