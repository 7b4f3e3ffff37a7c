//! End-to-end command tests against a small seed on disk.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
[benchmark]
seed = 7

[generator]
seed_dir = "seed/data"
floors_file = "seed/floors.txt"
floor_map_file = "seed/floormap.txt"
start_date = "2019-03-30"
end_date = "2019-04-01"
jitter_max = 0

[ingest]
start_date = "2019-04-01"
speed = 1000

[queries]
duration_secs = -1
warmup_secs = -1
max_count = 10
earliest_valid_date = "2019-03-30"
interval_min_secs = 3600
interval_max_secs = 86400
kmeans_interval_min_secs = 3600
kmeans_interval_max_secs = 86400
"#;

/// Two floors of two sensors each and one hour of per-minute entries.
fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let seed = temp.path().join("seed");
    fs::create_dir_all(seed.join("data")).unwrap();
    fs::write(seed.join("floors.txt"), "# key;repeatable\nground;false\nupper;true\n").unwrap();
    fs::write(
        seed.join("floormap.txt"),
        "ground;g1\nground;g2\nupper;u1\nupper;u2\n",
    )
    .unwrap();

    let mut data = String::new();
    for minute in 0..60 {
        writeln!(data, "Time;2019-01-01T00:{minute:02}:00Z").unwrap();
        writeln!(data, "Total clients;{}", 40 + minute).unwrap();
        for sensor in ["g1", "g2", "u1", "u2"] {
            writeln!(data, "{sensor};0.25").unwrap();
        }
    }
    fs::write(seed.join("data").join("2019-01-01.txt"), data).unwrap();
    fs::write(temp.path().join("occubench.toml"), CONFIG).unwrap();
    temp
}

fn occubench(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("occubench").unwrap();
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn version_names_the_binary() {
    let temp = TempDir::new().unwrap();
    occubench(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("occubench-cli"));
}

#[test]
fn config_show_json_reflects_the_project_file() {
    let temp = project();
    let output = occubench(temp.path())
        .args(["config", "show", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["benchmark"]["seed"], 7);
    assert_eq!(config["queries"]["max_count"], 10);
    assert_eq!(config["ingest"]["backend"], "memory");
}

#[test]
fn config_show_toml_and_text() {
    let temp = project();
    occubench(temp.path())
        .args(["config", "show", "--format", "toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[generator]"));
    occubench(temp.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generator"));
}

#[test]
fn explicit_config_file_wins() {
    let temp = project();
    let extra = temp.path().join("override.toml");
    fs::write(&extra, "[benchmark]\nseed = 99\n").unwrap();
    let output = occubench(temp.path())
        .args(["config", "show", "--format", "json", "--config"])
        .arg(&extra)
        .output()
        .unwrap();
    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["benchmark"]["seed"], 99);
}

#[test]
fn missing_config_file_is_an_error() {
    let temp = project();
    occubench(temp.path())
        .args(["config", "show", "--config", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn validate_rejects_zero_threads() {
    let temp = project();
    let bad = temp.path().join("bad.toml");
    fs::write(&bad, "[ingest]\nthreads = 0\n").unwrap();
    occubench(temp.path())
        .args(["config", "validate"])
        .assert()
        .success();
    occubench(temp.path())
        .args(["config", "validate", "--config"])
        .arg(&bad)
        .assert()
        .failure();
}

#[test]
fn topology_lists_every_access_point() {
    let temp = project();
    occubench(temp.path())
        .arg("topology")
        .assert()
        .success()
        .stdout(predicate::str::contains("Access points: 4"));
}

#[test]
fn generate_writes_history_as_csv() {
    let temp = project();
    let out = temp.path().join("history");
    occubench(temp.path())
        .args(["generate", "--out"])
        .arg(&out)
        .assert()
        .success();

    let csv = fs::read_to_string(out.join("readings-0000.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("timestamp,ap,clients"));
    // Two days of sixty ticks for four access points.
    assert_eq!(lines.count(), 2 * 60 * 4);
}

#[test]
fn run_saves_query_results() {
    let temp = project();
    let extra = temp.path().join("save.toml");
    fs::write(&extra, "[output]\nsave_query_results = true\n").unwrap();
    occubench(temp.path())
        .args(["run", "--seed", "11", "--config"])
        .arg(&extra)
        .assert()
        .success()
        .stdout(predicate::str::contains("Total queries: 10"));

    let results = fs::read_to_string(temp.path().join("results").join("queries-11.jsonl")).unwrap();
    let records: Vec<serde_json::Value> = results
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.get("kind").is_some()));
}
