//! Time-series generation from the normalized seed.
//!
//! Each seed date is mapped onto consecutive output dates starting at the
//! requested start date; when the seed runs out it is replayed from its
//! first date until the end date is reached or the writer asks to stop.
//! Seed entry times are not used: every output date starts at
//! `00:00:s` for a per-run `s` in `1..=10` and advances by the generation
//! interval.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;

use chrono::NaiveDate;
use occubench_config::GeneratorConfig;
use occubench_types::{
    ApName, GeneratedEntry, Schema, SeedEntry, SeedModel, SensorId, SyntheticAccessPoint,
    Timestamp,
};
use tracing::debug;

use crate::error::{GenError, GenResult};
use crate::rng::BenchRng;

/// Fixed spacing between consecutive row readings within one tick.
const READING_SPACING_NANOS: u64 = 15_000_000;
/// Exclusive upper bound of the random extra spacing.
const READING_SPACING_JITTER_NANOS: u64 = 10_000_000;

/// Destination of generated entries.
pub trait EntryWriter {
    type Error;

    fn write(&mut self, entry: GeneratedEntry) -> Result<(), Self::Error>;

    /// Polled between ticks and between seed dates. Once it returns
    /// `true` the generator returns after the current tick.
    fn should_stop(&self) -> bool {
        false
    }
}

impl EntryWriter for Vec<GeneratedEntry> {
    type Error = Infallible;

    fn write(&mut self, entry: GeneratedEntry) -> Result<(), Infallible> {
        self.push(entry);
        Ok(())
    }
}

/// An access point together with the seed sensor it mimics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedAp {
    pub name: ApName,
    pub sensor: SensorId,
}

/// Pairs every access point with its assigned sensor.
pub fn assigned_aps<'a>(
    aps: impl IntoIterator<Item = &'a SyntheticAccessPoint>,
) -> GenResult<Vec<AssignedAp>> {
    aps.into_iter()
        .map(|ap| {
            let sensor = ap
                .assigned
                .clone()
                .ok_or_else(|| GenError::Unassigned(ap.name.clone()))?;
            Ok(AssignedAp {
                name: ap.name.clone(),
                sensor,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesSettings {
    pub generation_interval_secs: u32,
    pub source_interval_secs: u32,
    pub client_scale: f64,
    pub jitter_max: u32,
    pub schema: Schema,
}

impl SeriesSettings {
    pub fn from_config(config: &GeneratorConfig, schema: Schema) -> Self {
        Self {
            generation_interval_secs: config.generation_interval_secs,
            source_interval_secs: config.source_interval_secs,
            client_scale: config.client_scale,
            jitter_max: config.jitter_max,
            schema,
        }
    }
}

/// How seed entries map onto generated ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    /// One tick per seed entry.
    Copy,
    /// `extra` interpolated ticks after every seed entry.
    Interpolate { extra: u32 },
    /// Emit one seed entry, then skip `skip`.
    Skip { skip: u32 },
}

impl Regime {
    fn select(generation: u32, source: u32) -> GenResult<Self> {
        let mismatch = GenError::MismatchedIntervals { generation, source };
        if generation == 0 || source == 0 {
            return Err(mismatch);
        }
        if generation == source {
            Ok(Regime::Copy)
        } else if generation < source && source % generation == 0 {
            Ok(Regime::Interpolate {
                extra: source / generation - 1,
            })
        } else if generation > source && generation % source == 0 {
            Ok(Regime::Skip {
                skip: generation / source - 1,
            })
        } else {
            Err(mismatch)
        }
    }
}

/// What one call to [`SeriesGenerator::generate`] produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    /// Entries handed to the writer.
    pub entries: u64,
    /// (access point, count) readings across those entries.
    pub readings: u64,
    /// Full or partial replays of the seed.
    pub passes: u32,
    pub last_time: Option<Timestamp>,
    pub stopped_early: bool,
}

/// Replays a normalized seed as synthetic readings.
#[derive(Debug)]
pub struct SeriesGenerator<'a> {
    seed: &'a SeedModel,
    dates: Vec<NaiveDate>,
    settings: SeriesSettings,
    regime: Regime,
}

impl<'a> SeriesGenerator<'a> {
    pub fn new(seed: &'a SeedModel, settings: SeriesSettings) -> GenResult<Self> {
        let regime = Regime::select(settings.generation_interval_secs, settings.source_interval_secs)?;
        let dates: Vec<NaiveDate> = seed
            .entries
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(date, _)| *date)
            .collect();
        if dates.is_empty() {
            return Err(GenError::EmptySeed("no seed entries to replay".to_string()));
        }
        Ok(Self {
            seed,
            dates,
            settings,
            regime,
        })
    }

    /// Generates readings for `aps` on `[start, end)`.
    ///
    /// Consumes `rng` for the start-second offset, the reading spacing and
    /// the client jitter, so identical inputs produce identical output.
    pub fn generate<W: EntryWriter>(
        &self,
        aps: &[AssignedAp],
        start: NaiveDate,
        end: NaiveDate,
        rng: &mut BenchRng,
        out: &mut W,
    ) -> Result<GenerationSummary, W::Error> {
        let mut run = Run {
            out,
            summary: GenerationSummary::default(),
        };
        if aps.is_empty() || start >= end {
            debug!(aps = aps.len(), %start, %end, "nothing to generate");
            return Ok(run.summary);
        }

        let start_second = rng.next_below(10) + 1;
        let mut date = start;
        while date < end && !run.out.should_stop() {
            date = self.replay_seed(date, end, start_second, aps, rng, &mut run)?;
            run.summary.passes += 1;
        }
        run.summary.stopped_early = date < end;

        debug!(
            entries = run.summary.entries,
            readings = run.summary.readings,
            passes = run.summary.passes,
            stopped_early = run.summary.stopped_early,
            "generation finished"
        );
        Ok(run.summary)
    }

    /// One pass over the seed dates. Returns the next output date.
    fn replay_seed<W: EntryWriter>(
        &self,
        mut date: NaiveDate,
        end: NaiveDate,
        start_second: u64,
        aps: &[AssignedAp],
        rng: &mut BenchRng,
        run: &mut Run<'_, W>,
    ) -> Result<NaiveDate, W::Error> {
        let interval = u64::from(self.settings.generation_interval_secs);

        for (k, seed_date) in self.dates.iter().enumerate() {
            if run.out.should_stop() {
                break;
            }
            let entries = self.entries_on(*seed_date);
            let midnight = Timestamp::from_date(date);
            let mut offset = start_second;
            let mut skipped = match self.regime {
                Regime::Skip { skip } => skip,
                _ => 0,
            };

            for (i, entry) in entries.iter().enumerate() {
                if run.out.should_stop() {
                    break;
                }
                if let Regime::Skip { skip } = self.regime {
                    if skipped != skip {
                        skipped += 1;
                        continue;
                    }
                    skipped = 0;
                }

                self.emit(midnight.saturating_add_secs(offset), entry, aps, rng, run)?;

                if let Regime::Interpolate { extra } = self.regime {
                    let next = entries
                        .get(i + 1)
                        .or_else(|| self.dates.get(k + 1).and_then(|d| self.entries_on(*d).first()));
                    match next {
                        Some(next) if entry.has_data() && next.has_data() => {
                            for j in 0..extra {
                                offset += interval;
                                let fake = interpolate(entry, next, j, extra);
                                self.emit(midnight.saturating_add_secs(offset), &fake, aps, rng, run)?;
                            }
                        }
                        _ => offset += interval * u64::from(extra),
                    }
                }
                offset += interval;
            }

            date = date.succ_opt().unwrap_or(NaiveDate::MAX);
            if date >= end {
                break;
            }
        }
        Ok(date)
    }

    fn entries_on(&self, date: NaiveDate) -> &[SeedEntry] {
        self.seed.entries.get(&date).map_or(&[], Vec::as_slice)
    }

    /// Emits the readings of one tick. Holes emit nothing.
    fn emit<W: EntryWriter>(
        &self,
        tick: Timestamp,
        entry: &SeedEntry,
        aps: &[AssignedAp],
        rng: &mut BenchRng,
        run: &mut Run<'_, W>,
    ) -> Result<(), W::Error> {
        let Some(probabilities) = entry.probabilities.as_ref() else {
            return Ok(());
        };

        match self.settings.schema {
            Schema::Row => {
                let mut time = tick;
                for ap in aps {
                    let Some(probability) = probabilities.get(&ap.sensor).copied() else {
                        continue;
                    };
                    time = time.saturating_add_nanos(reading_spacing(rng));
                    let clients = self.client_count(entry.total, probability, rng);
                    run.write(GeneratedEntry::Row {
                        time,
                        ap: ap.name.clone(),
                        clients,
                    })?;
                }
            }
            Schema::Wide => {
                let time = tick.saturating_add_nanos(reading_spacing(rng));
                let mut readings = BTreeMap::new();
                for ap in aps {
                    let Some(probability) = probabilities.get(&ap.sensor).copied() else {
                        continue;
                    };
                    let clients = self.client_count(entry.total, probability, rng);
                    readings.insert(ap.name.clone(), clients);
                }
                if !readings.is_empty() {
                    run.write(GeneratedEntry::Wide { time, readings })?;
                }
            }
        }
        Ok(())
    }

    /// `ceil(total × scale × p)`, plus `ceil(jitter × p)` for a uniform
    /// `jitter` in `[0, jitter_max)` when jitter is enabled.
    fn client_count(&self, total: u32, probability: f64, rng: &mut BenchRng) -> u32 {
        let base = (f64::from(total) * self.settings.client_scale * probability).ceil();
        let jitter = if self.settings.jitter_max > 0 {
            (rng.next_below(u64::from(self.settings.jitter_max)) as f64 * probability).ceil()
        } else {
            0.0
        };
        (base + jitter) as u32
    }
}

struct Run<'w, W> {
    out: &'w mut W,
    summary: GenerationSummary,
}

impl<W: EntryWriter> Run<'_, W> {
    /// Timestamps never go backwards within one producer, even when the
    /// reading spacing of a dense tick runs into the next one.
    fn write(&mut self, mut entry: GeneratedEntry) -> Result<(), W::Error> {
        if let Some(last) = self.summary.last_time {
            if entry.time() < last {
                match &mut entry {
                    GeneratedEntry::Row { time, .. } | GeneratedEntry::Wide { time, .. } => {
                        *time = last;
                    }
                }
            }
        }
        self.summary.entries += 1;
        self.summary.readings += entry.reading_count() as u64;
        self.summary.last_time = Some(entry.time());
        self.out.write(entry)
    }
}

fn reading_spacing(rng: &mut BenchRng) -> u64 {
    READING_SPACING_NANOS + rng.next_below(READING_SPACING_JITTER_NANOS)
}

/// Fake entry `index` of `extra` between `first` and `last`.
///
/// Only sensors present in both endpoints get a probability, so a sensor
/// missing from either side stays a hole across the interpolated ticks.
fn interpolate(first: &SeedEntry, last: &SeedEntry, index: u32, extra: u32) -> SeedEntry {
    let blend = f64::from(index + 1) / f64::from(extra + 1);
    let lerp = |a: f64, b: f64| (1.0 - blend) * a + blend * b;

    let total = lerp(f64::from(first.total), f64::from(last.total)).ceil() as u32;
    let mut probabilities = HashMap::new();
    if let (Some(a), Some(b)) = (&first.probabilities, &last.probabilities) {
        for (sensor, p) in a {
            if let Some(q) = b.get(sensor) {
                probabilities.insert(sensor.clone(), lerp(*p, *q));
            }
        }
    }
    SeedEntry::new(first.time, total, probabilities)
}
