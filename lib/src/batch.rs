//! Chunked sampling over a time range, for tabular export.
//!
//! [`BatchExport::next_chunk`] processes a bounded number of rows and then
//! returns, so a host can interleave a long export with other work. A row
//! that cannot be sampled is reported in place and the batch carries on.

use std::sync::Arc;

use color_eyre::eyre::{self, bail};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use crate::{
    bodies::NodeId,
    ephemeris::EphemerisSnapshot,
    orrery::Orrery,
    projection::{self, Reading},
    time::SimTime,
};

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("row {row}: cannot move the clock to {time}")]
    Time { row: u64, time: SimTime },
    #[error("row {row}: `{body}` has no finite reading at {time}")]
    NonFinite {
        row: u64,
        time: SimTime,
        body: Arc<str>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BodyRecord {
    pub name: Arc<str>,
    pub ra: String,
    pub dec: String,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub distance_au: f64,
    pub distance_km: f64,
    pub helio_longitude_deg: f64,
    pub helio_latitude_deg: f64,
    pub sun_distance_au: f64,
}

impl BodyRecord {
    fn from_reading(reading: &Reading) -> Self {
        Self {
            name: reading.name.clone(),
            ra: projection::format_ra(reading.ra),
            dec: projection::format_dec(reading.dec),
            ra_deg: reading.ra.to_degrees(),
            dec_deg: reading.dec.to_degrees(),
            distance_au: reading.distance.au,
            distance_km: reading.distance.km,
            helio_longitude_deg: reading.sun_longitude.to_degrees(),
            helio_latitude_deg: reading.sun_latitude.to_degrees(),
            sun_distance_au: reading.sun_distance.au,
        }
    }

    fn is_finite(&self) -> bool {
        [
            self.ra_deg,
            self.dec_deg,
            self.distance_au,
            self.helio_longitude_deg,
            self.helio_latitude_deg,
            self.sun_distance_au,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Everything sampled at one instant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportRecord {
    pub row: u64,
    pub time: SimTime,
    pub julian_day: f64,
    /// RFC 3339, when the instant is representable.
    pub datetime: Option<String>,
    pub ephemeris: EphemerisSnapshot,
    pub bodies: Vec<BodyRecord>,
}

pub type ExportRow = Result<ExportRecord, SampleError>;

#[derive(Clone, Debug)]
pub struct BatchExport {
    start: SimTime,
    step: f64,
    rows: u64,
    next_row: u64,
    bodies: Vec<NodeId>,
    chunk_size: usize,
    failed: u64,
}

impl BatchExport {
    /// Rows at `start + k · step` for every `k` that stays within `end`.
    pub fn new(
        start: SimTime,
        end: SimTime,
        step: f64,
        bodies: Vec<NodeId>,
        chunk_size: usize,
    ) -> eyre::Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            bail!("export range {start}..{end} is not finite");
        }
        if end < start {
            bail!("export range {start}..{end} runs backwards");
        }
        if !step.is_finite() || step <= 0.0 {
            bail!("export step must be positive and finite, got {step}");
        }
        if chunk_size == 0 {
            bail!("export chunk size must be at least 1");
        }
        let steps = ((end - start) / step).floor();
        if !steps.is_finite() || steps >= u64::MAX as f64 {
            bail!("export range {start}..{end} has too many steps of {step} days");
        }
        let rows = steps as u64 + 1;
        debug!(rows, chunk_size, bodies = bodies.len(), "batch export planned");
        Ok(Self {
            start,
            step,
            rows,
            next_row: 0,
            bodies,
            chunk_size,
            failed: 0,
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn completed(&self) -> u64 {
        self.next_row
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.next_row >= self.rows
    }

    /// Sample up to one chunk of rows, moving `orrery`'s clock to each row's
    /// time. Returns `None` once every row has been produced.
    pub fn next_chunk(&mut self, orrery: &mut Orrery) -> Option<Vec<ExportRow>> {
        if self.is_finished() {
            return None;
        }
        let end = self
            .rows
            .min(self.next_row.saturating_add(self.chunk_size as u64));
        let mut chunk = Vec::new();
        for row in self.next_row..end {
            let result = self.sample_row(orrery, row);
            if let Err(error) = &result {
                warn!(%error, "skipping export row");
                self.failed += 1;
            }
            chunk.push(result);
        }
        self.next_row = end;
        debug!(done = self.next_row, of = self.rows, "export chunk");
        Some(chunk)
    }

    fn sample_row(&self, orrery: &mut Orrery, row: u64) -> ExportRow {
        let time = self.start + row as f64 * self.step;
        if orrery.jump_to_time(time).is_err() {
            return Err(SampleError::Time { row, time });
        }

        let bodies: Vec<_> = orrery
            .readings(&self.bodies)
            .iter()
            .map(BodyRecord::from_reading)
            .collect();
        if let Some(bad) = bodies.iter().find(|record| !record.is_finite()) {
            return Err(SampleError::NonFinite {
                row,
                time,
                body: bad.name.clone(),
            });
        }

        let epoch_jd = orrery.config().calibration.epoch_jd;
        Ok(ExportRecord {
            row,
            time,
            julian_day: time.julian_day(epoch_jd),
            datetime: time
                .to_datetime(epoch_jd)
                .and_then(|dt| dt.format(&Rfc3339).ok()),
            ephemeris: orrery.sample_ephemeris_at(time),
            bodies,
        })
    }
}

#[test]
fn export_hands_back_control_every_chunk() {
    use crate::{catalog, config::Configuration};

    let mut orrery = Orrery::new(Configuration::default()).unwrap();
    let bodies = ["mars", catalog::SUN, catalog::MOON]
        .map(|name| orrery.registry().require(name).unwrap())
        .to_vec();
    let mut export =
        BatchExport::new(SimTime::ZERO, SimTime::from_days(10.0), 1.0, bodies, 4).unwrap();
    assert_eq!(export.rows(), 11);

    let mut sizes = Vec::new();
    let mut records = Vec::new();
    while let Some(chunk) = export.next_chunk(&mut orrery) {
        sizes.push(chunk.len());
        records.extend(chunk.into_iter().map(Result::unwrap));
    }
    assert_eq!(sizes, [4, 4, 3]);
    assert!(export.is_finished());
    assert_eq!(export.failed(), 0);
    assert_eq!(records[7].time.days(), 7.0);
    assert_eq!(records[0].datetime.as_deref(), Some("2000-06-21T00:00:00Z"));
    assert_eq!(&*records[3].bodies[0].name, "mars");
    assert_eq!(records[3].bodies.len(), 3);
}

#[test]
fn unsampleable_rows_are_recorded_and_skipped() {
    use crate::{bodies::NodeSpec, catalog, config::Configuration};

    let table = vec![
        NodeSpec::frame(catalog::ROOT),
        NodeSpec::body(catalog::EARTH).parent(catalog::ROOT),
        NodeSpec::frame(catalog::EARTH_EQUATOR).parent(catalog::EARTH),
        NodeSpec::body(catalog::SUN).parent(catalog::ROOT).circular(100.0),
        NodeSpec::frame(catalog::SUN_FIXED).parent(catalog::SUN),
        NodeSpec::body("runaway")
            .parent(catalog::SUN_FIXED)
            .circular(1.0)
            .speed(1e10),
    ];
    let mut orrery = Orrery::with_table(Configuration::default(), table).unwrap();
    let runaway = orrery.registry().require("runaway").unwrap();
    let mut export =
        BatchExport::new(SimTime::ZERO, SimTime::from_days(1e300), 1e300, vec![runaway], 8)
            .unwrap();

    let chunk = export.next_chunk(&mut orrery).unwrap();
    assert_eq!(chunk.len(), 2);
    assert!(chunk[0].is_ok());
    assert!(matches!(
        &chunk[1],
        Err(SampleError::NonFinite { row: 1, body, .. }) if &**body == "runaway"
    ));
    assert_eq!(export.failed(), 1);
    assert!(export.next_chunk(&mut orrery).is_none());
}

#[test]
fn malformed_ranges_are_rejected() {
    let t = SimTime::from_days;
    assert!(BatchExport::new(t(0.0), t(1.0), 0.0, vec![], 4).is_err());
    assert!(BatchExport::new(t(1.0), t(0.0), 1.0, vec![], 4).is_err());
    assert!(BatchExport::new(t(0.0), t(f64::INFINITY), 1.0, vec![], 4).is_err());
    assert!(BatchExport::new(t(0.0), t(1.0), 1.0, vec![], 0).is_err());
    assert!(BatchExport::new(t(0.0), t(1e300), 1e-300, vec![], 4).is_err());
    assert!(BatchExport::new(t(0.0), t(1e30), 1e-300, vec![], 4).is_err());
}
