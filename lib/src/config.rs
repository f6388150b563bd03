//! Engine configuration: calibration constants and runtime settings.
//!
//! A [`Configuration`] is built once at startup (usually deserialized from
//! TOML by the host, every field defaulting to the calibrated value) and is
//! passed by reference from then on. It is never reloaded.

use color_eyre::eyre::{self, bail};
use serde::{Deserialize, Serialize};

use crate::time::J2000_JD;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub calibration: Calibration,
    pub scene: SceneScale,
    pub trace: TraceSettings,
    pub clock: ClockSettings,
    pub export: ExportSettings,
}

impl Configuration {
    /// Reject configurations that would poison every downstream value.
    pub fn validate(&self) -> eyre::Result<()> {
        self.calibration.validate()?;
        self.scene.validate()?;
        self.trace.validate()?;
        ensure_finite("clock.start_days", self.clock.start_days)?;
        ensure_finite("clock.rate_days_per_second", self.clock.rate_days_per_second)?;
        if self.export.chunk_size == 0 {
            bail!("export.chunk_size must be at least 1");
        }
        Ok(())
    }
}

/// Empirically fitted constants. The phase constants encode fitted
/// relationships and are kept verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Length of the master cycle (`years`).
    pub holistic_year: f64,
    /// Mean length of the solar (tropical) year (`days`).
    pub mean_solar_year_days: f64,
    /// Julian day at simulation time zero (2000-06-21T00:00Z).
    pub epoch_jd: f64,
    /// Year in which perihelion coincided with the December solstice.
    pub perihelion_alignment_year: f64,
    /// Mean eccentricity of the solar orbit.
    pub eccentricity_base: f64,
    /// Half-range of the eccentricity cycle.
    pub eccentricity_amplitude: f64,
    /// Start phase of the rotating eccentric offset (`deg`).
    pub earth_perihelion_phase_deg: f64,
    /// Start phase of the Sun on its orbit (`deg`).
    pub sun_start_phase_deg: f64,
    /// Start phase of the axial precession (`deg`).
    pub earth_axial_phase_deg: f64,
    /// Heliocentric longitude of the Earth at the epoch (`deg`).
    pub earth_longitude_at_epoch_deg: f64,
    /// Length of the sidereal day (`s`).
    pub sidereal_day_seconds: f64,
    pub obliquity_mean_deg: f64,
    pub obliquity_amplitude_deg: f64,
    pub inclination_mean_deg: f64,
    pub inclination_amplitude_deg: f64,
    pub inclination_phase_deg: f64,
    /// Mean length of the solar day (`s`).
    pub mean_day_seconds: f64,
    /// Day-length amplitudes over the obliquity and perihelion cycles (`s`).
    pub day_amplitudes_seconds: [f64; 2],
    /// Solar-year amplitudes over the obliquity and perihelion cycles (`days`).
    pub solar_year_amplitudes_days: [f64; 2],
    /// Sidereal-year amplitude over the inclination cycle (`days`).
    pub sidereal_year_amplitude_days: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            holistic_year: 333_888.0,
            mean_solar_year_days: 365.242_189_7,
            epoch_jd: 2_451_716.5,
            perihelion_alignment_year: 1246.0,
            eccentricity_base: 0.015_321,
            eccentricity_amplitude: 0.001_422_6,
            earth_perihelion_phase_deg: 345.954_369_916_627,
            sun_start_phase_deg: 1.317_736_717_537,
            earth_axial_phase_deg: 0.0,
            earth_longitude_at_epoch_deg: 269.928,
            sidereal_day_seconds: 86_164.090_5,
            obliquity_mean_deg: 23.413_98,
            obliquity_amplitude_deg: 0.633_849,
            inclination_mean_deg: 1.481_592,
            inclination_amplitude_deg: 0.633_849,
            inclination_phase_deg: 78.75,
            mean_day_seconds: 86_400.001_8,
            day_amplitudes_seconds: [0.003_1, 0.001_2],
            solar_year_amplitudes_days: [0.000_186, 0.000_049],
            sidereal_year_amplitude_days: 0.000_012,
        }
    }
}

impl Calibration {
    /// Decimal year at simulation time zero.
    pub fn epoch_year(&self) -> f64 {
        2000.0 + (self.epoch_jd - J2000_JD) / crate::time::JULIAN_YEAR_DAYS
    }

    pub fn years_to_days(&self, years: f64) -> f64 {
        years * self.mean_solar_year_days
    }

    pub fn days_to_years(&self, days: f64) -> f64 {
        days / self.mean_solar_year_days
    }

    /// Mean axial precession period (`years`).
    pub fn mean_axial_precession(&self) -> f64 {
        self.holistic_year / 13.0
    }

    /// Mean sidereal year (`days`), consistent with the mean axial
    /// precession.
    pub fn mean_sidereal_year_days(&self) -> f64 {
        self.mean_solar_year_days * (1.0 + 1.0 / self.mean_axial_precession())
    }

    fn validate(&self) -> eyre::Result<()> {
        let fields = [
            ("holistic_year", self.holistic_year),
            ("mean_solar_year_days", self.mean_solar_year_days),
            ("epoch_jd", self.epoch_jd),
            ("perihelion_alignment_year", self.perihelion_alignment_year),
            ("eccentricity_base", self.eccentricity_base),
            ("eccentricity_amplitude", self.eccentricity_amplitude),
            ("earth_perihelion_phase_deg", self.earth_perihelion_phase_deg),
            ("sun_start_phase_deg", self.sun_start_phase_deg),
            ("earth_axial_phase_deg", self.earth_axial_phase_deg),
            ("earth_longitude_at_epoch_deg", self.earth_longitude_at_epoch_deg),
            ("sidereal_day_seconds", self.sidereal_day_seconds),
            ("obliquity_mean_deg", self.obliquity_mean_deg),
            ("obliquity_amplitude_deg", self.obliquity_amplitude_deg),
            ("inclination_mean_deg", self.inclination_mean_deg),
            ("inclination_amplitude_deg", self.inclination_amplitude_deg),
            ("inclination_phase_deg", self.inclination_phase_deg),
            ("mean_day_seconds", self.mean_day_seconds),
            ("day_amplitudes_seconds[0]", self.day_amplitudes_seconds[0]),
            ("day_amplitudes_seconds[1]", self.day_amplitudes_seconds[1]),
            ("solar_year_amplitudes_days[0]", self.solar_year_amplitudes_days[0]),
            ("solar_year_amplitudes_days[1]", self.solar_year_amplitudes_days[1]),
            ("sidereal_year_amplitude_days", self.sidereal_year_amplitude_days),
        ];
        for (name, value) in fields {
            ensure_finite(&format!("calibration.{name}"), value)?;
        }
        for (name, value) in [
            ("holistic_year", self.holistic_year),
            ("mean_solar_year_days", self.mean_solar_year_days),
            ("sidereal_day_seconds", self.sidereal_day_seconds),
            ("mean_day_seconds", self.mean_day_seconds),
        ] {
            if value <= 0.0 {
                bail!("calibration.{name} must be positive, got {value}");
            }
        }
        if self.eccentricity_amplitude > self.eccentricity_base {
            bail!(
                "calibration.eccentricity_amplitude ({}) exceeds eccentricity_base ({})",
                self.eccentricity_amplitude,
                self.eccentricity_base
            );
        }
        Ok(())
    }
}

/// Scene-unit conversions.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneScale {
    /// Scene units per astronomical unit.
    pub units_per_au: f64,
    /// Kilometres per astronomical unit.
    pub au_km: f64,
    pub km_per_mile: f64,
}

impl Default for SceneScale {
    fn default() -> Self {
        Self {
            units_per_au: 100.0,
            au_km: 149_597_870.7,
            km_per_mile: 1.609_344,
        }
    }
}

impl SceneScale {
    pub fn to_au(&self, units: f64) -> f64 {
        units / self.units_per_au
    }

    pub fn to_km(&self, units: f64) -> f64 {
        self.to_au(units) * self.au_km
    }

    pub fn to_miles(&self, units: f64) -> f64 {
        self.to_km(units) / self.km_per_mile
    }

    pub fn from_au(&self, au: f64) -> f64 {
        au * self.units_per_au
    }

    fn validate(&self) -> eyre::Result<()> {
        for (name, value) in [
            ("units_per_au", self.units_per_au),
            ("au_km", self.au_km),
            ("km_per_mile", self.km_per_mile),
        ] {
            ensure_finite(&format!("scene.{name}"), value)?;
            if value <= 0.0 {
                bail!("scene.{name} must be positive, got {value}");
            }
        }
        Ok(())
    }
}

/// Largest number of samples one trace buffer may hold.
pub const MAX_TRACE_CAPACITY: usize = 1 << 20;

/// Trace sampling settings.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Simulation time between two samples (`days`).
    pub step_days: f64,
    /// Simulation time covered by a full buffer (`days`).
    pub length_days: f64,
    /// Catch-up samples allowed in one call before the trace is reset
    /// instead.
    pub max_catch_up: usize,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            step_days: 1.0,
            length_days: 365.0,
            max_catch_up: 4096,
        }
    }
}

impl TraceSettings {
    /// Number of samples a buffer holds.
    pub fn capacity(&self) -> usize {
        (self.length_days / self.step_days).round().max(1.0) as usize
    }

    pub fn validate(&self) -> eyre::Result<()> {
        ensure_finite("trace.step_days", self.step_days)?;
        ensure_finite("trace.length_days", self.length_days)?;
        if self.step_days <= 0.0 {
            bail!("trace.step_days must be positive, got {}", self.step_days);
        }
        if self.length_days < self.step_days {
            bail!(
                "trace.length_days ({}) is shorter than one step ({})",
                self.length_days,
                self.step_days
            );
        }
        if self.length_days / self.step_days > MAX_TRACE_CAPACITY as f64 {
            bail!(
                "trace.length_days ({}) holds more than {MAX_TRACE_CAPACITY} steps of {}",
                self.length_days,
                self.step_days
            );
        }
        if self.max_catch_up == 0 {
            bail!("trace.max_catch_up must be at least 1");
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    /// Simulation time at startup (`days` since the epoch).
    pub start_days: f64,
    /// Simulation days per real second.
    pub rate_days_per_second: f64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            start_days: 0.0,
            rate_days_per_second: 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Rows processed before a batch export hands control back.
    pub chunk_size: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self { chunk_size: 256 }
    }
}

pub(crate) fn ensure_finite(name: &str, value: f64) -> eyre::Result<()> {
    if !value.is_finite() {
        bail!("{name} is not finite ({value})");
    }
    Ok(())
}

#[test]
fn default_configuration_is_valid() {
    let config = Configuration::default();
    config.validate().unwrap();
    assert_eq!(config.trace.capacity(), 365);
    assert!((config.calibration.mean_axial_precession() - 25_683.692_307_692).abs() < 1e-6);
}

#[test]
fn partial_toml_keeps_defaults() {
    let config: Configuration = toml::from_str(
        r#"
        [trace]
        step_days = 0.5
        length_days = 10.0

        [calibration]
        holistic_year = 300000.0
        "#,
    )
    .unwrap();
    assert_eq!(config.trace.capacity(), 20);
    assert_eq!(config.calibration.holistic_year, 300_000.0);
    assert_eq!(config.calibration.mean_solar_year_days, 365.242_189_7);
    assert_eq!(config.scene, SceneScale::default());
    config.validate().unwrap();
}

#[test]
fn invalid_settings_fail_fast() {
    let mut config = Configuration::default();
    config.trace.step_days = 0.0;
    assert!(config.validate().is_err());

    let mut config = Configuration::default();
    config.calibration.obliquity_mean_deg = f64::NAN;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("obliquity_mean_deg"));

    let mut config = Configuration::default();
    config.export.chunk_size = 0;
    assert!(config.validate().is_err());

    let mut config = Configuration::default();
    config.trace.length_days = 1e300;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("trace.length_days"));

    config.trace.length_days = MAX_TRACE_CAPACITY as f64;
    config.validate().unwrap();
    assert_eq!(config.trace.capacity(), MAX_TRACE_CAPACITY);
}
