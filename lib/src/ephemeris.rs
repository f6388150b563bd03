//! Closed-form ephemeris quantities and the longitude → date solver.
//!
//! Every quantity is a pure function of simulation time and the
//! [`Calibration`]. The Earth–Sun geometry used here is the same three-link
//! chain the catalog builds (two eccentric perihelion circles and the solar
//! orbit), so the eccentricity, the longitude of perihelion and the solar
//! longitude agree with the kinematic engine.

use std::f64::consts::TAU;

use serde::Serialize;
use tracing::trace;

use crate::{config::Calibration, time::SimTime};

const MAX_NEWTON_ITERATIONS: u32 = 8;
const LONGITUDE_TOLERANCE_DEG: f64 = 1e-8;

/// Wrap to `[0, 360)`.
pub fn wrap_degrees(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

/// Wrap to `[-180, 180)`.
pub fn signed_degrees(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Phase of a cycle of `period` years at decimal `year`, anchored at the
/// perihelion alignment year.
fn cycle_phase(calibration: &Calibration, year: f64, period: f64) -> f64 {
    TAU * (year - calibration.perihelion_alignment_year) / period
}

/// Parameters of the Earth–Sun chain.
///
/// Radii in AU, speeds in `rad/day` (the second and third links relative to
/// their parent), phases in `rad`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EarthSunChain {
    pub radii: [f64; 3],
    pub speeds: [f64; 3],
    pub phases: [f64; 3],
    /// Axial precession of the equinox frame.
    pub axial_speed: f64,
    pub axial_phase: f64,
}

impl EarthSunChain {
    pub fn new(calibration: &Calibration) -> Self {
        let h_days = calibration.years_to_days(calibration.holistic_year);
        let second_period = calibration.holistic_year / 16.0;
        let second_phase =
            360.0 * (calibration.epoch_year() - calibration.perihelion_alignment_year)
                / second_period;
        Self {
            radii: [
                calibration.eccentricity_base,
                calibration.eccentricity_amplitude,
                1.0,
            ],
            speeds: [
                TAU * 3.0 / h_days,
                -TAU * 16.0 / h_days,
                TAU / calibration.mean_solar_year_days,
            ],
            phases: [
                calibration.earth_perihelion_phase_deg.to_radians(),
                second_phase.to_radians(),
                calibration.sun_start_phase_deg.to_radians(),
            ],
            axial_speed: -TAU * 13.0 / h_days,
            axial_phase: calibration.earth_axial_phase_deg.to_radians(),
        }
    }

    /// Cumulative link angles at `t` days.
    fn angles(&self, t: f64) -> [f64; 3] {
        let mut angle = 0.0;
        let mut out = [0.0; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            angle += self.speeds[i] * t - self.phases[i];
            *slot = angle;
        }
        out
    }

    fn cumulative_speeds(&self) -> [f64; 3] {
        let [a, b, c] = self.speeds;
        [a, a + b, a + b + c]
    }

    /// Equinox direction angle about Y (`rad`).
    pub fn equinox_angle(&self, t: f64) -> f64 {
        self.axial_speed * t - self.axial_phase
    }

    /// Centre of the solar orbit relative to the Earth, in the `(x, z)`
    /// plane (AU).
    pub fn orbit_center(&self, t: f64) -> (f64, f64) {
        let a = self.angles(t);
        let x = self.radii[0] * libm::cos(a[0]) + self.radii[1] * libm::cos(a[1]);
        let z = -(self.radii[0] * libm::sin(a[0]) + self.radii[1] * libm::sin(a[1]));
        (x, z)
    }

    /// Geocentric Sun position in the `(x, z)` plane (AU) and its rate of
    /// change (AU/day).
    pub fn sun(&self, t: f64) -> ((f64, f64), (f64, f64)) {
        let a = self.angles(t);
        let w = self.cumulative_speeds();
        let (mut x, mut z, mut dx, mut dz) = (0.0, 0.0, 0.0, 0.0);
        for i in 0..3 {
            let (sin, cos) = (libm::sin(a[i]), libm::cos(a[i]));
            x += self.radii[i] * cos;
            z -= self.radii[i] * sin;
            dx -= self.radii[i] * w[i] * sin;
            dz -= self.radii[i] * w[i] * cos;
        }
        ((x, z), (dx, dz))
    }
}

/// Precession periods in years, all derived from the axial one.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct PrecessionPeriods {
    pub axial: f64,
    pub perihelion: f64,
    pub inclination: f64,
    pub obliquity: f64,
    pub ecliptic: f64,
}

impl PrecessionPeriods {
    pub fn from_axial(axial: f64) -> Self {
        Self {
            axial,
            perihelion: axial * 13.0 / 16.0,
            inclination: axial * 13.0 / 3.0,
            obliquity: axial * 13.0 / 8.0,
            ecliptic: axial * 13.0 / 5.0,
        }
    }

    pub fn mean(calibration: &Calibration) -> Self {
        Self::from_axial(calibration.mean_axial_precession())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct EphemerisSnapshot {
    pub time: SimTime,
    pub decimal_year: f64,
    pub length_of_day_seconds: f64,
    pub solar_year_days: f64,
    pub sidereal_year_days: f64,
    pub anomalistic_year_days: f64,
    pub precession_years: PrecessionPeriods,
    pub eccentricity: f64,
    pub obliquity_deg: f64,
    pub inclination_deg: f64,
    pub longitude_of_perihelion_deg: f64,
}

impl EphemerisSnapshot {
    pub fn at(calibration: &Calibration, t: SimTime) -> Self {
        let year = t.decimal_year(calibration.epoch_jd);
        let solar_year_days = length_of_solar_year(calibration, t);
        let sidereal_year_days = length_of_sidereal_year(calibration, t);
        let precession_years = precession_periods(calibration, t);
        Self {
            time: t,
            decimal_year: year,
            length_of_day_seconds: length_of_day(calibration, t),
            solar_year_days,
            sidereal_year_days,
            anomalistic_year_days: length_of_anomalistic_year(calibration, t),
            precession_years,
            eccentricity: eccentricity(calibration, t),
            obliquity_deg: obliquity(calibration, t),
            inclination_deg: inclination_to_invariable_plane(calibration, t),
            longitude_of_perihelion_deg: longitude_of_perihelion(calibration, t),
        }
    }
}

fn year_at(calibration: &Calibration, t: SimTime) -> f64 {
    t.decimal_year(calibration.epoch_jd)
}

/// Length of the mean solar day (`s`).
pub fn length_of_day(calibration: &Calibration, t: SimTime) -> f64 {
    let year = year_at(calibration, t);
    let periods = PrecessionPeriods::mean(calibration);
    let [a, b] = calibration.day_amplitudes_seconds;
    calibration.mean_day_seconds
        + a * libm::sin(cycle_phase(calibration, year, periods.obliquity))
        + b * libm::sin(cycle_phase(calibration, year, periods.perihelion))
}

/// Length of the tropical year (`days`).
pub fn length_of_solar_year(calibration: &Calibration, t: SimTime) -> f64 {
    let year = year_at(calibration, t);
    let periods = PrecessionPeriods::mean(calibration);
    let [a, b] = calibration.solar_year_amplitudes_days;
    calibration.mean_solar_year_days
        + a * libm::cos(cycle_phase(calibration, year, periods.obliquity))
        + b * libm::cos(cycle_phase(calibration, year, periods.perihelion))
}

/// Length of the sidereal year (`days`).
pub fn length_of_sidereal_year(calibration: &Calibration, t: SimTime) -> f64 {
    let year = year_at(calibration, t);
    let periods = PrecessionPeriods::mean(calibration);
    calibration.mean_sidereal_year_days()
        + calibration.sidereal_year_amplitude_days
            * libm::sin(cycle_phase(calibration, year, periods.inclination))
}

/// Anomalistic year (`days`) from the sidereal year and the sidereal
/// perihelion period, both in days.
fn anomalistic_year(sidereal_year_days: f64, perihelion_period_days: f64) -> f64 {
    1.0 / (1.0 / sidereal_year_days - 1.0 / perihelion_period_days)
}

/// Length of the anomalistic year, perihelion to perihelion (`days`).
pub fn length_of_anomalistic_year(calibration: &Calibration, t: SimTime) -> f64 {
    let solar = length_of_solar_year(calibration, t);
    anomalistic_year(
        length_of_sidereal_year(calibration, t),
        precession_periods(calibration, t).inclination * solar,
    )
}

/// Precession periods at `t`, from the current tropical and sidereal year.
pub fn precession_periods(calibration: &Calibration, t: SimTime) -> PrecessionPeriods {
    let tropical = length_of_solar_year(calibration, t);
    let sidereal = length_of_sidereal_year(calibration, t);
    PrecessionPeriods::from_axial(tropical / (sidereal - tropical))
}

/// Orbital eccentricity of the Earth.
pub fn eccentricity(calibration: &Calibration, t: SimTime) -> f64 {
    let chain = EarthSunChain::new(calibration);
    let (x, z) = chain.orbit_center(t.days());
    libm::hypot(x, z) / chain.radii[2]
}

/// Obliquity of the ecliptic (`deg`).
pub fn obliquity(calibration: &Calibration, t: SimTime) -> f64 {
    let year = year_at(calibration, t);
    let periods = PrecessionPeriods::mean(calibration);
    let amplitude = calibration.obliquity_amplitude_deg;
    calibration.obliquity_mean_deg
        - amplitude * libm::cos(cycle_phase(calibration, year, periods.obliquity))
        + amplitude * libm::cos(cycle_phase(calibration, year, periods.inclination))
}

/// Inclination of the ecliptic to the invariable plane (`deg`).
pub fn inclination_to_invariable_plane(calibration: &Calibration, t: SimTime) -> f64 {
    let year = year_at(calibration, t);
    let periods = PrecessionPeriods::mean(calibration);
    let phase = cycle_phase(calibration, year, periods.inclination)
        + calibration.inclination_phase_deg.to_radians();
    calibration.inclination_mean_deg + calibration.inclination_amplitude_deg * libm::cos(phase)
}

/// Longitude of the Earth's perihelion measured from the equinox of date
/// (`deg`).
pub fn longitude_of_perihelion(calibration: &Calibration, t: SimTime) -> f64 {
    let chain = EarthSunChain::new(calibration);
    let t = t.days();
    let (x, z) = chain.orbit_center(t);
    wrap_degrees((libm::atan2(x, z) - chain.equinox_angle(t)).to_degrees())
}

/// Geocentric longitude of the Sun measured from the equinox of date, and
/// its rate (`deg`, `deg/day`).
pub fn solar_longitude(calibration: &Calibration, t: SimTime) -> (f64, f64) {
    solar_longitude_on(&EarthSunChain::new(calibration), t.days())
}

fn solar_longitude_on(chain: &EarthSunChain, t: f64) -> (f64, f64) {
    let ((x, z), (dx, dz)) = chain.sun(t);
    let longitude = libm::atan2(x, z) - chain.equinox_angle(t);
    let rate = (dx * z - x * dz) / (x * x + z * z) - chain.axial_speed;
    (wrap_degrees(longitude.to_degrees()), rate.to_degrees())
}

/// A solved crossing of a solar longitude.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SolarCrossing {
    pub time: SimTime,
    /// Longitude actually reached (`deg`).
    pub longitude_deg: f64,
    pub iterations: u32,
}

/// Find the first time in or after decimal `year` at which the Sun's
/// longitude of date reaches `longitude_deg` (0 is the March equinox).
///
/// Returns `None` when the inputs are not finite or Newton's method does not
/// reach the tolerance within a few iterations, which includes years so
/// remote that simulation time no longer resolves a day.
pub fn longitude_to_datetime(
    calibration: &Calibration,
    longitude_deg: f64,
    year: f64,
) -> Option<SolarCrossing> {
    if !longitude_deg.is_finite() || !year.is_finite() {
        return None;
    }
    let chain = EarthSunChain::new(calibration);
    let target = wrap_degrees(longitude_deg);
    let start = SimTime::from_decimal_year(year, calibration.epoch_jd).days();
    let (at_start, _) = solar_longitude_on(&chain, start);
    let mut t = start
        + wrap_degrees(target - at_start) / 360.0 * calibration.mean_solar_year_days;

    for iterations in 0..=MAX_NEWTON_ITERATIONS {
        if !t.is_finite() {
            return None;
        }
        let (longitude, rate) = solar_longitude_on(&chain, t);
        let residual = signed_degrees(longitude - target);
        if residual.abs() < LONGITUDE_TOLERANCE_DEG {
            return Some(SolarCrossing {
                time: SimTime::from_days(t),
                longitude_deg: longitude,
                iterations,
            });
        }
        if iterations == MAX_NEWTON_ITERATIONS || rate.is_nan() || rate <= 0.0 {
            trace!(year, longitude_deg, residual, rate, "solver gave up");
            return None;
        }
        t -= residual / rate;
    }
    None
}

#[cfg(test)]
fn sun_longitude_from_chain(chain: &EarthSunChain, t: f64) -> f64 {
    let ((x, z), _) = chain.sun(t);
    wrap_degrees((libm::atan2(x, z) - chain.equinox_angle(t)).to_degrees())
}

#[test]
fn derived_periods_keep_their_ratios() {
    let calibration = Calibration::default();
    let mean = PrecessionPeriods::mean(&calibration);
    approx::assert_relative_eq!(mean.axial, 333_888.0 / 13.0);
    approx::assert_relative_eq!(mean.perihelion, 333_888.0 / 16.0, max_relative = 1e-12);
    approx::assert_relative_eq!(mean.inclination, 333_888.0 / 3.0, max_relative = 1e-12);
    approx::assert_relative_eq!(mean.obliquity, 333_888.0 / 8.0, max_relative = 1e-12);
    approx::assert_relative_eq!(mean.ecliptic, 333_888.0 / 5.0, max_relative = 1e-12);

    for year in [-50_000.0, 1246.0, 2000.0, 30_000.0] {
        let t = SimTime::from_decimal_year(year, calibration.epoch_jd);
        let p = precession_periods(&calibration, t);
        approx::assert_relative_eq!(p.perihelion / p.axial, 13.0 / 16.0, max_relative = 1e-12);
        approx::assert_relative_eq!(p.ecliptic / p.axial, 13.0 / 5.0, max_relative = 1e-12);
        // Year-length wobbles move the axial period but keep it near H/13.
        approx::assert_relative_eq!(p.axial, mean.axial, max_relative = 0.05);
    }
}

#[test]
fn present_day_values() {
    let calibration = Calibration::default();
    let snapshot = EphemerisSnapshot::at(&calibration, SimTime::ZERO);
    approx::assert_abs_diff_eq!(snapshot.eccentricity, 0.016_71, epsilon = 1e-5);
    approx::assert_abs_diff_eq!(snapshot.decimal_year, 2000.4695, epsilon = 1e-4);
    approx::assert_abs_diff_eq!(snapshot.solar_year_days, 365.2422, epsilon = 1e-3);
    assert!(snapshot.sidereal_year_days > snapshot.solar_year_days);
    let perihelion_drift = snapshot.anomalistic_year_days - snapshot.sidereal_year_days;
    assert!((0.002..0.005).contains(&perihelion_drift), "{perihelion_drift}");
    for days in [-2.5e6, 0.0, 9.0e5] {
        let t = SimTime::from_days(days);
        let sidereal = length_of_sidereal_year(&calibration, t);
        let perihelion_days =
            precession_periods(&calibration, t).inclination * length_of_solar_year(&calibration, t);
        approx::assert_relative_eq!(
            length_of_anomalistic_year(&calibration, t),
            sidereal * perihelion_days / (perihelion_days - sidereal),
            max_relative = 1e-12
        );
    }
    approx::assert_abs_diff_eq!(snapshot.length_of_day_seconds, 86_400.0, epsilon = 0.01);
    assert!((22.0..25.0).contains(&snapshot.obliquity_deg));
    assert!((0.5..2.5).contains(&snapshot.inclination_deg));
    approx::assert_abs_diff_eq!(snapshot.longitude_of_perihelion_deg, 102.947, epsilon = 1e-6);
}

#[test]
fn closed_forms_follow_the_chain() {
    let calibration = Calibration::default();
    let chain = EarthSunChain::new(&calibration);
    for days in [-3.0e6, -1234.5, 0.0, 77.25, 9.1e5] {
        let t = SimTime::from_days(days);
        let ((x, z), _) = chain.sun(days);
        let (cx, cz) = chain.orbit_center(days);
        // Sun-to-centre distance is the orbit radius.
        approx::assert_abs_diff_eq!(libm::hypot(x - cx, z - cz), 1.0, epsilon = 1e-12);

        let (longitude, rate) = solar_longitude(&calibration, t);
        approx::assert_abs_diff_eq!(longitude, sun_longitude_from_chain(&chain, days));
        let h = 1e-3;
        let numeric = signed_degrees(
            sun_longitude_from_chain(&chain, days + h)
                - sun_longitude_from_chain(&chain, days - h),
        ) / (2.0 * h);
        approx::assert_relative_eq!(rate, numeric, max_relative = 1e-6);
    }
}

#[test]
fn solver_finds_solstice_and_equinox() {
    let calibration = Calibration::default();
    let solstice = longitude_to_datetime(&calibration, 90.0, 2000.0).unwrap();
    approx::assert_abs_diff_eq!(solstice.time.days(), 0.0742, epsilon = 1e-3);
    assert!(solstice.iterations <= 8);
    let (longitude, _) = solar_longitude(&calibration, solstice.time);
    approx::assert_abs_diff_eq!(signed_degrees(longitude - 90.0), 0.0, epsilon = 1e-8);

    let equinox = longitude_to_datetime(&calibration, 360.0, 2000.0).unwrap();
    approx::assert_abs_diff_eq!(equinox.time.days(), -91.965, epsilon = 1e-2);
}

#[test]
fn solver_reports_failure_instead_of_a_date() {
    let calibration = Calibration::default();
    assert!(longitude_to_datetime(&calibration, 123.0, 1e15).is_none());
    assert!(longitude_to_datetime(&calibration, f64::NAN, 2000.0).is_none());
    assert!(longitude_to_datetime(&calibration, 0.0, f64::INFINITY).is_none());
}

#[test]
fn solver_never_answers_before_the_requested_year() {
    let calibration = Calibration::default();
    let epoch_jd = calibration.epoch_jd;
    let start = SimTime::from_decimal_year(3000.0, epoch_jd);

    let (just_passed, _) = solar_longitude(&calibration, start - 2.0);
    let crossing = longitude_to_datetime(&calibration, just_passed, 3000.0).unwrap();
    assert!(crossing.time.decimal_year(epoch_jd) >= 3000.0);
    approx::assert_abs_diff_eq!(
        crossing.time.days() - start.days(),
        calibration.mean_solar_year_days - 2.0,
        epsilon = 1.0
    );

    let (coming_up, _) = solar_longitude(&calibration, start + 2.0);
    let crossing = longitude_to_datetime(&calibration, coming_up, 3000.0).unwrap();
    approx::assert_abs_diff_eq!(crossing.time.days(), start.days() + 2.0, epsilon = 1e-6);
}
