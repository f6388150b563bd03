//! Simulation time and the simulation clock.

use std::{fmt, ops};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const SECONDS_PER_DAY: f64 = 86_400.0;
/// Julian day of 1970-01-01T00:00Z.
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;
/// Julian day of J2000.0.
pub const J2000_JD: f64 = 2_451_545.0;
pub const JULIAN_YEAR_DAYS: f64 = 365.25;

/// Simulation time, in days since the model epoch.
#[derive(Copy, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    pub fn from_days(days: f64) -> Self {
        Self(days)
    }

    pub fn days(self) -> f64 {
        self.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    pub fn julian_day(self, epoch_jd: f64) -> f64 {
        epoch_jd + self.0
    }

    pub fn from_julian_day(jd: f64, epoch_jd: f64) -> Self {
        Self(jd - epoch_jd)
    }

    /// Decimal Julian-calendar year, `2000.0` at J2000.
    pub fn decimal_year(self, epoch_jd: f64) -> f64 {
        2000.0 + (self.julian_day(epoch_jd) - J2000_JD) / JULIAN_YEAR_DAYS
    }

    pub fn from_decimal_year(year: f64, epoch_jd: f64) -> Self {
        Self::from_julian_day(J2000_JD + (year - 2000.0) * JULIAN_YEAR_DAYS, epoch_jd)
    }

    /// Calendar date-time, or `None` when the time falls outside the range
    /// `OffsetDateTime` can represent.
    pub fn to_datetime(self, epoch_jd: f64) -> Option<OffsetDateTime> {
        let nanos = (self.julian_day(epoch_jd) - UNIX_EPOCH_JD) * SECONDS_PER_DAY * 1e9;
        if !nanos.is_finite() || nanos.abs() > 1e27 {
            return None;
        }
        OffsetDateTime::from_unix_timestamp_nanos(nanos.round() as i128).ok()
    }

    pub fn from_datetime(datetime: OffsetDateTime, epoch_jd: f64) -> Self {
        let seconds = datetime.unix_timestamp_nanos() as f64 / 1e9;
        Self::from_julian_day(UNIX_EPOCH_JD + seconds / SECONDS_PER_DAY, epoch_jd)
    }
}

impl ops::Sub<SimTime> for SimTime {
    type Output = f64;

    fn sub(self, rhs: SimTime) -> Self::Output {
        self.0 - rhs.0
    }
}

impl ops::Sub<f64> for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: f64) -> Self::Output {
        SimTime(self.0 - rhs)
    }
}

impl ops::Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: f64) -> Self::Output {
        SimTime(self.0 + rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T({:+}d)", self.0)
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// The single simulation-time cursor.
///
/// It only changes through [`SimulationClock::advance`] (once per tick) or
/// [`SimulationClock::jump`] (an explicit external jump).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationClock {
    time: SimTime,
    /// Simulation days per real second. Negative runs time backwards.
    rate: f64,
    paused: bool,
}

impl SimulationClock {
    pub fn new(time: SimTime, rate: f64) -> Self {
        Self {
            time,
            rate: if rate.is_finite() { rate } else { 0.0 },
            paused: false,
        }
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        if rate.is_finite() {
            self.rate = rate;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Advance by `real_seconds` of wall time at the current rate.
    pub fn advance(&mut self, real_seconds: f64) -> SimTime {
        if !self.paused && real_seconds.is_finite() {
            self.time = self.time + self.rate * real_seconds;
        }
        self.time
    }

    /// Jump to an absolute time. Non-finite times are refused.
    pub fn jump(&mut self, time: SimTime) -> bool {
        if time.is_finite() {
            self.time = time;
            true
        } else {
            false
        }
    }
}

#[test]
fn epoch_is_june_solstice_2000() {
    let epoch_jd = 2_451_716.5;
    let dt = SimTime::ZERO.to_datetime(epoch_jd).unwrap();
    assert_eq!(dt.year(), 2000);
    assert_eq!(dt.month(), time::Month::June);
    assert_eq!(dt.day(), 21);
    assert_eq!(dt.hour(), 0);

    let back = SimTime::from_datetime(dt, epoch_jd);
    assert!(back.days().abs() < 1e-9);
    assert!((SimTime::ZERO.decimal_year(epoch_jd) - 2000.469_541_4).abs() < 1e-6);
}

#[test]
fn decimal_year_round_trips() {
    let epoch_jd = 2_451_716.5;
    let t = SimTime::from_decimal_year(2024.25, epoch_jd);
    assert!((t.decimal_year(epoch_jd) - 2024.25).abs() < 1e-9);
    assert!(SimTime::from_days(1e18).to_datetime(epoch_jd).is_none());
}

#[test]
fn clock_advances_only_when_running() {
    let mut clock = SimulationClock::new(SimTime::ZERO, 2.0);
    assert_eq!(clock.advance(0.5).days(), 1.0);
    clock.pause();
    assert_eq!(clock.advance(10.0).days(), 1.0);
    clock.resume();
    clock.set_rate(-4.0);
    assert_eq!(clock.advance(1.0).days(), -3.0);
    assert!(!clock.jump(SimTime::from_days(f64::NAN)));
    assert!(clock.jump(SimTime::from_days(42.0)));
    assert_eq!(clock.time().days(), 42.0);
}
