//! The engine facade tying the registry, clock, frames and traces
//! together.

use color_eyre::eyre::{self, bail};
use nalgebra::{Isometry3, Point3};
use tracing::{debug, info};

use crate::{
    bodies::{NodeId, NodeSpec, Registry},
    catalog,
    config::{Configuration, TraceSettings},
    ephemeris::{self, EphemerisSnapshot},
    kinematics::{Kinematics, WorldFrames},
    projection::{self, Reading},
    time::{SimTime, SimulationClock},
    trace::TraceRecorder,
};

/// The engine: one registry, one clock and everything derived from them.
///
/// Every public read reflects the state after the last [`Orrery::tick`] or
/// [`Orrery::jump_to_time`].
pub struct Orrery {
    config: Configuration,
    registry: Registry,
    clock: SimulationClock,
    kinematics: Kinematics,
    frames: WorldFrames,
    traces: TraceRecorder,
    earth: NodeId,
    earth_frame: NodeId,
    sun: NodeId,
    sun_frame: NodeId,
}

impl Orrery {
    /// Engine over the built-in solar system.
    pub fn new(config: Configuration) -> eyre::Result<Self> {
        let table = catalog::solar_system(&config.calibration, &config.scene);
        Self::with_table(config, table)
    }

    /// Engine over a custom node table. The table must contain the Earth,
    /// its equator frame, the Sun and the Sun-fixed frame under their
    /// catalog names.
    pub fn with_table(config: Configuration, table: Vec<NodeSpec>) -> eyre::Result<Self> {
        config.validate()?;
        let registry = Registry::build(table)?;
        registry.log_summary();

        let earth = registry.require(catalog::EARTH)?;
        let earth_frame = registry.require(catalog::EARTH_EQUATOR)?;
        let sun = registry.require(catalog::SUN)?;
        let sun_frame = registry.require(catalog::SUN_FIXED)?;

        let clock = SimulationClock::new(
            SimTime::from_days(config.clock.start_days),
            config.clock.rate_days_per_second,
        );
        let kinematics = Kinematics::new(&registry, clock.time());
        let frames = WorldFrames::compose(&registry, &kinematics);
        let traces = TraceRecorder::new(config.trace)?;
        info!(t = %clock.time(), rate = clock.rate(), "orrery ready");

        Ok(Self {
            config,
            registry,
            clock,
            kinematics,
            frames,
            traces,
            earth,
            earth_frame,
            sun,
            sun_frame,
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut SimulationClock {
        &mut self.clock
    }

    pub fn time(&self) -> SimTime {
        self.clock.time()
    }

    /// Advance the clock by `real_seconds` of wall time and bring every
    /// derived value up to date.
    pub fn tick(&mut self, real_seconds: f64) -> SimTime {
        self.clock.advance(real_seconds);
        self.refresh();
        self.clock.time()
    }

    /// Jump straight to `t`, forwards or backwards.
    pub fn jump_to_time(&mut self, t: SimTime) -> eyre::Result<()> {
        if !self.clock.jump(t) {
            bail!("cannot jump to non-finite time {t}");
        }
        debug!(%t, "jump");
        self.refresh();
        Ok(())
    }

    fn refresh(&mut self) {
        let t = self.clock.time();
        self.kinematics.update(&self.registry, t);
        self.frames.recompose(&self.registry, &self.kinematics);
        self.traces.sample_all(&self.registry, t);
    }

    pub fn frames(&self) -> &WorldFrames {
        &self.frames
    }

    pub fn world_pivot(&self, id: NodeId) -> &Isometry3<f64> {
        self.frames.pivot(id)
    }

    pub fn world_body(&self, id: NodeId) -> &Isometry3<f64> {
        self.frames.body(id)
    }

    pub fn position(&self, id: NodeId) -> Point3<f64> {
        self.frames.position(id)
    }

    /// RA/Dec and distances of `ids` from the Earth and the Sun.
    pub fn readings(&self, ids: &[NodeId]) -> Vec<Reading> {
        projection::project(
            &self.registry,
            &self.frames,
            ids,
            self.earth_frame,
            self.sun_frame,
            &self.config.scene,
        )
    }

    /// Readings of every physical body, in registry order.
    pub fn body_readings(&self) -> Vec<Reading> {
        let ids: Vec<_> = self.registry.bodies().map(|node| node.id).collect();
        self.readings(&ids)
    }

    /// Heliocentric ecliptic longitude of `id`, measured from the equinox
    /// of date (`deg`).
    pub fn heliocentric_longitude(&self, id: NodeId) -> f64 {
        let v = self.position(id) - self.position(self.sun);
        let equinox = self
            .registry
            .anomaly(self.earth, self.time().days())
            .to_degrees();
        ephemeris::wrap_degrees(projection::ecliptic_longitude(&v) - equinox)
    }

    /// Ephemeris quantities at `t`. Does not move the clock.
    pub fn sample_ephemeris_at(&self, t: SimTime) -> EphemerisSnapshot {
        EphemerisSnapshot::at(&self.config.calibration, t)
    }

    pub fn traces(&self) -> &TraceRecorder {
        &self.traces
    }

    pub fn enable_trace(&mut self, id: NodeId) {
        self.traces.enable(id, self.clock.time());
    }

    pub fn disable_trace(&mut self, id: NodeId) -> bool {
        self.traces.disable(id)
    }

    pub fn reset_trace(&mut self, id: NodeId) {
        self.traces.reset(id, self.clock.time());
    }

    pub fn set_trace_settings(&mut self, id: NodeId, settings: TraceSettings) -> eyre::Result<()> {
        self.traces.set_settings(id, settings, self.clock.time())
    }
}

#[cfg(test)]
fn orrery() -> Orrery {
    Orrery::new(Configuration::default()).unwrap()
}

#[test]
fn earth_longitude_at_the_epoch() {
    let orrery = orrery();
    let earth = orrery.registry().require(catalog::EARTH).unwrap();
    approx::assert_abs_diff_eq!(
        orrery.heliocentric_longitude(earth),
        orrery.config().calibration.earth_longitude_at_epoch_deg,
        epsilon = 1e-6
    );
}

#[test]
fn positions_depend_only_on_time() {
    let mut orrery = orrery();
    let ids: Vec<_> = orrery.registry().iter().map(|node| node.id).collect();
    let t1 = SimTime::from_days(1234.56);
    orrery.jump_to_time(t1).unwrap();
    let first: Vec<_> = ids.iter().map(|&id| orrery.position(id)).collect();

    orrery.jump_to_time(SimTime::from_days(-9.9e5)).unwrap();
    orrery.tick(3.0);
    orrery.jump_to_time(SimTime::from_days(4.4e6)).unwrap();
    orrery.jump_to_time(t1).unwrap();
    for (&id, before) in ids.iter().zip(&first) {
        assert!((orrery.position(id) - before).norm() < 1e-9);
    }
    assert!(orrery.jump_to_time(SimTime::from_days(f64::NAN)).is_err());
    assert_eq!(orrery.time(), t1);
}

#[test]
fn sun_sits_at_the_june_solstice() {
    let orrery = orrery();
    let sun = orrery.registry().require(catalog::SUN).unwrap();
    let [reading]: [Reading; 1] = orrery.readings(&[sun]).try_into().unwrap();
    approx::assert_abs_diff_eq!(reading.dec.to_degrees(), 23.41, epsilon = 0.01);
    approx::assert_abs_diff_eq!(reading.ra.to_degrees(), 90.0, epsilon = 0.1);
    approx::assert_abs_diff_eq!(reading.distance.au, 1.016_27, epsilon = 1e-5);
    approx::assert_abs_diff_eq!(reading.sun_distance.au, 0.0);
}

#[test]
fn coincident_body_reads_as_zero() {
    let orrery = orrery();
    let earth = orrery.registry().require(catalog::EARTH).unwrap();
    let [reading]: [Reading; 1] = orrery.readings(&[earth]).try_into().unwrap();
    assert_eq!((reading.ra, reading.dec), (0.0, 0.0));
    assert_eq!(reading.distance.au, 0.0);
    assert!(reading.sun_distance.au > 1.0);
}

#[test]
fn ephemeris_agrees_with_the_chain() {
    let mut orrery = orrery();
    let calibration = orrery.config().calibration.clone();
    let center = orrery
        .registry()
        .require(catalog::EARTH_PERIHELION_2)
        .unwrap();
    let earth = orrery.registry().require(catalog::EARTH).unwrap();
    for days in [-4.0e6, -20_000.0, 0.0, 180.0, 7.5e5] {
        let t = SimTime::from_days(days);
        orrery.jump_to_time(t).unwrap();
        let c = orrery.position(center).coords;
        let snapshot = orrery.sample_ephemeris_at(t);
        approx::assert_relative_eq!(snapshot.eccentricity, c.norm() / 100.0, max_relative = 1e-9);

        let equinox = orrery.registry().anomaly(earth, days).to_degrees();
        let perihelion =
            ephemeris::wrap_degrees(projection::ecliptic_longitude(&c) - equinox);
        approx::assert_abs_diff_eq!(
            ephemeris::signed_degrees(snapshot.longitude_of_perihelion_deg - perihelion),
            0.0,
            epsilon = 1e-7
        );

        let (sun_longitude, _) = ephemeris::solar_longitude(&calibration, t);
        approx::assert_abs_diff_eq!(
            ephemeris::signed_degrees(
                orrery.heliocentric_longitude(earth) - (sun_longitude + 180.0)
            ),
            0.0,
            epsilon = 1e-7
        );
    }
}

#[test]
fn ticking_feeds_enabled_traces() {
    let mut orrery = orrery();
    let mars = orrery.registry().require("mars").unwrap();
    orrery.enable_trace(mars);
    for _ in 0..10 {
        orrery.tick(0.5);
    }
    let buffer = orrery.traces().buffer(mars).unwrap();
    assert_eq!(buffer.len(), 5);
    assert_eq!(buffer.latest().unwrap().time.days(), 5.0);

    orrery.jump_to_time(SimTime::from_days(-10.0)).unwrap();
    assert!(orrery.traces().buffer(mars).unwrap().is_empty());
    assert!(orrery.disable_trace(mars));
}

#[test]
fn custom_tables_need_the_anchor_nodes() {
    let table = vec![
        NodeSpec::frame(catalog::ROOT),
        NodeSpec::body(catalog::SUN).parent(catalog::ROOT),
    ];
    assert!(Orrery::with_table(Configuration::default(), table).is_err());
}
