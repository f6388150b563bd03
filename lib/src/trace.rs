//! Bounded position history for traced bodies.
//!
//! Samples are taken on a fixed simulation-time grid `start + k · step`,
//! independent of how often [`TraceRecorder::sample`] is called.

use std::collections::BTreeMap;

use color_eyre::eyre;
use nalgebra::Point3;
use tracing::debug;

use crate::{
    bodies::{NodeId, Registry},
    config::TraceSettings,
    kinematics::world_position_at,
    time::SimTime,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TraceSample {
    pub time: SimTime,
    pub position: Point3<f64>,
}

/// Ring buffer of one body's recent world positions.
#[derive(Clone, Debug)]
pub struct TraceBuffer {
    settings: TraceSettings,
    capacity: usize,
    samples: Vec<TraceSample>,
    /// Total writes since the last reset.
    written: u64,
    start_time: SimTime,
}

impl TraceBuffer {
    fn new(settings: TraceSettings, start_time: SimTime) -> Self {
        let capacity = settings.capacity();
        Self {
            settings,
            capacity,
            samples: Vec::new(),
            written: 0,
            start_time,
        }
    }

    pub fn settings(&self) -> &TraceSettings {
        &self.settings
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    /// Time of the last recorded sample, or the start time if none.
    pub fn current_time(&self) -> SimTime {
        self.time_of(self.written)
    }

    fn time_of(&self, k: u64) -> SimTime {
        self.start_time + k as f64 * self.settings.step_days
    }

    fn push(&mut self, sample: TraceSample) {
        let slot = (self.written % self.capacity as u64) as usize;
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[slot] = sample;
        }
        self.written += 1;
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TraceSample> {
        let split = if self.samples.len() < self.capacity {
            0
        } else {
            (self.written % self.capacity as u64) as usize
        };
        let (newer, older) = self.samples.split_at(split);
        older.iter().chain(newer)
    }

    pub fn latest(&self) -> Option<&TraceSample> {
        if self.written == 0 {
            return None;
        }
        let slot = ((self.written - 1) % self.capacity as u64) as usize;
        self.samples.get(slot)
    }
}

#[derive(Clone, Debug)]
pub struct TraceRecorder {
    defaults: TraceSettings,
    buffers: BTreeMap<NodeId, TraceBuffer>,
}

impl TraceRecorder {
    pub fn new(defaults: TraceSettings) -> eyre::Result<Self> {
        defaults.validate()?;
        Ok(Self {
            defaults,
            buffers: BTreeMap::new(),
        })
    }

    /// Start tracing `body` from `t` with the default settings. A body that
    /// is already traced keeps its buffer.
    pub fn enable(&mut self, body: NodeId, t: SimTime) {
        let defaults = self.defaults;
        self.buffers.entry(body).or_insert_with(|| {
            debug!(?body, %t, "trace enabled");
            TraceBuffer::new(defaults, t)
        });
    }

    pub fn disable(&mut self, body: NodeId) -> bool {
        self.buffers.remove(&body).is_some()
    }

    pub fn is_enabled(&self, body: NodeId) -> bool {
        self.buffers.contains_key(&body)
    }

    pub fn enabled(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.buffers.keys().copied()
    }

    pub fn buffer(&self, body: NodeId) -> Option<&TraceBuffer> {
        self.buffers.get(&body)
    }

    /// Change a traced body's settings. The buffer is reallocated from `t`.
    pub fn set_settings(
        &mut self,
        body: NodeId,
        settings: TraceSettings,
        t: SimTime,
    ) -> eyre::Result<()> {
        settings.validate()?;
        debug!(?body, ?settings, "trace settings changed");
        self.buffers.insert(body, TraceBuffer::new(settings, t));
        Ok(())
    }

    /// Discard a body's history and restart it at `t`.
    pub fn reset(&mut self, body: NodeId, t: SimTime) {
        if let Some(buffer) = self.buffers.get_mut(&body) {
            debug!(?body, %t, discarded = buffer.len(), "trace reset");
            *buffer = TraceBuffer::new(buffer.settings, t);
        }
    }

    /// Bring `body`'s trace up to `t`. Returns the number of samples
    /// written.
    ///
    /// Going back before the last sample resets the trace at `t`, and so
    /// does a jump needing more than `max_catch_up` samples.
    pub fn sample(&mut self, registry: &Registry, body: NodeId, t: SimTime) -> usize {
        if !t.is_finite() {
            return 0;
        }
        let Some(buffer) = self.buffers.get(&body) else {
            return 0;
        };
        if t < buffer.current_time() {
            self.reset(body, t);
            return 0;
        }

        let step = buffer.settings.step_days;
        let due = ((t - buffer.start_time) / step).floor();
        let pending = due - buffer.written as f64;
        if pending < 1.0 {
            return 0;
        }
        if pending > buffer.settings.max_catch_up as f64 {
            debug!(?body, pending, "trace catch-up too large");
            self.reset(body, t);
            return 0;
        }

        let Some(buffer) = self.buffers.get_mut(&body) else {
            return 0;
        };
        let target = due as u64;
        let mut written = 0;
        while buffer.written < target {
            let time = buffer.time_of(buffer.written + 1);
            if time > t {
                break;
            }
            let position = world_position_at(registry, body, time);
            buffer.push(TraceSample { time, position });
            written += 1;
        }
        written
    }

    pub fn sample_all(&mut self, registry: &Registry, t: SimTime) -> usize {
        let bodies: Vec<NodeId> = self.enabled().collect();
        bodies
            .into_iter()
            .map(|body| self.sample(registry, body, t))
            .sum()
    }
}

#[cfg(test)]
fn fixture(step: f64, length: f64) -> (Registry, NodeId, TraceRecorder) {
    use crate::bodies::NodeSpec;

    let registry = Registry::build([
        NodeSpec::frame("origin"),
        NodeSpec::body("planet").parent("origin").circular(5.0).period(20.0),
    ])
    .unwrap();
    let planet = registry.lookup("planet").unwrap();
    let recorder = TraceRecorder::new(TraceSettings {
        step_days: step,
        length_days: length,
        max_catch_up: 1000,
    })
    .unwrap();
    (registry, planet, recorder)
}

#[cfg(test)]
fn times(buffer: &TraceBuffer) -> Vec<f64> {
    buffer.iter().map(|s| s.time.days()).collect()
}

#[test]
fn five_steps_give_five_evenly_spaced_samples() {
    let (registry, planet, mut recorder) = fixture(0.5, 100.0);
    let t0 = SimTime::from_days(3.0);
    recorder.enable(planet, t0);
    assert_eq!(recorder.sample(&registry, planet, t0 + 5.0 * 0.5), 5);

    let buffer = recorder.buffer(planet).unwrap();
    assert_eq!(times(buffer), [3.5, 4.0, 4.5, 5.0, 5.5]);
    for sample in buffer.iter() {
        let expected = world_position_at(&registry, planet, sample.time);
        assert_eq!(sample.position, expected);
    }
    assert_eq!(buffer.current_time().days(), 5.5);
}

#[test]
fn sampling_is_frame_rate_independent() {
    let (registry, planet, mut once) = fixture(0.25, 100.0);
    let mut often = once.clone();
    once.enable(planet, SimTime::ZERO);
    often.enable(planet, SimTime::ZERO);

    once.sample(&registry, planet, SimTime::from_days(3.1));
    let mut written = 0;
    for frame in 1..=31 {
        written += often.sample(&registry, planet, SimTime::from_days(frame as f64 * 0.1));
    }
    assert_eq!(written, 12);
    assert_eq!(
        times(once.buffer(planet).unwrap()),
        times(often.buffer(planet).unwrap())
    );
}

#[test]
fn ring_overwrites_the_oldest_sample() {
    let (registry, planet, mut recorder) = fixture(1.0, 4.0);
    recorder.enable(planet, SimTime::ZERO);
    recorder.sample(&registry, planet, SimTime::from_days(10.0));
    let buffer = recorder.buffer(planet).unwrap();
    assert_eq!(buffer.capacity(), 4);
    assert_eq!(buffer.len(), 4);
    assert_eq!(times(buffer), [7.0, 8.0, 9.0, 10.0]);
    assert_eq!(buffer.latest().unwrap().time.days(), 10.0);

    recorder.sample(&registry, planet, SimTime::from_days(11.0));
    let buffer = recorder.buffer(planet).unwrap();
    assert_eq!(buffer.len(), 4);
    assert_eq!(times(buffer), [8.0, 9.0, 10.0, 11.0]);
}

#[test]
fn rewinding_restarts_the_trace() {
    let (registry, planet, mut recorder) = fixture(0.5, 100.0);
    recorder.enable(planet, SimTime::ZERO);
    recorder.sample(&registry, planet, SimTime::from_days(5.0));
    assert_eq!(recorder.buffer(planet).unwrap().len(), 10);

    assert_eq!(recorder.sample(&registry, planet, SimTime::from_days(-3.0)), 0);
    let buffer = recorder.buffer(planet).unwrap();
    assert!(buffer.is_empty());
    assert_eq!(buffer.start_time().days(), -3.0);

    recorder.sample(&registry, planet, SimTime::from_days(-2.0));
    assert_eq!(times(recorder.buffer(planet).unwrap()), [-2.5, -2.0]);
}

#[test]
fn huge_jumps_reset_instead_of_catching_up() {
    let (registry, planet, mut recorder) = fixture(1.0, 50.0);
    recorder.enable(planet, SimTime::ZERO);
    recorder.sample(&registry, planet, SimTime::from_days(3.0));
    let far = SimTime::from_days(10_000.0 * 365.25);
    assert_eq!(recorder.sample(&registry, planet, far), 0);
    let buffer = recorder.buffer(planet).unwrap();
    assert!(buffer.is_empty());
    assert_eq!(buffer.start_time(), far);
    assert_eq!(recorder.sample(&registry, planet, far + 2.0), 2);
}

#[test]
fn settings_and_enablement() {
    let (registry, planet, mut recorder) = fixture(1.0, 10.0);
    assert_eq!(recorder.sample(&registry, planet, SimTime::from_days(5.0)), 0);
    assert!(recorder.buffer(planet).is_none());

    recorder.enable(planet, SimTime::ZERO);
    recorder.sample(&registry, planet, SimTime::from_days(5.0));
    let bad = TraceSettings {
        step_days: 0.0,
        ..TraceSettings::default()
    };
    assert!(recorder.set_settings(planet, bad, SimTime::ZERO).is_err());
    let endless = TraceSettings {
        length_days: 1e300,
        ..TraceSettings::default()
    };
    assert!(recorder.set_settings(planet, endless, SimTime::ZERO).is_err());
    assert_eq!(recorder.buffer(planet).unwrap().len(), 5);

    let finer = TraceSettings {
        step_days: 0.1,
        length_days: 2.0,
        max_catch_up: 100,
    };
    recorder
        .set_settings(planet, finer, SimTime::from_days(5.0))
        .unwrap();
    let buffer = recorder.buffer(planet).unwrap();
    assert!(buffer.is_empty());
    assert_eq!(buffer.capacity(), 20);

    assert!(recorder.disable(planet));
    assert!(!recorder.is_enabled(planet));
    assert!(TraceRecorder::new(bad).is_err());
}
