//! Kinematic update and transform composition.
//!
//! Every node's local transform is a pure function of simulation time and
//! the node's static parameters. World transforms are the product of local
//! transforms from the root down, in the fixed order
//!
//! ```text
//! translate(center) · tilt(Rx(a) · Rz(b)) · orbit(θ) [· spin]
//! ```
//!
//! where `orbit(θ)` is either a rotation about Y followed by an offset of
//! the orbit radius along X (circular), or a bare translation to
//! `(cos θ · a, 0, sin θ · b)` (elliptical). Children attach to the pivot
//! (everything but the spin); the spin only orients the body itself.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

use crate::{
    arena::Arena,
    bodies::{NodeId, OrbitNode, OrbitShape, Registry},
    time::SimTime,
};

/// Motion of one node's orbit sub-frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OrbitPose {
    /// Rotated about Y by `angle`, pivot `radius` along the rotated X axis.
    Rotated { angle: f64, radius: f64 },
    /// Translated without rotation.
    Offset(Vector3<f64>),
}

/// Local state of one node at one instant.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalPose {
    /// `rad`
    pub anomaly: f64,
    pub orbit: OrbitPose,
    /// Spin angle about the pivot's Y axis (`rad`).
    pub spin: Option<f64>,
}

impl LocalPose {
    pub const REST: LocalPose = LocalPose {
        anomaly: 0.0,
        orbit: OrbitPose::Rotated {
            angle: 0.0,
            radius: 0.0,
        },
        spin: None,
    };

    pub fn at(registry: &Registry, node: &OrbitNode, t: SimTime) -> Self {
        let t = t.days();
        let anomaly = registry.anomaly(node.id, t);
        let orbit = match node.shape {
            OrbitShape::Circular { radius } => OrbitPose::Rotated {
                angle: anomaly,
                radius,
            },
            OrbitShape::Elliptical {
                semi_major,
                semi_minor,
            } => OrbitPose::Offset(Vector3::new(
                libm::cos(anomaly) * semi_major,
                0.0,
                libm::sin(anomaly) * semi_minor,
            )),
        };
        Self {
            anomaly,
            orbit,
            spin: node.spin_angle(t),
        }
    }

    /// `translate(center) · tilt · orbit`, the frame children attach to.
    pub fn local_pivot(&self, node: &OrbitNode) -> Isometry3<f64> {
        let placed = Isometry3::from_parts(Translation3::from(node.center), tilt_rotation(node));
        let orbit = match self.orbit {
            OrbitPose::Rotated { angle, radius } => {
                Isometry3::rotation(Vector3::y() * angle) * Isometry3::translation(radius, 0.0, 0.0)
            }
            OrbitPose::Offset(offset) => Isometry3::translation(offset.x, offset.y, offset.z),
        };
        placed * orbit
    }

    pub fn spin_rotation(&self) -> Isometry3<f64> {
        match self.spin {
            Some(spin) => Isometry3::rotation(Vector3::y() * spin),
            None => Isometry3::identity(),
        }
    }
}

pub fn tilt_rotation(node: &OrbitNode) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), node.tilt_a)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), node.tilt_b)
}

/// Local poses of every node at the last updated time.
#[derive(Clone, Debug)]
pub struct Kinematics {
    time: SimTime,
    poses: Arena<NodeId, LocalPose>,
}

impl Kinematics {
    pub fn new(registry: &Registry, t: SimTime) -> Self {
        let mut kinematics = Self {
            time: t,
            poses: Arena::filled(registry.len(), LocalPose::REST),
        };
        kinematics.update(registry, t);
        kinematics
    }

    /// Recompute every node's local pose from scratch at `t`.
    pub fn update(&mut self, registry: &Registry, t: SimTime) {
        self.time = t;
        for node in registry.iter() {
            self.poses[node.id] = LocalPose::at(registry, node, t);
        }
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn pose(&self, id: NodeId) -> &LocalPose {
        &self.poses[id]
    }
}

/// World transforms of every node, composed from a [`Kinematics`] update.
#[derive(Clone, Debug)]
pub struct WorldFrames {
    time: SimTime,
    pivots: Arena<NodeId, Isometry3<f64>>,
    bodies: Arena<NodeId, Isometry3<f64>>,
}

impl WorldFrames {
    pub fn compose(registry: &Registry, kinematics: &Kinematics) -> Self {
        let mut frames = Self {
            time: kinematics.time(),
            pivots: Arena::filled(registry.len(), Isometry3::identity()),
            bodies: Arena::filled(registry.len(), Isometry3::identity()),
        };
        frames.recompose(registry, kinematics);
        frames
    }

    /// Recompose in place. Relies on parents preceding their children in
    /// registry order.
    pub fn recompose(&mut self, registry: &Registry, kinematics: &Kinematics) {
        self.time = kinematics.time();
        for node in registry.iter() {
            let pose = kinematics.pose(node.id);
            let parent = match node.parent {
                Some(parent) => self.pivots[parent],
                None => Isometry3::identity(),
            };
            let pivot = parent * pose.local_pivot(node);
            self.pivots[node.id] = pivot;
            self.bodies[node.id] = pivot * pose.spin_rotation();
        }
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn pivot(&self, id: NodeId) -> &Isometry3<f64> {
        &self.pivots[id]
    }

    /// Pivot with the node's own spin applied.
    pub fn body(&self, id: NodeId) -> &Isometry3<f64> {
        &self.bodies[id]
    }

    pub fn position(&self, id: NodeId) -> Point3<f64> {
        Point3::from(self.pivots[id].translation.vector)
    }
}

/// World pivot of a single node at an arbitrary time, composed along its
/// lineage only.
pub fn world_pivot_at(registry: &Registry, id: NodeId, t: SimTime) -> Isometry3<f64> {
    registry
        .lineage(id)
        .into_iter()
        .fold(Isometry3::identity(), |acc, id| {
            let node = &registry[id];
            acc * LocalPose::at(registry, node, t).local_pivot(node)
        })
}

pub fn world_position_at(registry: &Registry, id: NodeId, t: SimTime) -> Point3<f64> {
    Point3::from(world_pivot_at(registry, id, t).translation.vector)
}

#[cfg(test)]
use crate::bodies::NodeSpec;

#[cfg(test)]
fn compose_at(registry: &Registry, t: f64) -> WorldFrames {
    let kinematics = Kinematics::new(registry, SimTime::from_days(t));
    WorldFrames::compose(registry, &kinematics)
}

#[test]
fn circular_node_returns_after_one_period() {
    let registry = Registry::build([
        NodeSpec::frame("origin"),
        NodeSpec::body("planet")
            .parent("origin")
            .center(3.0, -1.0, 2.0)
            .tilt(7.0, -3.5)
            .circular(10.0)
            .period(365.25)
            .phase(42.0),
    ])
    .unwrap();
    let planet = registry.lookup("planet").unwrap();
    let start = compose_at(&registry, 0.0).position(planet);
    let later = compose_at(&registry, 365.25).position(planet);
    assert!((start - later).norm() < 1e-9);
    let half = compose_at(&registry, 365.25 / 2.0).position(planet);
    assert!((start - half).norm() > 19.0);
}

#[test]
fn composition_order_is_center_tilt_orbit() {
    let registry = Registry::build([
        NodeSpec::frame("origin"),
        NodeSpec::frame("tilted")
            .parent("origin")
            .center(5.0, 0.0, 0.0)
            .tilt(0.0, 90.0)
            .circular(1.0),
        NodeSpec::body("child").parent("tilted").circular(2.0),
    ])
    .unwrap();
    let frames = compose_at(&registry, 0.0);
    let tilted = frames.position(registry.lookup("tilted").unwrap());
    let child = frames.position(registry.lookup("child").unwrap());
    approx::assert_abs_diff_eq!(tilted, Point3::new(5.0, 1.0, 0.0), epsilon = 1e-12);
    approx::assert_abs_diff_eq!(child, Point3::new(5.0, 3.0, 0.0), epsilon = 1e-12);
}

#[test]
fn rotation_sense_and_elliptical_offsets() {
    let registry = Registry::build([
        NodeSpec::frame("origin"),
        NodeSpec::body("ring").parent("origin").circular(1.0).period(4.0),
        NodeSpec::body("comet")
            .parent("origin")
            .elliptical(30.0, 8.0)
            .period(40.0)
            .phase(-30.0),
    ])
    .unwrap();
    let frames = compose_at(&registry, 1.0);
    // A quarter turn carries +X onto -Z.
    approx::assert_abs_diff_eq!(
        frames.position(registry.lookup("ring").unwrap()),
        Point3::new(0.0, 0.0, -1.0),
        epsilon = 1e-12
    );
    // θ = 2π/40 + 30° = 39°
    let theta = 39f64.to_radians();
    let comet = registry.lookup("comet").unwrap();
    approx::assert_abs_diff_eq!(
        frames.position(comet),
        Point3::new(theta.cos() * 30.0, 0.0, theta.sin() * 8.0),
        epsilon = 1e-9
    );
    // Elliptical frames never rotate.
    assert!(frames.pivot(comet).rotation.angle() < 1e-12);
}

#[test]
fn spin_orients_the_body_but_not_its_children() {
    let table = |spin: bool| {
        let mut planet = NodeSpec::body("planet")
            .parent("origin")
            .circular(10.0)
            .period(50.0);
        if spin {
            planet = planet.spin_period(0.7);
        }
        Registry::build([
            NodeSpec::frame("origin"),
            planet,
            NodeSpec::body("moon").parent("planet").circular(1.0).period(3.0),
        ])
        .unwrap()
    };
    let spinning = table(true);
    let still = table(false);
    let moon = spinning.lookup("moon").unwrap();
    let planet = spinning.lookup("planet").unwrap();
    for t in [0.3, 11.0, -7.25] {
        let a = compose_at(&spinning, t);
        let b = compose_at(&still, t);
        assert_eq!(a.position(moon), b.position(moon));
        assert_eq!(a.pivot(planet), b.pivot(planet));
        assert_ne!(a.body(planet).rotation, b.body(planet).rotation);
    }
}

#[test]
fn single_lineage_matches_full_composition() {
    let registry = Registry::build([
        NodeSpec::frame("origin"),
        NodeSpec::frame("precession")
            .parent("origin")
            .circular(0.5)
            .period(-1000.0)
            .tilt(1.5, 0.0),
        NodeSpec::body("planet")
            .parent("precession")
            .circular(10.0)
            .period(88.0)
            .phase(10.0),
        NodeSpec::body("moon").parent("planet").circular(0.3).period(2.0),
    ])
    .unwrap();
    let moon = registry.lookup("moon").unwrap();
    for t in [-3000.0, 0.0, 17.5, 123_456.0] {
        let frames = compose_at(&registry, t);
        let single = world_position_at(&registry, moon, SimTime::from_days(t));
        assert!((frames.position(moon) - single).norm() < 1e-9);
    }
}
