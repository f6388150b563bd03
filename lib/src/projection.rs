//! Readings of world positions in the Earth-equatorial and heliocentric
//! frames.
//!
//! Spherical coordinates follow the Y-up scene convention: azimuth
//! (right ascension) is `atan2(x, z)` and elevation (declination) is the
//! angle above the XZ plane, `atan2(y, hypot(x, z))`.

use std::{f64::consts, sync::Arc};

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    bodies::{NodeId, Registry},
    config::SceneScale,
    kinematics::WorldFrames,
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spherical {
    pub radius: f64,
    /// `[0, 2π)`
    pub azimuth: f64,
    /// `[-π/2, π/2]`
    pub elevation: f64,
}

/// Cartesian → spherical. A zero-length or non-finite vector reads as
/// azimuth 0, elevation 0 instead of NaN; a non-finite radius is passed
/// through so callers can tell the two apart.
pub fn cartesian_to_spherical(v: &Vector3<f64>) -> Spherical {
    let radius = v.norm();
    if radius == 0.0 || !radius.is_finite() {
        trace!(?v, "degenerate direction, reading as 0/0");
        return Spherical {
            radius,
            azimuth: 0.0,
            elevation: 0.0,
        };
    }
    let azimuth = libm::atan2(v.x, v.z).rem_euclid(consts::TAU);
    Spherical {
        radius,
        azimuth,
        elevation: libm::atan2(v.y, libm::hypot(v.x, v.z)),
    }
}

pub fn spherical_to_cartesian(s: &Spherical) -> Vector3<f64> {
    let horizontal = s.radius * libm::cos(s.elevation);
    Vector3::new(
        horizontal * libm::sin(s.azimuth),
        s.radius * libm::sin(s.elevation),
        horizontal * libm::cos(s.azimuth),
    )
}

/// Ecliptic longitude of a direction expressed in a Y-up ecliptic frame
/// (`deg`, `[0, 360)`).
pub fn ecliptic_longitude(v: &Vector3<f64>) -> f64 {
    libm::atan2(v.x, v.z).to_degrees().rem_euclid(360.0)
}

/// `point` as seen from the origin of `frame`, in `frame`'s axes.
pub fn relative_spherical(frame: &Isometry3<f64>, point: &Point3<f64>) -> Spherical {
    cartesian_to_spherical(&frame.inverse_transform_point(point).coords)
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub scene_units: f64,
    pub au: f64,
    pub km: f64,
    pub mi: f64,
}

impl Distance {
    pub fn from_scene_units(units: f64, scale: &SceneScale) -> Self {
        Self {
            scene_units: units,
            au: scale.to_au(units),
            km: scale.to_km(units),
            mi: scale.to_miles(units),
        }
    }
}

/// One body as seen from the Earth and from the Sun.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub node: NodeId,
    pub name: Arc<str>,
    /// Right ascension (`rad`).
    pub ra: f64,
    /// Declination (`rad`).
    pub dec: f64,
    pub distance: Distance,
    /// Heliocentric longitude in the Sun frame (`rad`).
    pub sun_longitude: f64,
    /// Heliocentric latitude in the Sun frame (`rad`).
    pub sun_latitude: f64,
    pub sun_distance: Distance,
}

/// Project `bodies` against the Earth-equatorial frame `earth_frame` and
/// the heliocentric frame `sun_frame`. Read-only.
pub fn project(
    registry: &Registry,
    frames: &WorldFrames,
    bodies: &[NodeId],
    earth_frame: NodeId,
    sun_frame: NodeId,
    scale: &SceneScale,
) -> Vec<Reading> {
    let earth = frames.pivot(earth_frame);
    let sun = frames.pivot(sun_frame);
    bodies
        .iter()
        .map(|&id| {
            let position = frames.position(id);
            let geo = relative_spherical(earth, &position);
            let helio = relative_spherical(sun, &position);
            Reading {
                node: id,
                name: registry[id].name.clone(),
                ra: geo.azimuth,
                dec: geo.elevation,
                distance: Distance::from_scene_units(geo.radius, scale),
                sun_longitude: helio.azimuth,
                sun_latitude: helio.elevation,
                sun_distance: Distance::from_scene_units(helio.radius, scale),
            }
        })
        .collect()
}

/// Right ascension as `06h45m08.92s`.
pub fn format_ra(ra: f64) -> String {
    const DAY_CENTISECONDS: u64 = 24 * 3600 * 100;
    let turns = ra.rem_euclid(consts::TAU) / consts::TAU;
    let centis = (turns * DAY_CENTISECONDS as f64).round() as u64 % DAY_CENTISECONDS;
    let h = centis / 360_000;
    let m = centis / 6_000 % 60;
    let s = (centis % 6_000) as f64 / 100.0;
    format!("{h:02}h{m:02}m{s:05.2}s")
}

/// Declination as `+23°26'21.4"`.
pub fn format_dec(dec: f64) -> String {
    let sign = if dec < 0.0 { '-' } else { '+' };
    let tenths = (dec.abs().to_degrees() * 36_000.0).round() as u64;
    let d = tenths / 36_000;
    let m = tenths / 600 % 60;
    let s = (tenths % 600) as f64 / 10.0;
    format!("{sign}{d:02}°{m:02}'{s:04.1}\"")
}

#[test]
fn spherical_round_trip() {
    for v in [
        Vector3::new(1.0, 2.0, 3.0),
        Vector3::new(-4.5, 0.1, -0.2),
        Vector3::new(0.0, -7.0, 1e-3),
        Vector3::new(1e-6, 1e-6, -1e-6),
        Vector3::new(250.0, -30.0, 0.0),
        Vector3::new(1e-4, 3.0, -2e-4),
    ] {
        let s = cartesian_to_spherical(&v);
        assert!((0.0..consts::TAU).contains(&s.azimuth));
        let back = spherical_to_cartesian(&s);
        approx::assert_relative_eq!(back, v, epsilon = 1e-12, max_relative = 1e-12);
    }
}

#[test]
fn axes_map_to_expected_angles() {
    let z = cartesian_to_spherical(&Vector3::new(0.0, 0.0, 2.0));
    assert_eq!((z.azimuth, z.elevation, z.radius), (0.0, 0.0, 2.0));
    let x = cartesian_to_spherical(&Vector3::new(1.0, 0.0, 0.0));
    approx::assert_abs_diff_eq!(x.azimuth, consts::FRAC_PI_2, epsilon = 1e-15);
    let y = cartesian_to_spherical(&Vector3::new(0.0, 1.0, 0.0));
    approx::assert_abs_diff_eq!(y.elevation, consts::FRAC_PI_2, epsilon = 1e-15);
    let back = cartesian_to_spherical(&Vector3::new(-1.0, 0.0, -1e-9));
    approx::assert_abs_diff_eq!(back.azimuth, 1.5 * consts::PI, epsilon = 1e-6);
    approx::assert_abs_diff_eq!(
        ecliptic_longitude(&Vector3::new(0.0, 0.0, -1.0)),
        180.0,
        epsilon = 1e-12
    );
}

#[test]
fn degenerate_vectors_read_as_zero() {
    for v in [
        Vector3::zeros(),
        Vector3::new(f64::NAN, 0.0, 1.0),
        Vector3::new(f64::INFINITY, 0.0, 0.0),
    ] {
        let s = cartesian_to_spherical(&v);
        assert_eq!((s.azimuth, s.elevation), (0.0, 0.0));
    }
    assert_eq!(cartesian_to_spherical(&Vector3::zeros()).radius, 0.0);
    assert!(cartesian_to_spherical(&Vector3::new(f64::NAN, 0.0, 1.0))
        .radius
        .is_nan());
}

#[test]
fn sexagesimal_formatting() {
    assert_eq!(format_ra(consts::FRAC_PI_2), "06h00m00.00s");
    assert_eq!(format_ra(-consts::FRAC_PI_2), "18h00m00.00s");
    assert_eq!(format_ra(consts::TAU - 1e-12), "00h00m00.00s");
    assert_eq!(format_dec(23.439_291_1f64.to_radians()), "+23°26'21.4\"");
    assert_eq!(format_dec(-0.5f64.to_radians()), "-00°30'00.0\"");
}

#[test]
fn projection_reads_body_against_both_frames() {
    use crate::{bodies::NodeSpec, kinematics::Kinematics, time::SimTime};

    let registry = Registry::build([
        NodeSpec::frame("origin"),
        NodeSpec::body("earth").parent("origin"),
        NodeSpec::frame("equator").parent("earth").tilt(0.0, -30.0),
        NodeSpec::body("sun").parent("origin").center(0.0, 0.0, 100.0),
        NodeSpec::body("probe").parent("origin").center(100.0, 0.0, 0.0),
    ])
    .unwrap();
    let frames = WorldFrames::compose(&registry, &Kinematics::new(&registry, SimTime::ZERO));
    let scale = SceneScale::default();
    let [earth, equator, sun, probe] =
        ["earth", "equator", "sun", "probe"].map(|n| registry.lookup(n).unwrap());

    let readings = project(&registry, &frames, &[sun, probe, earth], equator, sun, &scale);
    // Along the tilt axis: on the equator at RA 0.
    approx::assert_abs_diff_eq!(readings[0].ra, 0.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(readings[0].dec, 0.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(readings[0].distance.au, 1.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(readings[0].distance.km, scale.au_km, epsilon = 1e-3);
    // Perpendicular to it: lifted by the tilt.
    approx::assert_abs_diff_eq!(readings[1].dec, 30f64.to_radians(), epsilon = 1e-12);
    approx::assert_abs_diff_eq!(readings[1].ra, consts::FRAC_PI_2, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(readings[1].sun_distance.au, 2f64.sqrt(), epsilon = 1e-12);
    // Coincident with the Earth.
    assert_eq!(readings[2].name.as_ref(), "earth");
    assert_eq!((readings[2].ra, readings[2].dec), (0.0, 0.0));
    assert_eq!(readings[2].distance.au, 0.0);
    approx::assert_abs_diff_eq!(readings[2].sun_longitude, consts::PI, epsilon = 1e-12);
}
