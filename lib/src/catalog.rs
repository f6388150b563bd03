//! The built-in solar system table.
//!
//! The Earth sits at the root. Its precessing equator, the Earth–Sun chain
//! and the Moon hang directly off the root; the planets and minor bodies hang
//! off `sun-fixed`, a frame that follows the Sun but keeps the root's
//! orientation.

use crate::{
    bodies::NodeSpec,
    config::{Calibration, SceneScale},
    ephemeris::EarthSunChain,
};

pub const ROOT: &str = "start";
pub const EARTH: &str = "earth";
pub const EARTH_EQUATOR: &str = "earth-equator";
pub const ZODIAC: &str = "zodiac";
pub const EARTH_PERIHELION_1: &str = "earth-perihelion-1";
pub const EARTH_PERIHELION_2: &str = "earth-perihelion-2";
pub const SUN: &str = "sun";
pub const SUN_FIXED: &str = "sun-fixed";
pub const MOON: &str = "moon";

const SUN_ROTATION_DAYS: f64 = 25.38;

/// Heliocentric mean elements at J2000 (`AU`, `deg`, `years`).
struct Planet {
    name: &'static str,
    semi_major: f64,
    eccentricity: f64,
    inclination: f64,
    ascending_node: f64,
    perihelion: f64,
    mean_longitude: f64,
    period: f64,
    /// Sidereal rotation (`days`), negative when retrograde.
    rotation: f64,
    /// Apsidal precession against the stars as a multiple of the holistic
    /// year; zero keeps the perihelion fixed.
    apsidal_cycles: f64,
    /// Nodal precession, same convention.
    nodal_cycles: f64,
    size: f64,
    color: [u8; 3],
}

#[rustfmt::skip]
const PLANETS: [Planet; 9] = [
    Planet { name: "mercury", semi_major: 0.387_099_27, eccentricity: 0.205_635_93, inclination: 7.004_979_02, ascending_node: 48.330_765_93, perihelion: 77.457_796_28, mean_longitude: 252.250_323_5, period: 0.240_846_7, rotation: 58.646, apsidal_cycles: 0.75, nodal_cycles: -1.0, size: 0.38, color: [0x8c, 0x86, 0x80] },
    Planet { name: "venus", semi_major: 0.723_335_66, eccentricity: 0.006_776_72, inclination: 3.394_676_05, ascending_node: 76.679_842_55, perihelion: 131.602_467_18, mean_longitude: 181.979_099_5, period: 0.615_197_26, rotation: -243.025, apsidal_cycles: 0.5, nodal_cycles: -1.0, size: 0.95, color: [0xe6, 0xc2, 0x7a] },
    Planet { name: "mars", semi_major: 1.523_710_34, eccentricity: 0.093_394_1, inclination: 1.849_691_42, ascending_node: 49.559_538_91, perihelion: 336.056_370_41, mean_longitude: 355.446_567_95, period: 1.880_815_8, rotation: 1.025_957, apsidal_cycles: 0.25, nodal_cycles: -1.0, size: 0.53, color: [0xc1, 0x44, 0x0e] },
    Planet { name: "ceres", semi_major: 2.767_5, eccentricity: 0.075_8, inclination: 10.593, ascending_node: 80.305_5, perihelion: 153.902_5, mean_longitude: 291.428, period: 4.60, rotation: 0.378_1, apsidal_cycles: 0.0, nodal_cycles: 0.0, size: 0.15, color: [0x9a, 0x96, 0x90] },
    Planet { name: "jupiter", semi_major: 5.202_887, eccentricity: 0.048_386_24, inclination: 1.304_396_95, ascending_node: 100.473_909_09, perihelion: 14.728_479_83, mean_longitude: 34.396_440_51, period: 11.862_615, rotation: 0.413_54, apsidal_cycles: 1.0, nodal_cycles: -1.0, size: 3.0, color: [0xd8, 0xca, 0x9d] },
    Planet { name: "saturn", semi_major: 9.536_675_94, eccentricity: 0.053_861_79, inclination: 2.485_991_87, ascending_node: 113.662_424_48, perihelion: 92.598_878_31, mean_longitude: 49.954_244_23, period: 29.447_498, rotation: 0.444, apsidal_cycles: -1.0, nodal_cycles: -1.0, size: 2.6, color: [0xe3, 0xe0, 0xc0] },
    Planet { name: "uranus", semi_major: 19.189_164_64, eccentricity: 0.047_257_44, inclination: 0.772_637_83, ascending_node: 74.016_925_03, perihelion: 170.954_276_3, mean_longitude: 313.238_104_51, period: 84.016_846, rotation: -0.718_33, apsidal_cycles: 1.0 / 3.0, nodal_cycles: -1.0, size: 1.6, color: [0xac, 0xe5, 0xee] },
    Planet { name: "neptune", semi_major: 30.069_922_76, eccentricity: 0.008_590_48, inclination: 1.770_043_47, ascending_node: 131.784_225_74, perihelion: 44.964_762_27, mean_longitude: 304.879_970_31, period: 164.791_32, rotation: 0.671_3, apsidal_cycles: 0.5, nodal_cycles: -1.0, size: 1.5, color: [0x5b, 0x5d, 0xdf] },
    Planet { name: "pluto", semi_major: 39.482_116_75, eccentricity: 0.248_827_3, inclination: 17.140_012_06, ascending_node: 110.303_936_84, perihelion: 224.068_916_29, mean_longitude: 238.929_038_33, period: 247.920_65, rotation: -6.387_23, apsidal_cycles: 0.0, nodal_cycles: 0.0, size: 0.18, color: [0xdd, 0xc4, 0xaf] },
];

/// Bodies drawn on a true ellipse with the Sun at one focus.
struct SmallBody {
    name: &'static str,
    semi_major: f64,
    eccentricity: f64,
    inclination: f64,
    ascending_node: f64,
    argument_of_perihelion: f64,
    perihelion_jd: f64,
    period: f64,
    size: f64,
    color: [u8; 3],
}

#[rustfmt::skip]
const SMALL_BODIES: [SmallBody; 2] = [
    SmallBody { name: "halley", semi_major: 17.834, eccentricity: 0.967_14, inclination: 162.262, ascending_node: 58.42, argument_of_perihelion: 111.33, perihelion_jd: 2_446_470.5, period: 75.32, size: 0.1, color: [0xcf, 0xe8, 0xff] },
    SmallBody { name: "eros", semi_major: 1.457_9, eccentricity: 0.222_9, inclination: 10.829, ascending_node: 304.32, argument_of_perihelion: 178.82, perihelion_jd: 2_451_470.5, period: 1.761, size: 0.05, color: [0xa0, 0x8a, 0x70] },
];

mod moon {
    pub const SEMI_MAJOR_KM: f64 = 384_399.0;
    pub const ECCENTRICITY: f64 = 0.054_9;
    pub const INCLINATION: f64 = 5.145;
    pub const ASCENDING_NODE: f64 = 125.08;
    pub const PERIGEE: f64 = 83.23;
    pub const MEAN_LONGITUDE: f64 = 218.316;
    pub const SIDEREAL_MONTH_DAYS: f64 = 27.321_661;
    pub const NODAL_PERIOD_YEARS: f64 = -18.612_958;
    pub const APSIDAL_PERIOD_YEARS: f64 = 8.850_4;
}

/// Start phase (`deg`) that puts a node moving at `speed` at `angle_deg`
/// at simulation time `reference`.
fn phase_at(speed: f64, reference: f64, angle_deg: f64) -> f64 {
    (speed * reference).to_degrees() - angle_deg
}

fn cycle_speed(cycles: f64, holistic_days: f64) -> f64 {
    if cycles == 0.0 {
        0.0
    } else {
        std::f64::consts::TAU / (cycles * holistic_days)
    }
}

/// Node, perihelion and body nodes of an orbit drawn as an offset circle.
///
/// `speeds` are the absolute nodal, apsidal and mean motions (`rad/day`);
/// angles are the ascending node, longitude of perihelion and mean longitude
/// at `reference`.
#[allow(clippy::too_many_arguments)]
fn offset_circle(
    name: &str,
    parent: &str,
    radius: f64,
    eccentricity: f64,
    inclination: f64,
    [node_speed, apsidal_speed, mean_motion]: [f64; 3],
    [node, perihelion, mean_longitude]: [f64; 3],
    reference: f64,
) -> [NodeSpec; 3] {
    let node_name = format!("{name}-node");
    let perihelion_name = format!("{name}-perihelion");
    let apsidal_relative = apsidal_speed - node_speed;
    let body_relative = mean_motion - apsidal_speed;
    [
        NodeSpec::frame(&node_name)
            .parent(parent)
            .speed(node_speed)
            .phase(phase_at(node_speed, reference, node)),
        NodeSpec::frame(&perihelion_name)
            .parent(&node_name)
            .tilt(0.0, inclination)
            .circular(radius * eccentricity)
            .speed(apsidal_relative)
            .phase(phase_at(
                apsidal_relative,
                reference,
                perihelion - node + 90.0,
            )),
        NodeSpec::body(name)
            .parent(&perihelion_name)
            .circular(radius)
            .speed(body_relative)
            .phase(phase_at(
                body_relative,
                reference,
                mean_longitude - perihelion - 180.0,
            )),
    ]
}

/// Build the default node table.
pub fn solar_system(calibration: &Calibration, scene: &SceneScale) -> Vec<NodeSpec> {
    let chain = EarthSunChain::new(calibration);
    let holistic_days = calibration.years_to_days(calibration.holistic_year);
    let [w1, w2, ws] = chain.speeds;
    let [p1, p2, ps] = chain.phases;
    let j2000 = crate::time::J2000_JD - calibration.epoch_jd;

    let mut specs = vec![
        NodeSpec::frame(ROOT),
        NodeSpec::body(EARTH)
            .parent(ROOT)
            .speed(chain.axial_speed)
            .phase(chain.axial_phase.to_degrees())
            .appearance(1.0, [0x2b, 0x65, 0xec]),
        NodeSpec::frame(EARTH_EQUATOR)
            .parent(EARTH)
            .tilt(0.0, -calibration.obliquity_mean_deg)
            .spin_period(calibration.sidereal_day_seconds / crate::time::SECONDS_PER_DAY),
        NodeSpec::frame(ZODIAC).parent(ROOT).coupled_to(EARTH, 0.0),
        NodeSpec::frame(EARTH_PERIHELION_1)
            .parent(ROOT)
            .circular(scene.from_au(chain.radii[0]))
            .speed(w1)
            .phase(p1.to_degrees()),
        NodeSpec::frame(EARTH_PERIHELION_2)
            .parent(EARTH_PERIHELION_1)
            .circular(scene.from_au(chain.radii[1]))
            .speed(w2)
            .phase(p2.to_degrees()),
        NodeSpec::body(SUN)
            .parent(EARTH_PERIHELION_2)
            .circular(scene.from_au(chain.radii[2]))
            .speed(ws)
            .phase(ps.to_degrees())
            .spin_period(SUN_ROTATION_DAYS)
            .appearance(4.0, [0xff, 0xd2, 0x3f]),
        NodeSpec::frame(SUN_FIXED)
            .parent(SUN)
            .speed(-(w1 + w2 + ws))
            .phase(-(p1 + p2 + ps).to_degrees()),
    ];

    // The Moon's pivot turns with its orbit, which keeps one face to Earth.
    let month_speed = std::f64::consts::TAU / moon::SIDEREAL_MONTH_DAYS;
    let [node, perigee, body] = offset_circle(
        MOON,
        ROOT,
        scene.from_au(moon::SEMI_MAJOR_KM / scene.au_km),
        moon::ECCENTRICITY,
        moon::INCLINATION,
        [
            std::f64::consts::TAU / calibration.years_to_days(moon::NODAL_PERIOD_YEARS),
            std::f64::consts::TAU / calibration.years_to_days(moon::APSIDAL_PERIOD_YEARS),
            month_speed,
        ],
        [moon::ASCENDING_NODE, moon::PERIGEE, moon::MEAN_LONGITUDE],
        j2000,
    );
    specs.extend([node, perigee, body.appearance(0.27, [0xc8, 0xc8, 0xc8])]);

    for planet in &PLANETS {
        let [node, perihelion, mut body] = offset_circle(
            planet.name,
            SUN_FIXED,
            scene.from_au(planet.semi_major),
            planet.eccentricity,
            planet.inclination,
            [
                cycle_speed(planet.nodal_cycles, holistic_days),
                cycle_speed(planet.apsidal_cycles, holistic_days),
                std::f64::consts::TAU / calibration.years_to_days(planet.period),
            ],
            [
                planet.ascending_node,
                planet.perihelion,
                planet.mean_longitude,
            ],
            j2000,
        );
        body = body
            .spin_period(planet.rotation)
            .appearance(planet.size, planet.color);
        specs.extend([node, perihelion, body]);
    }

    for small in &SMALL_BODIES {
        let node_name = format!("{}-node", small.name);
        let plane_name = format!("{}-orbit", small.name);
        let semi_major = scene.from_au(small.semi_major);
        let semi_minor = semi_major * (1.0 - small.eccentricity.powi(2)).sqrt();
        // Negative speed runs the ellipse prograde in its own plane.
        let speed = -std::f64::consts::TAU / calibration.years_to_days(small.period);
        let perihelion_time = small.perihelion_jd - calibration.epoch_jd;
        specs.extend([
            NodeSpec::frame(&node_name)
                .parent(SUN_FIXED)
                .phase(-small.ascending_node),
            NodeSpec::frame(&plane_name)
                .parent(&node_name)
                .tilt(0.0, small.inclination)
                .phase(90.0 - small.argument_of_perihelion),
            NodeSpec::body(small.name)
                .parent(&plane_name)
                .center(-semi_major * small.eccentricity, 0.0, 0.0)
                .elliptical(semi_major, semi_minor)
                .speed(speed)
                .phase(phase_at(speed, perihelion_time, 0.0))
                .appearance(small.size, small.color),
        ]);
    }

    specs
}

#[cfg(test)]
fn registry() -> crate::bodies::Registry {
    crate::bodies::Registry::build(solar_system(
        &Calibration::default(),
        &SceneScale::default(),
    ))
    .unwrap()
}

#[cfg(test)]
fn distance_between(
    registry: &crate::bodies::Registry,
    a: &str,
    b: &str,
    t: f64,
) -> f64 {
    use crate::{kinematics::world_position_at, time::SimTime};

    let t = SimTime::from_days(t);
    let a = world_position_at(registry, registry.lookup(a).unwrap(), t);
    let b = world_position_at(registry, registry.lookup(b).unwrap(), t);
    (a - b).norm()
}

#[test]
fn table_builds_with_every_body() {
    let registry = registry();
    assert_eq!(registry.len(), 8 + 3 + 3 * PLANETS.len() + 3 * SMALL_BODIES.len());
    assert_eq!(registry[registry.root()].name.as_ref(), ROOT);
    for name in [EARTH, SUN, MOON, "mercury", "pluto", "ceres", "halley", "eros"] {
        let id = registry.require(name).unwrap();
        assert!(registry[id].is_physical(), "{name}");
    }
    for name in [EARTH_EQUATOR, ZODIAC, SUN_FIXED, "mars-node", "halley-orbit"] {
        assert!(!registry[registry.require(name).unwrap()].is_physical());
    }
}

#[test]
fn earth_sun_distance_at_the_epoch() {
    let registry = registry();
    approx::assert_abs_diff_eq!(
        distance_between(&registry, EARTH, SUN, 0.0) / 100.0,
        1.016_27,
        epsilon = 1e-5
    );
}

#[test]
fn sun_fixed_keeps_the_root_orientation() {
    use crate::{kinematics::world_pivot_at, time::SimTime};

    let registry = registry();
    let sun_fixed = registry.require(SUN_FIXED).unwrap();
    for t in [-1.0e6, -300.0, 0.0, 45.5, 2.0e5] {
        let pivot = world_pivot_at(&registry, sun_fixed, SimTime::from_days(t));
        for axis in [nalgebra::Vector3::x(), nalgebra::Vector3::z()] {
            assert!((pivot.rotation * axis - axis).norm() < 1e-9, "t = {t}");
        }
    }
}

#[test]
fn planets_stay_between_perihelion_and_aphelion() {
    use crate::{kinematics::world_pivot_at, time::SimTime};

    let registry = registry();
    for planet in &PLANETS {
        let a = planet.semi_major * 100.0;
        for t in [-7.3e5, -171.5, 0.0, 1000.0, 3.3e4] {
            let r = distance_between(&registry, planet.name, SUN, t);
            assert!(
                r >= a * (1.0 - planet.eccentricity) - 1e-9
                    && r <= a * (1.0 + planet.eccentricity) + 1e-9,
                "{} at {t}: {r}",
                planet.name
            );
        }
        let plane = registry
            .require(&format!("{}-perihelion", planet.name))
            .unwrap();
        let normal = world_pivot_at(&registry, plane, SimTime::from_days(5000.0)).rotation
            * nalgebra::Vector3::y();
        approx::assert_abs_diff_eq!(
            normal.angle(&nalgebra::Vector3::y()).to_degrees(),
            planet.inclination,
            epsilon = 1e-7
        );
    }
}

#[test]
fn halley_reaches_perihelion_on_its_date() {
    let registry = registry();
    let calibration = Calibration::default();
    let halley = &SMALL_BODIES[0];
    let t = halley.perihelion_jd - calibration.epoch_jd;
    let a = halley.semi_major * 100.0;
    approx::assert_relative_eq!(
        distance_between(&registry, "halley", SUN, t),
        a * (1.0 - halley.eccentricity),
        max_relative = 1e-9
    );
    let half = calibration.years_to_days(halley.period) / 2.0;
    approx::assert_relative_eq!(
        distance_between(&registry, "halley", SUN, t + half),
        a * (1.0 + halley.eccentricity),
        max_relative = 1e-9
    );
}

#[test]
fn moon_orbits_the_earth() {
    let registry = registry();
    let a = 384_399.0 / 149_597_870.7 * 100.0;
    for t in [-5000.0, 0.0, 13.7, 400.0] {
        let r = distance_between(&registry, MOON, EARTH, t);
        assert!(r > a * (1.0 - moon::ECCENTRICITY) - 1e-12);
        assert!(r < a * (1.0 + moon::ECCENTRICITY) + 1e-12);
    }
}
