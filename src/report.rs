//! Plain-text and RON output for the command-line host.

use std::io::Write;

use color_eyre::eyre;
use itertools::Itertools;
use orrery::{
    batch::ExportRow,
    ephemeris::{EphemerisSnapshot, SolarCrossing},
    projection::{format_dec, format_ra, Reading},
    time::SimTime,
    Orrery,
};
use time::format_description::well_known::Rfc3339;

fn format_time(t: SimTime, epoch_jd: f64) -> String {
    t.to_datetime(epoch_jd)
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| "(out of calendar range)".to_owned())
}

pub fn write_time(out: &mut impl Write, orrery: &Orrery) -> eyre::Result<()> {
    let t = orrery.time();
    let epoch_jd = orrery.config().calibration.epoch_jd;
    writeln!(
        out,
        "{t}  JD {:.5}  {}  year {:.4}",
        t.julian_day(epoch_jd),
        format_time(t, epoch_jd),
        t.decimal_year(epoch_jd)
    )?;
    Ok(())
}

pub fn write_readings(out: &mut impl Write, readings: &[Reading]) -> eyre::Result<()> {
    writeln!(
        out,
        "{:<12} {:>12} {:>12} {:>12} {:>16} {:>10} {:>10} {:>12}",
        "body", "ra", "dec", "dist/AU", "dist/km", "helio lon", "helio lat", "sun/AU"
    )?;
    for reading in readings {
        writeln!(
            out,
            "{:<12} {:>12} {:>12} {:>12.6} {:>16.1} {:>10.4} {:>10.4} {:>12.6}",
            reading.name,
            format_ra(reading.ra),
            format_dec(reading.dec),
            reading.distance.au,
            reading.distance.km,
            reading.sun_longitude.to_degrees(),
            reading.sun_latitude.to_degrees(),
            reading.sun_distance.au,
        )?;
    }
    Ok(())
}

pub fn write_traces(out: &mut impl Write, orrery: &Orrery) -> eyre::Result<()> {
    let traces = orrery.traces();
    for id in traces.enabled() {
        let Some(buffer) = traces.buffer(id) else {
            continue;
        };
        let span = match (buffer.iter().next(), buffer.latest()) {
            (Some(first), Some(last)) => format!("{} .. {}", first.time, last.time),
            _ => "empty".to_owned(),
        };
        writeln!(
            out,
            "trace {}: {}/{} samples, {span}",
            orrery.registry()[id].name,
            buffer.len(),
            buffer.capacity()
        )?;
    }
    Ok(())
}

pub fn write_ephemeris(
    out: &mut impl Write,
    snapshot: &EphemerisSnapshot,
    epoch_jd: f64,
) -> eyre::Result<()> {
    let p = &snapshot.precession_years;
    writeln!(
        out,
        "{}  year {:.4}",
        format_time(snapshot.time, epoch_jd),
        snapshot.decimal_year
    )?;
    writeln!(out, "length of day        {:.6} s", snapshot.length_of_day_seconds)?;
    writeln!(out, "solar year           {:.7} d", snapshot.solar_year_days)?;
    writeln!(out, "sidereal year        {:.7} d", snapshot.sidereal_year_days)?;
    writeln!(out, "anomalistic year     {:.7} d", snapshot.anomalistic_year_days)?;
    writeln!(
        out,
        "precession (years)   {}",
        [
            ("axial", p.axial),
            ("perihelion", p.perihelion),
            ("inclination", p.inclination),
            ("obliquity", p.obliquity),
            ("ecliptic", p.ecliptic),
        ]
        .iter()
        .map(|(name, years)| format!("{name} {years:.1}"))
        .join(", ")
    )?;
    writeln!(out, "eccentricity         {:.8}", snapshot.eccentricity)?;
    writeln!(out, "obliquity            {:.6}°", snapshot.obliquity_deg)?;
    writeln!(out, "inclination          {:.6}°", snapshot.inclination_deg)?;
    writeln!(
        out,
        "perihelion longitude {:.6}°",
        snapshot.longitude_of_perihelion_deg
    )?;
    Ok(())
}

pub fn write_crossing(
    out: &mut impl Write,
    crossing: &SolarCrossing,
    epoch_jd: f64,
) -> eyre::Result<()> {
    writeln!(
        out,
        "{}  ({}, longitude {:.9}°, {} iterations)",
        format_time(crossing.time, epoch_jd),
        crossing.time,
        crossing.longitude_deg,
        crossing.iterations
    )?;
    Ok(())
}

/// One RON record per line; rows that failed become comments.
pub fn write_export_chunk(out: &mut impl Write, rows: &[ExportRow]) -> eyre::Result<()> {
    for row in rows {
        match row {
            Ok(record) => writeln!(out, "{}", ron::to_string(record)?)?,
            Err(error) => writeln!(out, "// {error}")?,
        }
    }
    Ok(())
}
