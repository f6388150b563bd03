#![warn(clippy::unwrap_used, clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::doc_markdown
)]
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{self, bail, WrapErr};
use orrery::{
    batch::BatchExport,
    bodies::{NodeId, NodeSpec},
    catalog,
    config::Configuration,
    ephemeris,
    time::SimTime,
    Orrery,
};
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod report;

#[derive(Parser)]
#[command(name = "orrery", version, about = "Clockwork solar system model")]
struct Cli {
    /// Engine configuration (TOML). Missing keys keep their defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Node table (TOML, a list of `[[node]]` entries) replacing the
    /// built-in solar system.
    #[arg(long, global = true)]
    table: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

/// A point in time given one of three ways.
#[derive(Args, Clone, Debug)]
#[group(multiple = false)]
struct When {
    /// RFC 3339 date-time, e.g. 2024-03-20T03:06:00Z
    #[arg(long)]
    date: Option<String>,
    /// Decimal year
    #[arg(long, allow_hyphen_values = true)]
    year: Option<f64>,
    /// Days since the model epoch
    #[arg(long, allow_hyphen_values = true)]
    days: Option<f64>,
}

impl When {
    fn resolve(&self, epoch_jd: f64) -> eyre::Result<Option<SimTime>> {
        Ok(match (&self.date, self.year, self.days) {
            (Some(date), _, _) => {
                let datetime = OffsetDateTime::parse(date, &Rfc3339)
                    .wrap_err_with(|| format!("invalid date `{date}`"))?;
                Some(SimTime::from_datetime(datetime, epoch_jd))
            }
            (None, Some(year), _) => Some(SimTime::from_decimal_year(year, epoch_jd)),
            (None, None, Some(days)) => Some(SimTime::from_days(days)),
            (None, None, None) => None,
        })
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the tick loop for a while and print where everything ended up
    Run {
        /// Real seconds to simulate
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        /// Ticks per real second
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
        /// Simulation days per real second (overrides the configuration)
        #[arg(long, allow_hyphen_values = true)]
        rate: Option<f64>,
        /// Bodies whose path is traced
        #[arg(long, value_delimiter = ',')]
        trace: Vec<String>,
        #[command(flatten)]
        start: When,
    },
    /// Jump to a time and print body readings
    Jump {
        #[command(flatten)]
        when: When,
        /// Bodies to read (default: every body)
        #[arg(long, value_delimiter = ',')]
        bodies: Vec<String>,
    },
    /// Print the ephemeris quantities at a time
    Ephemeris {
        #[command(flatten)]
        when: When,
    },
    /// Find when the Sun reaches a longitude of date
    Solve {
        /// Solar longitude (`deg`); 0 is the March equinox
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        /// Decimal year to search from
        #[arg(long, allow_hyphen_values = true)]
        year: f64,
    },
    /// Sample a time range and write RON records
    Export {
        /// First decimal year
        #[arg(long, allow_hyphen_values = true)]
        from: f64,
        /// Last decimal year
        #[arg(long, allow_hyphen_values = true)]
        to: f64,
        /// Spacing between rows (`days`)
        #[arg(long, default_value_t = 1.0)]
        step: f64,
        #[arg(long, value_delimiter = ',')]
        bodies: Vec<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Deserialize)]
struct NodeTable {
    node: Vec<NodeSpec>,
}

fn load_configuration(path: Option<&Path>) -> eyre::Result<Configuration> {
    let Some(path) = path else {
        return Ok(Configuration::default());
    };
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("reading configuration {}", path.display()))?;
    let config = toml::from_str(&text)
        .wrap_err_with(|| format!("parsing configuration {}", path.display()))?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

fn build_orrery(cli: &Cli) -> eyre::Result<Orrery> {
    let config = load_configuration(cli.config.as_deref())?;
    match &cli.table {
        Some(path) => {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("reading node table {}", path.display()))?;
            let table: NodeTable = toml::from_str(&text)
                .wrap_err_with(|| format!("parsing node table {}", path.display()))?;
            Orrery::with_table(config, table.node)
        }
        None => Orrery::new(config),
    }
}

fn resolve_bodies(orrery: &Orrery, names: &[String]) -> eyre::Result<Vec<NodeId>> {
    if names.is_empty() {
        return Ok(orrery.registry().bodies().map(|node| node.id).collect());
    }
    names
        .iter()
        .map(|name| orrery.registry().require(name))
        .collect()
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut orrery = build_orrery(&cli)?;
    let epoch_jd = orrery.config().calibration.epoch_jd;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Command::Run {
            seconds,
            fps,
            rate,
            trace,
            start,
        } => {
            if fps.is_nan() || *fps <= 0.0 || !seconds.is_finite() || *seconds < 0.0 {
                bail!("need a positive tick rate and a non-negative duration");
            }
            if let Some(t) = start.resolve(epoch_jd)? {
                orrery.jump_to_time(t)?;
            }
            if let Some(rate) = rate {
                orrery.clock_mut().set_rate(*rate);
            }
            if !trace.is_empty() {
                for id in resolve_bodies(&orrery, trace)? {
                    orrery.enable_trace(id);
                }
            }

            let ticks = (seconds * fps).round() as u64;
            let dt = 1.0 / fps;
            for _ in 0..ticks {
                orrery.tick(dt);
            }
            info!(ticks, t = %orrery.time(), "run finished");

            report::write_time(&mut out, &orrery)?;
            report::write_readings(&mut out, &orrery.body_readings())?;
            report::write_traces(&mut out, &orrery)?;
        }
        Command::Jump { when, bodies } => {
            let Some(t) = when.resolve(epoch_jd)? else {
                bail!("give one of --date, --year or --days");
            };
            orrery.jump_to_time(t)?;
            let ids = resolve_bodies(&orrery, bodies)?;
            report::write_time(&mut out, &orrery)?;
            report::write_readings(&mut out, &orrery.readings(&ids))?;
            if let Ok(earth) = orrery.registry().require(catalog::EARTH) {
                writeln!(
                    out,
                    "earth heliocentric longitude of date: {:.6}°",
                    orrery.heliocentric_longitude(earth)
                )?;
            }
        }
        Command::Ephemeris { when } => {
            let t = when.resolve(epoch_jd)?.unwrap_or_else(|| orrery.time());
            report::write_ephemeris(&mut out, &orrery.sample_ephemeris_at(t), epoch_jd)?;
        }
        Command::Solve { longitude, year } => {
            match ephemeris::longitude_to_datetime(
                &orrery.config().calibration,
                *longitude,
                *year,
            ) {
                Some(crossing) => report::write_crossing(&mut out, &crossing, epoch_jd)?,
                None => {
                    warn!(longitude, year, "no solution");
                    writeln!(out, "no solution for longitude {longitude}° from year {year}")?;
                }
            }
        }
        Command::Export {
            from,
            to,
            step,
            bodies,
            output,
        } => {
            let ids = resolve_bodies(&orrery, bodies)?;
            let mut export = BatchExport::new(
                SimTime::from_decimal_year(*from, epoch_jd),
                SimTime::from_decimal_year(*to, epoch_jd),
                *step,
                ids,
                orrery.config().export.chunk_size,
            )?;
            let mut sink: Box<dyn Write> = match output {
                Some(path) => Box::new(io::BufWriter::new(
                    fs::File::create(path)
                        .wrap_err_with(|| format!("creating {}", path.display()))?,
                )),
                None => Box::new(out),
            };
            while let Some(chunk) = export.next_chunk(&mut orrery) {
                report::write_export_chunk(&mut sink, &chunk)?;
                info!(done = export.completed(), of = export.rows(), "exporting");
            }
            sink.flush()?;
            if export.failed() > 0 {
                warn!(failed = export.failed(), "some rows could not be sampled");
            }
        }
    }

    Ok(())
}
