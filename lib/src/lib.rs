#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::doc_markdown
)]
//! A calibrated clockwork model of the solar system.
//!
//! Every body position is a pure function of one scalar simulation time:
//! the [`bodies::Registry`] describes a tree of orbit nodes, [`kinematics`]
//! turns a time into local and world transforms, [`projection`] reads them
//! back as right ascension, declination and distance, [`trace`] keeps a
//! bounded history per body and [`ephemeris`] layers closed-form secondary
//! quantities on top.
pub mod arena;
pub mod batch;
pub mod bodies;
pub mod catalog;
pub mod config;
pub mod ephemeris;
pub mod kinematics;
pub mod orrery;
pub mod projection;
pub mod time;
pub mod trace;

pub use crate::orrery::Orrery;
