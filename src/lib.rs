//! Merit-order dispatch of electricity producers against an hourly demand.
//!
//! Producers and users are added to an [`order::Order`], which is then calculated with one of
//! the [`calculator`] strategies. The calculation fills each producer's load curve for every
//! hour of the year and records which producer sets the price at each point in time.
#![warn(missing_docs)]
pub mod calculator;
pub mod cli;
pub mod error;
pub mod finance;
pub mod id;
pub mod input;
pub mod load_curve;
pub mod load_profile;
pub mod log;
pub mod model;
pub mod order;
pub mod output;
pub mod participant;
pub mod settings;

#[cfg(test)]
mod fixture;

/// The number of points in time (hours) in a year
pub const POINTS: usize = 8760;

/// Conversion factor between MWh and MJ
pub const MJ_PER_MWH: f64 = 3600.0;
