//! Algorithms which dispatch producers against demand in merit order.
//!
//! Always-on producers (volatiles and must-runs) run at their maximum load, and the demand
//! which remains (the residual demand) is met by dispatchable producers, cheapest first. The
//! exact [`ExactCalculator`] does this for every point in time. [`QuantizingCalculator`] and
//! [`AveragingCalculator`] do it once per chunk of points, which is faster but less accurate.
use crate::POINTS;
use crate::error::{MeritError, Result};
use crate::id::ParticipantID;
use crate::load_curve::LoadCurve;
use crate::participant::{Producer, ProducerKind};
use log::{debug, trace, warn};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::ops::Range;

/// The default number of points in each chunk for the approximate calculators
pub const DEFAULT_CHUNK_SIZE: usize = 8;

/// Demand or load (MW) at or below which a value is treated as zero.
///
/// Residual demand which matches a producer's capacity can be left a rounding error above
/// zero, which must not bring the next producer online.
pub const LOAD_TOLERANCE: f64 = 1e-9;

/// The producer (if any) which sets the price at each point in time
pub type PriceSetters = Vec<Option<ParticipantID>>;

/// A strategy for dispatching producers.
///
/// `producers` must be ordered volatiles first, then must-runs, then dispatchables by
/// ascending marginal cost. The calculator fills in the load curves of the dispatchables and
/// returns the price-setting producer for each point.
pub trait Calculator {
    /// A short name describing the strategy
    fn name(&self) -> &'static str;

    /// Dispatch `producers` against `demand`
    fn calculate(
        &self,
        demand: &LoadCurve,
        producers: &mut [&mut Producer],
    ) -> Result<PriceSetters>;
}

/// Dispatches every point in time separately
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactCalculator;

impl Calculator for ExactCalculator {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn calculate(
        &self,
        demand: &LoadCurve,
        producers: &mut [&mut Producer],
    ) -> Result<PriceSetters> {
        check_producer_order(producers)?;
        let residual = residual_demand(demand, producers);
        let mut dispatchables = active_dispatchables(producers);
        let mut price_setters = vec![None; POINTS];
        let mut unserved = 0;

        for (point, price_setter) in price_setters.iter_mut().enumerate() {
            let mut remaining = residual.get(point);

            for producer in &mut dispatchables {
                if remaining <= LOAD_TOLERANCE {
                    producer.set_load(point, 0.0);
                    continue;
                }

                let max_load = producer.max_load_at(point);
                let load = remaining.min(max_load);
                producer.set_load(point, load);
                remaining -= load;

                if is_partial_load(load, max_load, LOAD_TOLERANCE) {
                    *price_setter = Some(producer.key.clone());
                }
            }

            if remaining > LOAD_TOLERANCE {
                unserved += 1;
            }
        }

        warn_unserved(unserved);
        Ok(price_setters)
    }
}

/// Dispatches chunks of points using the total energy demanded in each chunk.
///
/// Each dispatchable is given the same fraction of its maximum load at every point in the
/// chunk, so producers without a load profile have a constant load within a chunk.
#[derive(Debug, Clone, Copy)]
pub struct QuantizingCalculator {
    chunk_size: usize,
}

impl QuantizingCalculator {
    /// Create a calculator which dispatches `chunk_size` points at a time
    pub fn new(chunk_size: usize) -> Result<Self> {
        Ok(Self {
            chunk_size: validate_chunk_size(chunk_size)?,
        })
    }

    /// The number of points in each chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for QuantizingCalculator {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Calculator for QuantizingCalculator {
    fn name(&self) -> &'static str {
        "quantizing"
    }

    fn calculate(
        &self,
        demand: &LoadCurve,
        producers: &mut [&mut Producer],
    ) -> Result<PriceSetters> {
        check_producer_order(producers)?;
        let residual = residual_demand(demand, producers);
        let mut dispatchables = active_dispatchables(producers);
        let mut price_setters = vec![None; POINTS];
        let mut unserved = 0;

        for chunk in chunks(self.chunk_size) {
            // Tolerance for energy summed over the chunk
            let tolerance = LOAD_TOLERANCE * chunk.len() as f64;
            let mut remaining = chunk_sum(&residual, &chunk).max(0.0);
            trace!("Chunk {chunk:?}: residual demand {remaining} MWh");

            for producer in &mut dispatchables {
                let capacity = producer.load_between(chunk.start, chunk.end - 1);
                let assigned = if remaining <= tolerance {
                    0.0
                } else {
                    remaining.min(capacity)
                };
                remaining -= assigned;

                let fraction = if capacity > 0.0 {
                    assigned / capacity
                } else {
                    0.0
                };

                for point in chunk.clone() {
                    let load = fraction * producer.max_load_at(point);
                    producer.set_load(point, load);
                }

                if is_partial_load(assigned, capacity, tolerance) {
                    set_price_setter(&mut price_setters, &chunk, &producer.key);
                }
            }

            if remaining > tolerance {
                unserved += chunk.len();
            }
        }

        warn_unserved(unserved);
        Ok(price_setters)
    }
}

/// Dispatches chunks of points using the mean demand and capacity in each chunk.
///
/// Dispatchables which are needed in full run at their maximum load at every point in the
/// chunk. The remaining demand is given to the next dispatchable at as few points as
/// possible, starting at the beginning of the chunk.
#[derive(Debug, Clone, Copy)]
pub struct AveragingCalculator {
    chunk_size: usize,
}

impl AveragingCalculator {
    /// Create a calculator which dispatches `chunk_size` points at a time
    pub fn new(chunk_size: usize) -> Result<Self> {
        Ok(Self {
            chunk_size: validate_chunk_size(chunk_size)?,
        })
    }

    /// The number of points in each chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for AveragingCalculator {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Calculator for AveragingCalculator {
    fn name(&self) -> &'static str {
        "averaging"
    }

    fn calculate(
        &self,
        demand: &LoadCurve,
        producers: &mut [&mut Producer],
    ) -> Result<PriceSetters> {
        check_producer_order(producers)?;
        let residual = residual_demand(demand, producers);
        let mut dispatchables = active_dispatchables(producers);
        let mut price_setters = vec![None; POINTS];
        let mut unserved = 0;

        for chunk in chunks(self.chunk_size) {
            let length = chunk.len() as f64;
            let mut remaining = chunk_sum(&residual, &chunk) / length;
            trace!("Chunk {chunk:?}: mean residual demand {remaining} MW");

            for producer in &mut dispatchables {
                for point in chunk.clone() {
                    producer.set_load(point, 0.0);
                }

                if remaining <= LOAD_TOLERANCE {
                    continue;
                }

                let mean_capacity = producer.load_between(chunk.start, chunk.end - 1) / length;
                if remaining >= mean_capacity {
                    for point in chunk.clone() {
                        let max_load = producer.max_load_at(point);
                        producer.set_load(point, max_load);
                    }
                    remaining -= mean_capacity;
                    continue;
                }

                // Spread the remaining energy over the chunk without exceeding the maximum load
                let mut energy = remaining * length;
                for point in chunk.clone() {
                    if energy <= 0.0 {
                        break;
                    }

                    let load = energy.min(producer.max_load_at(point));
                    producer.set_load(point, load);
                    energy -= load;
                }

                if is_partial_load(remaining, mean_capacity, LOAD_TOLERANCE) {
                    set_price_setter(&mut price_setters, &chunk, &producer.key);
                }
                remaining = 0.0;
            }

            if remaining > LOAD_TOLERANCE {
                unserved += chunk.len();
            }
        }

        warn_unserved(unserved);
        Ok(price_setters)
    }
}

/// The strategy named in a model file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, DeserializeLabeledStringEnum)]
pub enum CalculatorMethod {
    /// See [`ExactCalculator`]
    #[default]
    #[string = "exact"]
    Exact,
    /// See [`QuantizingCalculator`]
    #[string = "quantizing"]
    Quantizing,
    /// See [`AveragingCalculator`]
    #[string = "averaging"]
    Averaging,
}

/// Which calculator to use, as given in a model file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CalculatorConfig {
    /// The dispatch strategy
    #[serde(default)]
    pub method: CalculatorMethod,
    /// Points per chunk for the approximate strategies
    pub chunk_size: Option<usize>,
}

impl CalculatorConfig {
    /// Create the configured calculator
    pub fn build(&self) -> Result<Box<dyn Calculator>> {
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        Ok(match self.method {
            CalculatorMethod::Exact => Box::new(ExactCalculator),
            CalculatorMethod::Quantizing => Box::new(QuantizingCalculator::new(chunk_size)?),
            CalculatorMethod::Averaging => Box::new(AveragingCalculator::new(chunk_size)?),
        })
    }
}

/// Check that a chunk size is large enough to be worth approximating
fn validate_chunk_size(chunk_size: usize) -> Result<usize> {
    if chunk_size <= 1 {
        return Err(MeritError::InvalidChunkSize(chunk_size));
    }

    Ok(chunk_size)
}

/// Split the year into contiguous chunks of `chunk_size` points.
///
/// The last chunk is shorter if `chunk_size` does not divide the number of points.
fn chunks(chunk_size: usize) -> impl Iterator<Item = Range<usize>> {
    (0..POINTS)
        .step_by(chunk_size)
        .map(move |start| start..(start + chunk_size).min(POINTS))
}

/// The sum of the curve's values within `chunk`
fn chunk_sum(curve: &LoadCurve, chunk: &Range<usize>) -> f64 {
    chunk.clone().map(|point| curve.get(point)).sum()
}

fn set_price_setter(price_setters: &mut PriceSetters, chunk: &Range<usize>, key: &ParticipantID) {
    for price_setter in &mut price_setters[chunk.clone()] {
        *price_setter = Some(key.clone());
    }
}

/// Whether `load` is neither idle nor at `max_load`, allowing for rounding
fn is_partial_load(load: f64, max_load: f64, tolerance: f64) -> bool {
    load > tolerance && load < max_load - tolerance
}

fn warn_unserved(unserved: usize) {
    if unserved > 0 {
        warn!("Demand exceeds available capacity at {unserved} points in time");
    }
}

/// Position of each kind of producer in the merit order
fn group_rank(kind: ProducerKind) -> u8 {
    match kind {
        ProducerKind::Volatile => 0,
        ProducerKind::MustRun => 1,
        ProducerKind::Dispatchable => 2,
    }
}

/// Check that producers are volatiles, then must-runs, then dispatchables by marginal cost
fn check_producer_order(producers: &[&mut Producer]) -> Result<()> {
    for pair in producers.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let previous_rank = group_rank(previous.kind());
        let current_rank = group_rank(current.kind());

        let out_of_order = current_rank < previous_rank
            || (current_rank == previous_rank
                && current.kind() == ProducerKind::Dispatchable
                && current.marginal_costs() < previous.marginal_costs());

        if out_of_order {
            return Err(MeritError::IncorrectProducerOrder {
                key: current.key.to_string(),
            });
        }
    }

    Ok(())
}

/// Demand which remains once always-on producers have run at their maximum load
fn residual_demand(demand: &LoadCurve, producers: &[&mut Producer]) -> LoadCurve {
    let mut residual = demand.clone();
    for producer in producers.iter().filter(|p| p.is_always_on()) {
        residual = &residual - producer.load_curve();
    }

    debug!(
        "Residual demand ranges from {} to {} MW",
        residual.min().unwrap_or(0.0),
        residual.max().unwrap_or(0.0)
    );

    residual
}

/// The dispatchables which compete to meet demand, i.e. those with installed capacity
fn active_dispatchables<'a>(producers: &'a mut [&mut Producer]) -> Vec<&'a mut Producer> {
    producers
        .iter_mut()
        .filter(|p| p.is_transient() && p.installed_capacity() > 0.0)
        .map(|p| &mut **p)
        .collect()
}
