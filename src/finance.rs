//! Revenue, costs and profitability of producers, given the price at each point in time.
use crate::load_curve::LoadCurve;
use crate::participant::{EnergyUnit, Producer};

/// How a producer's revenue compares with its costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Profitability {
    /// Revenue covers all costs
    #[display("profitable")]
    Profitable,
    /// Revenue covers operating costs, but not all fixed costs
    #[display("conditionally_profitable")]
    ConditionallyProfitable,
    /// Revenue does not cover operating costs
    #[display("unprofitable")]
    Unprofitable,
}

/// The income at each point: the load multiplied by the price
pub fn revenue_curve(producer: &Producer, prices: &LoadCurve) -> LoadCurve {
    producer
        .load_curve()
        .iter()
        .zip(prices)
        .map(|(load, price)| load * price)
        .collect()
}

/// Total income over the year.
///
/// Zero for producers with no units or no capacity.
pub fn revenue(producer: &Producer, prices: &LoadCurve) -> f64 {
    if producer.installed_capacity() == 0.0 {
        return 0.0;
    }

    revenue_curve(producer, prices).sum()
}

/// Fixed costs of all units
pub fn fixed_costs(producer: &Producer) -> f64 {
    let attributes = producer.attributes();
    attributes.fixed_costs_per_unit * attributes.number_of_units
}

/// Fixed operation and maintenance costs of all units
pub fn fixed_om_costs(producer: &Producer) -> f64 {
    let attributes = producer.attributes();
    attributes.fixed_om_costs_per_unit * attributes.number_of_units
}

/// Costs incurred by producing electricity
pub fn variable_costs(producer: &Producer) -> f64 {
    producer.marginal_costs() * producer.production(EnergyUnit::MWh)
}

/// Costs incurred by running the plant: fixed O&M plus variable costs
pub fn operating_costs(producer: &Producer) -> f64 {
    fixed_om_costs(producer) + variable_costs(producer)
}

/// Fixed plus variable costs
pub fn total_costs(producer: &Producer) -> f64 {
    fixed_costs(producer) + variable_costs(producer)
}

/// Revenue minus total costs
pub fn profit(producer: &Producer, prices: &LoadCurve) -> f64 {
    revenue(producer, prices) - total_costs(producer)
}

/// Classify a producer by whether its revenue covers its total and operating costs
pub fn profitability(producer: &Producer, prices: &LoadCurve) -> Profitability {
    let revenue = revenue(producer, prices);
    if revenue > total_costs(producer) {
        Profitability::Profitable
    } else if revenue >= operating_costs(producer) {
        Profitability::ConditionallyProfitable
    } else {
        Profitability::Unprofitable
    }
}

/// Profit per MWh of electricity produced, or `None` if nothing was produced
pub fn profit_per_mwh_electricity(producer: &Producer, prices: &LoadCurve) -> Option<f64> {
    let production = producer.production(EnergyUnit::MWh);
    (production != 0.0).then(|| profit(producer, prices) / production)
}
