//! Fixtures for tests

use crate::POINTS;
use crate::load_curve::LoadCurve;
use crate::load_profile::LoadProfile;
use crate::order::Order;
use crate::participant::{Producer, ProducerAttributes, ProducerKind};
use rstest::fixture;
use std::f64::consts::PI;
use std::rc::Rc;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A single value which, repeated over the year, sums to 1/3600
pub fn flat_profile_values() -> Vec<f64> {
    vec![1.0 / (3600.0 * POINTS as f64)]
}

/// A solar-like shape: zero at night, peaking at noon, normalised to sum to 1/3600
pub fn daily_profile_values() -> Vec<f64> {
    let raw: Vec<f64> = (0..POINTS)
        .map(|point| {
            let hour = (point % 24) as f64;
            (PI * (hour - 6.0) / 12.0).sin().max(0.0)
        })
        .collect();
    let total: f64 = raw.iter().sum();

    raw.iter().map(|value| value / (total * 3600.0)).collect()
}

/// A demand of `load` MW at every point
pub fn flat_demand(load: f64) -> LoadCurve {
    LoadCurve::new(vec![load; POINTS])
}

#[fixture]
pub fn flat_profile() -> Rc<LoadProfile> {
    Rc::new(LoadProfile::new("flat", &flat_profile_values()).unwrap())
}

#[fixture]
pub fn daily_profile() -> Rc<LoadProfile> {
    Rc::new(LoadProfile::new("daily", &daily_profile_values()).unwrap())
}

#[fixture]
pub fn attributes() -> ProducerAttributes {
    ProducerAttributes {
        marginal_costs: 13.999791,
        output_capacity_per_unit: 0.1,
        number_of_units: 1.0,
        availability: 0.89,
        fixed_costs_per_unit: 222.9245208,
        fixed_om_costs_per_unit: 35.775,
        full_load_hours: None,
    }
}

#[fixture]
pub fn dispatchable(attributes: ProducerAttributes) -> Producer {
    Producer::new("dispatchable", ProducerKind::Dispatchable, attributes, None)
}

#[fixture]
pub fn volatile(attributes: ProducerAttributes, flat_profile: Rc<LoadProfile>) -> Producer {
    let attributes = ProducerAttributes {
        marginal_costs: 0.0,
        availability: 0.95,
        full_load_hours: Some(1000.0),
        ..attributes
    };
    Producer::new("volatile", ProducerKind::Volatile, attributes, Some(flat_profile))
}

#[fixture]
pub fn must_run(attributes: ProducerAttributes) -> Producer {
    let attributes = ProducerAttributes {
        marginal_costs: 0.0,
        full_load_hours: Some(5000.0),
        ..attributes
    };
    Producer::new("must_run", ProducerKind::MustRun, attributes, None)
}

/// An uncalculated order with one producer of each kind and a total demand of 6.4 TJ
#[fixture]
pub fn order(dispatchable: Producer, volatile: Producer, must_run: Producer) -> Order {
    let mut order = Order::with_total_demand(6.4e6);
    order.add(dispatchable).unwrap();
    order.add(volatile).unwrap();
    order.add(must_run).unwrap();
    order
}
