//! The merit order: the participants of one calculation and its results.
//!
//! An [`Order`] starts out accepting participants. Calculating it dispatches the producers,
//! after which the participants and their load curves can no longer be changed.
use crate::POINTS;
use crate::calculator::{Calculator, ExactCalculator, PriceSetters};
use crate::error::{MeritError, Result};
use crate::id::{HasID, ParticipantID};
use crate::load_curve::LoadCurve;
use crate::participant::{Participant, Producer, ProducerKind, User};
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;

/// Factor applied to the most expensive installed dispatchable when no producer sets the price
pub const SCARCITY_MARKUP: f64 = 7.22;

/// The price when there are no dispatchables installed at all
pub const FALLBACK_PRICE: f64 = 600.0;

/// The key of the user created by [`Order::with_total_demand`]
pub const TOTAL_DEMAND_KEY: &str = "total_demand";

/// The participants of an order grouped by kind, fixed when the order is calculated
#[derive(Debug)]
struct Snapshot {
    volatiles: Vec<ParticipantID>,
    must_runs: Vec<ParticipantID>,
    /// Ordered by ascending marginal cost
    dispatchables: Vec<ParticipantID>,
    users: Vec<ParticipantID>,
}

impl Snapshot {
    fn new(order: &Order) -> Self {
        Self {
            volatiles: keys(&order.select_producers(ProducerKind::Volatile)),
            must_runs: keys(&order.select_producers(ProducerKind::MustRun)),
            dispatchables: keys(&order.sorted_dispatchables()),
            users: keys(&order.select_users()),
        }
    }

    /// Keys of all producers in merit order
    fn producers(&self) -> impl Iterator<Item = &ParticipantID> {
        self.volatiles
            .iter()
            .chain(&self.must_runs)
            .chain(&self.dispatchables)
    }
}

fn keys<T: HasID<ParticipantID>>(participants: &[&T]) -> Vec<ParticipantID> {
    participants.iter().map(|p| p.get_id().clone()).collect()
}

#[derive(Debug)]
enum OrderState {
    /// Participants may still be added
    Building,
    /// Dispatch has run and the order is frozen
    Calculated(Snapshot),
}

/// Holds the participants of a merit order calculation, and its results
#[derive(Debug)]
pub struct Order {
    participants: IndexMap<ParticipantID, Participant>,
    state: OrderState,
    price_setting_producers: PriceSetters,
    price_curve: OnceCell<LoadCurve>,
}

impl Default for Order {
    fn default() -> Self {
        Self::new()
    }
}

impl Order {
    /// Create an empty order
    pub fn new() -> Self {
        Self {
            participants: IndexMap::new(),
            state: OrderState::Building,
            price_setting_producers: vec![None; POINTS],
            price_curve: OnceCell::new(),
        }
    }

    /// Create an order with a single user (keyed `total_demand`) consuming `total_demand` MJ
    pub fn with_total_demand(total_demand: f64) -> Self {
        let mut order = Self::new();
        let user = User::with_total_consumption(TOTAL_DEMAND_KEY, total_demand);
        order
            .participants
            .insert(user.key.clone(), Participant::User(user));

        order
    }

    /// Whether the order has been calculated
    pub fn is_calculated(&self) -> bool {
        matches!(self.state, OrderState::Calculated(_))
    }

    /// Add a participant.
    ///
    /// A participant with the same key as an existing one replaces it. The positions of the
    /// dispatchables are updated. Fails once the order has been calculated.
    pub fn add(&mut self, participant: impl Into<Participant>) -> Result<()> {
        let participant = participant.into();
        if self.is_calculated() {
            return Err(MeritError::LockedOrder(participant.key().to_string()));
        }

        let key = participant.key().clone();
        if self.participants.insert(key.clone(), participant).is_some() {
            warn!("Participant {key} was added more than once; keeping the last one");
        }

        let dispatchables = keys(&self.sorted_dispatchables());
        self.assign_positions(&dispatchables);

        Ok(())
    }

    /// The participant with the given key
    pub fn participant(&self, key: &str) -> Option<&Participant> {
        self.participants.get(key)
    }

    /// The participant with the given key, for changing before the order is calculated
    pub fn participant_mut(&mut self, key: &str) -> Result<&mut Participant> {
        if self.is_calculated() {
            return Err(MeritError::LockedOrder(key.to_string()));
        }

        self.participants
            .get_mut(key)
            .ok_or_else(|| MeritError::UnknownParticipant(key.to_string()))
    }

    /// The producer with the given key
    pub fn producer(&self, key: &str) -> Option<&Producer> {
        self.participant(key).and_then(Participant::as_producer)
    }

    /// The user with the given key
    pub fn user(&self, key: &str) -> Option<&User> {
        self.participant(key).and_then(Participant::as_user)
    }

    /// Iterate over all participants
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// All producers: volatiles, then must-runs, then dispatchables
    pub fn producers(&self) -> Vec<&Producer> {
        let mut producers = self.volatiles();
        producers.extend(self.must_runs());
        producers.extend(self.dispatchables());
        producers
    }

    /// Volatile producers, in the order they were added
    pub fn volatiles(&self) -> Vec<&Producer> {
        match &self.state {
            OrderState::Building => self.select_producers(ProducerKind::Volatile),
            OrderState::Calculated(snapshot) => self.lookup_producers(&snapshot.volatiles),
        }
    }

    /// Must-run producers, in the order they were added
    pub fn must_runs(&self) -> Vec<&Producer> {
        match &self.state {
            OrderState::Building => self.select_producers(ProducerKind::MustRun),
            OrderState::Calculated(snapshot) => self.lookup_producers(&snapshot.must_runs),
        }
    }

    /// Dispatchable producers, ordered by ascending marginal cost
    pub fn dispatchables(&self) -> Vec<&Producer> {
        match &self.state {
            OrderState::Building => self.sorted_dispatchables(),
            OrderState::Calculated(snapshot) => self.lookup_producers(&snapshot.dispatchables),
        }
    }

    /// All users
    pub fn users(&self) -> Vec<&User> {
        match &self.state {
            OrderState::Building => self.select_users(),
            OrderState::Calculated(snapshot) => snapshot
                .users
                .iter()
                .filter_map(|key| self.user(key.as_str()))
                .collect(),
        }
    }

    fn select_producers(&self, kind: ProducerKind) -> Vec<&Producer> {
        self.participants
            .values()
            .filter_map(Participant::as_producer)
            .filter(|producer| producer.kind() == kind)
            .collect()
    }

    fn sorted_dispatchables(&self) -> Vec<&Producer> {
        let mut dispatchables = self.select_producers(ProducerKind::Dispatchable);

        // NB: stable sort, so ties keep the order in which they were added
        dispatchables.sort_by(|a, b| a.marginal_costs().total_cmp(&b.marginal_costs()));
        dispatchables
    }

    fn select_users(&self) -> Vec<&User> {
        self.participants
            .values()
            .filter_map(Participant::as_user)
            .collect()
    }

    fn lookup_producers(&self, keys: &[ParticipantID]) -> Vec<&Producer> {
        keys.iter()
            .filter_map(|key| self.producer(key.as_str()))
            .collect()
    }

    /// The total demand of all users at every point
    pub fn demand_curve(&self) -> Result<LoadCurve> {
        let mut demand = LoadCurve::zeroed(POINTS);
        for user in self.users() {
            demand = &demand + &user.load_curve()?;
        }

        Ok(demand)
    }

    /// The producer which sets the price at each point, if any
    pub fn price_setting_producers(&self) -> &[Option<ParticipantID>] {
        &self.price_setting_producers
    }

    /// The price when no producer sets it: a markup on the most expensive dispatchable with
    /// installed units, or [`FALLBACK_PRICE`] if there is none
    fn scarcity_price(&self) -> f64 {
        self.dispatchables()
            .iter()
            .rev()
            .find(|producer| producer.attributes().number_of_units > 0.0)
            .map_or(FALLBACK_PRICE, |producer| {
                producer.marginal_costs() * SCARCITY_MARKUP
            })
    }

    /// The price at `point`.
    ///
    /// This is the marginal cost of the price-setting producer, if there is one.
    pub fn price_at(&self, point: usize) -> f64 {
        self.price_setter_costs(point)
            .unwrap_or_else(|| self.scarcity_price())
    }

    fn price_setter_costs(&self, point: usize) -> Option<f64> {
        let key = self.price_setting_producers.get(point)?.as_ref()?;
        self.producer(key.as_str()).map(Producer::marginal_costs)
    }

    /// The price at every point
    pub fn price_curve(&self) -> &LoadCurve {
        self.price_curve.get_or_init(|| {
            let scarcity_price = self.scarcity_price();
            (0..POINTS)
                .map(|point| self.price_setter_costs(point).unwrap_or(scarcity_price))
                .collect()
        })
    }

    /// Calculate the order with the [`ExactCalculator`]
    pub fn calculate_default(&mut self) -> Result<()> {
        self.calculate(&ExactCalculator)
    }

    /// Dispatch the producers with `calculator`.
    ///
    /// This happens only once: if the order has already been calculated, nothing is done.
    /// Nothing is changed if the calculation fails.
    pub fn calculate(&mut self, calculator: &dyn Calculator) -> Result<()> {
        if self.is_calculated() {
            debug!("Order has already been calculated");
            return Ok(());
        }

        let demand = self.demand_curve()?;
        let snapshot = Snapshot::new(self);
        info!(
            "Calculating {self} with the {} calculator",
            calculator.name()
        );

        let price_setters = {
            let mut producers = self.producers_mut(&snapshot);
            calculator.calculate(&demand, &mut producers)?
        };

        self.assign_positions(&snapshot.dispatchables);
        self.price_setting_producers = price_setters;
        self.price_curve.take();
        self.state = OrderState::Calculated(snapshot);
        info!("Calculation complete");

        Ok(())
    }

    /// Mutable references to the producers, in the order given by `snapshot`
    fn producers_mut(&mut self, snapshot: &Snapshot) -> Vec<&mut Producer> {
        let ranks: HashMap<&ParticipantID, usize> = snapshot
            .producers()
            .enumerate()
            .map(|(rank, key)| (key, rank))
            .collect();

        let mut producers: Vec<&mut Producer> = self
            .participants
            .values_mut()
            .filter_map(Participant::as_producer_mut)
            .collect();
        producers.sort_by_key(|producer| ranks.get(&producer.key).copied());

        producers
    }

    /// Rank dispatchables from 1, skipping those with no installed capacity
    fn assign_positions(&mut self, dispatchables: &[ParticipantID]) {
        let mut position = 1;
        for key in dispatchables {
            if let Some(producer) = self
                .participants
                .get_mut(key.as_str())
                .and_then(Participant::as_producer_mut)
            {
                if producer.installed_capacity() == 0.0 {
                    producer.set_position(None);
                } else {
                    producer.set_position(Some(position));
                    position += 1;
                }
            }
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let users = self.participants().filter(|p| p.as_user().is_some()).count();
        write!(
            f,
            "<Order {} producers, {} users>",
            self.participants.len() - users,
            users
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{AveragingCalculator, QuantizingCalculator};
    use crate::fixture::{attributes, dispatchable, order, volatile};
    use crate::participant::{ParticipantKind, ProducerAttributes};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn producer(key: &str, kind: ProducerKind, marginal_costs: f64, units: f64) -> Producer {
        let attributes = ProducerAttributes {
            marginal_costs,
            output_capacity_per_unit: 1.0,
            number_of_units: units,
            availability: 1.0,
            fixed_costs_per_unit: 0.0,
            fixed_om_costs_per_unit: 0.0,
            full_load_hours: None,
        };
        Producer::new(key, kind, attributes, None)
    }

    fn key_names(producers: &[&Producer]) -> Vec<String> {
        producers.iter().map(|p| p.key.to_string()).collect()
    }

    #[test]
    fn test_producers_in_merit_order() {
        let mut order = Order::with_total_demand(1e6);
        order.add(producer("gas", ProducerKind::Dispatchable, 30.0, 1.0)).unwrap();
        order.add(producer("nuclear", ProducerKind::MustRun, 5.0, 1.0)).unwrap();
        order.add(producer("coal", ProducerKind::Dispatchable, 20.0, 1.0)).unwrap();
        order.add(producer("wind", ProducerKind::Volatile, 0.0, 1.0)).unwrap();
        order.add(producer("lignite", ProducerKind::Dispatchable, 20.0, 1.0)).unwrap();
        order.add(producer("solar", ProducerKind::Volatile, 0.0, 1.0)).unwrap();

        let expected = ["wind", "solar", "nuclear", "coal", "lignite", "gas"];
        assert_eq!(key_names(&order.producers()), expected);
        assert_eq!(key_names(&order.dispatchables()), ["coal", "lignite", "gas"]);

        order.calculate_default().unwrap();
        assert_eq!(key_names(&order.producers()), expected);
        assert_eq!(order.users().len(), 1);
    }

    #[test]
    fn test_positions() {
        let mut order = Order::with_total_demand(1e6);
        order.add(producer("gas", ProducerKind::Dispatchable, 30.0, 1.0)).unwrap();
        order.add(producer("empty", ProducerKind::Dispatchable, 10.0, 0.0)).unwrap();
        order.add(producer("coal", ProducerKind::Dispatchable, 20.0, 1.0)).unwrap();
        order.add(producer("wind", ProducerKind::Volatile, 0.0, 1.0)).unwrap();

        let positions = |order: &Order| {
            ["empty", "coal", "gas", "wind"].map(|key| order.producer(key).unwrap().position())
        };
        let expected = [None, Some(1), Some(2), None];

        // Positions are known as soon as producers are added
        assert_eq!(positions(&order), expected);
        order.calculate_default().unwrap();
        assert_eq!(positions(&order), expected);
    }

    #[test]
    fn test_positions_follow_additions() {
        let mut order = Order::new();
        order.add(producer("gas", ProducerKind::Dispatchable, 30.0, 1.0)).unwrap();
        assert_eq!(order.producer("gas").unwrap().position(), Some(1));

        order.add(producer("coal", ProducerKind::Dispatchable, 20.0, 1.0)).unwrap();
        assert_eq!(order.producer("coal").unwrap().position(), Some(1));
        assert_eq!(order.producer("gas").unwrap().position(), Some(2));
    }

    #[rstest]
    fn test_locked_after_calculation(mut order: Order, dispatchable: Producer) {
        order.calculate_default().unwrap();
        assert!(order.is_calculated());
        assert_eq!(
            order.add(dispatchable).unwrap_err(),
            MeritError::LockedOrder("dispatchable".into())
        );
        assert_eq!(
            order.participant_mut("total_demand").unwrap_err(),
            MeritError::LockedOrder("total_demand".into())
        );
    }

    #[rstest]
    fn test_calculate_is_idempotent(mut order: Order) {
        order.calculate_default().unwrap();
        let curve = order.producer("dispatchable").unwrap().load_curve().clone();
        let price_setters = order.price_setting_producers().to_vec();
        let prices = order.price_curve().clone();

        // A second calculation (even with another calculator) changes nothing
        order.calculate(&AveragingCalculator::default()).unwrap();
        assert_eq!(order.producer("dispatchable").unwrap().load_curve(), &curve);
        assert_eq!(order.price_setting_producers(), price_setters.as_slice());
        assert_eq!(order.price_curve(), &prices);
    }

    #[rstest]
    fn test_unknown_demand_leaves_order_unlocked(dispatchable: Producer) {
        let mut order = Order::new();
        order.add(User::new("households", None)).unwrap();
        order.add(dispatchable).unwrap();

        assert_eq!(
            order.calculate(&QuantizingCalculator::default()).unwrap_err(),
            MeritError::UnknownDemand("households".into())
        );
        assert!(!order.is_calculated());

        order
            .participant_mut("households")
            .unwrap()
            .as_user_mut()
            .unwrap()
            .set_total_consumption(1e6);
        order.calculate_default().unwrap();
        assert!(order.is_calculated());
    }

    #[test]
    fn test_participant_mut_unknown() {
        let mut order = Order::new();
        assert_eq!(
            order.participant_mut("nobody").unwrap_err(),
            MeritError::UnknownParticipant("nobody".into())
        );
    }

    #[rstest]
    fn test_duplicate_key_replaces(attributes: ProducerAttributes) {
        let mut order = Order::new();
        order
            .add(Producer::new("p", ProducerKind::Dispatchable, attributes.clone(), None))
            .unwrap();
        order
            .add(Producer::new("p", ProducerKind::MustRun, attributes, None))
            .unwrap();

        assert_eq!(order.participants().count(), 1);
        assert_eq!(order.participant("p").unwrap().kind(), ParticipantKind::MustRun);
    }

    #[test]
    fn test_price_at_price_setter() {
        let mut order = Order::with_total_demand(1.5 * 8760.0 * 3600.0);
        order.add(producer("coal", ProducerKind::Dispatchable, 20.0, 1.0)).unwrap();
        order.add(producer("gas", ProducerKind::Dispatchable, 30.0, 1.0)).unwrap();
        order.calculate_default().unwrap();

        // Demand of 1.5 MW leaves gas partially loaded
        assert_eq!(
            order.price_setting_producers()[0].as_ref().map(ParticipantID::as_str),
            Some("gas")
        );
        assert_eq!(order.price_at(0), 30.0);
        assert_eq!(order.price_curve().len(), POINTS);
        assert!(order.price_curve().iter().all(|price| price == 30.0));
    }

    #[test]
    fn test_price_at_scarcity() {
        let mut order = Order::with_total_demand(5.0 * 8760.0 * 3600.0);
        order.add(producer("coal", ProducerKind::Dispatchable, 20.0, 1.0)).unwrap();
        order.add(producer("gas", ProducerKind::Dispatchable, 30.0, 1.0)).unwrap();
        order.add(producer("unbuilt", ProducerKind::Dispatchable, 90.0, 0.0)).unwrap();
        order.calculate_default().unwrap();

        // Both plants are saturated; the unbuilt plant is ignored
        assert!(order.price_setting_producers().iter().all(Option::is_none));
        assert_approx_eq!(f64, order.price_at(100), 30.0 * SCARCITY_MARKUP);
    }

    #[test]
    fn test_price_when_demand_matches_capacity() {
        let capacity = 0.0223;
        let mut order = Order::with_total_demand(capacity * 0.89 * 8760.0 * 3600.0);
        let attributes = ProducerAttributes {
            marginal_costs: 10.0,
            output_capacity_per_unit: capacity,
            number_of_units: 1.0,
            availability: 0.89,
            fixed_costs_per_unit: 0.0,
            fixed_om_costs_per_unit: 0.0,
            full_load_hours: None,
        };
        order
            .add(Producer::new("cheap", ProducerKind::Dispatchable, attributes, None))
            .unwrap();
        order.add(producer("dear", ProducerKind::Dispatchable, 99.0, 5.0)).unwrap();
        order.calculate_default().unwrap();

        // The cheap plant meets all demand, so the dear plant stays off and sets no price
        assert_eq!(order.producer("dear").unwrap().off_times(), POINTS);
        assert!(order.price_setting_producers().iter().all(Option::is_none));
        assert_approx_eq!(f64, order.price_at(0), 99.0 * SCARCITY_MARKUP);
    }

    #[rstest]
    fn test_price_at_fallback(volatile: Producer) {
        let mut order = Order::with_total_demand(1e6);
        order.add(volatile).unwrap();
        order.calculate_default().unwrap();

        assert_eq!(order.price_at(0), FALLBACK_PRICE);
        assert!(order.price_curve().iter().all(|price| price == FALLBACK_PRICE));
    }

    #[test]
    fn test_demand_curve() {
        let mut order = Order::with_total_demand(8760.0 * 3600.0);
        order
            .add(User::with_total_consumption("industry", 2.0 * 8760.0 * 3600.0))
            .unwrap();

        let demand = order.demand_curve().unwrap();
        assert_eq!(demand.len(), POINTS);
        assert_approx_eq!(f64, demand.get(42), 3.0, epsilon = 1e-12);
    }

    #[rstest]
    fn test_display(order: Order) {
        assert_eq!(order.to_string(), "<Order 3 producers, 1 users>");
    }
}
