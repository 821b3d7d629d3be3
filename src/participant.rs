//! Participants in the merit order: producers of electricity and the users who consume it.
use crate::error::{MeritError, Result};
use crate::id::{ParticipantID, define_id_getter};
use crate::load_curve::LoadCurve;
use crate::load_profile::{LoadProfile, ProfileReader};
use crate::{MJ_PER_MWH, POINTS};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

/// The kind of a participant
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, DeserializeLabeledStringEnum, derive_more::Display,
)]
pub enum ParticipantKind {
    /// Always produces its maximum output (e.g. CHPs, nuclear)
    #[string = "must_run"]
    #[display("must-run producer")]
    MustRun,
    /// Always produces its maximum output, driven by a weather profile (e.g. wind, solar)
    #[string = "volatile"]
    #[display("volatile producer")]
    Volatile,
    /// Output is decided by the merit order (e.g. coal, gas)
    #[string = "dispatchable"]
    #[display("dispatchable producer")]
    Dispatchable,
    /// A consumer of electricity
    #[string = "user"]
    #[display("user")]
    User,
}

/// The kind of a producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ProducerKind {
    /// See [`ParticipantKind::MustRun`]
    #[display("must_run")]
    MustRun,
    /// See [`ParticipantKind::Volatile`]
    #[display("volatile")]
    Volatile,
    /// See [`ParticipantKind::Dispatchable`]
    #[display("dispatchable")]
    Dispatchable,
}

impl From<ProducerKind> for ParticipantKind {
    fn from(kind: ProducerKind) -> Self {
        match kind {
            ProducerKind::MustRun => ParticipantKind::MustRun,
            ProducerKind::Volatile => ParticipantKind::Volatile,
            ProducerKind::Dispatchable => ParticipantKind::Dispatchable,
        }
    }
}

/// The unit in which to express energy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyUnit {
    /// Megajoules
    MJ,
    /// Megawatt hours
    MWh,
}

/// Attributes of a participant, as given in a model file.
///
/// Which attributes are required depends on the kind of participant being built.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ParticipantConfig {
    /// Unique key of the participant
    pub key: Option<String>,
    /// Cost of producing one MWh
    pub marginal_costs: Option<f64>,
    /// Output capacity of one unit (MW)
    pub output_capacity_per_unit: Option<f64>,
    /// Number of (typical) plants
    pub number_of_units: Option<f64>,
    /// Fraction of the year the plant is available
    pub availability: Option<f64>,
    /// Fixed costs of one unit per year
    pub fixed_costs_per_unit: Option<f64>,
    /// Fixed operation and maintenance costs of one unit per year
    pub fixed_om_costs_per_unit: Option<f64>,
    /// Overrides the number of full load hours
    pub full_load_hours: Option<f64>,
    /// Key of the load profile to use
    pub load_profile: Option<String>,
    /// Annual energy consumed by a user (MJ)
    pub total_consumption: Option<f64>,
}

/// Get a required attribute, or an error naming it
fn require<T>(value: Option<T>, attribute: &'static str, kind: ParticipantKind) -> Result<T> {
    value.ok_or_else(|| MeritError::MissingAttribute {
        attribute,
        kind: kind.to_string(),
    })
}

/// Load the profile named in `config`, if any
fn load_profile_for(
    config: &ParticipantConfig,
    reader: &dyn ProfileReader,
) -> Result<Option<Rc<LoadProfile>>> {
    config
        .load_profile
        .as_deref()
        .map(|key| LoadProfile::load(key, reader).map(Rc::new))
        .transpose()
}

/// Cost, capacity and availability attributes of a producer
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerAttributes {
    /// Cost of producing one MWh
    pub marginal_costs: f64,
    /// Output capacity of one unit (MW)
    pub output_capacity_per_unit: f64,
    /// Number of (typical) plants
    pub number_of_units: f64,
    /// Fraction of the year the plant is available (0 to 1)
    pub availability: f64,
    /// Fixed costs of one unit per year
    pub fixed_costs_per_unit: f64,
    /// Fixed operation and maintenance costs of one unit per year
    pub fixed_om_costs_per_unit: f64,
    /// Overrides the number of full load hours, which already accounts for availability
    pub full_load_hours: Option<f64>,
}

impl ProducerAttributes {
    /// Read producer attributes from a config, checking all required attributes are present
    pub fn from_config(config: &ParticipantConfig, kind: ParticipantKind) -> Result<Self> {
        Ok(Self {
            marginal_costs: require(config.marginal_costs, "marginal_costs", kind)?,
            output_capacity_per_unit: require(
                config.output_capacity_per_unit,
                "output_capacity_per_unit",
                kind,
            )?,
            number_of_units: require(config.number_of_units, "number_of_units", kind)?,
            availability: require(config.availability, "availability", kind)?,
            fixed_costs_per_unit: require(
                config.fixed_costs_per_unit,
                "fixed_costs_per_unit",
                kind,
            )?,
            fixed_om_costs_per_unit: require(
                config.fixed_om_costs_per_unit,
                "fixed_om_costs_per_unit",
                kind,
            )?,
            full_load_hours: config.full_load_hours,
        })
    }
}

/// A plant or technology which produces electricity to meet demand
#[derive(Debug, Clone)]
pub struct Producer {
    /// Unique key of the producer
    pub key: ParticipantID,
    kind: ProducerKind,
    attributes: ProducerAttributes,
    load_profile: Option<Rc<LoadProfile>>,
    load_curve: LoadCurve,
    max_load_curve: OnceCell<LoadCurve>,
    position: Option<usize>,
}
define_id_getter! {Producer, ParticipantID}

impl Producer {
    /// Create a new producer.
    ///
    /// Without a load profile the producer can deliver its available capacity at every point.
    pub fn new(
        key: impl Into<ParticipantID>,
        kind: ProducerKind,
        attributes: ProducerAttributes,
        load_profile: Option<Rc<LoadProfile>>,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            attributes,
            load_profile,
            load_curve: LoadCurve::zeroed(POINTS),
            max_load_curve: OnceCell::new(),
            position: None,
        }
    }

    /// Build a producer from a config, loading its profile (if any) with `reader`
    pub fn from_config(
        kind: ProducerKind,
        config: &ParticipantConfig,
        reader: &dyn ProfileReader,
    ) -> Result<Self> {
        let participant_kind = kind.into();
        let key = require(config.key.clone(), "key", participant_kind)?;
        let attributes = ProducerAttributes::from_config(config, participant_kind)?;
        let load_profile = load_profile_for(config, reader)?;

        Ok(Self::new(key, kind, attributes, load_profile))
    }

    /// The kind of producer
    pub fn kind(&self) -> ProducerKind {
        self.kind
    }

    /// The producer's cost and capacity attributes
    pub fn attributes(&self) -> &ProducerAttributes {
        &self.attributes
    }

    /// Cost of producing one MWh
    pub fn marginal_costs(&self) -> f64 {
        self.attributes.marginal_costs
    }

    /// The profile which shapes the producer's output, if any
    pub fn load_profile(&self) -> Option<&LoadProfile> {
        self.load_profile.as_deref()
    }

    /// Rank in the merit order, starting at 1.
    ///
    /// Set when the producer is added to an order. `None` for producers which are not
    /// dispatchable, have no installed capacity or do not belong to an order.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: Option<usize>) {
        self.position = position;
    }

    /// Whether the producer runs regardless of demand
    pub fn is_always_on(&self) -> bool {
        self.kind != ProducerKind::Dispatchable
    }

    /// Whether the producer may sometimes be turned off
    pub fn is_transient(&self) -> bool {
        !self.is_always_on()
    }

    /// Installed capacity (MW), ignoring availability
    pub fn installed_capacity(&self) -> f64 {
        self.attributes.output_capacity_per_unit * self.attributes.number_of_units
    }

    /// Capacity (MW) which can be used once availability is taken into account
    pub fn available_output_capacity(&self) -> f64 {
        self.installed_capacity() * self.attributes.availability
    }

    /// The most energy (MJ) which the producer could produce in a year
    pub fn max_production(&self) -> f64 {
        let seconds_per_hour = MJ_PER_MWH;
        match self.attributes.full_load_hours {
            // Full load hours already account for availability
            Some(flh) => self.installed_capacity() * flh * seconds_per_hour,
            None => self.available_output_capacity() * POINTS as f64 * seconds_per_hour,
        }
    }

    /// The most power (MW) the producer can deliver at `point`
    pub fn max_load_at(&self, point: usize) -> f64 {
        match &self.load_profile {
            Some(profile) => profile.value_at(point) * self.max_production(),
            None => self.available_output_capacity(),
        }
    }

    /// The most power the producer can deliver at every point
    pub fn max_load_curve(&self) -> &LoadCurve {
        self.max_load_curve.get_or_init(|| match &self.load_profile {
            Some(profile) => {
                let max_production = self.max_production();
                profile.values().iter().map(|v| v * max_production).collect()
            }
            None => LoadCurve::new(vec![self.available_output_capacity(); POINTS]),
        })
    }

    /// The summed maximum load between two points, inclusive of both.
    ///
    /// Points after the end of the year are ignored, so an empty range gives zero.
    pub fn load_between(&self, start: usize, finish: usize) -> f64 {
        let finish = finish.min(POINTS - 1);
        if start > finish {
            return 0.0;
        }

        match &self.load_profile {
            Some(profile) => {
                profile.values()[start..=finish].iter().sum::<f64>() * self.max_production()
            }
            None => self.available_output_capacity() * (1 + finish - start) as f64,
        }
    }

    /// The actual load at every point.
    ///
    /// For always-on producers this is the maximum load; for dispatchables it is filled in by
    /// the calculator.
    pub fn load_curve(&self) -> &LoadCurve {
        if self.is_always_on() {
            self.max_load_curve()
        } else {
            &self.load_curve
        }
    }

    /// The load at `point`
    pub fn load_at(&self, point: usize) -> f64 {
        self.load_curve().get(point)
    }

    /// Set the load of a dispatchable producer at `point`
    pub(crate) fn set_load(&mut self, point: usize, value: f64) {
        self.load_curve.set(point, value);
    }

    /// The energy actually produced over the year
    pub fn production(&self, unit: EnergyUnit) -> f64 {
        let mwh = self.load_curve().sum();
        match unit {
            EnergyUnit::MWh => mwh,
            EnergyUnit::MJ => mwh * MJ_PER_MWH,
        }
    }

    /// The number of hours the producer would have run at its installed capacity to produce
    /// the same energy.
    ///
    /// Returns the override when one was given.
    pub fn full_load_hours(&self) -> f64 {
        if let Some(flh) = self.attributes.full_load_hours {
            return flh;
        }

        let capacity = self.installed_capacity();
        if capacity == 0.0 {
            0.0
        } else {
            self.production(EnergyUnit::MJ) / (capacity * MJ_PER_MWH)
        }
    }

    /// The number of points at which the producer is completely off
    pub fn off_times(&self) -> usize {
        self.load_curve().iter().filter(|v| *v == 0.0).count()
    }

    /// The absolute change in load from each point to the next
    pub fn ramping_curve(&self) -> LoadCurve {
        self.load_curve()
            .as_slice()
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .collect()
    }

    /// The difference between the maximum and actual loads
    pub fn spare_load_curve(&self) -> LoadCurve {
        self.max_load_curve() - self.load_curve()
    }

    /// The mean load over the year
    pub fn average_load(&self) -> f64 {
        let curve = self.load_curve();
        if curve.is_empty() {
            return 0.0;
        }

        curve.sum() / curve.len() as f64
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", ParticipantKind::from(self.kind), self.key)
    }
}

/// A consumer of electricity
#[derive(Debug, Clone)]
pub struct User {
    /// Unique key of the user
    pub key: ParticipantID,
    total_consumption: Option<f64>,
    load_profile: Option<Rc<LoadProfile>>,
}
define_id_getter! {User, ParticipantID}

impl User {
    /// Create a new user.
    ///
    /// Without a load profile the user's demand is spread evenly over the year.
    pub fn new(key: impl Into<ParticipantID>, load_profile: Option<Rc<LoadProfile>>) -> Self {
        Self {
            key: key.into(),
            total_consumption: None,
            load_profile,
        }
    }

    /// Create a new user with a known annual consumption (MJ)
    pub fn with_total_consumption(key: impl Into<ParticipantID>, total_consumption: f64) -> Self {
        let mut user = Self::new(key, None);
        user.set_total_consumption(total_consumption);
        user
    }

    /// Build a user from a config, loading its profile (if any) with `reader`
    pub fn from_config(config: &ParticipantConfig, reader: &dyn ProfileReader) -> Result<Self> {
        let key = require(config.key.clone(), "key", ParticipantKind::User)?;
        let mut user = Self::new(key, load_profile_for(config, reader)?);
        user.total_consumption = config.total_consumption;

        Ok(user)
    }

    /// Annual energy consumed (MJ), if known
    pub fn total_consumption(&self) -> Option<f64> {
        self.total_consumption
    }

    /// Set the annual energy consumed (MJ)
    pub fn set_total_consumption(&mut self, total_consumption: f64) {
        self.total_consumption = Some(total_consumption);
    }

    fn require_total_consumption(&self) -> Result<f64> {
        self.total_consumption
            .ok_or_else(|| MeritError::UnknownDemand(self.key.to_string()))
    }

    /// The fraction of annual consumption (per second) used at `point`
    fn shape_at(&self, point: usize) -> f64 {
        match &self.load_profile {
            Some(profile) => profile.value_at(point),
            None => 1.0 / (POINTS as f64 * MJ_PER_MWH),
        }
    }

    /// The demand (MW) at `point`
    pub fn load_at(&self, point: usize) -> Result<f64> {
        Ok(self.shape_at(point) * self.require_total_consumption()?)
    }

    /// The demand at every point
    pub fn load_curve(&self) -> Result<LoadCurve> {
        let total = self.require_total_consumption()?;
        Ok((0..POINTS).map(|point| self.shape_at(point) * total).collect())
    }

    /// The summed demand between two points, inclusive of both
    pub fn load_between(&self, start: usize, finish: usize) -> Result<f64> {
        let total = self.require_total_consumption()?;
        Ok((start..=finish)
            .map(|point| self.shape_at(point) * total)
            .sum())
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<user {}>", self.key)
    }
}

/// Something taking part in the merit order
#[derive(Debug, Clone)]
pub enum Participant {
    /// A must-run, volatile or dispatchable producer
    Producer(Producer),
    /// A consumer
    User(User),
}

impl Participant {
    /// Build a participant of the given kind from a config
    pub fn from_config(
        kind: ParticipantKind,
        config: &ParticipantConfig,
        reader: &dyn ProfileReader,
    ) -> Result<Self> {
        let producer_kind = match kind {
            ParticipantKind::User => return Ok(User::from_config(config, reader)?.into()),
            ParticipantKind::MustRun => ProducerKind::MustRun,
            ParticipantKind::Volatile => ProducerKind::Volatile,
            ParticipantKind::Dispatchable => ProducerKind::Dispatchable,
        };

        Ok(Producer::from_config(producer_kind, config, reader)?.into())
    }

    /// The participant's key
    pub fn key(&self) -> &ParticipantID {
        match self {
            Self::Producer(producer) => &producer.key,
            Self::User(user) => &user.key,
        }
    }

    /// The kind of participant
    pub fn kind(&self) -> ParticipantKind {
        match self {
            Self::Producer(producer) => producer.kind().into(),
            Self::User(_) => ParticipantKind::User,
        }
    }

    /// Whether the participant is running all of the time
    pub fn is_always_on(&self) -> bool {
        match self {
            Self::Producer(producer) => producer.is_always_on(),
            Self::User(_) => false,
        }
    }

    /// The participant as a producer, if it is one
    pub fn as_producer(&self) -> Option<&Producer> {
        match self {
            Self::Producer(producer) => Some(producer),
            Self::User(_) => None,
        }
    }

    /// The participant as a mutable producer, if it is one
    pub fn as_producer_mut(&mut self) -> Option<&mut Producer> {
        match self {
            Self::Producer(producer) => Some(producer),
            Self::User(_) => None,
        }
    }

    /// The participant as a user, if it is one
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(user) => Some(user),
            Self::Producer(_) => None,
        }
    }

    /// The participant as a mutable user, if it is one
    pub fn as_user_mut(&mut self) -> Option<&mut User> {
        match self {
            Self::User(user) => Some(user),
            Self::Producer(_) => None,
        }
    }
}

impl From<Producer> for Participant {
    fn from(producer: Producer) -> Self {
        Self::Producer(producer)
    }
}

impl From<User> for Participant {
    fn from(user: User) -> Self {
        Self::User(user)
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer(producer) => producer.fmt(f),
            Self::User(user) => user.fmt(f),
        }
    }
}
