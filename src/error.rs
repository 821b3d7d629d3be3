//! Errors raised by the merit order calculation.
//!
//! Configuration errors are detected eagerly when participants, profiles and calculators are
//! constructed. Lookup errors name the key or attribute which could not be found. Invariant
//! violations indicate that a caller broke the contract of [`crate::order::Order`] or of a
//! [`crate::calculator::Calculator`].
use thiserror::Error;

/// A [`Result`](std::result::Result) whose error type is [`MeritError`]
pub type Result<T> = std::result::Result<T, MeritError>;

/// The errors which may occur when building or calculating a merit order
#[derive(Debug, Error, PartialEq)]
pub enum MeritError {
    /// A required attribute was not given when constructing a participant
    #[error("Missing attribute {attribute} for {kind}")]
    MissingAttribute {
        /// The name of the missing attribute
        attribute: &'static str,
        /// The kind of participant being constructed
        kind: String,
    },

    /// A load profile whose length is not a divisor of the number of points in a year
    #[error("Malformed load profile {key}: length {length} does not divide 8760")]
    MalformedLoadProfile {
        /// The load profile key
        key: String,
        /// The length of the source data
        length: usize,
    },

    /// A load profile file contained something other than a number
    #[error("Invalid value in load profile {key} on line {line}")]
    InvalidLoadProfileValue {
        /// The load profile key
        key: String,
        /// The (1-based) line number
        line: usize,
    },

    /// No stored load profile exists for the key
    #[error("No load profile found for {0}")]
    MissingLoadProfile(String),

    /// An approximate calculator was given a chunk size which is too small
    #[error("Invalid chunk size {0}: chunks must be larger than 1 (use the exact calculator)")]
    InvalidChunkSize(usize),

    /// A user was asked for its load before its total consumption was set
    #[error("Total consumption for {0} is unknown")]
    UnknownDemand(String),

    /// No participant with the key exists in the order
    #[error("Unknown participant {0}")]
    UnknownParticipant(String),

    /// A participant was added to (or changed in) an order which has already been calculated
    #[error("Cannot change {0}: the order has already been calculated")]
    LockedOrder(String),

    /// A calculator was given producers which are not in merit order
    #[error("Producer {key} is out of merit order")]
    IncorrectProducerOrder {
        /// The key of the first producer found to be out of order
        key: String,
    },

    /// Variance was requested for a curve with too few values
    #[error("Cannot compute variance of a curve with {length} values")]
    CurveTooShort {
        /// The length of the curve
        length: usize,
    },
}
