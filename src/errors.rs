//! Error types returned by the crate's fallible seams.
//!
//! The [`TokenMap`](crate::TokenMap) facade recovers from all of these
//! locally (the offending literal or keyspace degrades, the rest of the
//! update proceeds), so none of them ever reach a caller of the facade.
//! The observable failure mode is an empty replica vector.

use thiserror::Error;

/// A token literal received from the cluster could not be parsed by the
/// active partitioner.
///
/// Only the numeric partitioners can fail this way: `Murmur3Partitioner`
/// literals must be valid signed decimal 64-bit integers. The facade skips
/// the offending literal and installs the remaining ones.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed token literal: {literal:?}")]
pub struct MalformedTokenError {
    /// The literal as received from the cluster.
    pub literal: String,
}

/// Keyspace replication options could not be interpreted.
///
/// A keyspace whose options fail to parse resolves every query to the empty
/// replica vector until a later schema event repairs it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StrategyParseError {
    /// `SimpleStrategy` without a `replication_factor` option.
    #[error("SimpleStrategy options are missing a replication factor")]
    MissingReplicationFactor,

    /// A replication factor that is not an unsigned integer.
    #[error("could not parse replication factor {value:?} as an integer")]
    InvalidReplicationFactor {
        /// The raw option value.
        value: String,
    },
}
