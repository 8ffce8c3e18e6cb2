//! Keyspace schema metadata, as delivered by the schema event feed, and the
//! replica placement strategies parsed out of it.

use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::StrategyParseError;

/// The slice of keyspace metadata relevant to replica placement.
///
/// The schema feed delivers the replication settings as an opaque class name
/// plus a string-to-string option map; interpreting them is this crate's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceMetadata {
    /// Replication strategy class, possibly fully qualified
    /// (e.g. `org.apache.cassandra.locator.SimpleStrategy`).
    pub strategy_class: String,
    /// Strategy options, e.g. `replication_factor` or per-datacenter factors.
    pub strategy_options: HashMap<String, String>,
}

impl KeyspaceMetadata {
    /// Creates keyspace metadata from a strategy class name and its options.
    pub fn new(
        strategy_class: impl Into<String>,
        strategy_options: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        KeyspaceMetadata {
            strategy_class: strategy_class.into(),
            strategy_options: strategy_options
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Replication strategy used by a keyspace.
///
/// This specifies how the replica list for each ring slot is derived from
/// the token ring. Two descriptors are equal iff their tag and parameters
/// match exactly; the facade only rematerialises a keyspace when its
/// descriptor actually changed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplicationStrategy {
    /// Places the first replica on the slot's owner and additional replicas
    /// on the next distinct hosts clockwise on the ring, without considering
    /// topology.
    Simple {
        /// How many replicas of each piece of data there are.
        replication_factor: usize,
    },
    /// Places a configured number of replicas in each named datacenter,
    /// spreading them across racks where possible.
    NetworkTopology {
        /// Replication factor per datacenter name.
        datacenter_repfactors: HashMap<String, usize>,
    },
    /// Data lives only on the slot's owner. Used by system keyspaces.
    Local,
    /// A strategy this crate does not understand. Resolves every slot to no
    /// replicas.
    Other {
        /// Class name as received from the schema feed.
        name: String,
    },
}

impl ReplicationStrategy {
    /// Parses a strategy descriptor out of keyspace metadata.
    ///
    /// Class names are matched by suffix, so both the short and the fully
    /// qualified spellings resolve. For `NetworkTopologyStrategy` every
    /// option with an integer value is taken as a datacenter -> replication
    /// factor entry; other options are skipped.
    pub fn from_keyspace_metadata(meta: &KeyspaceMetadata) -> Result<Self, StrategyParseError> {
        if meta.strategy_class.ends_with("SimpleStrategy") {
            let rep_factor_str = meta
                .strategy_options
                .get("replication_factor")
                .ok_or(StrategyParseError::MissingReplicationFactor)?;

            let replication_factor = usize::from_str(rep_factor_str).map_err(|_| {
                StrategyParseError::InvalidReplicationFactor {
                    value: rep_factor_str.clone(),
                }
            })?;

            Ok(ReplicationStrategy::Simple { replication_factor })
        } else if meta.strategy_class.ends_with("NetworkTopologyStrategy") {
            let mut datacenter_repfactors: HashMap<String, usize> =
                HashMap::with_capacity(meta.strategy_options.len());

            for (datacenter, rep_factor_str) in &meta.strategy_options {
                let rep_factor: usize = match usize::from_str(rep_factor_str) {
                    Ok(number) => number,
                    // There might be other things in the map, we care only about rep_factors
                    Err(_) => continue,
                };

                datacenter_repfactors.insert(datacenter.clone(), rep_factor);
            }

            Ok(ReplicationStrategy::NetworkTopology {
                datacenter_repfactors,
            })
        } else if meta.strategy_class.ends_with("LocalStrategy") {
            Ok(ReplicationStrategy::Local)
        } else {
            Ok(ReplicationStrategy::Other {
                name: meta.strategy_class.clone(),
            })
        }
    }
}
