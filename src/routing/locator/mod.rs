//! Materialises per-keyspace replica maps: given the token ring and a
//! keyspace's replication strategy, computes the ordered replica list for
//! every ring slot up front, so that the query path is a single successor
//! lookup. Replica lists are in walk order, which is the preference order
//! the cluster itself derives - a compatibility contract, not an
//! implementation detail.


use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use itertools::Itertools;

use crate::cluster::{Host, HostRef, HostVec, ReplicationStrategy};
use crate::routing::ring::TokenHostRing;
use crate::routing::Token;

/// Ordered mapping from each ring token to the replica list owning the slot
/// that ends at it.
pub(crate) type TokenReplicaMap = BTreeMap<Token, HostVec>;

/// Computes the full token -> replicas map for one keyspace.
///
/// The result's key set is identical to the ring's. Unknown strategies
/// produce an empty map, which resolves every query on the keyspace to the
/// empty replica vector.
pub(crate) fn tokens_to_replicas(
    ring: &TokenHostRing,
    strategy: &ReplicationStrategy,
) -> TokenReplicaMap {
    match strategy {
        ReplicationStrategy::Simple { replication_factor } => {
            simple_strategy_replicas(ring, *replication_factor)
        }
        ReplicationStrategy::NetworkTopology {
            datacenter_repfactors,
        } => network_topology_strategy_replicas(ring, datacenter_repfactors),
        // Data lives only on the slot's owner.
        ReplicationStrategy::Local => simple_strategy_replicas(ring, 1),
        ReplicationStrategy::Other { .. } => TokenReplicaMap::new(),
    }
}

/// For each slot, walks the ring from the slot inclusive with wraparound and
/// collects distinct hosts until `min(rf, distinct hosts in ring)` are found.
fn simple_strategy_replicas(ring: &TokenHostRing, replication_factor: usize) -> TokenReplicaMap {
    let slots: Vec<(&Token, HostRef)> = ring.iter().collect();
    let unique_host_count = slots.iter().map(|(_, host)| *host).unique().count();
    let num_to_take = std::cmp::min(replication_factor, unique_host_count);

    let mut interner = HostVecInterner::new();
    slots
        .iter()
        .enumerate()
        .map(|(start, (token, _))| {
            let replicas: Vec<Arc<Host>> = walk_from(&slots, start)
                .unique()
                .take(num_to_take)
                .cloned()
                .collect();
            ((*token).clone(), interner.intern(replicas))
        })
        .collect()
}

/// For each slot, walks the global ring from the slot inclusive with
/// wraparound, accepting hosts under per-datacenter quotas.
///
/// A host in datacenter `d` is accepted iff `d` has a configured replication
/// factor, `d`'s quota is not yet met, and the host's rack was not seen yet
/// in `d` - unless every rack of `d` already holds a replica for this slot,
/// in which case same-rack repeats are accepted. The walk stops once every
/// configured datacenter met its quota, or after a full traversal.
fn network_topology_strategy_replicas(
    ring: &TokenHostRing,
    datacenter_repfactors: &HashMap<String, usize>,
) -> TokenReplicaMap {
    let slots: Vec<(&Token, HostRef)> = ring.iter().collect();

    // A missing rack label counts as a rack of its own.
    let mut racks_by_dc: HashMap<&str, HashSet<Option<&str>>> = HashMap::new();
    for host in slots.iter().map(|(_, host)| *host).unique() {
        if let Some(datacenter) = host.datacenter.as_deref() {
            racks_by_dc
                .entry(datacenter)
                .or_default()
                .insert(host.rack.as_deref());
        }
    }
    let rack_counts: HashMap<&str, usize> = racks_by_dc
        .into_iter()
        .map(|(datacenter, racks)| (datacenter, racks.len()))
        .collect();

    let quota_datacenters = datacenter_repfactors
        .values()
        .filter(|repfactor| **repfactor > 0)
        .count();

    let mut interner = HostVecInterner::new();
    slots
        .iter()
        .enumerate()
        .map(|(start, (token, _))| {
            let mut replicas: Vec<Arc<Host>> = Vec::new();
            let mut accepted_per_dc: HashMap<&str, usize> = HashMap::new();
            let mut racks_per_dc: HashMap<&str, HashSet<Option<&str>>> = HashMap::new();
            let mut full_datacenters = 0;

            for host in walk_from(&slots, start).unique() {
                let Some(datacenter) = host.datacenter.as_deref() else {
                    continue;
                };
                let Some(&repfactor) = datacenter_repfactors.get(datacenter) else {
                    continue;
                };

                let accepted = accepted_per_dc.entry(datacenter).or_insert(0);
                if *accepted >= repfactor {
                    continue;
                }

                let seen_racks = racks_per_dc.entry(datacenter).or_default();
                let all_racks_represented = seen_racks.len() == rack_counts[datacenter];
                if !seen_racks.insert(host.rack.as_deref()) && !all_racks_represented {
                    // Same rack again while other racks are still unrepresented.
                    continue;
                }

                *accepted += 1;
                replicas.push(Arc::clone(host));

                if *accepted == repfactor {
                    full_datacenters += 1;
                    if full_datacenters == quota_datacenters {
                        break;
                    }
                }
            }

            ((*token).clone(), interner.intern(replicas))
        })
        .collect()
}

/// Iterates hosts in ring order starting at `start`, wrapping around, each
/// slot visited once.
fn walk_from<'a>(
    slots: &'a [(&'a Token, HostRef<'a>)],
    start: usize,
) -> impl Iterator<Item = HostRef<'a>> {
    slots[start..]
        .iter()
        .chain(slots[..start].iter())
        .map(|(_, host)| *host)
}

/// Rolling interner: adjacent ring slots frequently resolve to the very same
/// replica list, and sharing one allocation between them bounds memory on
/// large rings.
struct HostVecInterner {
    prev: Option<HostVec>,
}

impl HostVecInterner {
    fn new() -> Self {
        HostVecInterner { prev: None }
    }

    fn intern(&mut self, replicas: Vec<Arc<Host>>) -> HostVec {
        if let Some(prev) = &self.prev {
            if prev.len() == replicas.len()
                && prev.iter().zip(&replicas).all(|(a, b)| Arc::ptr_eq(a, b))
            {
                return Arc::clone(prev);
            }
        }

        let interned: HostVec = Arc::new(replicas);
        self.prev = Some(Arc::clone(&interned));
        interned
    }
}
