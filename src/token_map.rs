//! The token map facade: binds a partitioner, maintains the ring index and
//! the per-keyspace strategy table as topology and schema events arrive, and
//! resolves partition keys to replica preference lists.

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::cluster::{Host, HostVec, KeyspaceMetadata, ReplicationStrategy};
use crate::routing::locator::{self, TokenReplicaMap};
use crate::routing::partitioner::PartitionerName;
use crate::routing::ring::TokenHostRing;

static NO_REPLICAS: LazyLock<HostVec> = LazyLock::new(|| Arc::new(Vec::new()));

fn no_replicas() -> HostVec {
    Arc::clone(&NO_REPLICAS)
}

/// The read-side snapshot: everything a replica query needs.
///
/// A fresh snapshot is published wholesale on every effective mutation.
/// The per-keyspace replica maps inside are shared by reference count with
/// the writer's state, so publishing after a single-keyspace change clones
/// map handles, not replica data.
#[derive(Debug, Default)]
struct MapView {
    partitioner: Option<PartitionerName>,
    replicas_by_keyspace: HashMap<String, Arc<TokenReplicaMap>>,
}

impl MapView {
    fn replicas_for_key<'a>(
        &self,
        ks_name: &str,
        key_parts: impl IntoIterator<Item = &'a [u8]>,
    ) -> HostVec {
        let Some(partitioner) = &self.partitioner else {
            return no_replicas();
        };
        let Some(replicas) = self.replicas_by_keyspace.get(ks_name) else {
            return no_replicas();
        };

        let token = partitioner.hash_key_parts(key_parts);

        // The slot's owner is the smallest ring token strictly greater than
        // the key's token; a key hashing beyond the maximum ring token wraps
        // around to the smallest one.
        replicas
            .range((Bound::Excluded(&token), Bound::Unbounded))
            .next()
            .or_else(|| replicas.iter().next())
            .map(|(_, hosts)| Arc::clone(hosts))
            .unwrap_or_else(no_replicas)
    }
}

/// Client-side token map: resolves a partition key to the ordered list of
/// replica hosts responsible for it, with no round-trip to the cluster.
///
/// The map is driven by an external, linearised topology event stream:
/// `set_partitioner`, then any number of host and keyspace updates, a
/// terminal [`build`](TokenMap::build) once the first consistent snapshot
/// has been delivered, and further updates from then on. All event-applying
/// operations take `&mut self` - the single topology thread is the only
/// writer. Request threads query through a [`TokenMapReader`].
///
/// All failures are recovered locally (see the crate's
/// [`errors`](crate::errors) module); the observable failure mode of every
/// degraded path is an empty replica vector.
#[derive(Debug, Default)]
pub struct TokenMap {
    partitioner: Option<PartitionerName>,
    ring: TokenHostRing,
    strategies_by_keyspace: HashMap<String, ReplicationStrategy>,
    replicas_by_keyspace: HashMap<String, Arc<TokenReplicaMap>>,
    view: Arc<ArcSwap<MapView>>,
    built: bool,
}

/// A cheap, cloneable read handle over a [`TokenMap`].
///
/// [`get_replicas`](TokenMapReader::get_replicas) is a lock-free load of the
/// most recently published snapshot: a reader observes either the pre-update
/// or the post-update state of a keyspace, never a torn intermediate, and a
/// query that happens-after a mutation observes that mutation's effects.
#[derive(Debug, Clone)]
pub struct TokenMapReader {
    view: Arc<ArcSwap<MapView>>,
}

impl TokenMapReader {
    /// Resolves a partition key, pre-serialized as its ordered key parts, to
    /// the replica preference list of the keyspace it lives in.
    ///
    /// Returns the shared empty vector when no partitioner is bound or the
    /// keyspace is unknown.
    pub fn get_replicas<'a>(
        &self,
        ks_name: &str,
        key_parts: impl IntoIterator<Item = &'a [u8]>,
    ) -> HostVec {
        self.view.load().replicas_for_key(ks_name, key_parts)
    }
}

impl TokenMap {
    /// Creates an empty, partitioner-less map in the unbuilt state.
    pub fn new() -> Self {
        TokenMap::default()
    }

    /// Returns a read handle for request threads.
    pub fn reader(&self) -> TokenMapReader {
        TokenMapReader {
            view: Arc::clone(&self.view),
        }
    }

    /// Binds the partitioner by its (possibly fully qualified) class name.
    ///
    /// The first successful call binds the partitioner for the lifetime of
    /// the map; a later call naming a different class is ignored. An unknown
    /// class name leaves the map partitioner-less, in which case every
    /// mutating and query call is a no-op returning empty replicas.
    pub fn set_partitioner(&mut self, partitioner_class: &str) {
        let parsed = PartitionerName::from_str(partitioner_class);

        if let Some(current) = &self.partitioner {
            if parsed.as_ref() != Some(current) {
                warn!(
                    "Ignoring partitioner change to {:?}, already set to {:?}",
                    partitioner_class, current
                );
            }
            return;
        }

        match parsed {
            Some(partitioner) => {
                self.partitioner = Some(partitioner);
                self.publish();
            }
            None => warn!(
                "Unknown partitioner class {:?}, token map will stay inert",
                partitioner_class
            ),
        }
    }

    /// Registers or moves a host together with the ring positions it owns,
    /// given as the cluster's textual token representations.
    ///
    /// Malformed literals are skipped; the remaining ones are installed.
    pub fn update_host<S: AsRef<str>>(
        &mut self,
        host: &Arc<Host>,
        token_literals: impl IntoIterator<Item = S>,
    ) {
        let Some(partitioner) = &self.partitioner else {
            return;
        };

        let mut tokens = Vec::new();
        for literal in token_literals {
            match partitioner.token_from_string(literal.as_ref()) {
                Ok(token) => tokens.push(token),
                Err(error) => warn!("Host {}: skipping token: {}", host, error),
            }
        }

        self.ring.update_host(host, tokens);
        self.map_replicas(false);
    }

    /// Removes a host and every ring position it owns.
    pub fn remove_host(&mut self, host: &Arc<Host>) {
        if self.partitioner.is_none() {
            return;
        }

        if self.ring.purge_address(host.address) {
            self.map_replicas(false);
        }
    }

    /// Applies a keyspace creation or alteration.
    ///
    /// The keyspace's replica map is rematerialised only if the replication
    /// descriptor actually changed.
    pub fn update_keyspace(&mut self, ks_name: &str, ks_meta: &KeyspaceMetadata) {
        if self.partitioner.is_none() {
            return;
        }

        let strategy = match ReplicationStrategy::from_keyspace_metadata(ks_meta) {
            Ok(strategy) => strategy,
            Err(error) => {
                warn!(
                    "Keyspace {}: {}; resolving all queries to no replicas",
                    ks_name, error
                );
                ReplicationStrategy::Other {
                    name: ks_meta.strategy_class.clone(),
                }
            }
        };

        if self.strategies_by_keyspace.get(ks_name) == Some(&strategy) {
            return;
        }

        self.map_keyspace_replicas(ks_name, &strategy, false);
        self.strategies_by_keyspace
            .insert(ks_name.to_owned(), strategy);
    }

    /// Forgets a dropped keyspace.
    pub fn drop_keyspace(&mut self, ks_name: &str) {
        if self.partitioner.is_none() {
            return;
        }

        self.strategies_by_keyspace.remove(ks_name);
        if self.replicas_by_keyspace.remove(ks_name).is_some() {
            self.publish();
        }
    }

    /// Signals that the first consistent topology snapshot has been fully
    /// delivered, and materialises replica maps for every known keyspace.
    ///
    /// Until this call, host and keyspace updates only accumulate inputs;
    /// from this call on, every mutation rematerialises what it affects.
    pub fn build(&mut self) {
        if self.partitioner.is_none() {
            return;
        }

        self.built = true;
        self.map_replicas(true);
    }

    /// Resolves a partition key, pre-serialized as its ordered key parts, to
    /// the replica preference list of the keyspace it lives in.
    ///
    /// Same semantics as [`TokenMapReader::get_replicas`].
    pub fn get_replicas<'a>(
        &self,
        ks_name: &str,
        key_parts: impl IntoIterator<Item = &'a [u8]>,
    ) -> HostVec {
        self.view.load().replicas_for_key(ks_name, key_parts)
    }

    /// Returns the map to the empty, partitioner-less, unbuilt state.
    pub fn clear(&mut self) {
        self.partitioner = None;
        self.ring.clear();
        self.strategies_by_keyspace.clear();
        self.replicas_by_keyspace.clear();
        self.built = false;
        self.publish();
    }

    /// Rematerialises every known keyspace. Deferred until `build` unless
    /// forced by it.
    fn map_replicas(&mut self, force: bool) {
        if !self.built && !force {
            return;
        }

        for (ks_name, strategy) in &self.strategies_by_keyspace {
            debug!("Computing replicas for keyspace {}", ks_name);
            let replicas = locator::tokens_to_replicas(&self.ring, strategy);
            self.replicas_by_keyspace
                .insert(ks_name.clone(), Arc::new(replicas));
        }
        self.publish();
    }

    /// Rematerialises a single keyspace. Deferred until `build`.
    fn map_keyspace_replicas(&mut self, ks_name: &str, strategy: &ReplicationStrategy, force: bool) {
        if !self.built && !force {
            return;
        }

        debug!("Computing replicas for keyspace {}", ks_name);
        let replicas = locator::tokens_to_replicas(&self.ring, strategy);
        self.replicas_by_keyspace
            .insert(ks_name.to_owned(), Arc::new(replicas));
        self.publish();
    }

    /// Publishes the current state for readers with a release store.
    fn publish(&self) {
        self.view.store(Arc::new(MapView {
            partitioner: self.partitioner.clone(),
            replicas_by_keyspace: self.replicas_by_keyspace.clone(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::TokenMap;
    use crate::cluster::{Host, KeyspaceMetadata};
    use crate::routing::locator::test::{host, id_to_invalid_addr};
    use crate::test_utils::setup_tracing;
    use std::collections::HashMap;
    use std::sync::Arc;

    const MURMUR3_CLASS: &str = "org.apache.cassandra.dht.Murmur3Partitioner";
    const BYTE_ORDERED_CLASS: &str = "org.apache.cassandra.dht.ByteOrderedPartitioner";

    fn simple_strategy(replication_factor: usize) -> KeyspaceMetadata {
        KeyspaceMetadata::new(
            "SimpleStrategy",
            [("replication_factor", replication_factor.to_string())],
        )
    }

    fn replica_ids(replicas: &[Arc<Host>]) -> Vec<u16> {
        replicas.iter().map(|h| h.address.port()).collect()
    }

    // Three hosts on a ByteOrdered ring at raw tokens "b", "d", "f", so key
    // placement is easy to reason about.
    fn byte_ordered_map(replication_factor: usize) -> TokenMap {
        let mut map = TokenMap::new();
        map.set_partitioner(BYTE_ORDERED_CLASS);
        map.update_host(&host(1, "dc1", "r1"), ["b"]);
        map.update_host(&host(2, "dc1", "r1"), ["d"]);
        map.update_host(&host(3, "dc1", "r1"), ["f"]);
        map.update_keyspace("ks", &simple_strategy(replication_factor));
        map.build();
        map
    }

    #[test]
    fn test_successor_lookup_and_wraparound() {
        setup_tracing();
        let map = byte_ordered_map(2);

        // "a" < "b": owned by the slot ending at "b".
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"a".as_slice()])), [1, 2]);
        // A key equal to a ring token belongs to the next slot.
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"b".as_slice()])), [2, 3]);
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"c".as_slice()])), [2, 3]);
        // Beyond the maximum ring token: wraps around to the smallest.
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"g".as_slice()])), [1, 2]);
    }

    #[test]
    fn test_murmur3_ring_bias() {
        setup_tracing();
        let mut map = TokenMap::new();
        map.set_partitioner(MURMUR3_CLASS);
        // A sits at the minimum ring position, B at zero; the biased
        // encodings must order A before B.
        map.update_host(&host(1, "dc1", "r1"), ["-9223372036854775808"]);
        map.update_host(&host(2, "dc1", "r1"), ["0"]);
        map.update_keyspace("ks", &simple_strategy(1));
        map.build();

        // Murmur3("test") = -6017608668500074083: negative, so it lands in
        // the slot ending at token 0.
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"test".as_slice()])), [2]);
        // Murmur3("xd") = 4507812186440344727: past the maximum ring token,
        // wraps around to the minimum.
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"xd".as_slice()])), [1]);
    }

    #[test]
    fn test_replica_maps_are_deferred_until_build() {
        setup_tracing();
        let mut map = TokenMap::new();
        map.set_partitioner(BYTE_ORDERED_CLASS);
        map.update_host(&host(1, "dc1", "r1"), ["b"]);
        map.update_keyspace("ks", &simple_strategy(1));

        assert!(map.get_replicas("ks", [b"a".as_slice()]).is_empty());

        map.build();
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"a".as_slice()])), [1]);

        // Post-build mutations take effect immediately.
        map.update_host(&host(2, "dc1", "r1"), ["a"]);
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"0".as_slice()])), [2, 1]);
    }

    #[test]
    fn test_update_host_is_idempotent_and_moves_purge_old_tokens() {
        setup_tracing();
        let mut map = byte_ordered_map(3);
        let d = host(4, "dc1", "r1");

        map.update_host(&d, ["a"]);
        let after_once = replica_ids(&map.get_replicas("ks", [b"0".as_slice()]));
        map.update_host(&d, ["a"]);
        let after_twice = replica_ids(&map.get_replicas("ks", [b"0".as_slice()]));
        assert_eq!(after_once, [4, 1, 2]);
        assert_eq!(after_once, after_twice);

        // Moving the host leaves no trace of its old position.
        map.update_host(&d, ["z"]);
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"0".as_slice()])), [1, 2, 3]);
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"x".as_slice()])), [4, 1, 2]);
    }

    #[test]
    fn test_remove_host() {
        setup_tracing();
        let mut map = byte_ordered_map(2);
        let b = host(2, "dc1", "r1");

        map.remove_host(&b);
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"c".as_slice()])), [3, 1]);

        // Removing an unknown host changes nothing.
        map.remove_host(&host(9, "dc1", "r1"));
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"c".as_slice()])), [3, 1]);
    }

    #[test]
    fn test_unchanged_keyspace_descriptor_skips_rematerialisation() {
        setup_tracing();
        let mut map = byte_ordered_map(2);

        let before = map.get_replicas("ks", [b"a".as_slice()]);
        map.update_keyspace("ks", &simple_strategy(2));
        let after = map.get_replicas("ks", [b"a".as_slice()]);
        // Same descriptor: the very same replica list is still published.
        assert!(Arc::ptr_eq(&before, &after));

        map.update_keyspace("ks", &simple_strategy(3));
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"a".as_slice()])), [1, 2, 3]);
    }

    #[test]
    fn test_drop_keyspace() {
        setup_tracing();
        let mut map = byte_ordered_map(2);

        map.drop_keyspace("ks");
        assert!(map.get_replicas("ks", [b"a".as_slice()]).is_empty());

        // And it can come back.
        map.update_keyspace("ks", &simple_strategy(1));
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"a".as_slice()])), [1]);
    }

    #[test]
    fn test_unknown_keyspace_and_unknown_strategy_resolve_to_empty() {
        setup_tracing();
        let mut map = byte_ordered_map(2);

        assert!(map.get_replicas("nope", [b"a".as_slice()]).is_empty());

        map.update_keyspace(
            "custom",
            &KeyspaceMetadata::new("com.example.EverywhereStrategy", HashMap::<String, String>::new()),
        );
        assert!(map.get_replicas("custom", [b"a".as_slice()]).is_empty());

        // A Simple keyspace with an unparseable factor degrades the same way.
        map.update_keyspace(
            "broken",
            &KeyspaceMetadata::new("SimpleStrategy", [("replication_factor", "lots")]),
        );
        assert!(map.get_replicas("broken", [b"a".as_slice()]).is_empty());
    }

    #[test]
    fn test_partitioner_is_locked_after_first_bind() {
        setup_tracing();
        let mut map = TokenMap::new();
        map.set_partitioner(MURMUR3_CLASS);
        // Ignored: the map keeps speaking Murmur3.
        map.set_partitioner(BYTE_ORDERED_CLASS);

        map.update_host(&host(1, "dc1", "r1"), ["0"]);
        map.update_keyspace("ks", &simple_strategy(1));
        map.build();
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"k".as_slice()])), [1]);

        // Re-binding the same class is fine and changes nothing.
        map.set_partitioner("Murmur3Partitioner");
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"k".as_slice()])), [1]);
    }

    #[test]
    fn test_unknown_partitioner_leaves_the_map_inert() {
        setup_tracing();
        let mut map = TokenMap::new();
        map.set_partitioner("com.example.VoldemortPartitioner");

        map.update_host(&host(1, "dc1", "r1"), ["0"]);
        map.update_keyspace("ks", &simple_strategy(1));
        map.build();

        assert!(map.get_replicas("ks", [b"a".as_slice()]).is_empty());

        // The map is still unbound, so a valid partitioner can be set later.
        map.set_partitioner(BYTE_ORDERED_CLASS);
        map.update_host(&host(1, "dc1", "r1"), ["b"]);
        map.update_keyspace("ks", &simple_strategy(1));
        map.build();
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"a".as_slice()])), [1]);
    }

    #[test]
    fn test_malformed_token_literals_are_skipped() {
        setup_tracing();
        let mut map = TokenMap::new();
        map.set_partitioner(MURMUR3_CLASS);
        map.update_host(&host(1, "dc1", "r1"), ["notanumber", "0"]);
        map.update_keyspace("ks", &simple_strategy(1));
        map.build();

        // The host still owns its one valid position.
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"k".as_slice()])), [1]);
    }

    #[test]
    fn test_clear_resets_to_the_initial_state() {
        setup_tracing();
        let mut map = byte_ordered_map(2);
        map.clear();

        assert!(map.get_replicas("ks", [b"a".as_slice()]).is_empty());

        // Partitioner-less again: mutations are no-ops...
        map.update_host(&host(1, "dc1", "r1"), ["b"]);
        map.update_keyspace("ks", &simple_strategy(1));
        map.build();
        assert!(map.get_replicas("ks", [b"a".as_slice()]).is_empty());

        // ...until a partitioner is bound anew.
        map.set_partitioner(BYTE_ORDERED_CLASS);
        map.update_host(&host(1, "dc1", "r1"), ["b"]);
        map.update_keyspace("ks", &simple_strategy(1));
        map.build();
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"a".as_slice()])), [1]);
    }

    #[test]
    fn test_reader_observes_published_snapshots() {
        setup_tracing();
        let mut map = TokenMap::new();
        let reader = map.reader();

        map.set_partitioner(BYTE_ORDERED_CLASS);
        map.update_host(&host(1, "dc1", "r1"), ["b"]);
        map.update_keyspace("ks", &simple_strategy(1));
        assert!(reader.get_replicas("ks", [b"a".as_slice()]).is_empty());

        map.build();
        assert_eq!(replica_ids(&reader.get_replicas("ks", [b"a".as_slice()])), [1]);

        // Readers and the writer resolve queries against the same snapshot.
        let from_reader = reader.get_replicas("ks", [b"a".as_slice()]);
        let from_map = map.get_replicas("ks", [b"a".as_slice()]);
        assert!(Arc::ptr_eq(&from_reader, &from_map));

        map.clear();
        assert!(reader.get_replicas("ks", [b"a".as_slice()]).is_empty());
    }

    #[test]
    fn test_network_topology_keyspace_end_to_end() {
        setup_tracing();
        let mut map = TokenMap::new();
        map.set_partitioner(BYTE_ORDERED_CLASS);
        map.update_host(&Arc::new(Host::new(id_to_invalid_addr(1), Some("dc1".into()), Some("r1".into()))), ["b"]);
        map.update_host(&Arc::new(Host::new(id_to_invalid_addr(2), Some("dc1".into()), Some("r2".into()))), ["d"]);
        map.update_host(&Arc::new(Host::new(id_to_invalid_addr(3), Some("dc2".into()), Some("r1".into()))), ["f"]);
        map.update_keyspace(
            "ks",
            &KeyspaceMetadata::new(
                "org.apache.cassandra.locator.NetworkTopologyStrategy",
                [("dc1", "2"), ("dc2", "1")],
            ),
        );
        map.build();

        // Walk from "b": both dc1 racks, then the dc2 host, in walk order.
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"a".as_slice()])), [1, 2, 3]);
        assert_eq!(replica_ids(&map.get_replicas("ks", [b"c".as_slice()])), [2, 3, 1]);
    }
}
