//! The ring index: a sorted token -> host map maintained incrementally as
//! hosts join, move or leave the cluster.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::cluster::Host;
use crate::routing::Token;

/// Sorted mapping from token to the host owning that ring position, with a
/// side set of every mapped host address.
///
/// Tokens are globally unique: re-inserting an existing token overwrites its
/// owner. Every address owning at least one ring entry (or registered via
/// [`update_host`](TokenHostRing::update_host), even token-less) is present
/// in the mapped-address set; removal is atomic across both structures.
#[derive(Debug, Default, Clone)]
pub(crate) struct TokenHostRing {
    ring: BTreeMap<Token, Arc<Host>>,
    mapped_addresses: HashSet<SocketAddr>,
}

impl TokenHostRing {
    /// Re-registers a host and the ring positions it owns.
    ///
    /// Existing entries for the host's address are purged first rather than
    /// diff-merged: host updates only happen for "new" or "moved" hosts, and
    /// moves only occur on non-vnode clusters, where the ring is small and
    /// cheap to repopulate.
    pub(crate) fn update_host(&mut self, host: &Arc<Host>, tokens: impl IntoIterator<Item = Token>) {
        self.purge_address(host.address);

        for token in tokens {
            self.ring.insert(token, Arc::clone(host));
        }
        self.mapped_addresses.insert(host.address);
    }

    /// Forgets an address and every ring entry it owns. Returns whether the
    /// address was known.
    pub(crate) fn purge_address(&mut self, addr: SocketAddr) -> bool {
        if !self.mapped_addresses.remove(&addr) {
            return false;
        }

        self.ring.retain(|_, host| host.address != addr);
        true
    }

    /// Iterates over ring entries in token order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Token, &Arc<Host>)> {
        self.ring.iter()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.ring.len()
    }

    pub(crate) fn clear(&mut self) {
        self.ring.clear();
        self.mapped_addresses.clear();
    }

    #[cfg(test)]
    pub(crate) fn mapped_addresses(&self) -> &HashSet<SocketAddr> {
        &self.mapped_addresses
    }
}

#[cfg(test)]
mod tests {
    use super::TokenHostRing;
    use crate::routing::locator::test::{host, ring_token};
    use crate::test_utils::setup_tracing;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_moved_host_leaves_no_stale_entries() {
        setup_tracing();
        let h = host(1, "dc1", "r1");

        let mut ring = TokenHostRing::default();
        ring.update_host(&h, [ring_token(10)]);
        ring.update_host(&h, [ring_token(20)]);

        let tokens: Vec<_> = ring.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(tokens, [ring_token(20)]);
        assert_eq!(
            ring.mapped_addresses(),
            &HashSet::from([h.address])
        );
    }

    #[test]
    fn test_duplicate_token_overwrites_owner() {
        setup_tracing();
        let a = host(1, "dc1", "r1");
        let b = host(2, "dc1", "r1");

        let mut ring = TokenHostRing::default();
        ring.update_host(&a, [ring_token(10), ring_token(30)]);
        ring.update_host(&b, [ring_token(10)]);

        let owners: Vec<_> = ring.iter().map(|(_, h)| Arc::clone(h)).collect();
        assert_eq!(owners, [Arc::clone(&b), Arc::clone(&a)]);
    }

    #[test]
    fn test_purge_address_is_atomic_across_ring_and_address_set() {
        setup_tracing();
        let a = host(1, "dc1", "r1");
        let b = host(2, "dc1", "r2");

        let mut ring = TokenHostRing::default();
        ring.update_host(&a, [ring_token(10), ring_token(30)]);
        ring.update_host(&b, [ring_token(20)]);

        assert!(ring.purge_address(a.address));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.mapped_addresses(), &HashSet::from([b.address]));
        // Address consistency: every ring owner is a mapped address.
        for (_, owner) in ring.iter() {
            assert!(ring.mapped_addresses().contains(&owner.address));
        }

        assert!(!ring.purge_address(a.address));
    }

    #[test]
    fn test_token_less_host_is_still_mapped() {
        setup_tracing();
        let h = host(1, "dc1", "r1");

        let mut ring = TokenHostRing::default();
        ring.update_host(&h, []);
        assert_eq!(ring.len(), 0);
        assert!(ring.mapped_addresses().contains(&h.address));
        assert!(ring.purge_address(h.address));
    }
}
