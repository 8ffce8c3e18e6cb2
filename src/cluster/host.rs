use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;

/// Host represents a cluster node together with its topology labels.
///
/// The token map never creates or mutates hosts; it holds shared handles to
/// instances owned by the metadata layer. A host is identified by its
/// address - if a host changes its datacenter or rack, the metadata layer is
/// expected to remove it and re-add it with fresh labels.
#[derive(Debug)]
pub struct Host {
    /// Address of the node (IP + port). This is the host's identity.
    pub address: SocketAddr,
    /// Datacenter the host is in, if known.
    pub datacenter: Option<String>,
    /// Rack the host is in, if known.
    pub rack: Option<String>,
}

/// A way that hosts are passed around and compared in this crate.
pub type HostRef<'a> = &'a Arc<Host>;

/// An ordered replica preference list, shared by reference count.
///
/// Replica lists are immutable once materialised and are deeply shared: many
/// ring slots, and many published map snapshots, point at the same
/// allocation. Updates build fresh lists and swap them in wholesale.
pub type HostVec = Arc<Vec<Arc<Host>>>;

impl Host {
    /// Creates a new host descriptor.
    pub fn new(address: SocketAddr, datacenter: Option<String>, rack: Option<String>) -> Self {
        Host {
            address,
            datacenter,
            rack,
        }
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}
