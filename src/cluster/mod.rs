//! Entities fed to the token map by the external metadata layer:
//! host descriptors and keyspace schema metadata.

pub mod host;
pub mod metadata;

pub use host::{Host, HostRef, HostVec};
pub use metadata::{KeyspaceMetadata, ReplicationStrategy};
