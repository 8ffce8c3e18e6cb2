//! Client-side topology oracle for Dynamo-style clusters.
//!
//! Given a keyspace and a pre-serialized partition key, [`TokenMap`] answers
//! "which hosts own this key, and in what preference order?" without any
//! round-trip to the cluster. It is fed topology and schema events by an
//! external metadata layer and is queried on the request path.
//!
//! # Overview
//! The map is composed of three pieces:
//! * [`routing::partitioner`] - the ring coordinate system: parses the
//!   cluster's textual token representation and hashes partition keys onto
//!   the ring (`Murmur3Partitioner`, `RandomPartitioner`,
//!   `ByteOrderedPartitioner`),
//! * a sorted token -> host ring index, maintained incrementally as hosts
//!   join, move or leave,
//! * [`routing::locator`] - per-keyspace materialisation of the replica list
//!   for every ring slot, driven by the keyspace's
//!   [`ReplicationStrategy`](cluster::ReplicationStrategy).
//!
//! # Threading model
//! [`TokenMap`] is a read-mostly structure with a single writer: all
//! mutating operations take `&mut self`, so writer serialisation is expressed
//! in the type system. Request threads use a [`TokenMapReader`] obtained from
//! [`TokenMap::reader`]; its lookups are lock-free loads of an immutable
//! snapshot, so a reader always observes either the pre-update or the
//! post-update state of a keyspace, never a torn intermediate.
//!
//! The map performs no I/O and owns no threads. Host descriptors are owned
//! by the metadata layer and shared with the map by [`Arc`](std::sync::Arc)
//! handle.
//!
//! # Example
//! ```
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use token_map::cluster::{Host, KeyspaceMetadata};
//! use token_map::TokenMap;
//!
//! let addr: SocketAddr = "10.0.0.1:9042".parse().unwrap();
//! let host = Arc::new(Host::new(addr, Some("dc1".into()), Some("r1".into())));
//!
//! let mut map = TokenMap::new();
//! map.set_partitioner("org.apache.cassandra.dht.Murmur3Partitioner");
//! map.update_host(&host, ["0"]);
//! map.update_keyspace("ks", &KeyspaceMetadata::new("SimpleStrategy", [("replication_factor", "1")]));
//! map.build();
//!
//! let replicas = map.get_replicas("ks", [b"some key".as_slice()]);
//! assert_eq!(replicas.as_slice(), [host]);
//! ```

pub mod cluster;
pub mod errors;
pub mod routing;
mod token_map;

pub use token_map::{TokenMap, TokenMapReader};
