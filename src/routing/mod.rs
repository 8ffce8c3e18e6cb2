//! The ring coordinate system: tokens, partitioners, the ring index and the
//! replica locator.

pub mod locator;
mod md5;
pub mod partitioner;
pub(crate) mod ring;

use std::fmt;

use smallvec::SmallVec;

/// Token is a position on the ring, produced by hashing a partition key or
/// by parsing the cluster's textual token representation.
///
/// A token is an opaque immutable byte string whose width is fixed by the
/// active partitioner: 8 bytes for `Murmur3Partitioner`, 16 bytes for
/// `RandomPartitioner`, and a raw key prefix of arbitrary length for
/// `ByteOrderedPartitioner`. Ordering is lexicographic unsigned byte
/// comparison in all three cases. The numeric partitioners store their
/// tokens in a biased big-endian form so that this byte order coincides
/// with the cluster's signed/unsigned ring arithmetic.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct Token {
    // Inline capacity covers both numeric widths, so only ByteOrdered
    // tokens longer than 16 bytes ever spill to the heap.
    bytes: SmallVec<[u8; 16]>,
}

impl Token {
    /// Canonical encoding of a Murmur3 ring position: the signed hash mapped
    /// monotonically onto [0, 2^64 - 1] and stored big-endian.
    #[inline]
    pub(crate) fn from_murmur3(hash: i64) -> Self {
        let biased = (hash as u64).wrapping_add(1 << 63);
        Token {
            bytes: SmallVec::from_slice(&biased.to_be_bytes()),
        }
    }

    /// Canonical encoding of a Random ring position: an unsigned 128-bit
    /// integer as two big-endian 64-bit limbs, high limb first.
    #[inline]
    pub(crate) fn from_u128_limbs(hi: u64, lo: u64) -> Self {
        let mut bytes = SmallVec::new();
        bytes.extend_from_slice(&hi.to_be_bytes());
        bytes.extend_from_slice(&lo.to_be_bytes());
        Token { bytes }
    }

    /// A ring position given by raw bytes: a ByteOrdered key prefix, or a
    /// full MD5 digest for the Random partitioner.
    #[inline]
    pub(crate) fn from_key_bytes(key: &[u8]) -> Self {
        Token {
            bytes: SmallVec::from_slice(key),
        }
    }

    /// The token's canonical byte encoding.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(0x")?;
        for byte in &self.bytes {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}
