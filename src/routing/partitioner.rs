//! Partitioners are algorithms that define the ring coordinate system: they
//! parse the cluster's textual token representation and compute the token
//! for a given partition key, ultimately allowing requests to be routed to
//! the replicas that really own the data. Three partitioners are supported:
//! - Murmur3Partitioner
//!     - the default partitioner,
//!     - modified for compatibility with Cassandra's buggy implementation,
//! - RandomPartitioner
//!     - MD5-based, found on long-lived clusters,
//! - ByteOrderedPartitioner
//!     - order-preserving, tokens are raw key bytes.
//!
//! All three encode their tokens so that lexicographic byte comparison of
//! [`Token`]s agrees with the ring order the cluster itself uses; see
//! [`Token`] for the encodings.

use bytes::Buf;
use std::num::Wrapping;

use crate::errors::MalformedTokenError;
use crate::routing::md5::Md5;
use crate::routing::Token;

/// The partitioner in force for a cluster, picked by matching the suffix of
/// the fully-qualified partitioner class name reported by the cluster.
#[derive(Clone, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum PartitionerName {
    Murmur3,
    Random,
    ByteOrdered,
}

impl PartitionerName {
    pub(crate) fn from_str(name: &str) -> Option<Self> {
        if name.ends_with("Murmur3Partitioner") {
            Some(PartitionerName::Murmur3)
        } else if name.ends_with("RandomPartitioner") {
            Some(PartitionerName::Random)
        } else if name.ends_with("ByteOrderedPartitioner") {
            Some(PartitionerName::ByteOrdered)
        } else {
            None
        }
    }

    /// Parses the cluster's textual token representation into the canonical
    /// encoding: a decimal signed 64-bit integer for Murmur3, a decimal
    /// unsigned 128-bit integer for Random, raw bytes for ByteOrdered.
    pub(crate) fn token_from_string(&self, literal: &str) -> Result<Token, MalformedTokenError> {
        match self {
            PartitionerName::Murmur3 => {
                let value: i64 = literal.parse().map_err(|_| MalformedTokenError {
                    literal: literal.to_owned(),
                })?;
                Ok(Token::from_murmur3(value))
            }
            PartitionerName::Random => {
                let (hi, lo) = parse_decimal_u128(literal);
                Ok(Token::from_u128_limbs(hi, lo))
            }
            PartitionerName::ByteOrdered => Ok(Token::from_key_bytes(literal.as_bytes())),
        }
    }

    /// Hashes an ordered sequence of pre-serialized partition key parts into
    /// a token. Parts are fed into the hash in order, with no separators.
    pub(crate) fn hash_key_parts<'a>(
        &self,
        key_parts: impl IntoIterator<Item = &'a [u8]>,
    ) -> Token {
        let mut hasher = self.build_hasher();
        for part in key_parts {
            hasher.write(part);
        }
        hasher.finish()
    }
}

impl Partitioner for PartitionerName {
    type Hasher = PartitionerHasherAny;

    fn build_hasher(&self) -> Self::Hasher {
        match self {
            PartitionerName::Murmur3 => {
                PartitionerHasherAny::Murmur3(Murmur3Partitioner.build_hasher())
            }
            PartitionerName::Random => {
                PartitionerHasherAny::Random(RandomPartitioner.build_hasher())
            }
            PartitionerName::ByteOrdered => {
                PartitionerHasherAny::ByteOrdered(ByteOrderedPartitioner.build_hasher())
            }
        }
    }
}

pub(crate) enum PartitionerHasherAny {
    Murmur3(Murmur3PartitionerHasher),
    Random(RandomPartitionerHasher),
    ByteOrdered(ByteOrderedPartitionerHasher),
}

impl PartitionerHasher for PartitionerHasherAny {
    fn write(&mut self, pk_part: &[u8]) {
        match self {
            PartitionerHasherAny::Murmur3(h) => h.write(pk_part),
            PartitionerHasherAny::Random(h) => h.write(pk_part),
            PartitionerHasherAny::ByteOrdered(h) => h.write(pk_part),
        }
    }

    fn finish(&self) -> Token {
        match self {
            PartitionerHasherAny::Murmur3(h) => h.finish(),
            PartitionerHasherAny::Random(h) => h.finish(),
            PartitionerHasherAny::ByteOrdered(h) => h.finish(),
        }
    }
}

/// A trait for creating instances of `PartitionerHasher`, which ultimately
/// compute the token.
///
/// The partitioners' design is based on std::hash design: `Partitioner`
/// corresponds to `BuildHasher`, and `PartitionerHasher` to `Hasher`.
pub(crate) trait Partitioner {
    type Hasher: PartitionerHasher;

    fn build_hasher(&self) -> Self::Hasher;

    fn hash_one(&self, data: &[u8]) -> Token {
        let mut hasher = self.build_hasher();
        hasher.write(data);
        hasher.finish()
    }
}

/// A trait for hashing a stream of serialized key parts.
///
/// Instances of this trait are created by a `Partitioner` and are stateful.
/// At any point, one can call `finish()` and a `Token` will be computed
/// based on values that have been fed so far.
pub(crate) trait PartitionerHasher {
    fn write(&mut self, pk_part: &[u8]);
    fn finish(&self) -> Token;
}

pub(crate) struct Murmur3Partitioner;

impl Partitioner for Murmur3Partitioner {
    type Hasher = Murmur3PartitionerHasher;

    fn build_hasher(&self) -> Self::Hasher {
        Self::Hasher {
            total_len: 0,
            buf: Default::default(),
            h1: Wrapping(0),
            h2: Wrapping(0),
        }
    }
}

pub(crate) struct Murmur3PartitionerHasher {
    total_len: usize,
    buf: [u8; Self::BUF_CAPACITY],
    h1: Wrapping<i64>,
    h2: Wrapping<i64>,
}

impl Murmur3PartitionerHasher {
    const BUF_CAPACITY: usize = 16;

    const C1: Wrapping<i64> = Wrapping(0x87c3_7b91_1142_53d5_u64 as i64);
    const C2: Wrapping<i64> = Wrapping(0x4cf5_ad43_2745_937f_u64 as i64);

    fn hash_16_bytes(&mut self, mut k1: Wrapping<i64>, mut k2: Wrapping<i64>) {
        k1 *= Self::C1;
        k1 = Self::rotl64(k1, 31);
        k1 *= Self::C2;
        self.h1 ^= k1;

        self.h1 = Self::rotl64(self.h1, 27);
        self.h1 += self.h2;
        self.h1 = self.h1 * Wrapping(5) + Wrapping(0x52dce729);

        k2 *= Self::C2;
        k2 = Self::rotl64(k2, 33);
        k2 *= Self::C1;
        self.h2 ^= k2;

        self.h2 = Self::rotl64(self.h2, 31);
        self.h2 += self.h1;
        self.h2 = self.h2 * Wrapping(5) + Wrapping(0x38495ab5);
    }

    fn fetch_16_bytes_from_buf(buf: &mut &[u8]) -> (Wrapping<i64>, Wrapping<i64>) {
        let k1 = Wrapping(buf.get_i64_le());
        let k2 = Wrapping(buf.get_i64_le());
        (k1, k2)
    }

    #[inline]
    fn rotl64(v: Wrapping<i64>, n: u32) -> Wrapping<i64> {
        Wrapping((v.0 << n) | (v.0 as u64 >> (64 - n)) as i64)
    }

    #[inline]
    fn fmix(mut k: Wrapping<i64>) -> Wrapping<i64> {
        k ^= Wrapping((k.0 as u64 >> 33) as i64);
        k *= Wrapping(0xff51afd7ed558ccd_u64 as i64);
        k ^= Wrapping((k.0 as u64 >> 33) as i64);
        k *= Wrapping(0xc4ceb9fe1a85ec53_u64 as i64);
        k ^= Wrapping((k.0 as u64 >> 33) as i64);

        k
    }
}

// The implemented Murmur3 algorithm is roughly as follows:
// 1. while there are at least 16 bytes given:
//      consume 16 bytes by parsing them into i64s, then
//      include them in h1, h2, k1, k2;
// 2. do some magic with remaining n < 16 bytes,
//      include them in h1, h2, k1, k2;
// 3. compute the token based on h1, h2, k1, k2.
//
// Therefore, the buffer of capacity 16 is used. As soon as it gets full,
// point 1. is executed. Points 2. and 3. are exclusively done in `finish()`,
// so they don't mutate the state.
//
// Note the `as i8 as i64` sign extension in the tail loops: it reproduces
// Cassandra's signed-char bug and is required for interop.
impl PartitionerHasher for Murmur3PartitionerHasher {
    fn write(&mut self, mut pk_part: &[u8]) {
        let mut buf_len = self.total_len % Self::BUF_CAPACITY;
        self.total_len += pk_part.len();

        // If the buffer is nonempty and can be filled completely, so that we
        // can fetch two i64s from it, fill it and hash its contents, then
        // make it empty.
        if buf_len > 0 && Self::BUF_CAPACITY - buf_len <= pk_part.len() {
            // First phase: populate buffer until full, then consume two i64s.
            let to_write = Ord::min(Self::BUF_CAPACITY - buf_len, pk_part.len());
            self.buf[buf_len..buf_len + to_write].copy_from_slice(&pk_part[..to_write]);
            pk_part.advance(to_write);
            buf_len += to_write;

            debug_assert_eq!(buf_len, Self::BUF_CAPACITY);
            let mut buf_ptr = &self.buf[..];
            let (k1, k2) = Self::fetch_16_bytes_from_buf(&mut buf_ptr);
            debug_assert!(buf_ptr.is_empty());
            self.hash_16_bytes(k1, k2);
            buf_len = 0;
        }

        // If there were enough data, now we have an empty buffer. Further
        // data, if enough, can be hence hashed directly from the external
        // buffer.
        if buf_len == 0 {
            // Second phase: fast path for big values.
            while pk_part.len() >= Self::BUF_CAPACITY {
                let (k1, k2) = Self::fetch_16_bytes_from_buf(&mut pk_part);
                self.hash_16_bytes(k1, k2);
            }
        }

        // Third phase: move remaining bytes to the buffer.
        debug_assert!(pk_part.len() < Self::BUF_CAPACITY - buf_len);
        let to_write = pk_part.len();
        self.buf[buf_len..buf_len + to_write].copy_from_slice(&pk_part[..to_write]);
        pk_part.advance(to_write);
        buf_len += to_write;
        debug_assert!(pk_part.is_empty());

        debug_assert!(buf_len < Self::BUF_CAPACITY);
    }

    fn finish(&self) -> Token {
        let mut h1 = self.h1;
        let mut h2 = self.h2;

        let mut k1 = Wrapping(0_i64);
        let mut k2 = Wrapping(0_i64);

        let buf_len = self.total_len % Self::BUF_CAPACITY;

        if buf_len > 8 {
            for i in (8..buf_len).rev() {
                k2 ^= Wrapping(self.buf[i] as i8 as i64) << ((i - 8) * 8);
            }

            k2 *= Self::C2;
            k2 = Self::rotl64(k2, 33);
            k2 *= Self::C1;
            h2 ^= k2;
        }

        if buf_len > 0 {
            for i in (0..std::cmp::min(8, buf_len)).rev() {
                k1 ^= Wrapping(self.buf[i] as i8 as i64) << (i * 8);
            }

            k1 *= Self::C1;
            k1 = Self::rotl64(k1, 31);
            k1 *= Self::C2;
            h1 ^= k1;
        }

        h1 ^= Wrapping(self.total_len as i64);
        h2 ^= Wrapping(self.total_len as i64);

        h1 += h2;
        h2 += h1;

        h1 = Self::fmix(h1);
        h2 = Self::fmix(h2);

        h1 += h2;

        // The 128-bit variant with only the low 64 output bits retained.
        Token::from_murmur3(h1.0)
    }
}

pub(crate) struct RandomPartitioner;

impl Partitioner for RandomPartitioner {
    type Hasher = RandomPartitionerHasher;

    fn build_hasher(&self) -> Self::Hasher {
        Self::Hasher { hash: Md5::new() }
    }
}

pub(crate) struct RandomPartitionerHasher {
    hash: Md5,
}

impl PartitionerHasher for RandomPartitionerHasher {
    fn write(&mut self, pk_part: &[u8]) {
        self.hash.update(pk_part);
    }

    fn finish(&self) -> Token {
        let digest = self.hash.clone().finalize();
        Token::from_key_bytes(&digest)
    }
}

pub(crate) struct ByteOrderedPartitioner;

impl Partitioner for ByteOrderedPartitioner {
    type Hasher = ByteOrderedPartitionerHasher;

    fn build_hasher(&self) -> Self::Hasher {
        Self::Hasher { key: Vec::new() }
    }
}

pub(crate) struct ByteOrderedPartitionerHasher {
    key: Vec<u8>,
}

impl PartitionerHasher for ByteOrderedPartitionerHasher {
    fn write(&mut self, pk_part: &[u8]) {
        self.key.extend_from_slice(pk_part);
    }

    fn finish(&self) -> Token {
        Token::from_key_bytes(&self.key)
    }
}

/// Schoolbook decimal parse of an unsigned 128-bit integer over two 64-bit
/// limbs, multiplying by 10 as `(x << 1) + (x << 3)` with manual carry
/// propagation between the limbs.
///
/// Leading whitespace is skipped; the first non-digit terminates parsing; an
/// empty or all-whitespace input yields zero. The server only emits tokens
/// in [0, 2^127], so overflow handling is not required.
fn parse_decimal_u128(literal: &str) -> (u64, u64) {
    let mut hi: u64 = 0;
    let mut lo: u64 = 0;

    for byte in literal.bytes().skip_while(u8::is_ascii_whitespace) {
        if !byte.is_ascii_digit() {
            break;
        }

        // value *= 10
        let lo2 = lo << 1;
        let lo8 = lo << 3;
        let (mul_lo, carry) = lo2.overflowing_add(lo8);
        let mul_hi = (lo >> 63)
            .wrapping_add(hi << 1)
            .wrapping_add(lo >> 61)
            .wrapping_add(hi << 3)
            .wrapping_add(carry as u64);

        // value += digit
        let (new_lo, carry) = mul_lo.overflowing_add((byte - b'0') as u64);
        lo = new_lo;
        hi = mul_hi.wrapping_add(carry as u64);
    }

    (hi, lo)
}
