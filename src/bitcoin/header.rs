//! Bitcoin block header codec and proof-of-work arithmetic.
//!
//! Headers are the fixed 80-byte wire layout: version, previous block
//! hash, merkle root, time, bits, nonce. Hashes and targets are kept in
//! internal (little-endian) byte order throughout.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::double_sha256;

/// Exact serialized header size.
pub const HEADER_SIZE: usize = 80;

/// Compact bits of the maximum (difficulty-1) target.
pub const MAX_TARGET_BITS: u32 = 0x1d00ffff;

/// Header parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid header length: {0} bytes")]
    BadLength(usize),
}

/// Parsed Bitcoin block header (80 bytes on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Parse from raw 80-byte format (little-endian fields).
    pub fn from_raw(raw: &[u8]) -> Result<Self, HeaderError> {
        if raw.len() != HEADER_SIZE {
            return Err(HeaderError::BadLength(raw.len()));
        }
        Ok(Self {
            version: i32::from_le_bytes(raw[0..4].try_into().unwrap()),
            prev_block_hash: raw[4..36].try_into().unwrap(),
            merkle_root: raw[36..68].try_into().unwrap(),
            timestamp: u32::from_le_bytes(raw[68..72].try_into().unwrap()),
            bits: u32::from_le_bytes(raw[72..76].try_into().unwrap()),
            nonce: u32::from_le_bytes(raw[76..80].try_into().unwrap()),
        })
    }

    /// Serialize to raw 80-byte format.
    pub fn to_raw(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        raw[0..4].copy_from_slice(&self.version.to_le_bytes());
        raw[4..36].copy_from_slice(&self.prev_block_hash);
        raw[36..68].copy_from_slice(&self.merkle_root);
        raw[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        raw[72..76].copy_from_slice(&self.bits.to_le_bytes());
        raw[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        raw
    }

    /// Block hash (double SHA-256 of the raw header, internal byte order).
    pub fn block_hash(&self) -> [u8; 32] {
        double_sha256(&self.to_raw())
    }

    /// Full 256-bit target implied by the compact bits field.
    pub fn target(&self) -> [u8; 32] {
        bits_to_target(self.bits)
    }
}

/// Convert compact bits to the full little-endian target.
pub fn bits_to_target(bits: u32) -> [u8; 32] {
    let mut target = [0u8; 32];
    let exponent = ((bits >> 24) & 0xff) as usize;
    let mantissa = bits & 0x007fffff;

    if exponent <= 3 {
        let shift = 8 * (3 - exponent);
        let value = mantissa >> shift;
        target[0..4].copy_from_slice(&value.to_le_bytes());
    } else if exponent <= 34 {
        let byte_offset = exponent - 3;
        if byte_offset < 30 {
            target[byte_offset] = (mantissa & 0xff) as u8;
            target[byte_offset + 1] = ((mantissa >> 8) & 0xff) as u8;
            target[byte_offset + 2] = ((mantissa >> 16) & 0xff) as u8;
        }
    }

    target
}

/// Check whether a block hash satisfies a target (both little-endian).
pub fn hash_meets_target(hash: &[u8; 32], target: &[u8; 32]) -> bool {
    for i in (0..32).rev() {
        if hash[i] > target[i] {
            return false;
        }
        if hash[i] < target[i] {
            return true;
        }
    }
    true
}

/// Difficulty implied by a target: floor(max_target / target), floored
/// at 1 so that minimum-difficulty chains still accumulate countable
/// work.
pub fn difficulty_from_target(target: &[u8; 32]) -> u64 {
    let max_target = bits_to_target(MAX_TARGET_BITS);
    let quotient = u256_div(&to_limbs(&max_target), &to_limbs(target));
    // Quotient above u64::MAX cannot occur for real compact targets,
    // but saturate rather than truncate.
    let high = quotient[1] | quotient[2] | quotient[3];
    let d = if high != 0 { u64::MAX } else { quotient[0] };
    d.max(1)
}

// 256-bit helpers on 4 little-endian u64 limbs.

fn to_limbs(le_bytes: &[u8; 32]) -> [u64; 4] {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        *limb = u64::from_le_bytes(le_bytes[i * 8..i * 8 + 8].try_into().unwrap());
    }
    limbs
}

fn u256_cmp(a: &[u64; 4], b: &[u64; 4]) -> std::cmp::Ordering {
    for i in (0..4).rev() {
        match a[i].cmp(&b[i]) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

fn u256_sub(a: &mut [u64; 4], b: &[u64; 4]) {
    let mut borrow = 0u64;
    for i in 0..4 {
        let (v, b1) = a[i].overflowing_sub(b[i]);
        let (v, b2) = v.overflowing_sub(borrow);
        a[i] = v;
        borrow = (b1 as u64) + (b2 as u64);
    }
}

fn u256_shl1(a: &mut [u64; 4]) {
    for i in (1..4).rev() {
        a[i] = (a[i] << 1) | (a[i - 1] >> 63);
    }
    a[0] <<= 1;
}

/// Shift-subtract long division: floor(dividend / divisor).
/// A zero divisor yields all-ones (saturated), mapping a zero target to
/// "unrepresentably hard".
fn u256_div(dividend: &[u64; 4], divisor: &[u64; 4]) -> [u64; 4] {
    if *divisor == [0u64; 4] {
        return [u64::MAX; 4];
    }

    let mut quotient = [0u64; 4];
    let mut remainder = [0u64; 4];

    for bit in (0..256).rev() {
        u256_shl1(&mut remainder);
        remainder[0] |= (dividend[bit / 64] >> (bit % 64)) & 1;
        if u256_cmp(&remainder, divisor) != std::cmp::Ordering::Less {
            u256_sub(&mut remainder, divisor);
            quotient[bit / 64] |= 1 << (bit % 64);
        }
    }

    quotient
}
