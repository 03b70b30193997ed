//! Raw Bitcoin transaction plumbing.
//!
//! Transactions arrive pre-split into their four serialized fields
//! (version, input vector, output vector, locktime); the txid is the
//! double SHA-256 over their concatenation. Output vectors are parsed
//! with strict bounds checking, and locking scripts are classified into
//! the standard hash-based forms plus OP_RETURN.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::address::ScriptType;
use super::hash::double_sha256;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_RETURN: u8 = 0x6a;
const OP_0: u8 = 0x00;
const OP_PUSHBYTES_20: u8 = 0x14;
const OP_PUSHBYTES_32: u8 = 0x20;

/// Transaction parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("truncated varint")]
    TruncatedVarint,

    #[error("non-canonical varint encoding")]
    NonCanonicalVarint,

    #[error("truncated output vector at output {0}")]
    TruncatedOutput(usize),

    #[error("trailing bytes after output vector")]
    TrailingBytes,

    #[error("empty output vector")]
    EmptyOutputVector,
}

/// The four serialized fields of a Bitcoin transaction.
///
/// Input and output vectors are kept as raw bytes (varint-prefixed wire
/// form); the version and locktime are fixed 4-byte little-endian fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    pub version: [u8; 4],
    pub input_vector: Vec<u8>,
    pub output_vector: Vec<u8>,
    pub locktime: [u8; 4],
}

impl TxInfo {
    /// Canonical transaction hash (txid, internal byte order): double
    /// SHA-256 over version ‖ inputs ‖ outputs ‖ locktime.
    pub fn txid(&self) -> [u8; 32] {
        let mut raw = Vec::with_capacity(8 + self.input_vector.len() + self.output_vector.len());
        raw.extend_from_slice(&self.version);
        raw.extend_from_slice(&self.input_vector);
        raw.extend_from_slice(&self.output_vector);
        raw.extend_from_slice(&self.locktime);
        double_sha256(&raw)
    }

    /// Parse the output vector into structured outputs.
    pub fn outputs(&self) -> Result<Vec<TxOut>, TxError> {
        parse_output_vector(&self.output_vector)
    }
}

/// One transaction output: value plus locking script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value_sats: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// Extract (script type, script hash) for the standard hash-based
    /// locking scripts. Returns `None` for anything else.
    pub fn script_hash(&self) -> Option<(ScriptType, &[u8])> {
        let s = &self.script_pubkey;
        match s.as_slice() {
            // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
            [OP_DUP, OP_HASH160, OP_PUSHBYTES_20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG]
                if hash.len() == 20 =>
            {
                Some((ScriptType::P2pkh, hash))
            }
            // OP_HASH160 <20> OP_EQUAL
            [OP_HASH160, OP_PUSHBYTES_20, hash @ .., OP_EQUAL] if hash.len() == 20 => {
                Some((ScriptType::P2sh, hash))
            }
            // OP_0 <20>
            [OP_0, OP_PUSHBYTES_20, hash @ ..] if hash.len() == 20 => {
                Some((ScriptType::P2wpkh, hash))
            }
            // OP_0 <32>
            [OP_0, OP_PUSHBYTES_32, hash @ ..] if hash.len() == 32 => {
                Some((ScriptType::P2wsh, hash))
            }
            _ => None,
        }
    }

    /// Extract the data payload of an OP_RETURN output, if this is one.
    /// Only the single-pushdata form `OP_RETURN <push> <data>` is
    /// recognized.
    pub fn op_return_payload(&self) -> Option<&[u8]> {
        let s = &self.script_pubkey;
        if s.len() < 2 || s[0] != OP_RETURN {
            return None;
        }
        let push = s[1] as usize;
        // Direct pushes only (1..=75 bytes)
        if push == 0 || push > 75 || s.len() != 2 + push {
            return None;
        }
        Some(&s[2..])
    }
}

/// Build a locking script for a (script type, script hash) pair.
pub fn script_pubkey_for(script_type: ScriptType, script_hash: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(script_hash.len() + 5);
    match script_type {
        ScriptType::P2pkh => {
            s.extend_from_slice(&[OP_DUP, OP_HASH160, OP_PUSHBYTES_20]);
            s.extend_from_slice(script_hash);
            s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        }
        ScriptType::P2sh => {
            s.extend_from_slice(&[OP_HASH160, OP_PUSHBYTES_20]);
            s.extend_from_slice(script_hash);
            s.push(OP_EQUAL);
        }
        ScriptType::P2wpkh => {
            s.extend_from_slice(&[OP_0, OP_PUSHBYTES_20]);
            s.extend_from_slice(script_hash);
        }
        ScriptType::P2wsh => {
            s.extend_from_slice(&[OP_0, OP_PUSHBYTES_32]);
            s.extend_from_slice(script_hash);
        }
    }
    s
}

/// Parse a varint-prefixed output vector into structured outputs.
pub fn parse_output_vector(data: &[u8]) -> Result<Vec<TxOut>, TxError> {
    let (count, mut pos) = read_varint(data)?;
    if count == 0 {
        return Err(TxError::EmptyOutputVector);
    }

    let mut outputs = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        if data.len() < pos + 8 {
            return Err(TxError::TruncatedOutput(i));
        }
        let value_sats = u64::from_le_bytes(
            data[pos..pos + 8]
                .try_into()
                .map_err(|_| TxError::TruncatedOutput(i))?,
        );
        pos += 8;

        let (script_len, used) = read_varint(&data[pos..])?;
        pos += used;
        // Declared lengths can exceed the buffer (or usize); bound them
        // without overflowing.
        let script_len = usize::try_from(script_len).map_err(|_| TxError::TruncatedOutput(i))?;
        let end = pos
            .checked_add(script_len)
            .ok_or(TxError::TruncatedOutput(i))?;
        if data.len() < end {
            return Err(TxError::TruncatedOutput(i));
        }
        outputs.push(TxOut {
            value_sats,
            script_pubkey: data[pos..end].to_vec(),
        });
        pos = end;
    }

    if pos != data.len() {
        return Err(TxError::TrailingBytes);
    }
    Ok(outputs)
}

/// Serialize outputs into a varint-prefixed output vector (test support
/// and re-encoding).
pub fn serialize_output_vector(outputs: &[TxOut]) -> Vec<u8> {
    let mut out = Vec::new();
    push_varint(&mut out, outputs.len() as u64);
    for o in outputs {
        out.extend_from_slice(&o.value_sats.to_le_bytes());
        push_varint(&mut out, o.script_pubkey.len() as u64);
        out.extend_from_slice(&o.script_pubkey);
    }
    out
}

/// Read a Bitcoin CompactSize varint. Returns (value, bytes consumed).
/// Non-minimal encodings are rejected.
pub fn read_varint(data: &[u8]) -> Result<(u64, usize), TxError> {
    let first = *data.first().ok_or(TxError::TruncatedVarint)?;
    match first {
        0x00..=0xfc => Ok((first as u64, 1)),
        0xfd => {
            if data.len() < 3 {
                return Err(TxError::TruncatedVarint);
            }
            let v = u16::from_le_bytes([data[1], data[2]]) as u64;
            if v < 0xfd {
                return Err(TxError::NonCanonicalVarint);
            }
            Ok((v, 3))
        }
        0xfe => {
            if data.len() < 5 {
                return Err(TxError::TruncatedVarint);
            }
            let v = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as u64;
            if v <= u16::MAX as u64 {
                return Err(TxError::NonCanonicalVarint);
            }
            Ok((v, 5))
        }
        0xff => {
            if data.len() < 9 {
                return Err(TxError::TruncatedVarint);
            }
            let v = u64::from_le_bytes(
                data[1..9].try_into().map_err(|_| TxError::TruncatedVarint)?,
            );
            if v <= u32::MAX as u64 {
                return Err(TxError::NonCanonicalVarint);
            }
            Ok((v, 9))
        }
    }
}

/// Append a CompactSize varint.
pub fn push_varint(vec: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        vec.push(value as u8);
    } else if value <= 0xffff {
        vec.push(0xfd);
        vec.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffffffff {
        vec.push(0xfe);
        vec.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        vec.push(0xff);
        vec.extend_from_slice(&value.to_le_bytes());
    }
}
