//! Bitcoin address codec.
//!
//! Decodes and validates legacy (Base58Check) and segwit v0 (Bech32)
//! addresses into a script type plus script hash, and derives a P2WPKH
//! address from an uncompressed public key. Both encodings are verified
//! in full: Base58Check with its trailing double-SHA256 checksum, Bech32
//! with the BCH generator-polynomial checksum.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::{double_sha256, hash160};

/// Base58 alphabet (Bitcoin variant, no 0/O/I/l).
const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Bech32 data charset.
const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Legacy version bytes.
const VERSION_P2PKH_MAINNET: u8 = 0x00;
const VERSION_P2SH_MAINNET: u8 = 0x05;
const VERSION_P2PKH_TESTNET: u8 = 0x6f;
const VERSION_P2SH_TESTNET: u8 = 0xc4;

/// Address decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("invalid character: {0}")]
    InvalidCharacter(char),

    #[error("checksum mismatch")]
    BadChecksum,

    #[error("invalid payload length: {0}")]
    BadLength(usize),

    #[error("mixed-case bech32 string")]
    MixedCase,

    #[error("unknown address prefix")]
    UnknownPrefix,

    #[error("unknown version byte: {0:#04x}")]
    UnknownVersionByte(u8),

    #[error("unsupported witness version: {0}")]
    UnsupportedWitnessVersion(u8),

    #[error("non-zero padding bits in bech32 data")]
    InvalidPadding,

    #[error("invalid witness program length: {0}")]
    BadWitnessProgramLength(usize),

    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Script type behind a decoded address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptType {
    /// Legacy pay-to-pubkey-hash (20-byte hash)
    P2pkh,
    /// Legacy pay-to-script-hash (20-byte hash)
    P2sh,
    /// Segwit v0 pay-to-witness-pubkey-hash (20-byte hash)
    P2wpkh,
    /// Segwit v0 pay-to-witness-script-hash (32-byte hash)
    P2wsh,
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P2pkh => write!(f, "p2pkh"),
            Self::P2sh => write!(f, "p2sh"),
            Self::P2wpkh => write!(f, "p2wpkh"),
            Self::P2wsh => write!(f, "p2wsh"),
        }
    }
}

/// A decoded Bitcoin address: script type plus 20- or 32-byte script hash.
///
/// Transient by design; the accounting layers store address strings and
/// re-decode on use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    pub script_type: ScriptType,
    pub script_hash: Vec<u8>,
}

/// Decode and validate a Bitcoin address string.
///
/// Detects Base58Check vs Bech32 by prefix. Any checksum mismatch,
/// malformed length or unrecognized prefix fails explicitly.
pub fn decode_address(addr: &str) -> Result<DecodedAddress, AddressError> {
    if addr.is_empty() {
        return Err(AddressError::Empty);
    }

    let lower = addr.to_lowercase();
    if lower.starts_with("bc1") || lower.starts_with("tb1") {
        return decode_bech32_address(addr);
    }

    decode_base58_address(addr)
}

// ---------------------------------------------------------------------------
// Base58Check
// ---------------------------------------------------------------------------

fn decode_base58_address(addr: &str) -> Result<DecodedAddress, AddressError> {
    let payload = base58check_decode(addr)?;

    // version byte + 20-byte hash
    if payload.len() != 21 {
        return Err(AddressError::BadLength(payload.len()));
    }

    let script_type = match payload[0] {
        VERSION_P2PKH_MAINNET | VERSION_P2PKH_TESTNET => ScriptType::P2pkh,
        VERSION_P2SH_MAINNET | VERSION_P2SH_TESTNET => ScriptType::P2sh,
        other => return Err(AddressError::UnknownVersionByte(other)),
    };

    Ok(DecodedAddress {
        script_type,
        script_hash: payload[1..].to_vec(),
    })
}

/// Decode a Base58Check string, verifying the trailing 4-byte checksum.
/// Returns version byte plus payload (checksum stripped).
pub fn base58check_decode(s: &str) -> Result<Vec<u8>, AddressError> {
    if s.is_empty() {
        return Err(AddressError::Empty);
    }

    // Big-number decode, base 58 to base 256.
    let mut bytes: Vec<u8> = Vec::new();
    for c in s.chars() {
        let digit = BASE58_ALPHABET
            .iter()
            .position(|&a| a as char == c)
            .ok_or(AddressError::InvalidCharacter(c))? as u32;

        let mut carry = digit;
        for b in bytes.iter_mut() {
            let v = (*b as u32) * 58 + carry;
            *b = (v & 0xff) as u8;
            carry = v >> 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    // Leading '1's encode leading zero bytes.
    for c in s.chars() {
        if c != '1' {
            break;
        }
        bytes.push(0);
    }
    bytes.reverse();

    if bytes.len() < 5 {
        return Err(AddressError::BadLength(bytes.len()));
    }

    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    let expected = double_sha256(payload);
    if checksum != &expected[0..4] {
        return Err(AddressError::BadChecksum);
    }

    Ok(payload.to_vec())
}

/// Base58Check-encode a payload (version byte included by the caller).
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = double_sha256(payload);
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[0..4]);

    // Base 256 to base 58.
    let mut digits: Vec<u8> = Vec::new();
    for &byte in &data {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let v = ((*d as u32) << 8) + carry;
            *d = (v % 58) as u8;
            carry = v / 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::new();
    for &byte in &data {
        if byte != 0 {
            break;
        }
        out.push('1');
    }
    for &d in digits.iter().rev() {
        out.push(BASE58_ALPHABET[d as usize] as char);
    }
    out
}

// ---------------------------------------------------------------------------
// Bech32 (segwit v0)
// ---------------------------------------------------------------------------

fn decode_bech32_address(addr: &str) -> Result<DecodedAddress, AddressError> {
    let (hrp, data) = bech32_decode(addr)?;

    if hrp != "bc" && hrp != "tb" {
        return Err(AddressError::UnknownPrefix);
    }
    if data.is_empty() {
        return Err(AddressError::BadLength(0));
    }

    let witness_version = data[0];
    if witness_version != 0 {
        return Err(AddressError::UnsupportedWitnessVersion(witness_version));
    }

    let program = convert_bits_5_to_8(&data[1..])?;
    let script_type = match program.len() {
        20 => ScriptType::P2wpkh,
        32 => ScriptType::P2wsh,
        n => return Err(AddressError::BadWitnessProgramLength(n)),
    };

    Ok(DecodedAddress {
        script_type,
        script_hash: program,
    })
}

/// Decode a bech32 string into (hrp, 5-bit data values), verifying the
/// 6-character checksum. Mixed-case input is rejected outright per BIP-173.
pub fn bech32_decode(s: &str) -> Result<(String, Vec<u8>), AddressError> {
    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(AddressError::MixedCase);
    }

    let s = s.to_lowercase();
    let sep = s.rfind('1').ok_or(AddressError::UnknownPrefix)?;
    if sep == 0 || sep + 7 > s.len() {
        return Err(AddressError::BadLength(s.len()));
    }

    let hrp = &s[..sep];
    for c in hrp.chars() {
        if !(' '..='~').contains(&c) {
            return Err(AddressError::InvalidCharacter(c));
        }
    }

    let mut data = Vec::with_capacity(s.len() - sep - 1);
    for c in s[sep + 1..].chars() {
        let v = BECH32_CHARSET
            .iter()
            .position(|&a| a as char == c)
            .ok_or(AddressError::InvalidCharacter(c))? as u8;
        data.push(v);
    }

    if bech32_polymod(hrp, &data) != 1 {
        return Err(AddressError::BadChecksum);
    }

    // Strip the 6-value checksum.
    data.truncate(data.len() - 6);
    Ok((hrp.to_string(), data))
}

/// Encode a segwit address: hrp, witness version, program bytes.
pub fn bech32_encode(hrp: &str, witness_version: u8, program: &[u8]) -> String {
    let mut data = vec![witness_version];
    data.extend(convert_bits_8_to_5(program));

    // Append checksum: polymod over data plus six zero values, xor 1.
    let mut values = data.clone();
    values.extend_from_slice(&[0u8; 6]);
    let plm = bech32_polymod(hrp, &values) ^ 1;

    let mut out = String::from(hrp);
    out.push('1');
    for &d in &data {
        out.push(BECH32_CHARSET[d as usize] as char);
    }
    for i in 0..6 {
        out.push(BECH32_CHARSET[((plm >> (5 * (5 - i))) & 0x1f) as usize] as char);
    }
    out
}

/// BCH checksum over the expanded hrp followed by the data values.
fn bech32_polymod(hrp: &str, data: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for c in hrp.bytes() {
        chk = polymod_step(chk) ^ ((c >> 5) as u32);
    }
    chk = polymod_step(chk);
    for c in hrp.bytes() {
        chk = polymod_step(chk) ^ ((c & 0x1f) as u32);
    }
    for &d in data {
        chk = polymod_step(chk) ^ (d as u32);
    }
    chk
}

fn polymod_step(pre: u32) -> u32 {
    let b = pre >> 25;
    ((pre & 0x1ffffff) << 5)
        ^ (if b & 1 != 0 { 0x3b6a57b2 } else { 0 })
        ^ (if b & 2 != 0 { 0x26508e6d } else { 0 })
        ^ (if b & 4 != 0 { 0x1ea119fa } else { 0 })
        ^ (if b & 8 != 0 { 0x3d4233dd } else { 0 })
        ^ (if b & 16 != 0 { 0x2a1462b3 } else { 0 })
}

/// Regroup 5-bit values into bytes, rejecting non-zero padding.
fn convert_bits_5_to_8(values: &[u8]) -> Result<Vec<u8>, AddressError> {
    let mut out = Vec::with_capacity(values.len() * 5 / 8);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for &v in values {
        if v > 0x1f {
            return Err(AddressError::InvalidCharacter('?'));
        }
        acc = (acc << 5) | v as u32;
        bits += 5;
        while bits >= 8 {
            bits -= 8;
            out.push(((acc >> bits) & 0xff) as u8);
        }
    }

    // At most 4 leftover bits, all zero, or the encoding was padded wrong.
    if bits >= 5 || (acc & ((1 << bits) - 1)) != 0 {
        return Err(AddressError::InvalidPadding);
    }

    Ok(out)
}

fn convert_bits_8_to_5(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 8 / 5 + 1);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for &b in bytes {
        acc = (acc << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(((acc >> bits) & 0x1f) as u8);
        }
    }
    if bits > 0 {
        out.push(((acc << (5 - bits)) & 0x1f) as u8);
    }
    out
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive a mainnet P2WPKH address from a 64-byte uncompressed public key
/// (x ‖ y, no 0x04 prefix).
///
/// Compresses the key (parity byte plus x-coordinate), applies hash160 and
/// bech32-encodes with witness version 0. Deterministic.
pub fn derive_address_from_pubkey(pubkey: &[u8; 64]) -> Result<String, AddressError> {
    // All-zero input is not a point on the curve.
    if pubkey.iter().all(|&b| b == 0) {
        return Err(AddressError::InvalidPublicKey);
    }

    let mut compressed = [0u8; 33];
    compressed[0] = if pubkey[63] & 1 == 1 { 0x03 } else { 0x02 };
    compressed[1..].copy_from_slice(&pubkey[0..32]);

    let program = hash160(&compressed);
    Ok(bech32_encode("bc", 0, &program))
}

#[cfg(test)]
mod tests {
    use super::*;

    // secp256k1 generator point, uncompressed, no prefix byte.
    fn generator_pubkey() -> [u8; 64] {
        let bytes = hex::decode(
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();
        bytes.try_into().unwrap()
    }

    #[test]
    fn test_decode_p2wpkh_known_vector() {
        let decoded = decode_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4").unwrap();
        assert_eq!(decoded.script_type, ScriptType::P2wpkh);
        assert_eq!(decoded.script_hash.len(), 20);
        assert_eq!(
            hex::encode(&decoded.script_hash),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn test_decode_is_deterministic() {
        let a = decode_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4").unwrap();
        let b = decode_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_uppercase_bech32_accepted_mixed_rejected() {
        // All-uppercase is valid per BIP-173
        assert!(decode_address("BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4").is_ok());
        // Mixed case is not
        assert_eq!(
            decode_address("bc1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4"),
            Err(AddressError::MixedCase)
        );
    }

    #[test]
    fn test_bech32_tampered_checksum_rejected() {
        // Flip the final checksum character.
        let result = decode_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t5");
        assert_eq!(result, Err(AddressError::BadChecksum));
    }

    #[test]
    fn test_decode_legacy_p2pkh_and_p2sh() {
        let p2pkh = decode_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").unwrap();
        assert_eq!(p2pkh.script_type, ScriptType::P2pkh);
        assert_eq!(p2pkh.script_hash.len(), 20);

        let p2sh = decode_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy").unwrap();
        assert_eq!(p2sh.script_type, ScriptType::P2sh);
        assert_eq!(p2sh.script_hash.len(), 20);
    }

    #[test]
    fn test_base58_tampered_checksum_rejected() {
        // Change the last character of a valid P2PKH address.
        let result = decode_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN3");
        assert_eq!(result, Err(AddressError::BadChecksum));
    }

    #[test]
    fn test_base58_invalid_alphabet_rejected() {
        // '0' and 'O' are not in the base58 alphabet.
        assert_eq!(
            decode_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNV00"),
            Err(AddressError::InvalidCharacter('0'))
        );
    }

    #[test]
    fn test_base58check_round_trip() {
        let mut payload = vec![VERSION_P2PKH_MAINNET];
        payload.extend_from_slice(&[0xab; 20]);
        let encoded = base58check_encode(&payload);
        assert_eq!(base58check_decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_empty_and_garbage_inputs() {
        assert_eq!(decode_address(""), Err(AddressError::Empty));
        assert!(decode_address("bc1").is_err());
        assert!(decode_address("zzz").is_err());
    }

    #[test]
    fn test_derive_generator_pubkey_gives_known_address() {
        let addr = derive_address_from_pubkey(&generator_pubkey()).unwrap();
        assert_eq!(addr, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    }

    #[test]
    fn test_derive_then_decode_round_trip() {
        let key = generator_pubkey();
        let addr = derive_address_from_pubkey(&key).unwrap();
        let decoded = decode_address(&addr).unwrap();

        let mut compressed = [0u8; 33];
        compressed[0] = 0x02; // generator y is even
        compressed[1..].copy_from_slice(&key[0..32]);

        assert_eq!(decoded.script_type, ScriptType::P2wpkh);
        assert_eq!(decoded.script_hash, hash160(&compressed).to_vec());

        // Deterministic across repeated calls.
        assert_eq!(addr, derive_address_from_pubkey(&key).unwrap());
    }

    #[test]
    fn test_derive_distinct_keys_distinct_addresses() {
        let mut other = generator_pubkey();
        other[0] ^= 0x01;
        let a = derive_address_from_pubkey(&generator_pubkey()).unwrap();
        let b = derive_address_from_pubkey(&other).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_p2wsh_program_length() {
        let addr = bech32_encode("bc", 0, &[0x55; 32]);
        let decoded = decode_address(&addr).unwrap();
        assert_eq!(decoded.script_type, ScriptType::P2wsh);
        assert_eq!(decoded.script_hash.len(), 32);
    }

    #[test]
    fn test_bad_witness_program_length_rejected() {
        let addr = bech32_encode("bc", 0, &[0x55; 25]);
        assert_eq!(
            decode_address(&addr),
            Err(AddressError::BadWitnessProgramLength(25))
        );
    }

    #[test]
    fn test_nonzero_witness_version_rejected() {
        // Taproot-style v1 program is outside this codec's remit.
        let addr = bech32_encode("bc", 1, &[0x55; 32]);
        let result = decode_address(&addr);
        assert_eq!(result, Err(AddressError::UnsupportedWitnessVersion(1)));
    }

    #[test]
    fn test_testnet_hrp_accepted_foreign_hrp_rejected() {
        let tb = bech32_encode("tb", 0, &[0x55; 20]);
        assert_eq!(decode_address(&tb).unwrap().script_type, ScriptType::P2wpkh);

        // "ltc1..." does not start with bc1/tb1, falls through to base58 and fails
        let ltc = bech32_encode("ltc", 0, &[0x55; 20]);
        assert!(decode_address(&ltc).is_err());
    }
}
