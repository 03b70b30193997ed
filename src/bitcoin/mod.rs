//! Byte-level Bitcoin primitives: hashing, address codec, raw
//! transactions, block headers and merkle proofs.

pub mod address;
pub mod hash;
pub mod header;
pub mod merkle;
pub mod tx;
