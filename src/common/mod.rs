//! Shared infrastructure: the unified error type.

pub mod error;

pub use error::{QcbtcError, Result};
