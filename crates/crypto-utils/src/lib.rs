//! # crypto-utils
//!
//! PIN-based key derivation, block encryption, zeroizing buffers and secure
//! random generation used by the key custody layer.

pub mod encryption;
pub mod error;
pub mod kdf;
pub mod random;
pub mod zeroizing;

pub use error::CryptoError;
pub use zeroizing::{ZeroizingBytes, ZeroizingString};
