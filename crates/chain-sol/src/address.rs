//! Solana address encoding and validation.
//!
//! An address is the Base58 encoding of a 32-byte Ed25519 public key (or of a
//! program derived address, which is 32 bytes off the curve).

use crate::error::SolError;

/// Decode a Base58 address to its 32-byte form.
pub fn address_to_bytes(address: &str) -> Result<[u8; 32], SolError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| SolError::InvalidAddress(format!("base58 decode failed: {e}")))?;

    let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        SolError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
    })?;

    Ok(arr)
}

/// Encode 32 bytes as a Base58 address.
pub fn bytes_to_address(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}

/// Syntactic check only: Base58 that decodes to exactly 32 bytes.
pub fn validate_address(address: &str) -> Result<(), SolError> {
    address_to_bytes(address).map(|_| ())
}
