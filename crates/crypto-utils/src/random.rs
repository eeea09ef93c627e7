use rand::RngCore;
use rand_core::OsRng;

use crate::error::CryptoError;

/// Fills a fixed-size array from the OS random source, surfacing failures
/// instead of panicking.
pub fn try_random_bytes_fixed<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| CryptoError::RandomSource(e.to_string()))?;
    Ok(buf)
}
