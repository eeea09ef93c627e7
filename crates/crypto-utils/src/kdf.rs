use sha2::Sha512;

use crate::error::CryptoError;
use crate::random::try_random_bytes_fixed;

/// PBKDF2 round count. The PIN space is only 10^4 values, so this cost is the
/// main defense against offline guessing.
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Derives a 32-byte AES-256 key from `pin` and `salt` using
/// PBKDF2-HMAC-SHA512 with [`PBKDF2_ROUNDS`] iterations.
///
/// The caller owns the returned key and must zeroize it after use.
pub fn derive_key(pin: &[u8], salt: &[u8; SALT_LEN]) -> [u8; 32] {
    let mut output = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha512>(pin, salt, PBKDF2_ROUNDS, &mut output);
    output
}

/// Generates a fresh random salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    try_random_bytes_fixed::<SALT_LEN>()
}
