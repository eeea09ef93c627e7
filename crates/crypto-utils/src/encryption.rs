//! AES-256-CBC with PKCS#7 padding.
//!
//! The IV is generated here and returned to the caller alongside the
//! ciphertext; it is not prepended. Records store ciphertext, IV and salt as
//! three separate fields.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::CryptoError;
use crate::random::try_random_bytes_fixed;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// CBC initialization vector size in bytes (one AES block).
pub const IV_SIZE: usize = 16;

/// Output of [`encrypt`].
#[derive(Debug, Clone)]
pub struct CbcCiphertext {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_SIZE],
}

/// Encrypts `plaintext` under a 32-byte `key` with a fresh random IV.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32]) -> Result<CbcCiphertext, CryptoError> {
    let iv = try_random_bytes_fixed::<IV_SIZE>()?;
    let ciphertext = encrypt_with_iv(plaintext, key, &iv)?;
    Ok(CbcCiphertext { ciphertext, iv })
}

/// Encrypts with a caller-supplied IV. Only [`encrypt`] should be used for
/// new records; this exists so fixtures can be reproduced.
pub fn encrypt_with_iv(
    plaintext: &[u8],
    key: &[u8; 32],
    iv: &[u8; IV_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypts data produced by [`encrypt`].
///
/// Any failure (wrong key, truncated input, bad padding) is reported as the
/// same [`CryptoError::DecryptionFailed`].
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8; 32],
    iv: &[u8; IV_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % IV_SIZE != 0 {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKeyLength)?;

    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
