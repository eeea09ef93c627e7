//! Keypair generation and PIN-based encryption at rest.
//!
//! A record stores the lowercase hex of the 64-byte Solana secret key
//! (`secret || public`), encrypted with AES-256-CBC under a key derived from
//! the PIN with PBKDF2-HMAC-SHA512 (100,000 rounds, 16-byte salt).

use std::fmt;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use chain_sol::bytes_to_address;
use crypto_utils::encryption::{self, IV_SIZE};
use crypto_utils::kdf::{self, SALT_LEN};
use crypto_utils::random::try_random_bytes_fixed;
use crypto_utils::ZeroizingBytes;

use crate::error::CustodyError;

pub const PIN_LEN: usize = 4;

/// Length of a Solana secret key: 32-byte seed followed by the public key.
pub const KEYPAIR_LEN: usize = 64;

/// Exactly four ASCII digits.
pub fn validate_pin(pin: &str) -> Result<(), CustodyError> {
    if pin.len() == PIN_LEN && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(CustodyError::InvalidPin)
    }
}

/// An Ed25519 keypair whose secret half is wiped on drop.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Parse the 64-byte `secret || public` layout, checking the halves agree.
    pub fn from_bytes(bytes: &[u8; KEYPAIR_LEN]) -> Result<Self, CustodyError> {
        let signing = SigningKey::from_keypair_bytes(bytes)
            .map_err(|_| CustodyError::InvalidKey("public key does not match secret key".into()))?;
        Ok(Self { signing })
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; KEYPAIR_LEN]> {
        Zeroizing::new(self.signing.to_keypair_bytes())
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Base58 public key, which is also the account address.
    pub fn address(&self) -> String {
        bytes_to_address(&self.public_key())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Ciphertext, IV and salt of one encrypted key; always stored together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKeyRecord {
    #[serde(rename = "encryptedPrivateKey", with = "hex")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex")]
    pub iv: [u8; IV_SIZE],
    #[serde(with = "hex")]
    pub salt: [u8; SALT_LEN],
}

/// Generate a fresh keypair from the OS random source.
pub fn generate() -> Result<Keypair, CustodyError> {
    let mut seed = try_random_bytes_fixed::<32>()
        .map_err(|e| CustodyError::KeyGeneration(e.to_string()))?;
    let signing = SigningKey::from_bytes(&seed);
    seed.zeroize();

    Ok(Keypair { signing })
}

/// Encrypt `keypair` under `pin` with a fresh salt and IV.
pub fn encrypt(pin: &str, keypair: &Keypair) -> Result<EncryptedKeyRecord, CustodyError> {
    let salt = kdf::generate_salt().map_err(|e| CustodyError::Encryption(e.to_string()))?;
    let key = Zeroizing::new(kdf::derive_key(pin.as_bytes(), &salt));

    let plaintext = Zeroizing::new(hex::encode(&*keypair.to_bytes()));
    let sealed = encryption::encrypt(plaintext.as_bytes(), &key)
        .map_err(|e| CustodyError::Encryption(e.to_string()))?;

    Ok(EncryptedKeyRecord {
        ciphertext: sealed.ciphertext,
        iv: sealed.iv,
        salt,
    })
}

/// Recover the keypair sealed in `record`.
///
/// Every failure, whether wrong PIN, bad padding, malformed plaintext or
/// inconsistent key halves, is reported as [`CustodyError::Decryption`].
pub fn decrypt(pin: &str, record: &EncryptedKeyRecord) -> Result<Keypair, CustodyError> {
    let key = Zeroizing::new(kdf::derive_key(pin.as_bytes(), &record.salt));

    let plaintext = encryption::decrypt(&record.ciphertext, &key, &record.iv)
        .map(ZeroizingBytes::from)
        .map_err(|_| CustodyError::Decryption)?;

    let mut bytes = Zeroizing::new([0u8; KEYPAIR_LEN]);
    hex::decode_to_slice(&*plaintext, &mut *bytes).map_err(|_| CustodyError::Decryption)?;

    Keypair::from_bytes(&bytes).map_err(|_| CustodyError::Decryption)
}
