//! Field-level encryption of PII.
//!
//! Every value is sealed with AES-256-GCM under a key derived from the
//! master key with HKDF-SHA256 and a fresh random salt, so two encryptions of
//! the same plaintext never share a key or nonce. Equality lookups go
//! through [`EncryptionVault::hash_for_search`], an HMAC-SHA256 of the
//! plaintext under the master key.
//!
//! The master key comes from the `ENCRYPTION_KEY` environment variable as 64
//! hex characters. A missing or malformed key is fatal at startup.

use std::env;
use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

use super::field::{EncryptedField, StoredField, IV_SIZE, SALT_SIZE, TAG_SIZE};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Environment variable holding the master key.
pub const ENCRYPTION_KEY_ENV_VAR: &str = "ENCRYPTION_KEY";

const FIELD_KEY_INFO: &[u8] = b"chorus/field-encryption/v1";

type HmacSha256 = Hmac<Sha256>;

/// Encrypts, decrypts and hashes PII fields under one master key.
#[derive(Clone)]
pub struct EncryptionVault {
    master_key: [u8; KEY_SIZE],
    search_mac: HmacSha256,
}

impl fmt::Debug for EncryptionVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionVault").finish_non_exhaustive()
    }
}

impl EncryptionVault {
    /// Creates a vault from raw key bytes.
    pub fn new(master_key: [u8; KEY_SIZE]) -> CryptoResult<Self> {
        let search_mac =
            <HmacSha256 as Mac>::new_from_slice(&master_key).map_err(|e| CryptoError::InvalidKey {
                reason: format!("failed to initialize HMAC: {}", e),
            })?;
        Ok(Self {
            master_key,
            search_mac,
        })
    }

    /// Creates a vault by reading `ENCRYPTION_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if:
    /// - the environment variable is not set
    /// - the value is not valid hex
    /// - the decoded length is not 32 bytes
    pub fn from_env() -> CryptoResult<Self> {
        let hex_key = env::var(ENCRYPTION_KEY_ENV_VAR).map_err(|_| CryptoError::InvalidKey {
            reason: format!("{} environment variable not set", ENCRYPTION_KEY_ENV_VAR),
        })?;
        Self::from_hex(&hex_key)
    }

    /// Creates a vault from a 64-character hex key.
    pub fn from_hex(hex_key: &str) -> CryptoResult<Self> {
        let hex_key = hex_key.trim();
        if hex_key.len() != KEY_SIZE * 2 {
            return Err(CryptoError::InvalidKey {
                reason: format!(
                    "key must be {} hex characters (got {})",
                    KEY_SIZE * 2,
                    hex_key.len()
                ),
            });
        }

        let bytes = hex::decode(hex_key).map_err(|e| CryptoError::InvalidKey {
            reason: format!("invalid hex: {}", e),
        })?;

        let mut master_key = [0u8; KEY_SIZE];
        master_key.copy_from_slice(&bytes);
        Self::new(master_key)
    }

    /// Encrypts a plaintext into its stored form `iv:salt:ciphertext:tag`.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut rng = rand::thread_rng();
        let mut iv = [0u8; IV_SIZE];
        let mut salt = [0u8; SALT_SIZE];
        rng.fill_bytes(&mut iv);
        rng.fill_bytes(&mut salt);

        let cipher = self.cipher_for(&salt)?;
        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption {
                message: format!("encryption failed: {}", e),
            })?;

        // aes-gcm appends the tag to the ciphertext
        let tag_start = sealed.len().checked_sub(TAG_SIZE).ok_or_else(|| {
            CryptoError::Encryption {
                message: "sealed output shorter than tag".to_string(),
            }
        })?;
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&sealed[tag_start..]);
        sealed.truncate(tag_start);

        Ok(EncryptedField {
            iv,
            salt,
            ciphertext: sealed,
            tag,
        }
        .to_string())
    }

    /// Decrypts a stored value.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Decryption`] if the value does not have four hex
    /// segments of the right sizes, or authentication fails (tampered data or
    /// wrong key).
    pub fn decrypt(&self, stored: &str) -> CryptoResult<String> {
        let field: EncryptedField = stored.parse()?;
        self.open(&field)
    }

    /// Decrypts a stored value, passing legacy plaintext through unchanged.
    pub fn decrypt_safe(&self, stored: &str) -> CryptoResult<String> {
        match StoredField::parse(stored) {
            StoredField::Encrypted(field) => self.open(&field),
            StoredField::Legacy(plaintext) => Ok(plaintext.to_string()),
        }
    }

    /// Returns `true` if the stored value is in encrypted form.
    pub fn is_encrypted(stored: &str) -> bool {
        StoredField::parse(stored).is_encrypted()
    }

    /// Encrypts a nullable column value.
    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> CryptoResult<Option<String>> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// Decrypts a nullable column value, passing legacy plaintext through.
    pub fn decrypt_optional(&self, stored: Option<&str>) -> CryptoResult<Option<String>> {
        stored.map(|s| self.decrypt_safe(s)).transpose()
    }

    /// Encrypts a legacy plaintext value; encrypted values are returned as-is.
    ///
    /// This is the only path that upgrades legacy data. Reads never do.
    pub fn migrate_legacy(&self, stored: &str) -> CryptoResult<String> {
        match StoredField::parse(stored) {
            StoredField::Encrypted(_) => Ok(stored.to_string()),
            StoredField::Legacy(plaintext) => self.encrypt(plaintext),
        }
    }

    /// Returns the hex HMAC-SHA256 of a plaintext, for equality lookups.
    pub fn hash_for_search(&self, plaintext: &str) -> String {
        let mut mac = self.search_mac.clone();
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks a plaintext against a stored search hash in constant time.
    pub fn verify_hash_for_search(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(expected) = hex::decode(hash) else {
            return false;
        };
        let mut mac = self.search_mac.clone();
        mac.update(plaintext.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    fn cipher_for(&self, salt: &[u8; SALT_SIZE]) -> CryptoResult<Aes256Gcm> {
        let hk = Hkdf::<Sha256>::new(Some(salt), &self.master_key);
        let mut key = [0u8; KEY_SIZE];
        hk.expand(FIELD_KEY_INFO, &mut key)
            .map_err(|_| CryptoError::Encryption {
                message: "HKDF expand failed".to_string(),
            })?;
        Aes256Gcm::new_from_slice(&key).map_err(|e| CryptoError::Encryption {
            message: format!("failed to create cipher: {}", e),
        })
    }

    fn open(&self, field: &EncryptedField) -> CryptoResult<String> {
        let cipher = self.cipher_for(&field.salt).map_err(|e| CryptoError::Decryption {
            message: e.to_string(),
        })?;

        let mut sealed = Vec::with_capacity(field.ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(&field.ciphertext);
        sealed.extend_from_slice(&field.tag);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&field.iv), sealed.as_slice())
            .map_err(|_| CryptoError::Decryption {
                message: "authentication failed".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption {
            message: "plaintext is not valid UTF-8".to_string(),
        })
    }
}
