//! Authenticated encryption of PII fields.
//!
//! - [`EncryptionVault`] - encrypt, decrypt and search-hash field values
//! - [`StoredField`] - classifies a stored value as encrypted or legacy plaintext
//! - masking helpers for display of decrypted values
//!
//! # Example
//!
//! ```
//! use chorus_persistence::crypto::{mask_ein, EncryptionVault};
//!
//! # fn main() -> Result<(), chorus_persistence::error::CryptoError> {
//! let vault = EncryptionVault::from_hex(
//!     "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
//! )?;
//!
//! let stored = vault.encrypt("123456789")?;
//! assert_eq!(stored.split(':').count(), 4);
//!
//! let ein = vault.decrypt(&stored)?;
//! assert_eq!(mask_ein(&ein), "XX-XXX6789");
//! # Ok(())
//! # }
//! ```

mod field;
mod mask;
mod vault;

pub use field::{EncryptedField, StoredField, IV_SIZE, SALT_SIZE, SEGMENT_COUNT, TAG_SIZE};
pub use mask::{mask_ein, mask_email, mask_phone};
pub use vault::{EncryptionVault, ENCRYPTION_KEY_ENV_VAR, KEY_SIZE};
