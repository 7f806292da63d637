//! Stored shape of an encrypted field.
//!
//! An encrypted value is stored as `iv:salt:ciphertext:tag`, each segment
//! hex-encoded. Anything else found in a PII column is legacy plaintext that
//! predates encryption.

use std::fmt;
use std::str::FromStr;

use crate::error::{CryptoError, CryptoResult};

/// AES-GCM nonce size in bytes (96 bits).
pub const IV_SIZE: usize = 12;

/// Per-value HKDF salt size in bytes.
pub const SALT_SIZE: usize = 16;

/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Number of colon-delimited segments in a stored encrypted value.
pub const SEGMENT_COUNT: usize = 4;

/// The parts of one encrypted value.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedField {
    /// Random nonce.
    pub iv: [u8; IV_SIZE],
    /// Random salt for key derivation.
    pub salt: [u8; SALT_SIZE],
    /// Ciphertext without the tag.
    pub ciphertext: Vec<u8>,
    /// Authentication tag.
    pub tag: [u8; TAG_SIZE],
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedField")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            hex::encode(self.iv),
            hex::encode(self.salt),
            hex::encode(&self.ciphertext),
            hex::encode(self.tag)
        )
    }
}

fn decode_fixed<const N: usize>(segment: &str, name: &str) -> CryptoResult<[u8; N]> {
    let bytes = hex::decode(segment).map_err(|e| CryptoError::Decryption {
        message: format!("invalid {} encoding: {}", name, e),
    })?;
    bytes.try_into().map_err(|bytes: Vec<u8>| CryptoError::Decryption {
        message: format!("{} must be {} bytes, got {}", name, N, bytes.len()),
    })
}

impl FromStr for EncryptedField {
    type Err = CryptoError;

    /// Parses the stored form strictly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split(':').collect();
        if segments.len() != SEGMENT_COUNT {
            return Err(CryptoError::Decryption {
                message: format!(
                    "expected {} segments, found {}",
                    SEGMENT_COUNT,
                    segments.len()
                ),
            });
        }

        let ciphertext = hex::decode(segments[2]).map_err(|e| CryptoError::Decryption {
            message: format!("invalid ciphertext encoding: {}", e),
        })?;

        Ok(Self {
            iv: decode_fixed(segments[0], "iv")?,
            salt: decode_fixed(segments[1], "salt")?,
            ciphertext,
            tag: decode_fixed(segments[3], "tag")?,
        })
    }
}

/// A value read from a PII column, classified without attempting decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredField<'a> {
    /// A well-formed encrypted value.
    Encrypted(EncryptedField),
    /// Plaintext written before encryption was introduced.
    Legacy(&'a str),
}

impl<'a> StoredField<'a> {
    /// Classifies a stored value.
    ///
    /// Values with four hex segments of the right sizes are `Encrypted`;
    /// everything else is `Legacy`.
    ///
    /// ```
    /// use chorus_persistence::crypto::StoredField;
    ///
    /// assert!(matches!(StoredField::parse("555-0100"), StoredField::Legacy("555-0100")));
    /// ```
    pub fn parse(stored: &'a str) -> Self {
        match stored.parse::<EncryptedField>() {
            Ok(field) => StoredField::Encrypted(field),
            Err(_) => StoredField::Legacy(stored),
        }
    }

    /// Returns `true` for encrypted values.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, StoredField::Encrypted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptedField {
        EncryptedField {
            iv: [1; IV_SIZE],
            salt: [2; SALT_SIZE],
            ciphertext: vec![0xab, 0xcd],
            tag: [3; TAG_SIZE],
        }
    }

    #[test]
    fn test_display_shape() {
        let s = sample().to_string();
        let segments: Vec<_> = s.split(':').collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].len(), IV_SIZE * 2);
        assert_eq!(segments[1].len(), SALT_SIZE * 2);
        assert_eq!(segments[2], "abcd");
        assert_eq!(segments[3].len(), TAG_SIZE * 2);
        assert_eq!(s.parse::<EncryptedField>().unwrap(), sample());
    }

    #[test]
    fn test_strict_parse_errors() {
        assert!("a:b:c".parse::<EncryptedField>().is_err());
        assert!("zz:zz:zz:zz".parse::<EncryptedField>().is_err());

        // Right shape, wrong iv length
        let s = format!("0102:{}:ab:{}", "02".repeat(16), "03".repeat(16));
        let err = s.parse::<EncryptedField>().unwrap_err();
        assert!(err.to_string().contains("iv must be 12 bytes"));
    }

    #[test]
    fn test_stored_field_classification() {
        assert!(StoredField::parse(&sample().to_string()).is_encrypted());
        assert_eq!(StoredField::parse("12-3456789"), StoredField::Legacy("12-3456789"));
        // Four segments that are not hex stay legacy
        assert_eq!(StoredField::parse("a:b:c:d"), StoredField::Legacy("a:b:c:d"));
        assert_eq!(StoredField::parse(""), StoredField::Legacy(""));
    }

    #[test]
    fn test_debug_hides_bytes() {
        let debug = format!("{:?}", sample());
        assert!(!debug.contains("abcd"));
    }
}
