//! Minisign public keys.
//!
//! The textual form is base64 over `"Ed" || key_id[8] || ed25519_key[32]`.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::FormatError;

/// Length of a minisign key identifier in bytes.
pub const KEY_ID_LEN: usize = 8;

const KEY_ALGORITHM: [u8; 2] = *b"Ed";
const ED25519_KEY_LEN: usize = 32;
const ENCODED_KEY_LEN: usize = 2 + KEY_ID_LEN + ED25519_KEY_LEN;

/// A trusted minisign verification key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    id: [u8; KEY_ID_LEN],
    key: [u8; ED25519_KEY_LEN],
}

impl PublicKey {
    /// Builds a key from its raw parts.
    #[must_use]
    pub const fn from_parts(id: [u8; KEY_ID_LEN], key: [u8; ED25519_KEY_LEN]) -> Self {
        Self { id, key }
    }

    /// Decodes the base64 form found in `minisign.pub` files.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] if the input is not base64, does not decode to
    /// 42 bytes, or carries an algorithm tag other than `Ed`.
    pub fn from_base64(encoded: &str) -> Result<Self, FormatError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|source| FormatError::Base64 {
                what: "public key",
                source,
            })?;
        if bytes.len() != ENCODED_KEY_LEN {
            return Err(FormatError::Length {
                what: "public key",
                expected: ENCODED_KEY_LEN,
                actual: bytes.len(),
            });
        }

        let (tag, rest) = bytes.split_at(2);
        if tag != KEY_ALGORITHM {
            return Err(FormatError::UnknownAlgorithm {
                tag: String::from_utf8_lossy(tag).into_owned(),
            });
        }

        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&rest[..KEY_ID_LEN]);
        let mut key = [0u8; ED25519_KEY_LEN];
        key.copy_from_slice(&rest[KEY_ID_LEN..]);
        Ok(Self { id, key })
    }

    /// Encodes the key back into its base64 form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(ENCODED_KEY_LEN);
        bytes.extend_from_slice(&KEY_ALGORITHM);
        bytes.extend_from_slice(&self.id);
        bytes.extend_from_slice(&self.key);
        STANDARD.encode(bytes)
    }

    /// The 8-byte key identifier.
    #[must_use]
    pub fn id(&self) -> &[u8; KEY_ID_LEN] {
        &self.id
    }

    /// The raw Ed25519 verification key.
    #[must_use]
    pub fn key(&self) -> &[u8; ED25519_KEY_LEN] {
        &self.key
    }
}

impl FromStr for PublicKey {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Minisign prints key ids as little-endian hex.
        let id: String = self.id.iter().rev().map(|b| format!("{b:02X}")).collect();
        f.debug_struct("PublicKey").field("id", &id).finish_non_exhaustive()
    }
}
