//! Producing minisign signature files.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey};

use crate::signature::{TRUSTED_PREFIX, UNTRUSTED_PREFIX};
use crate::verify::signed_message;
use crate::{Algorithm, KEY_ID_LEN, PublicKey, SIGNATURE_LEN};

/// An Ed25519 signing key tagged with a minisign key id.
pub struct KeyPair {
    id: [u8; KEY_ID_LEN],
    signing: SigningKey,
}

impl KeyPair {
    /// Derives a key pair from a fixed 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32], id: [u8; KEY_ID_LEN]) -> Self {
        Self {
            id,
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// The public half, as it would be embedded in a verifier.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_parts(self.id, self.signing.verifying_key().to_bytes())
    }

    /// Signs `content` and returns the bare 64-byte signature.
    #[must_use]
    pub fn raw_signature(&self, content: &[u8], algorithm: Algorithm) -> [u8; SIGNATURE_LEN] {
        self.signing
            .sign(&signed_message(algorithm, content))
            .to_bytes()
    }

    /// Signs `content` and renders a complete `.minisig` file.
    #[must_use]
    pub fn sign(&self, content: &[u8], algorithm: Algorithm, trusted_comment: &str) -> String {
        let signature = self.raw_signature(content, algorithm);

        let mut block = Vec::with_capacity(2 + KEY_ID_LEN + SIGNATURE_LEN);
        block.extend_from_slice(&algorithm.tag());
        block.extend_from_slice(&self.id);
        block.extend_from_slice(&signature);

        let mut global = signature.to_vec();
        global.extend_from_slice(trusted_comment.as_bytes());
        let global_signature = self.signing.sign(&global).to_bytes();

        let key_id: String = self.id.iter().rev().map(|b| format!("{b:02X}")).collect();
        format!(
            "{UNTRUSTED_PREFIX}signature from minisign secret key {key_id}\n{}\n{TRUSTED_PREFIX}{trusted_comment}\n{}\n",
            STANDARD.encode(block),
            STANDARD.encode(global_signature),
        )
    }
}
