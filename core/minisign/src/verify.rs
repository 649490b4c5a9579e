use std::borrow::Cow;

use blake2::{Blake2b512, Digest};
use ed25519_dalek::VerifyingKey;

use crate::{Algorithm, PublicKey, Signature};

/// Checks `signature` over `content` with `key`.
///
/// Returns `false` when the signature was made by a different key id, when
/// the key bytes are not a valid Ed25519 point, or when the signature does
/// not match. A `false` result means the content is untrusted and must be
/// rejected.
#[must_use]
pub fn verify_signature(key: &PublicKey, signature: &Signature, content: &[u8]) -> bool {
    if signature.key_id != *key.id() {
        return false;
    }
    let Ok(verifying_key) = VerifyingKey::from_bytes(key.key()) else {
        return false;
    };
    let ed_signature = ed25519_dalek::Signature::from_bytes(&signature.signature);
    let message = signed_message(signature.algorithm, content);
    verifying_key.verify_strict(&message, &ed_signature).is_ok()
}

pub(crate) fn signed_message(algorithm: Algorithm, content: &[u8]) -> Cow<'_, [u8]> {
    match algorithm {
        Algorithm::Legacy => Cow::Borrowed(content),
        Algorithm::Hashed => Cow::Owned(Blake2b512::digest(content).to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    const CONTENT: &[u8] = b"zig-x86_64-linux-0.13.0.tar.xz contents";

    fn pair() -> KeyPair {
        KeyPair::from_seed([7u8; 32], *b"zigxtest")
    }

    fn signed(algorithm: Algorithm) -> (PublicKey, Signature) {
        let pair = pair();
        let file = pair.sign(CONTENT, algorithm, "fixture");
        let signature = Signature::parse(file.as_bytes()).expect("Should parse fixture");
        (pair.public_key(), signature)
    }

    #[test]
    fn verifies_hashed_signature() {
        let (key, signature) = signed(Algorithm::Hashed);
        assert!(verify_signature(&key, &signature, CONTENT));
    }

    #[test]
    fn verifies_legacy_signature() {
        let (key, signature) = signed(Algorithm::Legacy);
        assert!(verify_signature(&key, &signature, CONTENT));
    }

    #[test]
    fn verifies_after_key_text_round_trip() {
        let (key, signature) = signed(Algorithm::Hashed);
        let reparsed = PublicKey::from_base64(&key.to_base64()).expect("Should reparse key");
        assert!(verify_signature(&reparsed, &signature, CONTENT));
    }

    #[test]
    fn any_content_bit_flip_fails() {
        let (key, signature) = signed(Algorithm::Hashed);
        for byte in 0..CONTENT.len() {
            for bit in 0..8 {
                let mut tampered = CONTENT.to_vec();
                tampered[byte] ^= 1 << bit;
                assert!(
                    !verify_signature(&key, &signature, &tampered),
                    "flip of byte {byte} bit {bit} should fail"
                );
            }
        }
    }

    #[test]
    fn any_signature_bit_flip_fails() {
        let (key, signature) = signed(Algorithm::Hashed);
        for byte in 0..signature.signature.len() {
            for bit in 0..8 {
                let mut tampered = signature.clone();
                tampered.signature[byte] ^= 1 << bit;
                assert!(
                    !verify_signature(&key, &tampered, CONTENT),
                    "flip of byte {byte} bit {bit} should fail"
                );
            }
        }
    }

    #[test]
    fn any_key_bit_flip_fails() {
        let (key, signature) = signed(Algorithm::Legacy);
        for byte in 0..key.key().len() {
            for bit in 0..8 {
                let mut raw = *key.key();
                raw[byte] ^= 1 << bit;
                let tampered = PublicKey::from_parts(*key.id(), raw);
                assert!(
                    !verify_signature(&tampered, &signature, CONTENT),
                    "flip of byte {byte} bit {bit} should fail"
                );
            }
        }
    }

    #[test]
    fn key_id_mismatch_fails_closed() {
        let (key, signature) = signed(Algorithm::Hashed);
        let other_id = PublicKey::from_parts(*b"otherkey", *key.key());
        assert!(!verify_signature(&other_id, &signature, CONTENT));
    }

    #[test]
    fn algorithm_tag_changes_the_signed_message() {
        let (key, mut signature) = signed(Algorithm::Hashed);
        signature.algorithm = Algorithm::Legacy;
        assert!(!verify_signature(&key, &signature, CONTENT));
    }

    #[test]
    fn signature_from_other_key_fails() {
        let other = KeyPair::from_seed([9u8; 32], *b"zigxtest");
        let file = other.sign(CONTENT, Algorithm::Hashed, "other signer");
        let signature = Signature::parse(file.as_bytes()).expect("Should parse");
        assert!(!verify_signature(&pair().public_key(), &signature, CONTENT));
    }
}
