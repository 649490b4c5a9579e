//! Detached minisign signature files.
//!
//! ```text
//! untrusted comment: <free text>
//! <base64: algorithm[2] || key_id[8] || signature[64]>
//! trusted comment: <free text>
//! <base64: global signature over signature || trusted comment>
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{FormatError, KEY_ID_LEN};

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

pub(crate) const UNTRUSTED_PREFIX: &str = "untrusted comment: ";
pub(crate) const TRUSTED_PREFIX: &str = "trusted comment: ";
const SIGNATURE_BLOCK_LEN: usize = 2 + KEY_ID_LEN + SIGNATURE_LEN;

/// Signature algorithm carried in the first two bytes of the signature block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// `Ed`: the raw file content is signed.
    Legacy,
    /// `ED`: the BLAKE2b-512 digest of the content is signed.
    Hashed,
}

impl Algorithm {
    /// The two-byte tag written in signature files.
    #[must_use]
    pub const fn tag(self) -> [u8; 2] {
        match self {
            Algorithm::Legacy => *b"Ed",
            Algorithm::Hashed => *b"ED",
        }
    }

    fn from_tag(tag: [u8; 2]) -> Option<Self> {
        match &tag {
            b"Ed" => Some(Algorithm::Legacy),
            b"ED" => Some(Algorithm::Hashed),
            _ => None,
        }
    }
}

/// A parsed `.minisig` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// How the content was reduced before signing.
    pub algorithm: Algorithm,
    /// Identifier of the key that produced the signature.
    pub key_id: [u8; KEY_ID_LEN],
    /// Ed25519 signature bytes.
    pub signature: [u8; SIGNATURE_LEN],
    /// Text after `untrusted comment: `.
    pub untrusted_comment: String,
    /// Text after `trusted comment: `. Not authenticated.
    pub trusted_comment: String,
}

impl Signature {
    /// Parses the contents of a `.minisig` file.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] if:
    /// - the text header `untrusted comment: ` is missing
    /// - the signature block is not base64 or is not 74 bytes
    /// - the algorithm tag is neither `Ed` nor `ED`
    /// - the trusted comment line is missing or malformed
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidEncoding)?;
        let mut lines = text.lines();

        let untrusted_comment = lines
            .next()
            .and_then(|line| line.strip_prefix(UNTRUSTED_PREFIX))
            .ok_or(FormatError::MissingHeader)?;

        let encoded = lines.next().ok_or(FormatError::Truncated {
            line: "signature block",
        })?;
        let block = STANDARD
            .decode(encoded.trim())
            .map_err(|source| FormatError::Base64 {
                what: "signature block",
                source,
            })?;
        if block.len() != SIGNATURE_BLOCK_LEN {
            return Err(FormatError::Length {
                what: "signature block",
                expected: SIGNATURE_BLOCK_LEN,
                actual: block.len(),
            });
        }

        let tag = [block[0], block[1]];
        let algorithm = Algorithm::from_tag(tag).ok_or_else(|| FormatError::UnknownAlgorithm {
            tag: String::from_utf8_lossy(&tag).into_owned(),
        })?;
        let mut key_id = [0u8; KEY_ID_LEN];
        key_id.copy_from_slice(&block[2..2 + KEY_ID_LEN]);
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&block[2 + KEY_ID_LEN..]);

        let trusted_comment = lines
            .next()
            .ok_or(FormatError::Truncated {
                line: "trusted comment",
            })?
            .strip_prefix(TRUSTED_PREFIX)
            .ok_or(FormatError::TrustedComment)?;

        Ok(Self {
            algorithm,
            key_id,
            signature,
            untrusted_comment: untrusted_comment.trim_end_matches('\r').to_owned(),
            trusted_comment: trusted_comment.trim_end_matches('\r').to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    fn fixture_pair() -> KeyPair {
        KeyPair::from_seed([42u8; 32], [1, 2, 3, 4, 5, 6, 7, 8])
    }

    #[test]
    fn parse_reproduces_signer_fields() {
        let pair = fixture_pair();
        let file = pair.sign(b"payload", Algorithm::Hashed, "timestamp:1700000000\tfile:zig.tar.xz");

        let parsed = Signature::parse(file.as_bytes()).expect("Should parse signer output");

        assert_eq!(parsed.algorithm, Algorithm::Hashed);
        assert_eq!(&parsed.key_id, pair.public_key().id());
        assert_eq!(parsed.signature, pair.raw_signature(b"payload", Algorithm::Hashed));
        assert_eq!(parsed.trusted_comment, "timestamp:1700000000\tfile:zig.tar.xz");
        assert!(parsed.untrusted_comment.starts_with("signature from"));
    }

    #[test]
    fn parse_accepts_legacy_algorithm() {
        let file = fixture_pair().sign(b"payload", Algorithm::Legacy, "legacy");
        let parsed = Signature::parse(file.as_bytes()).expect("Should parse legacy signature");
        assert_eq!(parsed.algorithm, Algorithm::Legacy);
    }

    #[test]
    fn parse_accepts_crlf_line_endings() {
        let file = fixture_pair()
            .sign(b"payload", Algorithm::Hashed, "crlf")
            .replace('\n', "\r\n");
        let parsed = Signature::parse(file.as_bytes()).expect("Should parse CRLF file");
        assert_eq!(parsed.trusted_comment, "crlf");
    }

    #[test]
    fn parse_rejects_missing_header() {
        let file = fixture_pair().sign(b"payload", Algorithm::Hashed, "x");
        let without_header = file.replacen(UNTRUSTED_PREFIX, "comment: ", 1);
        let err = Signature::parse(without_header.as_bytes()).expect_err("Should reject");
        assert!(matches!(err, FormatError::MissingHeader));
    }

    #[test]
    fn parse_rejects_wrong_block_length() {
        let block = STANDARD.encode([b'E', b'D', 0, 0, 0]);
        let file = format!("{UNTRUSTED_PREFIX}x\n{block}\n{TRUSTED_PREFIX}y\n");
        let err = Signature::parse(file.as_bytes()).expect_err("Should reject");
        assert!(matches!(
            err,
            FormatError::Length {
                expected: 74,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn parse_rejects_unknown_algorithm() {
        let mut block = vec![b'R', b'S'];
        block.extend_from_slice(&[0u8; KEY_ID_LEN + SIGNATURE_LEN]);
        let file = format!(
            "{UNTRUSTED_PREFIX}x\n{}\n{TRUSTED_PREFIX}y\n",
            STANDARD.encode(block)
        );
        let err = Signature::parse(file.as_bytes()).expect_err("Should reject");
        assert!(matches!(err, FormatError::UnknownAlgorithm { tag } if tag == "RS"));
    }

    #[test]
    fn parse_rejects_malformed_trusted_comment() {
        let file = fixture_pair().sign(b"payload", Algorithm::Hashed, "x");
        let broken = file.replacen(TRUSTED_PREFIX, "trusted: ", 1);
        let err = Signature::parse(broken.as_bytes()).expect_err("Should reject");
        assert!(matches!(err, FormatError::TrustedComment));
    }

    #[test]
    fn parse_rejects_truncated_file() {
        let err = Signature::parse(b"untrusted comment: only a header\n").expect_err("Should reject");
        assert!(matches!(err, FormatError::Truncated { .. }));
    }

    #[test]
    fn parse_rejects_binary_garbage() {
        let err = Signature::parse(&[0xFF, 0xFE, 0x00]).expect_err("Should reject");
        assert!(matches!(err, FormatError::InvalidEncoding));
    }
}
