//! Parse errors for keys and signature files.

use thiserror::Error;

/// A public key or signature file could not be decoded.
///
/// Format errors are final: the input is rejected and never retried.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The signature file is not valid UTF-8 text.
    #[error("signature file is not valid UTF-8")]
    InvalidEncoding,

    /// The first line does not start with `untrusted comment: `.
    #[error("file format not recognized: missing untrusted comment header")]
    MissingHeader,

    /// The signature file ended before a required line.
    #[error("signature file is truncated: missing {line}")]
    Truncated {
        /// Name of the line that was expected.
        line: &'static str,
    },

    /// A base64 block could not be decoded.
    #[error("invalid base64 in {what}")]
    Base64 {
        /// Which block failed to decode.
        what: &'static str,
        /// The underlying decoder error.
        #[source]
        source: base64::DecodeError,
    },

    /// A decoded block has the wrong byte length.
    #[error("{what} has {actual} bytes, expected {expected}")]
    Length {
        /// Which block has the wrong length.
        what: &'static str,
        /// Expected length in bytes.
        expected: usize,
        /// Actual decoded length in bytes.
        actual: usize,
    },

    /// The two-byte algorithm tag is not a known minisign algorithm.
    #[error("unsupported signature algorithm {tag:?}")]
    UnknownAlgorithm {
        /// The tag as found in the input.
        tag: String,
    },

    /// The third line is present but is not a trusted comment.
    #[error("malformed trusted comment line")]
    TrustedComment,
}
