#![warn(clippy::pedantic)]

//! Minisign signature verification for downloaded toolchain artifacts.
//!
//! Zig and ZLS release tarballs are published next to a detached
//! `<artifact>.minisig` file. This crate parses the base64 public key
//! encoding and the signature file format, and checks the binary signature
//! over the artifact content.
//!
//! ## Trust scope
//!
//! Only the Ed25519 signature over the file content is authoritative. The
//! trusted comment is parsed and pattern-checked, but its global signature
//! is not verified.
//!
//! ## Example
//!
//! ```ignore
//! use zigx_minisign::{PublicKey, Signature, verify_signature};
//!
//! let key = PublicKey::from_base64("RWSGOq2NVecA2UPNdBUZykf1CCb147pkmdtYxgb3Ti+JO/wCYvhbAb/U")?;
//! let signature = Signature::parse(&std::fs::read("zig.tar.xz.minisig")?)?;
//! let trusted = verify_signature(&key, &signature, &std::fs::read("zig.tar.xz")?);
//! ```

mod error;
mod key;
mod signature;
#[cfg(any(test, feature = "signing"))]
mod signing;
mod verify;

pub use error::FormatError;
pub use key::{KEY_ID_LEN, PublicKey};
pub use signature::{Algorithm, SIGNATURE_LEN, Signature};
#[cfg(any(test, feature = "signing"))]
pub use signing::KeyPair;
pub use verify::verify_signature;
