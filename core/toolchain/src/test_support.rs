//! Fixtures shared by the unit tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use tar::{Builder, Header};
use xz2::write::XzEncoder;
use zigx_minisign::{Algorithm, KeyPair};

/// Writes an executable shell script and returns its path.
#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("Should write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Should chmod script");
    path
}

/// A deterministic signer standing in for the release keys.
pub(crate) fn test_signer() -> KeyPair {
    KeyPair::from_seed([7u8; 32], [1, 2, 3, 4, 5, 6, 7, 8])
}

/// Signs `content` the way release artifacts are signed.
pub(crate) fn sign(signer: &KeyPair, content: &[u8]) -> String {
    signer.sign(content, Algorithm::Hashed, "timestamp:1718000000\tfile:artifact")
}

/// A `.tar.xz` holding `exe` as a script that prints `version_output`, plus
/// a standard library file. Entries sit under `root` when given.
pub(crate) fn toolchain_tar_xz(root: Option<&str>, exe: &str, version_output: &str) -> Vec<u8> {
    let prefix = root.map(|r| format!("{r}/")).unwrap_or_default();
    let mut builder = Builder::new(XzEncoder::new(Vec::new(), 6));

    let script = format!("#!/bin/sh\necho {version_output}\n");
    append(&mut builder, &format!("{prefix}{exe}"), script.as_bytes(), 0o644);
    append(&mut builder, &format!("{prefix}lib/std/std.zig"), b"pub const x = 1;\n", 0o644);

    builder
        .into_inner()
        .expect("Should finish tar")
        .finish()
        .expect("Should finish xz")
}

fn append<W: Write>(builder: &mut Builder<W>, path: &str, body: &[u8], mode: u32) {
    let mut header = Header::new_gnu();
    header.set_size(body.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    builder
        .append_data(&mut header, path, body)
        .expect("Should append entry");
}
