//! List command for the zigx CLI.
//!
//! ## Output Format
//!
//! ```text
//! zig:
//!   0.13.0    x86_64-linux  (used 2 hours ago)
//!   0.12.1    x86_64-linux  (never used)
//! zls:
//!   0.13.0    x86_64-linux  (used 2 hours ago)
//! ```

use std::path::PathBuf;

use anyhow::Result;
use zigx_toolchain::InstalledToolchain;
use zigx_toolchain::state::now_millis;

use super::open_context;

/// Executes the list command.
///
/// # Errors
///
/// Returns an error if an install root cannot be read.
pub fn execute(workspace: Option<PathBuf>) -> Result<()> {
    let context = open_context(workspace)?;
    let mut groups = Vec::new();
    for config in [context.zig_config(), context.zls_config()] {
        let exe = config.exe_name.as_str();
        groups.push((exe, context.installer().installed(exe)?));
    }

    if groups.iter().all(|(_, installs)| installs.is_empty()) {
        println!("No toolchains installed.");
        println!();
        println!("Run 'zigx install' to install the latest Zig.");
        return Ok(());
    }

    let now = now_millis();
    for (exe, installs) in groups {
        if installs.is_empty() {
            continue;
        }
        println!("{exe}:");
        for install in &installs {
            println!(
                "  {:<10} {:<14} ({})",
                install.version.to_string(),
                install.platform.to_string(),
                last_used(install, now)
            );
        }
    }
    Ok(())
}

fn last_used(install: &InstalledToolchain, now: u64) -> String {
    let Some(record) = install.last_access else {
        return "never used".to_string();
    };
    let minutes = now.saturating_sub(record.at_millis) / 60_000;
    match minutes {
        0 => "used just now".to_string(),
        1..60 => format!("used {minutes} minutes ago"),
        60..1440 => format!("used {} hours ago", minutes / 60),
        _ => format!("used {} days ago", minutes / 1440),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zigx_toolchain::Platform;
    use zigx_toolchain::platform::{Arch, Os};
    use zigx_toolchain::state::AccessRecord;

    fn install(at_millis: Option<u64>) -> InstalledToolchain {
        InstalledToolchain {
            platform: Platform::new(Os::Linux, Arch::X86_64),
            version: semver::Version::new(0, 13, 0),
            path: PathBuf::from("/home/user/.zigx/installs/zig/x86_64-linux-0.13.0"),
            last_access: at_millis.map(|at_millis| AccessRecord { at_millis, seq: 0 }),
        }
    }

    #[test]
    fn last_used_is_relative() {
        let now = 10 * 86_400_000;
        assert_eq!(last_used(&install(None), now), "never used");
        assert_eq!(last_used(&install(Some(now - 1_000)), now), "used just now");
        assert_eq!(last_used(&install(Some(now - 5 * 60_000)), now), "used 5 minutes ago");
        assert_eq!(last_used(&install(Some(now - 3 * 3_600_000)), now), "used 3 hours ago");
        assert_eq!(last_used(&install(Some(now - 2 * 86_400_000)), now), "used 2 days ago");
    }
}
