//! Config command for the zigx CLI.
//!
//! ## Usage
//!
//! ```bash
//! zigx config path                          # Location of the user settings
//! zigx config show                          # Effective settings as TOML
//! zigx config set install.max-installed 3
//! zigx config unset zig.version
//! ```
//!
//! `set` and `unset` change the user file. A workspace `zigx.toml` still
//! overrides it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use zigx_toolchain::settings::SETTING_KEYS;

use super::open_context;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the path of the user settings file.
    Path,
    /// Print the effective settings.
    Show,
    /// Set a value.
    #[command(after_help = keys_help())]
    Set {
        key: String,
        value: String,
    },
    /// Remove a value.
    #[command(after_help = keys_help())]
    Unset { key: String },
}

fn keys_help() -> String {
    format!("KEYS:\n    {}", SETTING_KEYS.join("\n    "))
}

/// Executes the config command.
///
/// # Errors
///
/// Returns an error for an unknown key, an invalid value or a failed write.
pub fn execute(workspace: Option<PathBuf>, args: &ConfigArgs) -> Result<()> {
    let context = open_context(workspace)?;
    let settings = context.settings();

    match &args.command {
        ConfigCommand::Path => println!("{}", settings.path().display()),
        ConfigCommand::Show => {
            let text = toml::to_string_pretty(&settings.effective())
                .context("Failed to render settings")?;
            print!("{text}");
        }
        ConfigCommand::Set { key, value } => {
            settings.update(|s| s.set(key, value))?;
            println!("{key} = {value}");
        }
        ConfigCommand::Unset { key } => {
            settings.update(|s| s.unset(key))?;
            println!("{key} unset");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_help_lists_every_key() {
        let help = keys_help();
        for key in SETTING_KEYS {
            assert!(help.contains(key), "missing {key}");
        }
    }
}
