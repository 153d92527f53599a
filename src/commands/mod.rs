// src/commands/mod.rs
//! Command handlers for the mwpkg CLI

mod build;
mod inspect;

pub use build::{cmd_build, BuildOptions};
pub use inspect::cmd_inspect;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;

/// Write completions for `shell` to stdout
pub fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = crate::cli::Cli::command();
    clap_complete::generate(shell, &mut cmd, "mwpkg", &mut std::io::stdout());
    Ok(())
}
