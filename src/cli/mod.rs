// src/cli/mod.rs
//! CLI definitions for mwpkg
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations live in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mwpkg")]
#[command(author = "mwpkg Contributors")]
#[command(version)]
#[command(about = "Create per-product packages from a MathWorks installer image", long_about = None)]
pub struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package products from an installer disk image and register their policies
    Build {
        /// Disk image containing the full installer
        #[arg(short, long, value_name = "DMG")]
        dmg: PathBuf,

        /// Working folder (default: the folder holding the disk image)
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// Newline-separated list of products to package
        #[arg(short, long)]
        targets: Option<PathBuf>,

        /// Product to package instead of the targets file (repeatable)
        #[arg(short = 'p', long = "product", value_name = "NAME")]
        products: Vec<String>,

        /// User with API privileges
        #[arg(short = 'U', long)]
        user: Option<String>,

        /// Password for the API user
        #[arg(short = 'P', long, env = "MWPKG_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Skip product packaging and only write policies from the saved definitions
        #[arg(short, long)]
        skip: bool,

        /// Use an in-memory management server instead of the real one
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what the installer archives contain
    Inspect {
        /// Folder holding platform_common.zip and platform_maci64.zip
        #[arg(short, long)]
        archives: PathBuf,

        /// Product to describe (repeatable); lists all products when omitted
        #[arg(short = 'p', long = "product", value_name = "NAME")]
        products: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
