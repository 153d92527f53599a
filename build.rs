// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: repeatable product selection
fn product_arg() -> Arg {
    Arg::new("product")
        .short('p')
        .long("product")
        .value_name("NAME")
        .action(ArgAction::Append)
}

fn build_cli() -> Command {
    Command::new("mwpkg")
        .version(env!("CARGO_PKG_VERSION"))
        .author("mwpkg Contributors")
        .about("Create per-product packages from a MathWorks installer image")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log output (-v info, -vv debug)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Only log errors"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Configuration file (TOML)"),
        )
        .subcommand(
            Command::new("build")
                .about("Package products from an installer disk image and register their policies")
                .arg(
                    Arg::new("dmg")
                        .short('d')
                        .long("dmg")
                        .required(true)
                        .help("Disk image containing the full installer"),
                )
                .arg(
                    Arg::new("folder")
                        .short('f')
                        .long("folder")
                        .help("Working folder (default: the folder holding the disk image)"),
                )
                .arg(
                    Arg::new("targets")
                        .short('t')
                        .long("targets")
                        .help("Newline-separated list of products to package"),
                )
                .arg(product_arg().help("Product to package instead of the targets file (repeatable)"))
                .arg(Arg::new("user").short('U').long("user").help("User with API privileges"))
                .arg(
                    Arg::new("password")
                        .short('P')
                        .long("password")
                        .env("MWPKG_PASSWORD")
                        .help("Password for the API user"),
                )
                .arg(
                    Arg::new("skip")
                        .short('s')
                        .long("skip")
                        .action(ArgAction::SetTrue)
                        .help("Skip product packaging and only write policies from the saved definitions"),
                )
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Use an in-memory management server instead of the real one"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Show what the installer archives contain")
                .arg(
                    Arg::new("archives")
                        .short('a')
                        .long("archives")
                        .required(true)
                        .help("Folder holding platform_common.zip and platform_maci64.zip"),
                )
                .arg(product_arg().help("Product to describe (repeatable)")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("Shell to generate completions for")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("mwpkg.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
