// src/commands/inspect.rs
//! Archive inspection

use anyhow::{Context, Result};
use mwpkg::{Archive, Platform, Product};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// List the products in the installer archives, or describe selected ones
pub fn cmd_inspect(archives: &Path, products: &[String]) -> Result<()> {
    let mut opened = Vec::new();
    for platform in Platform::ALL {
        let path = archives.join(platform.archive_file_name());
        let archive = Archive::open(&path, platform)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        opened.push(Arc::new(archive));
    }

    if products.is_empty() {
        let mut names = BTreeSet::new();
        for archive in &opened {
            names.extend(archive.product_names()?);
        }
        println!("{} products:", names.len());
        for name in names {
            println!("  {name}");
        }
        return Ok(());
    }

    for name in products {
        let mut product = Product::new(name);
        for archive in &opened {
            product.bind_archive(Arc::clone(archive));
        }
        product.discover_manifest()?;
        product.discover_components()?;
        describe(&product);
    }
    Ok(())
}

fn describe(product: &Product) {
    println!("{}", product.name());
    println!("  Version: {}", product.version().unwrap_or("(unknown)"));
    println!("  Family: {}", product.family().unwrap_or("(unknown)"));
    if product.is_controlling_product() {
        println!("  Controlling product");
    } else {
        println!(
            "  Controlled by: {}",
            product.controlling_product_name().unwrap_or("(none)")
        );
    }
    let dependencies = product.dependency_names();
    if !dependencies.is_empty() {
        println!("  Requires: {}", dependencies.join(", "));
    }

    for platform in Platform::ALL {
        match product.manifest(platform).entry() {
            Some(entry) => println!("  [{platform}] {entry}"),
            None => {
                println!("  [{platform}] no manifest");
                continue;
            }
        }
        for component in product.components(platform) {
            match component.path() {
                Some(path) => println!("    {} -> {}", component.name, path),
                None => println!("    {} (no manifest)", component.name),
            }
        }
    }
}
