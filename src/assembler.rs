// src/assembler.rs

//! Package assembly
//!
//! Copies a product's component payloads from the mounted installer's
//! archives folder into a staging tree, places the product and component
//! manifests next to them (the license-key install needs both at install
//! time) and turns the staging root into a flat package with the OS
//! package build tool.
//!
//! Staging layout for one product:
//!
//! ```text
//! <staging>/<product manifest entry path>
//! <staging>/<component manifest entry path>...
//! <staging>/common/<componentFileName>...
//! <staging>/maci64/<componentFileName>...
//! ```

use crate::archive::Platform;
use crate::error::{Error, Result};
use crate::paths::join_under;
use crate::product::Product;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What happened while staging one product
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Payload files copied
    pub copied: usize,
    /// Payload files found only by the fallback search
    pub relocated: usize,
    /// Components skipped because their manifest was not found
    pub skipped: Vec<String>,
}

/// Stages product payloads from `source_root` into `staging_root`
#[derive(Debug, Clone)]
pub struct Assembler {
    staging_root: PathBuf,
    source_root: PathBuf,
}

impl Assembler {
    pub fn new(staging_root: impl Into<PathBuf>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            source_root: source_root.into(),
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Stage every resolved component of `product` on both platforms
    ///
    /// Fails when a platform's manifest was not found or when a payload is
    /// missing from both its expected location and the fallback search.
    pub fn assemble(&self, product: &Product) -> Result<AssemblyReport> {
        fs::create_dir_all(&self.staging_root)?;
        let mut report = AssemblyReport::default();

        for platform in Platform::ALL {
            info!("{}: staging {} components", product.name(), platform);
            self.assemble_platform(product, platform, &mut report)?;
        }

        info!(
            "{}: staged {} files ({} relocated, {} skipped)",
            product.name(),
            report.copied,
            report.relocated,
            report.skipped.len()
        );
        Ok(report)
    }

    fn assemble_platform(
        &self,
        product: &Product,
        platform: Platform,
        report: &mut AssemblyReport,
    ) -> Result<()> {
        let archive = product.archive(platform).ok_or_else(|| {
            Error::NotFound(format!("{}: no {} archive bound", product.name(), platform))
        })?;
        let manifest_entry =
            product
                .manifest(platform)
                .entry()
                .ok_or_else(|| Error::ManifestNotFound {
                    name: product.name().to_string(),
                    platform: platform.to_string(),
                })?;

        archive.extract(manifest_entry, &self.staging_root)?;
        debug!("{}: product data from {}", product.name(), manifest_entry);

        for component in product.components(platform) {
            let (Some(file), Some(entry)) = (component.path(), component.manifest_entry()) else {
                warn!(
                    "{}: skipping component '{}' without a {} manifest",
                    product.name(),
                    component.name,
                    platform
                );
                report.skipped.push(component.name.clone());
                continue;
            };

            let relative = Path::new(platform.as_str()).join(file);
            let source = join_under(&self.source_root, &relative)?;
            let destination = join_under(&self.staging_root, &relative)?;
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }

            let source = if source.is_file() {
                source
            } else {
                let found = relocate(&source, file)?;
                debug!(
                    "{}: {} found at {}",
                    product.name(),
                    file,
                    found.display()
                );
                report.relocated += 1;
                found
            };

            fs::copy(&source, &destination).map_err(|e| {
                Error::IoError(format!(
                    "Failed to copy {} to {}: {e}",
                    source.display(),
                    destination.display()
                ))
            })?;
            report.copied += 1;

            archive.extract(entry, &self.staging_root)?;
        }
        Ok(())
    }
}

/// Search near `expected` for a file whose path ends with `file`
///
/// Some payloads are stored outside the folder their manifest names. The
/// search starts one level above the expected file's parent directory and
/// returns the first hit in file-name order.
pub fn relocate(expected: &Path, file: &str) -> Result<PathBuf> {
    let search_root = expected
        .parent()
        .and_then(Path::parent)
        .ok_or_else(|| Error::InvalidPath(expected.display().to_string()))?;
    let suffix = Path::new(file);

    WalkDir::new(search_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .find(|path| path.ends_with(suffix))
        .ok_or_else(|| {
            Error::ComponentFileMissing(format!(
                "{} (also searched {})",
                expected.display(),
                search_root.display()
            ))
        })
}

/// Remove `dir` and everything below it; returns whether anything was removed
pub fn clean_directory(dir: &Path) -> Result<bool> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| {
            Error::IoError(format!("Failed to remove {}: {e}", dir.display()))
        })?;
        return Ok(true);
    }
    Ok(false)
}

/// The OS tool that turns a payload root into an installer package
pub trait PackageBuilder {
    /// Build `output` from the files under `root`, tagged with `identifier`
    fn build(&self, root: &Path, identifier: &str, output: &Path) -> Result<()>;
}

/// `pkgbuild --root <root> --identifier <id> <output>`
#[derive(Debug, Clone)]
pub struct Pkgbuild {
    program: PathBuf,
}

impl Pkgbuild {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PackageBuilder for Pkgbuild {
    fn build(&self, root: &Path, identifier: &str, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .arg("--root")
            .arg(root)
            .arg("--identifier")
            .arg(identifier)
            .arg(output)
            .output()
            .map_err(|e| {
                Error::CommandFailed(format!("{} failed to start: {e}", self.program.display()))
            })?;

        if !result.status.success() {
            return Err(Error::CommandFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Result of [`build_package`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Built,
    /// The output already existed; the tool was not run
    AlreadyExists,
}

/// Build `output` from `root`, using the output's file stem as identifier
///
/// An existing `output` is left untouched and counts as success, so re-runs
/// only build what is missing.
pub fn build_package(
    builder: &dyn PackageBuilder,
    root: &Path,
    output: &Path,
) -> Result<PackageStatus> {
    if output.exists() {
        warn!("Skipping package creation, {} exists", output.display());
        return Ok(PackageStatus::AlreadyExists);
    }

    let identifier = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(output.display().to_string()))?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    info!("Building {} from {}", output.display(), root.display());
    builder.build(root, &identifier, output)?;
    Ok(PackageStatus::Built)
}
