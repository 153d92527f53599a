// src/license_manager.rs

//! Network License Manager bundle
//!
//! The license manager's payload has to be present in every product
//! package. It is staged once per run, compressed into one zip per platform
//! together with an `mwcontents_<zip stem>.xml` table of contents, and the
//! zips are then copied into each product's staging tree.

use crate::archive::Platform;
use crate::assembler::Assembler;
use crate::error::{Error, Result};
use crate::product::{Product, ProductInfo};
use crate::xml::XmlWriter;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// The compressed license manager, one zip per platform
#[derive(Debug, Clone)]
pub struct LicenseManagerBundle {
    pub info: ProductInfo,
    zips: Vec<(Platform, PathBuf)>,
}

impl LicenseManagerBundle {
    /// Stage `product` below `root` and compress each platform folder
    ///
    /// `product` must already have its archives bound.
    pub fn prepare(product: &mut Product, root: &Path, source_root: &Path) -> Result<Self> {
        product.discover_manifest()?;
        product.discover_components()?;
        let info = product.info()?;
        info!("{}: creating version {}", info.name, info.version);

        Assembler::new(root, source_root).assemble(product)?;

        let mut zips = Vec::new();
        for platform in Platform::ALL {
            zips.push((platform, compress(&info.version, root, platform)?));
        }
        Ok(Self { info, zips })
    }

    /// Zip file for one platform
    pub fn zip(&self, platform: Platform) -> Option<&Path> {
        self.zips
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, path)| path.as_path())
    }

    /// Copy each platform's zip into `<staged_archives>/<platform>/`
    pub fn install_into(&self, staged_archives: &Path) -> Result<()> {
        for (platform, zip) in &self.zips {
            let dir = staged_archives.join(platform.as_str());
            fs::create_dir_all(&dir)?;
            let file_name = zip
                .file_name()
                .ok_or_else(|| Error::InvalidPath(zip.display().to_string()))?;
            fs::copy(zip, dir.join(file_name)).map_err(|e| {
                Error::IoError(format!("Failed to copy {}: {e}", zip.display()))
            })?;
        }
        Ok(())
    }
}

/// `Network_License_Manager<version without dots>_<platform>.zip`
pub fn zip_name(version: &str, platform: Platform) -> String {
    format!(
        "Network_License_Manager{}_{}.zip",
        version.replace('.', ""),
        platform
    )
}

/// Compress `<root>/<platform>` into `<root>/<zip_name>`
///
/// Entries are stored relative to the platform folder. `.DS_Store` files are
/// left out. The contents document lists `.enc` payloads as
/// `componentFiles` and `.xml` manifests as `definitions`.
pub fn compress(version: &str, root: &Path, platform: Platform) -> Result<PathBuf> {
    let source = root.join(platform.as_str());
    let zip_path = root.join(zip_name(version, platform));
    let stem = zip_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(zip_path.display().to_string()))?;

    let file = File::create(&zip_path).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {e}", zip_path.display()))
    })?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let mut contents = XmlWriter::new();
    contents.declaration(true)?;
    contents.start("contents")?;

    for entry in WalkDir::new(&source).sort_by_file_name().min_depth(1) {
        let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
        if entry.file_name() == ".DS_Store" {
            continue;
        }
        let stored = entry
            .path()
            .strip_prefix(&source)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(stored.as_str(), options)?;
            continue;
        }

        match entry.path().extension().and_then(|e| e.to_str()) {
            Some("enc") => {
                contents.element("componentFiles", &stored)?;
            }
            Some("xml") => {
                contents.element("definitions", &stored)?;
            }
            _ => {}
        }

        zip.start_file(stored.as_str(), options)?;
        io::copy(&mut File::open(entry.path())?, &mut zip)?;
        debug!("Network License Manager: added {}", stored);
    }

    contents.end("contents")?;
    zip.start_file(format!("mwcontents_{stem}.xml"), options)?;
    zip.write_all(contents.finish()?.as_bytes())?;
    zip.finish()?;

    info!("Network License Manager: created {}", zip_path.display());
    Ok(zip_path)
}
