// src/archive.rs

//! Platform archives
//!
//! The installer ships one zip container per platform variant holding every
//! product and component manifest for that platform. An [`Archive`] indexes
//! the entry names once at open time; lookups are regular-expression
//! full matches over that sorted, de-duplicated index, so repeated searches
//! always return candidates in the same order.

use crate::error::{Error, Result};
use crate::manifest::ProductManifest;
use crate::paths::join_under;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::debug;
use zip::ZipArchive;

/// The two packaging targets every product is resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// Platform-independent files
    Common,
    /// Intel macOS files
    Maci64,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Common, Platform::Maci64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Maci64 => "maci64",
        }
    }

    /// File name of this platform's archive in the installer's archives folder
    pub fn archive_file_name(&self) -> String {
        format!("platform_{}.zip", self.as_str())
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Common => 0,
            Self::Maci64 => 1,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opened, read-only platform archive
pub struct Archive {
    path: PathBuf,
    platform: Platform,
    entries: Vec<String>,
    zip: Mutex<ZipArchive<File>>,
    products: OnceLock<Vec<ProductManifest>>,
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("platform", &self.platform)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Archive {
    /// Open an archive and index its entry names
    pub fn open(path: impl AsRef<Path>, platform: Platform) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "{} archive: {}",
                platform,
                path.display()
            )));
        }

        let file = File::open(path)?;
        let zip = ZipArchive::new(file)?;
        let entries: BTreeSet<String> = zip.file_names().map(str::to_string).collect();
        debug!(
            "Indexed {} entries in {} ({})",
            entries.len(),
            path.display(),
            platform
        );

        Ok(Self {
            path: path.to_path_buf(),
            platform,
            entries: entries.into_iter().collect(),
            zip: Mutex::new(zip),
            products: OnceLock::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// All entry names, sorted
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose whole name matches `pattern`
    pub fn find_files(&self, pattern: &str) -> Result<Vec<&str>> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(self.find_matching(&regex))
    }

    /// Entries matched by an already anchored expression
    pub fn find_matching(&self, regex: &Regex) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|name| regex.is_match(name))
            .map(String::as_str)
            .collect()
    }

    /// Read a whole entry into memory
    pub fn read(&self, entry: &str) -> Result<Vec<u8>> {
        let mut zip = self.lock()?;
        let mut file = zip.by_name(entry)?;
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Read an entry as text, replacing invalid UTF-8
    pub fn read_to_string(&self, entry: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.read(entry)?).into_owned())
    }

    /// Write one entry below `dest_dir`, keeping its path inside the archive
    ///
    /// Returns the path written. Write failures are returned to the caller.
    pub fn extract(&self, entry: &str, dest_dir: &Path) -> Result<PathBuf> {
        let target = join_under(dest_dir, entry)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut zip = self.lock()?;
        let mut file = zip.by_name(entry)?;
        let mut out = File::create(&target).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {e}", target.display()))
        })?;
        io::copy(&mut file, &mut out)?;
        debug!("Extracted {} to {}", entry, target.display());
        Ok(target)
    }

    /// Every product manifest in the archive, parsed on first use
    pub fn product_manifests(&self) -> Result<&[ProductManifest]> {
        if let Some(products) = self.products.get() {
            return Ok(products);
        }

        let mut products = Vec::new();
        for entry in self.find_files(r".*/productdata_.*\.xml")? {
            products.push(ProductManifest::parse(&self.read_to_string(entry)?)?);
        }
        Ok(self.products.get_or_init(|| products))
    }

    /// Names declared by the archive's product manifests
    pub fn product_names(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .product_manifests()?
            .iter()
            .filter_map(|m| m.name.clone())
            .collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ZipArchive<File>>> {
        self.zip
            .lock()
            .map_err(|_| Error::ArchiveError(format!("{} is poisoned", self.path.display())))
    }
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
