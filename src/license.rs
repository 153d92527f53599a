// src/license.rs

//! License inputs shared by every policy in a run

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// License values handed to the client-side install script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseInfo {
    pub key: String,
    pub hash: String,
}

impl LicenseInfo {
    pub fn load(dir: &Path, family: &str) -> Result<Self> {
        Ok(Self {
            key: file_installation_key(dir, family)?,
            hash: license_hash(dir, family)?,
        })
    }
}

/// First non-blank line of `<family>_key.txt` that is not the
/// "File Installation Key:" label
pub fn file_installation_key(dir: &Path, family: &str) -> Result<String> {
    let path = dir.join(format!("{family}_key.txt"));
    let content = read(&path)?;
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.contains("File Installation Key:"))
        .map(str::to_string)
        .ok_or_else(|| Error::ParseError(format!("No installation key in {}", path.display())))
}

/// Last whitespace-separated token on the first line of `<family>_license.dat`
pub fn license_hash(dir: &Path, family: &str) -> Result<String> {
    let path = dir.join(format!("{family}_license.dat"));
    let content = read(&path)?;
    content
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().last())
        .map(str::to_string)
        .ok_or_else(|| Error::ParseError(format!("No license hash in {}", path.display())))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::NotFound(format!("{}: {e}", path.display())))
}
