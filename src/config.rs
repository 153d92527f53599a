// src/config.rs

//! Run configuration
//!
//! All paths, names and API settings used by a packaging run live in a
//! single [`Config`] value that is handed to each stage. A TOML file may
//! override any subset of the defaults:
//!
//! ```toml
//! vendor = "MathWorks"
//! license_dir = "/Users/admin/matlab/license"
//!
//! [api]
//! url = "https://example.jamfcloud.com"
//! retries = 3
//!
//! [prestage_script]
//! name = "MatLab.Prestage"
//! id = "42"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for the device-management API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the management server
    pub url: String,
    /// Attempts made for every write before giving up
    pub retries: u32,
    /// Fixed delay between attempts
    pub retry_delay_ms: u64,
    /// Timeout for lookups and document writes
    pub timeout_secs: u64,
    /// Timeout for binary package uploads
    pub upload_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "https://yourjamfserver.jamfcloud.com".to_string(),
            retries: 3,
            retry_delay_ms: 2000,
            timeout_secs: 60,
            upload_timeout_secs: 7200,
        }
    }
}

/// The client-side script attached to every self-service policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub name: String,
    pub id: Option<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            name: "MatLab.Prestage".to_string(),
            id: None,
        }
    }
}

/// Configuration for a packaging run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vendor label used for categories, prefixes and group names
    pub vendor: String,
    /// Product installed when a policy carries no dependency names
    pub primary_product: String,
    /// Name of the synthetic policy that installs every target
    pub aggregate_name: String,
    /// Product whose payload is bundled into every package
    pub license_manager_product: String,
    /// Directory holding `<family>_key.txt` and `<family>_license.dat`
    pub license_dir: PathBuf,
    /// Newline-separated list of products to package
    pub targets_file: PathBuf,
    /// Glob locating the mounted installer volume
    pub volume_glob: String,
    /// Location of the platform archives inside the mounted volume
    pub archives_subpath: PathBuf,
    /// Installer script/binary, found next to the archives folder
    pub installer_binary: String,
    /// Where product payloads land on the client, relative to the package root
    pub staging_subpath: PathBuf,
    /// OS package build tool
    pub pkgbuild: PathBuf,
    /// Disk image tool
    pub hdiutil: PathBuf,
    /// Folder for the rotating debug log (default `~/Library/Logs/mwpkg`)
    pub log_dir: Option<PathBuf>,
    /// Daily log files kept before the oldest is removed
    pub log_files: usize,
    pub api: ApiConfig,
    pub prestage_script: ScriptConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vendor: "MathWorks".to_string(),
            primary_product: "MATLAB".to_string(),
            aggregate_name: "Install All".to_string(),
            license_manager_product: "Network License Manager".to_string(),
            license_dir: PathBuf::from("license"),
            targets_file: PathBuf::from("target_software_and_toolboxes.txt"),
            volume_glob: "/Volumes/matlab_*".to_string(),
            archives_subpath: PathBuf::from("InstallForMacOSX.app/Contents/MacOS/archives"),
            installer_binary: "InstallForMacOSX".to_string(),
            staging_subpath: PathBuf::from("private/tmp/matlab/archives"),
            pkgbuild: PathBuf::from("/usr/bin/pkgbuild"),
            hdiutil: PathBuf::from("/usr/bin/hdiutil"),
            log_dir: None,
            log_files: 5,
            api: ApiConfig::default(),
            prestage_script: ScriptConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the given file, or fall back to defaults when none is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Where the debug log goes; `None` when no home folder is known
    pub fn log_directory(&self) -> Option<PathBuf> {
        self.log_dir.clone().or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join("Library/Logs/mwpkg"))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.vendor.trim().is_empty() {
            return Err(Error::ConfigError("vendor must not be empty".to_string()));
        }
        if self.log_files == 0 {
            return Err(Error::ConfigError("log_files must be at least 1".to_string()));
        }
        if self.api.retries == 0 {
            return Err(Error::ConfigError("api.retries must be at least 1".to_string()));
        }
        Ok(())
    }
}
