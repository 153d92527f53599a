// src/dmg.rs

//! Disk image attach and detach through `hdiutil`

use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

/// An attached disk image; detach it before exiting
#[derive(Debug)]
pub struct MountedImage {
    hdiutil: PathBuf,
    device: String,
}

impl MountedImage {
    /// `hdiutil attach <dmg> -plist -nobrowse`
    pub fn attach(hdiutil: &Path, dmg: &Path) -> Result<Self> {
        if !dmg.exists() {
            return Err(Error::NotFound(format!("Disk image {}", dmg.display())));
        }
        let output = Command::new(hdiutil)
            .arg("attach")
            .arg(dmg)
            .args(["-plist", "-nobrowse"])
            .output()
            .map_err(|e| Error::CommandFailed(format!("{} failed to start: {e}", hdiutil.display())))?;

        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "hdiutil attach {} exited with {}: {}",
                dmg.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let device = whole_disk_device(&String::from_utf8_lossy(&output.stdout))?
            .ok_or_else(|| {
                Error::CommandFailed(format!("hdiutil reported no disk device for {}", dmg.display()))
            })?;
        info!("Attached {} as {}", dmg.display(), device);

        Ok(Self {
            hdiutil: hdiutil.to_path_buf(),
            device,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// `hdiutil detach <device>`; returns whether it succeeded
    pub fn detach(self) -> bool {
        match Command::new(&self.hdiutil).arg("detach").arg(&self.device).output() {
            Ok(output) if output.status.success() => {
                info!("Detached {}", self.device);
                true
            }
            Ok(output) => {
                warn!(
                    "hdiutil detach {} exited with {}: {}",
                    self.device,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                warn!("hdiutil detach {} failed to start: {}", self.device, e);
                false
            }
        }
    }
}

/// The first `/dev/diskN` dev-entry in `hdiutil attach -plist` output
pub fn whole_disk_device(plist: &str) -> Result<Option<String>> {
    let entry = Regex::new(r"<key>dev-entry</key>\s*<string>(/dev/disk\d+)</string>")?;
    Ok(entry.captures(plist).map(|caps| caps[1].to_string()))
}

/// First path matching the volume glob
pub fn find_mount_point(pattern: &str) -> Result<PathBuf> {
    let paths = glob::glob(pattern)
        .map_err(|e| Error::ConfigError(format!("Invalid volume glob '{pattern}': {e}")))?;
    let mut matches: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
    matches.sort();
    matches
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("No mounted volume matches {pattern}")))
}
