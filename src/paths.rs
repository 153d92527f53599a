// src/paths.rs

//! Path handling for names taken from archives and manifests
//!
//! Archive entry names and `componentFileName` values come from vendor data.
//! They are joined onto staging directories only after being reduced to a
//! plain relative path, so a crafted entry such as `../../etc/hosts` cannot
//! escape the package root.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Reduce an archive-relative path to normal components only
///
/// Leading slashes and `.` components are dropped; `..` is rejected.
///
/// ```
/// use mwpkg::paths::relative_path;
/// use std::path::PathBuf;
///
/// assert_eq!(relative_path("bin/maci64/libmw.enc").unwrap(), PathBuf::from("bin/maci64/libmw.enc"));
/// assert_eq!(relative_path("/./toolbox/a.xml").unwrap(), PathBuf::from("toolbox/a.xml"));
/// assert!(relative_path("toolbox/../../a.xml").is_err());
/// ```
pub fn relative_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut normalized = PathBuf::new();

    for component in original.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                return Err(Error::PathTraversal(original.display().to_string()));
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{}' has no path components",
            original.display()
        )));
    }
    Ok(normalized)
}

/// Join an untrusted relative path onto a trusted root
pub fn join_under(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    Ok(root.as_ref().join(relative_path(path)?))
}
