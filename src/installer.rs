// src/installer.rs

//! Vendor installer packaging
//!
//! The installer application's main executable is a shell script header
//! followed by a zip archive. The header unpacks itself with a line of the
//! form `tail -n +<N> "$0" ...`, meaning the archive starts at line `N`
//! (1-indexed). We locate that marker, slice the file from the start of
//! line `N`, unpack the archive and package the result like any product.

use crate::assembler::{build_package, PackageBuilder, PackageStatus};
use crate::error::{Error, Result};
use regex::bytes::Regex;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Line number named by the first `tail -n +<N>` line of the header
pub fn find_tail_line(data: &[u8]) -> Option<usize> {
    let marker = Regex::new(r"^tail -n \+(\d+)").ok()?;
    data.split(|b| *b == b'\n')
        .find_map(|line| marker.captures(line))
        .and_then(|caps| std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?.parse().ok())
}

/// Byte offset at which 1-indexed `line` starts
pub fn line_offset(data: &[u8], line: usize) -> Option<usize> {
    if line == 0 {
        return None;
    }
    if line == 1 {
        return Some(0);
    }
    data.iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .nth(line - 2)
        .map(|(pos, _)| pos + 1)
}

/// The archive bytes embedded after the script header
pub fn embedded_archive<'a>(data: &'a [u8], source: &Path) -> Result<&'a [u8]> {
    let line = find_tail_line(data)
        .ok_or_else(|| Error::InstallerMarkerNotFound(source.display().to_string()))?;
    let offset = line_offset(data, line).ok_or_else(|| {
        Error::InstallerMarkerNotFound(format!(
            "{} has fewer than {line} lines",
            source.display()
        ))
    })?;
    debug!(
        "Embedded archive in {} starts at line {} (byte {})",
        source.display(),
        line,
        offset
    );
    Ok(&data[offset..])
}

/// Unpack an in-memory zip archive below `dest`
///
/// Entries with unsafe paths are skipped. Unix permissions and symbolic
/// links are restored. Returns the number of entries written.
pub fn extract_zip(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    fs::create_dir_all(dest)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut link = String::new();
            io::Read::read_to_string(&mut entry, &mut link)?;
            write_symlink(&link, &target)?;
            written += 1;
            continue;
        }

        let mut out = File::create(&target).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {e}", target.display()))
        })?;
        io::copy(&mut entry, &mut out)?;
        set_mode(&target, mode)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(unix)]
fn write_symlink(link: &str, target: &Path) -> Result<()> {
    if target.symlink_metadata().is_ok() {
        fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(link, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(link: &str, target: &Path) -> Result<()> {
    fs::write(target, link)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(target: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o7777))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_target: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

/// Package the vendor installer embedded in `installer`
///
/// The archive is unpacked into `dest_dir` (which must lie under
/// `pkg_root`) and `pkg_root` is packaged as `output`. Nothing is unpacked
/// when `output` already exists.
pub fn build_installer_package(
    builder: &dyn PackageBuilder,
    installer: &Path,
    pkg_root: &Path,
    dest_dir: &Path,
    output: &Path,
) -> Result<PackageStatus> {
    if output.exists() {
        warn!("Installer: {} exists, skipping creation", output.display());
        return Ok(PackageStatus::AlreadyExists);
    }

    let data = fs::read(installer).map_err(|e| {
        Error::IoError(format!("Failed to read installer {}: {e}", installer.display()))
    })?;
    let archive = embedded_archive(&data, installer)?;
    let count = extract_zip(archive, dest_dir)?;
    info!("Installer: unpacked {} entries into {}", count, dest_dir.display());

    build_package(builder, pkg_root, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn installer_file(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn test_find_tail_line() {
        let data = b"#!/bin/sh\nexport X=1\ntail -n +57 \"$0\" > /tmp/x.zip\nexit 0\n";
        assert_eq!(find_tail_line(data), Some(57));
        assert_eq!(find_tail_line(b"#!/bin/sh\n  tail -n +3\n"), None);
        assert_eq!(find_tail_line(b"no marker here"), None);
    }

    #[test]
    fn test_line_offset() {
        let data = b"one\ntwo\nthree\n";
        assert_eq!(line_offset(data, 1), Some(0));
        assert_eq!(line_offset(data, 2), Some(4));
        assert_eq!(line_offset(data, 3), Some(8));
        assert_eq!(line_offset(data, 0), None);
        assert_eq!(line_offset(data, 9), None);
    }

    #[test]
    fn test_embedded_archive_starts_at_marked_line() {
        let payload = zip_bytes(&[("InstallForMacOSX.app/Contents/Info.plist", b"<plist/>")]);
        let data = installer_file("#!/bin/sh\ntail -n +3 \"$0\"\n", &payload);

        let slice = embedded_archive(&data, Path::new("InstallForMacOSX")).unwrap();
        assert_eq!(slice, payload.as_slice());
    }

    #[test]
    fn test_embedded_archive_skips_junk_lines() {
        let payload = zip_bytes(&[("a.txt", b"a")]);
        let data = installer_file("#!/bin/sh\ntail -n +5 \"$0\"\njunk one\njunk two\n", &payload);
        let slice = embedded_archive(&data, Path::new("x")).unwrap();
        assert_eq!(slice, payload.as_slice());
    }

    #[test]
    fn test_missing_marker() {
        let result = embedded_archive(b"#!/bin/sh\necho hi\n", Path::new("x"));
        assert!(matches!(result, Err(Error::InstallerMarkerNotFound(_))));
    }

    #[test]
    fn test_extract_zip_keeps_modes() {
        let temp = TempDir::new().unwrap();
        let payload = zip_bytes(&[("app/Contents/MacOS/run", b"#!/bin/sh\n")]);
        assert_eq!(extract_zip(&payload, temp.path()).unwrap(), 1);

        let target = temp.path().join("app/Contents/MacOS/run");
        assert_eq!(fs::read(&target).unwrap(), b"#!/bin/sh\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&target).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    struct TouchBuilder;

    impl PackageBuilder for TouchBuilder {
        fn build(&self, root: &Path, _identifier: &str, output: &Path) -> Result<()> {
            assert!(root.join("private/tmp/matlab/app/file").exists());
            fs::write(output, b"pkg")?;
            Ok(())
        }
    }

    #[test]
    fn test_build_installer_package() {
        let temp = TempDir::new().unwrap();
        let payload = zip_bytes(&[("app/file", b"content")]);
        let installer = temp.path().join("InstallForMacOSX");
        fs::write(&installer, installer_file("#!/bin/sh\ntail -n +3\n", &payload)).unwrap();

        let root = temp.path().join("ROOT");
        let output = temp.path().join("packages/MathWorks.R2021a.Installer.pkg");
        let status = build_installer_package(
            &TouchBuilder,
            &installer,
            &root,
            &root.join("private/tmp/matlab"),
            &output,
        )
        .unwrap();
        assert_eq!(status, PackageStatus::Built);
        assert!(output.exists());

        // A second run does not even read the installer
        fs::remove_file(&installer).unwrap();
        let status =
            build_installer_package(&TouchBuilder, &installer, &root, &root, &output).unwrap();
        assert_eq!(status, PackageStatus::AlreadyExists);
    }
}
