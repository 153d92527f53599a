// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! [`Fixture`] lays out a fake mounted installer volume:
//!
//! ```text
//! volume/installer/InstallForMacOSX        script header + embedded zip
//! volume/installer/archives/platform_*.zip manifests
//! volume/installer/archives/<platform>/... component payloads
//! license/R2021a_key.txt, R2021a_license.dat
//! work/
//! ```

#![allow(dead_code)]

use mwpkg::{Config, PackageBuilder, Platform, Result};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

pub const FAMILY: &str = "R2021a";

/// One product in the fake installer
pub struct ProductSpec {
    pub name: &'static str,
    pub version: &'static str,
    pub controlling: bool,
    /// (name, is controlling product)
    pub required: Vec<(&'static str, bool)>,
    /// Per component: (component name, platform, componentFileName)
    pub components: Vec<(&'static str, Platform, &'static str)>,
}

impl ProductSpec {
    fn entry(&self, platform: Platform) -> String {
        format!(
            "bin/productdata_{}{}_{}.xml",
            self.name.replace(' ', "_"),
            self.version.replace('.', ""),
            platform.as_str()
        )
    }

    fn xml(&self, platform: Platform) -> String {
        let required: String = self
            .required
            .iter()
            .map(|(name, controlling)| {
                format!(
                    "<product><productName>{name}</productName>\
                     <isControllingProduct>{controlling}</isControllingProduct></product>"
                )
            })
            .collect();
        let components: String = self
            .components
            .iter()
            .filter(|(_, p, _)| *p == platform)
            .map(|(name, _, _)| format!("<component><name>{name}</name></component>"))
            .collect();
        format!(
            "<?xml version=\"1.0\"?>\n<productData>\
             <productName>{}</productName><productVersion>{}</productVersion>\
             <releaseFamily>{FAMILY}</releaseFamily>\
             <isControllingProduct>{}</isControllingProduct>\
             <requiredProducts>{required}</requiredProducts>\
             <dependsOn>{components}</dependsOn></productData>",
            self.name, self.version, self.controlling
        )
    }
}

pub fn license_manager() -> ProductSpec {
    ProductSpec {
        name: "Network License Manager",
        version: "11.16.2",
        controlling: true,
        required: vec![],
        components: vec![
            ("nlm common", Platform::Common, "nlm/lmgrd.enc"),
            ("nlm maci64", Platform::Maci64, "nlm/bin/lmgrd.enc"),
        ],
    }
}

pub fn matlab() -> ProductSpec {
    ProductSpec {
        name: "MATLAB",
        version: "9.10",
        controlling: true,
        required: vec![],
        components: vec![
            ("matlab common", Platform::Common, "matlab/toolbox.enc"),
            ("matlab maci64", Platform::Maci64, "matlab/bin.enc"),
        ],
    }
}

pub fn curve_fitting() -> ProductSpec {
    ProductSpec {
        name: "Curve Fitting Toolbox",
        version: "3.5.13",
        controlling: false,
        required: vec![("MATLAB", true)],
        components: vec![
            ("curvefit common", Platform::Common, "curvefit/curvefit.enc"),
            ("curvefit maci64", Platform::Maci64, "curvefit/mex.enc"),
        ],
    }
}

/// A toolbox whose payload is missing from the installer
pub fn broken_toolbox() -> ProductSpec {
    ProductSpec {
        name: "Broken Toolbox",
        version: "1.0",
        controlling: false,
        required: vec![("MATLAB", true)],
        components: vec![("broken common", Platform::Common, "broken/missing.enc")],
    }
}

/// A toolbox that names no controlling product
pub fn orphan_toolbox() -> ProductSpec {
    ProductSpec {
        name: "Orphan Toolbox",
        version: "1.0",
        controlling: false,
        required: vec![("Statistics Toolbox", false)],
        components: vec![("orphan common", Platform::Common, "orphan/orphan.enc")],
    }
}

fn component_entry(name: &str) -> String {
    format!("defs/{}_1.xml", name.replace(' ', "_"))
}

fn component_xml(name: &str, file: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<componentData><component>\
         <componentName>{name}</componentName>\
         <componentFileName>{file}</componentFileName></component></componentData>"
    )
}

/// Zip archive bytes holding `entries`
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A fake installer volume plus license and work folders
pub struct Fixture {
    pub temp: TempDir,
    pub config: Config,
}

impl Fixture {
    /// Installer containing the license manager, MATLAB, a toolbox and the
    /// two faulty toolboxes
    pub fn new() -> Self {
        Self::with_products(vec![
            license_manager(),
            matlab(),
            curve_fitting(),
            broken_toolbox(),
            orphan_toolbox(),
        ])
    }

    pub fn with_products(products: Vec<ProductSpec>) -> Self {
        let temp = TempDir::new().unwrap();
        let fixture = Self {
            config: Config {
                license_dir: temp.path().join("license"),
                ..Config::default()
            },
            temp,
        };

        for platform in Platform::ALL {
            let mut entries: Vec<(String, String)> = Vec::new();
            for product in &products {
                entries.push((product.entry(platform), product.xml(platform)));
                for (name, p, file) in &product.components {
                    if *p != platform {
                        continue;
                    }
                    entries.push((component_entry(name), component_xml(name, file)));
                    if product.name != "Broken Toolbox" {
                        fixture.write_payload(platform, file);
                    }
                }
            }
            let entries: Vec<(&str, &[u8])> = entries
                .iter()
                .map(|(name, content)| (name.as_str(), content.as_bytes()))
                .collect();
            write_file(
                &fixture.archives_dir().join(platform.archive_file_name()),
                &zip_bytes(&entries),
            );
        }

        let payload = zip_bytes(&[
            ("InstallForMacOSX.app/Contents/Info.plist", b"<plist/>"),
            ("InstallForMacOSX.app/Contents/MacOS/setup", b"#!/bin/sh\n"),
        ]);
        let mut installer = b"#!/bin/sh\ntail -n +4 \"$0\" > /tmp/installer.zip\nexit 0\n".to_vec();
        installer.extend_from_slice(&payload);
        write_file(&fixture.volume().join("InstallForMacOSX"), &installer);

        write_file(
            &fixture.license_dir().join(format!("{FAMILY}_key.txt")),
            b"File Installation Key:\n11111-22222-33333-44444\n",
        );
        write_file(
            &fixture.license_dir().join(format!("{FAMILY}_license.dat")),
            b"# BEGIN LICENSE HASH 0123ABCD\nINCREMENT MATLAB\n",
        );
        fs::create_dir_all(fixture.work_dir()).unwrap();
        fixture
    }

    /// The mounted installer application folder
    pub fn volume(&self) -> PathBuf {
        self.temp.path().join("volume/installer")
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.volume().join("archives")
    }

    pub fn license_dir(&self) -> PathBuf {
        self.temp.path().join("license")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.temp.path().join("work")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.work_dir().join("packages")
    }

    /// Write a payload file at its manifest location
    pub fn write_payload(&self, platform: Platform, file: &str) {
        write_file(
            &self.archives_dir().join(platform.as_str()).join(file),
            format!("payload {file}").as_bytes(),
        );
    }

    /// Move a payload below `<platform>/<folder>/`, away from where its
    /// manifest says it is
    pub fn misplace_payload(&self, platform: Platform, file: &str, folder: &str) {
        let platform_dir = self.archives_dir().join(platform.as_str());
        let target = platform_dir.join(folder).join(file);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::rename(platform_dir.join(file), target).unwrap();
    }
}

/// Builds a package by recording the package root's file list
///
/// The output file holds one relative path per line.
#[derive(Default)]
pub struct TreeBuilder {
    pub builds: RefCell<Vec<(String, Vec<String>)>>,
}

impl TreeBuilder {
    pub fn identifiers(&self) -> Vec<String> {
        self.builds.borrow().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Files in the package root when `identifier` was built
    pub fn files_of(&self, identifier: &str) -> Vec<String> {
        self.builds
            .borrow()
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, files)| files.clone())
            .unwrap_or_default()
    }
}

impl PackageBuilder for TreeBuilder {
    fn build(&self, root: &Path, identifier: &str, output: &Path) -> Result<()> {
        let mut files: Vec<String> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        let mut out = File::create(output)?;
        out.write_all(files.join("\n").as_bytes())?;
        self.builds
            .borrow_mut()
            .push((identifier.to_string(), files));
        Ok(())
    }
}
