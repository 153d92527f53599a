// src/product.rs

//! Products and their per-platform state
//!
//! A [`Product`] starts as a bare name and is enriched in explicit steps:
//!
//! 1. [`Product::bind_archive`] attaches each platform archive
//! 2. [`Product::discover_manifest`] finds and parses the product manifest
//!    on each platform
//! 3. [`Product::discover_components`] resolves every component the
//!    manifests list (the expensive step: one archive scan per component)
//!
//! Once discovery is done, [`Product::info`] produces an immutable
//! [`ProductInfo`] record and fails loudly when the data needed for naming
//! and policy planning is missing.

use crate::archive::{Archive, Platform};
use crate::component::Component;
use crate::error::{Error, Result};
use crate::manifest::{ManifestLookup, ProductManifest};
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct PlatformState {
    archive: Option<Arc<Archive>>,
    manifest: ManifestLookup<ProductManifest>,
    components: Vec<Component>,
}

/// One catalog item to be packaged
#[derive(Debug)]
pub struct Product {
    name: String,
    platforms: [PlatformState; 2],
}

/// Metadata of a product whose common manifest was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub name: String,
    pub version: String,
    pub family: String,
    pub is_controlling_product: bool,
    /// First required product flagged as controlling; `None` for
    /// controlling products and for toolboxes whose data lacks one
    pub controlling_product: Option<String>,
    /// Required product names in manifest order
    pub dependencies: Vec<String>,
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platforms: Default::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach an archive for its platform
    ///
    /// An archive whose file has disappeared is ignored and the platform
    /// stays unbound. Returns whether the archive was attached.
    pub fn bind_archive(&mut self, archive: Arc<Archive>) -> bool {
        if !archive.path().exists() {
            warn!(
                "{}: ignoring missing {} archive {}",
                self.name,
                archive.platform(),
                archive.path().display()
            );
            return false;
        }
        let platform = archive.platform();
        self.platforms[platform.index()].archive = Some(archive);
        true
    }

    pub fn archive(&self, platform: Platform) -> Option<&Arc<Archive>> {
        self.platforms[platform.index()].archive.as_ref()
    }

    /// Find this product's manifest on each bound platform
    pub fn discover_manifest(&mut self) -> Result<()> {
        let escaped = regex::escape(&self.name.replace(' ', "_"));

        for platform in Platform::ALL {
            let state = &mut self.platforms[platform.index()];
            state.manifest = ManifestLookup::NotFound;

            let Some(archive) = state.archive.as_ref() else {
                warn!("{}: no {} archive bound", self.name, platform);
                continue;
            };

            let pattern = Regex::new(&format!(
                r"^.*/productdata_{escaped}\d+_{}\.xml$",
                platform.as_str()
            ))?;

            let mut matches = Vec::new();
            for entry in archive.find_matching(&pattern) {
                let manifest = ProductManifest::parse(&archive.read_to_string(entry)?)?;
                if manifest.name.as_deref() == Some(self.name.as_str()) {
                    matches.push((entry.to_string(), manifest));
                } else {
                    debug!(
                        "{}: skipping {} (declares {:?})",
                        self.name, entry, manifest.name
                    );
                }
            }

            if matches.len() > 1 {
                return Err(Error::AmbiguousManifest {
                    name: self.name.clone(),
                    platform: platform.to_string(),
                    candidates: matches.into_iter().map(|(entry, _)| entry).collect(),
                });
            }

            match matches.pop() {
                Some((entry, manifest)) => {
                    info!("{}: {} manifest {}", self.name, platform, entry);
                    state.manifest = ManifestLookup::Found { entry, manifest };
                }
                None => warn!("{}: no {} manifest found", self.name, platform),
            }
        }
        Ok(())
    }

    pub fn manifest(&self, platform: Platform) -> &ManifestLookup<ProductManifest> {
        &self.platforms[platform.index()].manifest
    }

    /// Resolve every component listed under `dependsOn` on each platform
    pub fn discover_components(&mut self) -> Result<()> {
        for platform in Platform::ALL {
            let state = &mut self.platforms[platform.index()];
            state.components.clear();

            let (Some(archive), Some(manifest)) =
                (state.archive.as_ref(), state.manifest.manifest())
            else {
                continue;
            };

            for component_name in &manifest.depends_on {
                let component = Component::resolve(component_name, archive)?;
                if !component.manifest.is_found() {
                    warn!(
                        "{}: component '{}' has no {} manifest",
                        self.name, component_name, platform
                    );
                }
                state.components.push(component);
            }
            info!(
                "{}: {} {} components",
                self.name,
                state.components.len(),
                platform
            );
        }
        Ok(())
    }

    pub fn components(&self, platform: Platform) -> &[Component] {
        &self.platforms[platform.index()].components
    }

    fn common_manifest(&self) -> Option<&ProductManifest> {
        self.manifest(Platform::Common).manifest()
    }

    pub fn version(&self) -> Option<&str> {
        self.common_manifest()?.version.as_deref()
    }

    pub fn family(&self) -> Option<&str> {
        self.common_manifest()?.release_family.as_deref()
    }

    /// `false` when the manifest is missing
    pub fn is_controlling_product(&self) -> bool {
        self.common_manifest()
            .is_some_and(|m| m.is_controlling_product)
    }

    /// The first required product flagged as controlling
    ///
    /// Always `None` for a controlling product.
    pub fn controlling_product_name(&self) -> Option<&str> {
        if self.is_controlling_product() {
            return None;
        }
        self.common_manifest()?
            .required_products
            .iter()
            .find(|p| p.is_controlling_product)
            .map(|p| p.name.as_str())
    }

    pub fn dependency_names(&self) -> Vec<String> {
        self.common_manifest()
            .map(ProductManifest::dependency_names)
            .unwrap_or_default()
    }

    /// Snapshot the metadata needed for naming and planning
    pub fn info(&self) -> Result<ProductInfo> {
        let manifest = self.common_manifest().ok_or_else(|| Error::ManifestNotFound {
            name: self.name.clone(),
            platform: Platform::Common.to_string(),
        })?;

        let required = |value: &Option<String>, field: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::MissingField {
                    name: self.name.clone(),
                    field: field.to_string(),
                })
        };

        Ok(ProductInfo {
            name: self.name.clone(),
            version: required(&manifest.version, "productVersion")?,
            family: required(&manifest.release_family, "releaseFamily")?,
            is_controlling_product: manifest.is_controlling_product,
            controlling_product: self.controlling_product_name().map(str::to_string),
            dependencies: manifest.dependency_names(),
        })
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_archive(dir: &Path, platform: Platform, entries: &[(String, String)]) -> Arc<Archive> {
        let path = dir.join(platform.archive_file_name());
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, content) in entries {
            writer.start_file(name.as_str(), SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        Arc::new(Archive::open(&path, platform).unwrap())
    }

    fn product_xml(name: &str, controlling: bool, required: &[(&str, bool)], components: &[&str]) -> String {
        let required: String = required
            .iter()
            .map(|(n, c)| {
                format!("<product><productName>{n}</productName><isControllingProduct>{c}</isControllingProduct></product>")
            })
            .collect();
        let components: String = components
            .iter()
            .map(|c| format!("<component><name>{c}</name></component>"))
            .collect();
        format!(
            "<productData><productName>{name}</productName><productVersion>3.5</productVersion>\
             <releaseFamily>R2021a</releaseFamily><isControllingProduct>{controlling}</isControllingProduct>\
             <requiredProducts>{required}</requiredProducts><dependsOn>{components}</dependsOn></productData>"
        )
    }

    fn component_xml(name: &str, file: &str) -> String {
        format!(
            "<c><component><componentName>{name}</componentName>\
             <componentFileName>{file}</componentFileName></component></c>"
        )
    }

    fn toolbox_archives(dir: &Path) -> (Arc<Archive>, Arc<Archive>) {
        let xml = |platform: &str| {
            product_xml(
                "Curve Fitting Toolbox",
                false,
                &[("Statistics Toolbox", false), ("MATLAB", true), ("Simulink", true)],
                &[format!("CFT {platform}").as_str()],
            )
        };
        let common = write_archive(
            dir,
            Platform::Common,
            &[
                ("bin/productdata_Curve_Fitting_Toolbox3513_common.xml".into(), xml("common")),
                ("defs/CFT_common_1.xml".into(), component_xml("CFT common", "toolbox/cft.enc")),
            ],
        );
        let maci64 = write_archive(
            dir,
            Platform::Maci64,
            &[
                ("bin/productdata_Curve_Fitting_Toolbox3513_maci64.xml".into(), xml("maci64")),
                ("defs/CFT_maci64_1.xml".into(), component_xml("CFT maci64", "bin/cft.enc")),
            ],
        );
        (common, maci64)
    }

    #[test]
    fn test_discovery_steps() {
        let temp = TempDir::new().unwrap();
        let (common, maci64) = toolbox_archives(temp.path());

        let mut product = Product::new("Curve Fitting Toolbox");
        assert!(product.bind_archive(common));
        assert!(product.bind_archive(maci64));

        product.discover_manifest().unwrap();
        assert!(product.manifest(Platform::Common).is_found());
        assert!(product.manifest(Platform::Maci64).is_found());
        assert!(product.components(Platform::Common).is_empty());

        product.discover_components().unwrap();
        assert_eq!(product.components(Platform::Common)[0].path(), Some("toolbox/cft.enc"));
        assert_eq!(product.components(Platform::Maci64)[0].path(), Some("bin/cft.enc"));

        assert_eq!(product.version(), Some("3.5"));
        assert_eq!(product.family(), Some("R2021a"));
        assert!(!product.is_controlling_product());
        assert_eq!(
            product.dependency_names(),
            vec!["Statistics Toolbox", "MATLAB", "Simulink"]
        );
    }

    #[test]
    fn test_controlling_product_is_first_flagged_dependency() {
        let temp = TempDir::new().unwrap();
        let (common, maci64) = toolbox_archives(temp.path());
        let mut product = Product::new("Curve Fitting Toolbox");
        product.bind_archive(common);
        product.bind_archive(maci64);
        product.discover_manifest().unwrap();

        assert_eq!(product.controlling_product_name(), Some("MATLAB"));
        let info = product.info().unwrap();
        assert_eq!(info.controlling_product.as_deref(), Some("MATLAB"));
        assert_eq!(info.family, "R2021a");
    }

    #[test]
    fn test_missing_manifest_degrades_to_defaults() {
        let temp = TempDir::new().unwrap();
        let (common, maci64) = toolbox_archives(temp.path());
        let mut product = Product::new("Simulink");
        product.bind_archive(common);
        product.bind_archive(maci64);
        product.discover_manifest().unwrap();
        product.discover_components().unwrap();

        assert!(!product.manifest(Platform::Common).is_found());
        assert_eq!(product.version(), None);
        assert_eq!(product.family(), None);
        assert!(!product.is_controlling_product());
        assert_eq!(product.controlling_product_name(), None);
        assert!(product.dependency_names().is_empty());
        assert!(product.components(Platform::Maci64).is_empty());
        assert!(matches!(product.info(), Err(Error::ManifestNotFound { .. })));
    }

    #[test]
    fn test_name_prefix_does_not_match_longer_product() {
        let temp = TempDir::new().unwrap();
        let common = write_archive(
            temp.path(),
            Platform::Common,
            &[(
                "bin/productdata_MATLAB_Coder2100_common.xml".into(),
                product_xml("MATLAB Coder", false, &[("MATLAB", true)], &[]),
            )],
        );
        let mut product = Product::new("MATLAB");
        product.bind_archive(common);
        product.discover_manifest().unwrap();
        assert!(!product.manifest(Platform::Common).is_found());
    }

    #[test]
    fn test_unbound_platform_is_not_found() {
        let mut product = Product::new("MATLAB");
        product.discover_manifest().unwrap();
        assert!(product.archive(Platform::Common).is_none());
        assert!(!product.manifest(Platform::Maci64).is_found());
    }

    #[test]
    fn test_bind_rejects_deleted_archive() {
        let temp = TempDir::new().unwrap();
        let (common, _) = toolbox_archives(temp.path());
        std::fs::remove_file(common.path()).unwrap();
        let mut product = Product::new("Curve Fitting Toolbox");
        assert!(!product.bind_archive(common));
        assert!(product.archive(Platform::Common).is_none());
    }

    #[test]
    fn test_info_requires_family() {
        let temp = TempDir::new().unwrap();
        let common = write_archive(
            temp.path(),
            Platform::Common,
            &[(
                "bin/productdata_MATLAB9100_common.xml".into(),
                "<productData><productName>MATLAB</productName><productVersion>9.10</productVersion></productData>".into(),
            )],
        );
        let mut product = Product::new("MATLAB");
        product.bind_archive(common);
        product.discover_manifest().unwrap();
        match product.info() {
            Err(Error::MissingField { field, .. }) => assert_eq!(field, "releaseFamily"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
