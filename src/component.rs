// src/component.rs

//! Component resolution
//!
//! A product's manifest lists its components by name only. Each name is
//! turned into a file-name pattern (`*<Name_With_Underscores>_<digits>.xml`)
//! and searched for in the owning platform archive. Because such a pattern
//! can also match the manifest of a differently named component (for
//! example `Foo_1.xml` and `Bar_Foo_1.xml`), a candidate is bound only when
//! the name it declares equals the name searched for.

use crate::archive::{Archive, Platform};
use crate::error::{Error, Result};
use crate::manifest::{ComponentManifest, ManifestLookup};
use regex::Regex;
use tracing::debug;

/// One file-bearing piece of a product on one platform
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub platform: Platform,
    pub manifest: ManifestLookup<ComponentManifest>,
}

impl Component {
    /// Locate and parse the manifest for `name` in `archive`
    ///
    /// Returns a component whose manifest is `NotFound` when no entry
    /// declares this name, and `AmbiguousManifest` when more than one does.
    pub fn resolve(name: &str, archive: &Archive) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r"^.*{}_\d+\.xml$",
            regex::escape(&name.replace(' ', "_"))
        ))?;

        let mut matches = Vec::new();
        for entry in archive.find_matching(&pattern) {
            let manifest = ComponentManifest::parse(&archive.read_to_string(entry)?)?;
            if manifest.name.as_deref() == Some(name) {
                matches.push((entry.to_string(), manifest));
            } else {
                debug!(
                    "{}: skipping {} (declares {:?})",
                    name, entry, manifest.name
                );
            }
        }

        let manifest = match matches.len() {
            0 => ManifestLookup::NotFound,
            1 => {
                let (entry, manifest) = matches.remove(0);
                debug!("{}: component manifest {}", name, entry);
                ManifestLookup::Found { entry, manifest }
            }
            _ => {
                return Err(Error::AmbiguousManifest {
                    name: name.to_string(),
                    platform: archive.platform().to_string(),
                    candidates: matches.into_iter().map(|(entry, _)| entry).collect(),
                });
            }
        };

        Ok(Self {
            name: name.to_string(),
            platform: archive.platform(),
            manifest,
        })
    }

    pub fn is_common(&self) -> bool {
        self.platform == Platform::Common
    }

    /// Payload path relative to the platform's archives folder
    ///
    /// `None` when the manifest was not found or lacks `componentFileName`.
    pub fn path(&self) -> Option<&str> {
        self.manifest.manifest()?.file_name.as_deref()
    }

    /// Entry name of this component's manifest within its archive
    pub fn manifest_entry(&self) -> Option<&str> {
        self.manifest.entry()
    }
}
