// src/manifest.rs

//! Product and component manifests
//!
//! Each platform archive carries one `productdata_<Name><digits>_<platform>.xml`
//! document per product and one `<Component>_<digits>.xml` document per
//! component. Only the handful of fields the packager consumes are kept:
//!
//! ```xml
//! <productData>
//!   <productName>Curve Fitting Toolbox</productName>
//!   <productVersion>3.5.13</productVersion>
//!   <releaseFamily>R2021a</releaseFamily>
//!   <isControllingProduct>false</isControllingProduct>
//!   <requiredProducts>
//!     <product>
//!       <productName>MATLAB</productName>
//!       <isControllingProduct>true</isControllingProduct>
//!     </product>
//!   </requiredProducts>
//!   <dependsOn>
//!     <component><name>Curve Fitting Toolbox Common</name></component>
//!   </dependsOn>
//! </productData>
//! ```

use crate::error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Outcome of looking up a manifest inside an archive
///
/// Absence is an ordinary result here; each caller decides whether a
/// missing manifest is fatal for what it is doing.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestLookup<T> {
    Found {
        /// Entry name of the manifest within its archive
        entry: String,
        manifest: T,
    },
    NotFound,
}

impl<T> ManifestLookup<T> {
    pub fn manifest(&self) -> Option<&T> {
        match self {
            Self::Found { manifest, .. } => Some(manifest),
            Self::NotFound => None,
        }
    }

    pub fn entry(&self) -> Option<&str> {
        match self {
            Self::Found { entry, .. } => Some(entry),
            Self::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

impl<T> Default for ManifestLookup<T> {
    fn default() -> Self {
        Self::NotFound
    }
}

/// A product named in another product's `requiredProducts` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredProduct {
    pub name: String,
    pub is_controlling_product: bool,
}

/// Parsed `productdata_*.xml`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub release_family: Option<String>,
    pub is_controlling_product: bool,
    /// Required products in document order
    pub required_products: Vec<RequiredProduct>,
    /// Component names listed anywhere under `dependsOn`
    pub depends_on: Vec<String>,
}

impl ProductManifest {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut manifest = ProductManifest::default();
        // Entries whose productName has not been seen yet
        let mut pending: Vec<(Option<String>, bool)> = Vec::new();

        walk(xml, |node| match node {
            Node::Open(path) => {
                if tail_is(path, &["requiredProducts", "product"]) && path.len() == 3 {
                    pending.push((None, false));
                }
            }
            Node::Close(path, text) => match &path[1..] {
                [field] if field == "productName" => set_once(&mut manifest.name, text),
                [field] if field == "productVersion" => set_once(&mut manifest.version, text),
                [field] if field == "releaseFamily" => {
                    set_once(&mut manifest.release_family, text)
                }
                [field] if field == "isControllingProduct" => {
                    manifest.is_controlling_product = text == "true";
                }
                [list, product, field] if list == "requiredProducts" && product == "product" => {
                    if let Some(entry) = pending.last_mut() {
                        match field.as_str() {
                            "productName" if entry.0.is_none() => entry.0 = Some(text.to_string()),
                            "isControllingProduct" => entry.1 = text == "true",
                            _ => {}
                        }
                    }
                }
                [first, .., last] if first == "dependsOn" && last == "name" => {
                    manifest.depends_on.push(text.to_string());
                }
                _ => {}
            },
        })?;

        manifest.required_products = pending
            .into_iter()
            .filter_map(|(name, is_controlling_product)| {
                name.map(|name| RequiredProduct {
                    name,
                    is_controlling_product,
                })
            })
            .collect();
        Ok(manifest)
    }

    /// Names of the required products, in document order
    pub fn dependency_names(&self) -> Vec<String> {
        self.required_products.iter().map(|p| p.name.clone()).collect()
    }
}

/// Parsed component manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentManifest {
    pub name: Option<String>,
    /// Payload file path relative to the platform's archives folder
    pub file_name: Option<String>,
}

impl ComponentManifest {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut manifest = ComponentManifest::default();
        walk(xml, |node| {
            if let Node::Close(path, text) = node {
                if tail_is(path, &["component", "componentName"]) {
                    set_once(&mut manifest.name, text);
                } else if tail_is(path, &["component", "componentFileName"]) {
                    set_once(&mut manifest.file_name, text);
                }
            }
        })?;
        Ok(manifest)
    }
}

enum Node<'a> {
    /// An element was opened; the path ends with its name
    Open(&'a [String]),
    /// An element was closed, with its trimmed text content
    Close(&'a [String], &'a str),
}

fn walk(xml: &str, mut visit: impl FnMut(Node<'_>)) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut texts: Vec<String> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                texts.push(String::new());
                visit(Node::Open(&path));
            }
            Event::Empty(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                visit(Node::Open(&path));
                visit(Node::Close(&path, ""));
                path.pop();
            }
            Event::Text(t) => {
                if let Some(buf) = texts.last_mut() {
                    buf.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(buf) = texts.last_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let text = texts.pop().unwrap_or_default();
                visit(Node::Close(&path, text.trim()));
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

fn tail_is(path: &[String], tail: &[&str]) -> bool {
    path.len() >= tail.len()
        && path[path.len() - tail.len()..]
            .iter()
            .zip(tail)
            .all(|(a, b)| a == b)
}

fn set_once(slot: &mut Option<String>, text: &str) {
    if slot.is_none() && !text.is_empty() {
        *slot = Some(text.to_string());
    }
}
