// src/jamf/mod.rs

//! Device-management server integration
//!
//! The pipeline only needs four remote operations, captured by
//! [`ManagementApi`]: look an object up by name, create it from a document,
//! update it by id, and upload a package file. [`JamfClient`] talks to a
//! Jamf Pro server's classic API; [`InMemoryApi`] keeps everything in
//! process for dry runs and tests.
//!
//! The `ensure_*` helpers make creation idempotent: an object whose name
//! already exists is never created or uploaded again.

mod client;
mod memory;
pub mod policy;
pub mod templates;

pub use client::{parse_upload_response, JamfClient};
pub use memory::InMemoryApi;

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Kinds of remote objects the pipeline manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Category,
    Group,
    Package,
    Policy,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Category,
        ObjectKind::Group,
        ObjectKind::Package,
        ObjectKind::Policy,
    ];

    /// Classic API resource path segment
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Group => "computergroups",
            Self::Package => "packages",
            Self::Policy => "policies",
        }
    }

    /// JSON pointer to the id in a lookup-by-name response
    pub fn id_pointer(&self) -> &'static str {
        match self {
            Self::Category => "/category/id",
            Self::Group => "/computer_group/id",
            Self::Package => "/package/id",
            Self::Policy => "/policy/general/id",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Category => "category",
            Self::Group => "group",
            Self::Package => "package",
            Self::Policy => "policy",
        };
        f.write_str(name)
    }
}

/// Remote object store, keyed by exact name
pub trait ManagementApi {
    /// Id of the object called `name`, if it exists
    fn find_id(&self, kind: ObjectKind, name: &str) -> Result<Option<String>>;

    /// Create a new object from `document`
    fn create(&self, kind: ObjectKind, name: &str, document: &str) -> Result<()>;

    /// Replace the object `id` with `document`
    fn update(&self, kind: ObjectKind, id: &str, name: &str, document: &str) -> Result<()>;

    /// Upload a package file under its file name and return the new id
    fn upload_package(&self, path: &Path) -> Result<String>;
}

/// Look up `name`, creating it from `render(name)` when absent
fn ensure_object(
    api: &dyn ManagementApi,
    kind: ObjectKind,
    name: &str,
    render: impl FnOnce(&str) -> Result<String>,
) -> Result<String> {
    if let Some(id) = api.find_id(kind, name)? {
        info!("{} '{}' ({}) already exists", kind, name, id);
        return Ok(id);
    }

    debug!("Creating {} '{}'", kind, name);
    api.create(kind, name, &render(name)?)?;
    let id = confirm(api, kind, name)?;
    info!("Created {} '{}' ({})", kind, name, id);
    Ok(id)
}

fn confirm(api: &dyn ManagementApi, kind: ObjectKind, name: &str) -> Result<String> {
    api.find_id(kind, name)?
        .ok_or_else(|| Error::RemoteObjectMissing {
            kind: kind.to_string(),
            name: name.to_string(),
        })
}

pub fn ensure_category(api: &dyn ManagementApi, name: &str) -> Result<String> {
    ensure_object(api, ObjectKind::Category, name, templates::render_category)
}

pub fn ensure_static_group(api: &dyn ManagementApi, name: &str) -> Result<String> {
    ensure_object(api, ObjectKind::Group, name, templates::render_static_group)
}

/// Upload `path` unless a package with its file name exists
pub fn ensure_package(api: &dyn ManagementApi, path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;

    if let Some(id) = api.find_id(ObjectKind::Package, &name)? {
        warn!("Package {} ({}) already uploaded", name, id);
        return Ok(id);
    }

    let id = api.upload_package(path)?;
    info!("Uploaded package {} ({})", name, id);
    Ok(id)
}

/// Create the policy `name`, or update it in place when it exists
///
/// Returns the policy id after confirming the server knows the name.
pub fn upsert_policy(api: &dyn ManagementApi, name: &str, document: &str) -> Result<String> {
    match api.find_id(ObjectKind::Policy, name)? {
        Some(id) => {
            warn!("Policy '{}' ({}) exists, updating", name, id);
            api.update(ObjectKind::Policy, &id, name, document)?;
        }
        None => {
            info!("Policy '{}' does not exist, creating", name);
            api.create(ObjectKind::Policy, name, document)?;
        }
    }
    confirm(api, ObjectKind::Policy, name)
}
