// src/lib.rs

//! mwpkg
//!
//! Turns a MathWorks installer disk image into one installer package per
//! product and registers the install policies that deploy them through a
//! Jamf Pro server.
//!
//! # Architecture
//!
//! - Archives: the installer's per-platform zip containers are indexed once
//!   and searched with full-match patterns
//! - Products: discovered in explicit steps (bind archives, find manifest,
//!   resolve components) and snapshotted into an immutable `ProductInfo`
//! - Assembly: payloads are staged under a package root and handed to the
//!   OS package builder behind the `PackageBuilder` trait
//! - Planning: every product becomes a typed policy definition persisted
//!   between runs
//! - Remote state: the `ManagementApi` trait, with idempotent helpers that
//!   never create or upload an existing name twice

pub mod archive;
pub mod assembler;
pub mod component;
pub mod config;
pub mod dmg;
mod error;
pub mod installer;
pub mod jamf;
pub mod license;
pub mod license_manager;
pub mod manifest;
pub mod paths;
pub mod pipeline;
pub mod planner;
pub mod product;
pub mod targets;
mod xml;

pub use archive::{Archive, Platform};
pub use assembler::{build_package, Assembler, PackageBuilder, PackageStatus, Pkgbuild};
pub use component::Component;
pub use config::Config;
pub use error::{Error, Result};
pub use jamf::{InMemoryApi, JamfClient, ManagementApi, ObjectKind};
pub use manifest::{ComponentManifest, ManifestLookup, ProductManifest};
pub use pipeline::{Pipeline, RunSummary};
pub use planner::{Labels, PolicyDefinition, PolicyDefinitions, PolicyKind, ProductPlan};
pub use product::{Product, ProductInfo};
