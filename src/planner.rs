// src/planner.rs

//! Policy planning
//!
//! Derives naming, categorization, scope and dependency lists for every
//! packaged product and keeps them in a persisted [`PolicyDefinitions`]
//! record, which the policy phase later turns into remote policies.
//!
//! A product is planned as one of two shapes, decided by its manifest's
//! controlling flag:
//!
//! | | controlling product | toolbox |
//! |---|---|---|
//! | full name | `<prefix><Name.With.Dots>` | `<prefix><Controller>.<Name.With.Dots>` |
//! | self-service | `<Name> <family>` | `Add <Name> to <Controller> <family>` |
//! | dependencies | declared + itself appended | declared with itself at index 1 |
//! | category | regular | toolbox |

use crate::error::{Error, Result};
use crate::license::LicenseInfo;
use crate::product::ProductInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Record key of the vendor installer policy
pub const INSTALLER_KEY: &str = "Installer";

/// Names shared by every policy in one release family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub family: String,
    /// `<vendor> <family>`
    pub category: String,
    /// `<vendor> <family> Toolboxes`
    pub toolbox_category: String,
    /// `<vendor>.<family>.`
    pub prefix: String,
    /// `<prefix>Anchor`
    pub anchor_category: String,
    /// `<prefix>Anchor.Toolboxes`
    pub anchor_toolbox_category: String,
    /// `<prefix>Advertised.STG`
    pub scope_group: String,
}

impl Labels {
    pub fn new(vendor: &str, family: &str) -> Self {
        let category = format!("{vendor} {family}");
        let prefix = format!("{vendor}.{family}.");
        let anchor_category = format!("{prefix}Anchor");
        Self {
            family: family.to_string(),
            toolbox_category: format!("{category} Toolboxes"),
            category,
            anchor_toolbox_category: format!("{anchor_category}.Toolboxes"),
            anchor_category,
            scope_group: format!("{prefix}Advertised.STG"),
            prefix,
        }
    }

    /// Category names in creation order
    pub fn categories(&self) -> [&str; 4] {
        [
            &self.category,
            &self.toolbox_category,
            &self.anchor_category,
            &self.anchor_toolbox_category,
        ]
    }

    /// `<prefix>Installer`
    pub fn installer_name(&self) -> String {
        format!("{}Installer", self.prefix)
    }
}

/// Remote ids of the objects every policy refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIds {
    pub category: String,
    pub toolbox_category: String,
    pub anchor_category: String,
    pub anchor_toolbox_category: String,
    pub scope_group: String,
}

/// Everything shared by the policies of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub labels: Labels,
    pub ids: RemoteIds,
    pub license: LicenseInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// The vendor installer; anchor policy only
    Installer,
    /// A controlling product
    #[default]
    Product,
    /// An add-on of a controlling product
    Toolbox,
    /// The synthetic "install everything" self-service policy
    Aggregate,
}

/// Naming and dependencies computed for one product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPlan {
    pub kind: PolicyKind,
    pub full_name: String,
    pub self_service_name: String,
    pub dependencies: Vec<String>,
}

impl ProductPlan {
    /// Custom event name that triggers the anchor policy
    pub fn anchor_trigger(&self) -> String {
        format!("@{}", self.full_name)
    }

    pub fn package_name(&self) -> String {
        format!("{}.pkg", self.full_name)
    }
}

/// Plan a product from its manifest data
///
/// A toolbox without a controlling product cannot be named and fails with
/// `MissingControllingProduct`.
pub fn plan_product(info: &ProductInfo, labels: &Labels, aggregate_name: &str) -> Result<ProductPlan> {
    let dotted = info.name.replace(' ', ".");

    if info.is_controlling_product {
        let mut dependencies = info.dependencies.clone();
        dependencies.push(info.name.clone());
        return Ok(ProductPlan {
            kind: PolicyKind::Product,
            full_name: format!("{}{}", labels.prefix, dotted),
            self_service_name: format!("{} {}", info.name, labels.family),
            dependencies,
        });
    }

    let controller = info
        .controlling_product
        .as_deref()
        .ok_or_else(|| Error::MissingControllingProduct(info.name.clone()))?;

    let mut dependencies = info.dependencies.clone();
    if info.name != aggregate_name {
        dependencies.insert(dependencies.len().min(1), info.name.clone());
    }

    Ok(ProductPlan {
        kind: PolicyKind::Toolbox,
        full_name: format!("{}{}.{}", labels.prefix, controller, dotted),
        self_service_name: format!("Add {} to {} {}", info.name, controller, labels.family),
        dependencies,
    })
}

/// Persisted policy data for one product (or the installer/aggregate)
///
/// Remote ids are recorded as they become known and survive re-planning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_trigger: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default)]
    pub kind: PolicyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_service_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_service_category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_service_name: Option<String>,
}

impl PolicyDefinition {
    pub fn is_toolbox(&self) -> bool {
        self.kind == PolicyKind::Toolbox
    }

    /// Definition for a planned product
    pub fn for_product(plan: &ProductPlan, ctx: &RunContext) -> Self {
        let labels = &ctx.labels;
        let toolbox = plan.kind == PolicyKind::Toolbox;
        let (category, category_id, anchor_category, anchor_category_id) = if toolbox {
            (
                &labels.toolbox_category,
                &ctx.ids.toolbox_category,
                &labels.anchor_toolbox_category,
                &ctx.ids.anchor_toolbox_category,
            )
        } else {
            (
                &labels.category,
                &ctx.ids.category,
                &labels.anchor_category,
                &ctx.ids.anchor_category,
            )
        };

        Self {
            anchor_category: Some(anchor_category.clone()),
            anchor_category_id: Some(anchor_category_id.clone()),
            anchor_name: Some(plan.full_name.clone()),
            anchor_trigger: Some(plan.anchor_trigger()),
            dependencies: plan.dependencies.clone(),
            family: Some(labels.family.clone()),
            kind: plan.kind,
            license_hash: Some(ctx.license.hash.clone()),
            license_key: Some(ctx.license.key.clone()),
            package_name: Some(plan.package_name()),
            scope_id: Some(ctx.ids.scope_group.clone()),
            scope_name: Some(labels.scope_group.clone()),
            self_service_category: Some(category.clone()),
            self_service_category_id: Some(category_id.clone()),
            self_service_name: Some(plan.self_service_name.clone()),
            ..Self::default()
        }
    }

    /// Definition for the vendor installer's anchor policy
    pub fn for_installer(ctx: &RunContext, package_name: &str, package_id: &str) -> Self {
        let name = package_name
            .strip_suffix(".pkg")
            .unwrap_or(package_name)
            .to_string();
        Self {
            anchor_category: Some(ctx.labels.anchor_category.clone()),
            anchor_category_id: Some(ctx.ids.anchor_category.clone()),
            anchor_trigger: Some(format!("@{name}")),
            anchor_name: Some(name),
            kind: PolicyKind::Installer,
            package_id: Some(package_id.to_string()),
            package_name: Some(package_name.to_string()),
            scope_id: Some(ctx.ids.scope_group.clone()),
            scope_name: Some(ctx.labels.scope_group.clone()),
            ..Self::default()
        }
    }

    /// Definition for the self-service policy installing every target
    pub fn for_aggregate(ctx: &RunContext, targets: &[String], primary_product: &str) -> Self {
        Self {
            dependencies: targets.to_vec(),
            family: Some(ctx.labels.family.clone()),
            kind: PolicyKind::Aggregate,
            license_hash: Some(ctx.license.hash.clone()),
            license_key: Some(ctx.license.key.clone()),
            scope_id: Some(ctx.ids.scope_group.clone()),
            scope_name: Some(ctx.labels.scope_group.clone()),
            self_service_category: Some(ctx.labels.category.clone()),
            self_service_category_id: Some(ctx.ids.category.clone()),
            self_service_name: Some(format!(
                "{} {} and All Toolboxes",
                primary_product, ctx.labels.family
            )),
            ..Self::default()
        }
    }

    /// Take every planned field from `fresh`, keeping recorded remote ids
    /// that `fresh` does not carry
    pub fn merge(&mut self, fresh: PolicyDefinition) {
        let package_id = fresh.package_id.or_else(|| self.package_id.take());
        let anchor_id = fresh.anchor_id.or_else(|| self.anchor_id.take());
        let self_service_id = fresh.self_service_id.or_else(|| self.self_service_id.take());
        *self = PolicyDefinition {
            package_id,
            anchor_id,
            self_service_id,
            ..fresh
        };
    }
}

/// All policy definitions of a run, keyed by product name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyDefinitions {
    entries: BTreeMap<String, PolicyDefinition>,
}

impl PolicyDefinitions {
    /// Read a definitions file; a missing file yields an empty record
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("{} does not exist, starting with no definitions", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let definitions: Self = serde_json::from_str(&content)?;
        debug!("Loaded {} policy definitions", definitions.len());
        Ok(definitions)
    }

    /// Write the record atomically, keys in sorted order
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        file.persist(path)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {e}", path.display())))?;
        debug!("Saved {} policy definitions to {}", self.len(), path.display());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PolicyDefinition> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PolicyDefinition> {
        self.entries.get_mut(name)
    }

    /// Merge `fresh` into the record for `name`
    pub fn upsert(&mut self, name: &str, fresh: PolicyDefinition) -> &mut PolicyDefinition {
        let entry = self.entries.entry(name.to_string()).or_default();
        entry.merge(fresh);
        entry
    }

    /// Replace the record for `name` outright
    pub fn set(&mut self, name: &str, definition: PolicyDefinition) {
        self.entries.insert(name.to_string(), definition);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> RunContext {
        RunContext {
            labels: Labels::new("MathWorks", "R2021a"),
            ids: RemoteIds {
                category: "1".to_string(),
                toolbox_category: "2".to_string(),
                anchor_category: "3".to_string(),
                anchor_toolbox_category: "4".to_string(),
                scope_group: "9".to_string(),
            },
            license: LicenseInfo {
                key: "KEY".to_string(),
                hash: "HASH".to_string(),
            },
        }
    }

    fn info(name: &str, controlling: bool, controller: Option<&str>, deps: &[&str]) -> ProductInfo {
        ProductInfo {
            name: name.to_string(),
            version: "1.0".to_string(),
            family: "R2021a".to_string(),
            is_controlling_product: controlling,
            controlling_product: controller.map(str::to_string),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_labels() {
        let labels = Labels::new("MathWorks", "R2021a");
        assert_eq!(labels.category, "MathWorks R2021a");
        assert_eq!(labels.toolbox_category, "MathWorks R2021a Toolboxes");
        assert_eq!(labels.prefix, "MathWorks.R2021a.");
        assert_eq!(labels.anchor_category, "MathWorks.R2021a.Anchor");
        assert_eq!(labels.anchor_toolbox_category, "MathWorks.R2021a.Anchor.Toolboxes");
        assert_eq!(labels.scope_group, "MathWorks.R2021a.Advertised.STG");
        assert_eq!(labels.installer_name(), "MathWorks.R2021a.Installer");
    }

    #[test]
    fn test_controlling_product_naming() {
        let labels = Labels::new("MathWorks", "R2021a");
        let plan = plan_product(&info("Simulink", true, None, &["MATLAB"]), &labels, "Install All")
            .unwrap();
        assert_eq!(plan.kind, PolicyKind::Product);
        assert_eq!(plan.full_name, "MathWorks.R2021a.Simulink");
        assert_eq!(plan.self_service_name, "Simulink R2021a");
        assert_eq!(plan.dependencies, vec!["MATLAB", "Simulink"]);
        assert_eq!(plan.anchor_trigger(), "@MathWorks.R2021a.Simulink");
        assert_eq!(plan.package_name(), "MathWorks.R2021a.Simulink.pkg");
    }

    #[test]
    fn test_toolbox_naming() {
        let labels = Labels::new("MathWorks", "R2021a");
        let toolbox = info(
            "Curve Fitting Toolbox",
            false,
            Some("MATLAB"),
            &["MATLAB", "Statistics Toolbox"],
        );
        let plan = plan_product(&toolbox, &labels, "Install All").unwrap();
        assert_eq!(plan.kind, PolicyKind::Toolbox);
        assert_eq!(plan.full_name, "MathWorks.R2021a.MATLAB.Curve.Fitting.Toolbox");
        assert_eq!(plan.self_service_name, "Add Curve Fitting Toolbox to MATLAB R2021a");
        assert_eq!(
            plan.dependencies,
            vec!["MATLAB", "Curve Fitting Toolbox", "Statistics Toolbox"]
        );
    }

    #[test]
    fn test_toolbox_dependency_insertion_edges() {
        let labels = Labels::new("MathWorks", "R2021a");
        let plan = plan_product(&info("Solo", false, Some("MATLAB"), &[]), &labels, "Install All")
            .unwrap();
        assert_eq!(plan.dependencies, vec!["Solo"]);

        let plan = plan_product(
            &info("Install All", false, Some("MATLAB"), &["MATLAB", "Simulink"]),
            &labels,
            "Install All",
        )
        .unwrap();
        assert_eq!(plan.dependencies, vec!["MATLAB", "Simulink"]);
    }

    #[test]
    fn test_toolbox_without_controller_fails() {
        let labels = Labels::new("MathWorks", "R2021a");
        let result = plan_product(&info("Orphan", false, None, &["X"]), &labels, "Install All");
        assert!(matches!(result, Err(Error::MissingControllingProduct(_))));
    }

    #[test]
    fn test_definition_categories() {
        let ctx = context();
        let labels = &ctx.labels;
        let toolbox = plan_product(&info("CFT", false, Some("MATLAB"), &["MATLAB"]), labels, "Install All")
            .unwrap();
        let def = PolicyDefinition::for_product(&toolbox, &ctx);
        assert!(def.is_toolbox());
        assert_eq!(def.self_service_category.as_deref(), Some("MathWorks R2021a Toolboxes"));
        assert_eq!(def.self_service_category_id.as_deref(), Some("2"));
        assert_eq!(def.anchor_category_id.as_deref(), Some("4"));
        assert_eq!(def.license_key.as_deref(), Some("KEY"));
        assert_eq!(def.scope_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_merge_keeps_remote_ids() {
        let ctx = context();
        let plan = plan_product(&info("MATLAB", true, None, &[]), &ctx.labels, "Install All").unwrap();
        let mut definitions = PolicyDefinitions::default();
        let entry = definitions.upsert("MATLAB", PolicyDefinition::for_product(&plan, &ctx));
        entry.package_id = Some("31".to_string());
        entry.anchor_id = Some("32".to_string());
        entry.self_service_id = Some("33".to_string());

        let mut replanned = PolicyDefinition::for_product(&plan, &ctx);
        replanned.self_service_name = Some("MATLAB R2021b".to_string());
        let entry = definitions.upsert("MATLAB", replanned);
        assert_eq!(entry.package_id.as_deref(), Some("31"));
        assert_eq!(entry.anchor_id.as_deref(), Some("32"));
        assert_eq!(entry.self_service_id.as_deref(), Some("33"));
        assert_eq!(entry.self_service_name.as_deref(), Some("MATLAB R2021b"));
    }

    #[test]
    fn test_installer_and_aggregate_definitions() {
        let ctx = context();
        let installer = PolicyDefinition::for_installer(&ctx, "MathWorks.R2021a.Installer.pkg", "7");
        assert_eq!(installer.kind, PolicyKind::Installer);
        assert_eq!(installer.anchor_name.as_deref(), Some("MathWorks.R2021a.Installer"));
        assert_eq!(installer.anchor_trigger.as_deref(), Some("@MathWorks.R2021a.Installer"));
        assert!(installer.dependencies.is_empty());
        assert!(installer.self_service_name.is_none());

        let all = PolicyDefinition::for_aggregate(&ctx, &["MATLAB".to_string()], "MATLAB");
        assert_eq!(all.kind, PolicyKind::Aggregate);
        assert_eq!(all.self_service_name.as_deref(), Some("MATLAB R2021a and All Toolboxes"));
        assert_eq!(all.self_service_category_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("policy_definitions.json");
        assert!(PolicyDefinitions::load(&path).unwrap().is_empty());

        let ctx = context();
        let mut definitions = PolicyDefinitions::default();
        definitions.set(INSTALLER_KEY, PolicyDefinition::for_installer(&ctx, "I.pkg", "5"));
        definitions.set("Install All", PolicyDefinition::for_aggregate(&ctx, &[], "MATLAB"));
        definitions.save(&path).unwrap();

        let loaded = PolicyDefinitions::load(&path).unwrap();
        assert_eq!(loaded, definitions);
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["Install All", "Installer"]);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"kind\": \"installer\""));
        let installer = &text[text.find("\"Installer\"").unwrap()..];
        assert!(installer.find("\"anchor_category\"").unwrap() < installer.find("\"scope_id\"").unwrap());
    }
}
