// src/jamf/policy.rs

//! Policy creation from persisted definitions

use super::templates::{AnchorPolicy, ObjectRef, PrestageParameters, SelfServicePolicy};
use super::{upsert_policy, ManagementApi};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::planner::PolicyDefinition;
use tracing::info;

fn field<'a>(value: &'a Option<String>, product: &str, name: &str) -> Result<&'a str> {
    value.as_deref().ok_or_else(|| Error::MissingField {
        name: product.to_string(),
        field: name.to_string(),
    })
}

/// Anchor policy for `product`; requires an uploaded package
pub fn anchor_policy(product: &str, def: &PolicyDefinition) -> Result<AnchorPolicy> {
    let name = field(&def.anchor_name, product, "anchor_name")?;
    Ok(AnchorPolicy {
        name: name.to_string(),
        category: ObjectRef::new(
            field(&def.anchor_category_id, product, "anchor_category_id")?,
            field(&def.anchor_category, product, "anchor_category")?,
        ),
        trigger: def
            .anchor_trigger
            .clone()
            .unwrap_or_else(|| format!("@{name}")),
        package: ObjectRef::new(
            field(&def.package_id, product, "package_id")?,
            field(&def.package_name, product, "package_name")?,
        ),
    })
}

pub fn self_service_policy(
    product: &str,
    def: &PolicyDefinition,
    config: &Config,
) -> Result<SelfServicePolicy> {
    Ok(SelfServicePolicy {
        name: field(&def.self_service_name, product, "self_service_name")?.to_string(),
        category: ObjectRef::new(
            field(&def.self_service_category_id, product, "self_service_category_id")?,
            field(&def.self_service_category, product, "self_service_category")?,
        ),
        scope_group: ObjectRef::new(
            field(&def.scope_id, product, "scope_id")?,
            field(&def.scope_name, product, "scope_name")?,
        ),
        script_name: config.prestage_script.name.clone(),
        script_id: config.prestage_script.id.clone(),
        parameters: PrestageParameters {
            family: field(&def.family, product, "family")?.to_string(),
            license_key: field(&def.license_key, product, "license_key")?.to_string(),
            license_hash: field(&def.license_hash, product, "license_hash")?.to_string(),
            products: def.dependencies.clone(),
        },
        is_toolbox: def.is_toolbox(),
    })
}

/// Create or update the anchor policy; returns its id
pub fn create_anchor_policy(
    api: &dyn ManagementApi,
    product: &str,
    def: &PolicyDefinition,
) -> Result<String> {
    let policy = anchor_policy(product, def)?;
    info!("{}: writing anchor policy '{}'", product, policy.name);
    upsert_policy(api, &policy.name, &policy.render()?)
}

/// Create or update the self-service policy; returns its id
pub fn create_self_service_policy(
    api: &dyn ManagementApi,
    product: &str,
    def: &PolicyDefinition,
    config: &Config,
) -> Result<String> {
    let policy = self_service_policy(product, def, config)?;
    info!("{}: writing self-service policy '{}'", product, policy.name);
    upsert_policy(api, &policy.name, &policy.render(&config.primary_product)?)
}
