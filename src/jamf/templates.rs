// src/jamf/templates.rs

//! Classic API documents
//!
//! Every document the pipeline sends is rendered from a typed record. The
//! anchor policy is an ongoing, custom-event triggered install of a single
//! package; the self-service policy is user initiated, scoped to the
//! advertising group, and runs the prestage script that stages the license
//! and fires the anchor triggers on the client.

use crate::error::Result;
use crate::xml::XmlWriter;

/// `(id, name)` reference to another remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorPolicy {
    pub name: String,
    pub category: ObjectRef,
    /// Custom event name, `@<full name>`
    pub trigger: String,
    pub package: ObjectRef,
}

/// Parameters 4 to 7 of the prestage script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrestageParameters {
    pub family: String,
    pub license_key: String,
    pub license_hash: String,
    /// Products whose anchor triggers the client fires, in order
    pub products: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfServicePolicy {
    pub name: String,
    pub category: ObjectRef,
    pub scope_group: ObjectRef,
    pub script_name: String,
    pub script_id: Option<String>,
    pub parameters: PrestageParameters,
    /// Toolboxes are offered as "Add" rather than "Install"
    pub is_toolbox: bool,
}

pub fn render_category(name: &str) -> Result<String> {
    let mut w = XmlWriter::new();
    w.start("category")?;
    w.element("name", name)?;
    w.element("priority", "9")?;
    w.end("category")?;
    w.finish()
}

pub fn render_static_group(name: &str) -> Result<String> {
    let mut w = XmlWriter::new();
    w.start("computer_group")?;
    w.element("name", name)?;
    w.element("is_smart", "false")?;
    w.end("computer_group")?;
    w.finish()
}

fn object_ref(w: &mut XmlWriter, tag: &str, object: &ObjectRef) -> Result<()> {
    w.start(tag)?;
    w.element("id", &object.id)?;
    w.element("name", &object.name)?;
    w.end(tag)?;
    Ok(())
}

impl AnchorPolicy {
    pub fn render(&self) -> Result<String> {
        let mut w = XmlWriter::new();
        w.start("policy")?;

        w.start("general")?;
        w.element("name", &self.name)?;
        w.element("enabled", "true")?;
        w.element("trigger", "EVENT")?;
        w.element("trigger_other", &self.trigger)?;
        w.element("frequency", "Ongoing")?;
        object_ref(&mut w, "category", &self.category)?;
        w.end("general")?;

        w.start("scope")?;
        w.element("all_computers", "true")?;
        w.end("scope")?;

        w.start("self_service")?;
        w.element("use_for_self_service", "false")?;
        w.element("notification_subject", &self.name)?;
        w.end("self_service")?;

        w.start("package_configuration")?;
        w.start("packages")?;
        w.element("size", "1")?;
        w.start("package")?;
        w.element("id", &self.package.id)?;
        w.element("name", &self.package.name)?;
        w.element("action", "Install")?;
        w.end("package")?;
        w.end("packages")?;
        w.end("package_configuration")?;

        w.end("policy")?;
        w.finish()
    }
}

impl PrestageParameters {
    /// Comma-joined product list, `fallback` when empty
    pub fn products_csv(&self, fallback: &str) -> String {
        if self.products.is_empty() {
            fallback.to_string()
        } else {
            self.products.join(",")
        }
    }
}

impl SelfServicePolicy {
    /// `fallback` is used as parameter 7 when no products are listed
    pub fn render(&self, fallback: &str) -> Result<String> {
        let mut w = XmlWriter::new();
        w.start("policy")?;

        w.start("general")?;
        w.element("name", &self.name)?;
        w.element("enabled", "true")?;
        w.element("trigger", "USER_INITIATED")?;
        w.element("frequency", "Ongoing")?;
        object_ref(&mut w, "category", &self.category)?;
        w.end("general")?;

        w.start("scope")?;
        w.element("all_computers", "false")?;
        w.start("computer_groups")?;
        object_ref(&mut w, "computer_group", &self.scope_group)?;
        w.end("computer_groups")?;
        w.end("scope")?;

        w.start("self_service")?;
        w.element("use_for_self_service", "true")?;
        w.element("self_service_display_name", &self.name)?;
        w.element(
            "install_button_text",
            if self.is_toolbox { "Add" } else { "Install" },
        )?;
        w.element("notification_subject", &self.name)?;
        w.start("self_service_categories")?;
        w.start("category")?;
        w.element("id", &self.category.id)?;
        w.element("name", &self.category.name)?;
        w.element("display_in", "true")?;
        w.element("feature_in", "false")?;
        w.end("category")?;
        w.end("self_service_categories")?;
        w.end("self_service")?;

        w.start("scripts")?;
        w.element("size", "1")?;
        w.start("script")?;
        if let Some(id) = &self.script_id {
            w.element("id", id)?;
        }
        w.element("name", &self.script_name)?;
        w.element("priority", "Before")?;
        w.element("parameter4", &self.parameters.family)?;
        w.element("parameter5", &self.parameters.license_key)?;
        w.element("parameter6", &self.parameters.license_hash)?;
        w.element("parameter7", &self.parameters.products_csv(fallback))?;
        w.end("script")?;
        w.end("scripts")?;

        w.end("policy")?;
        w.finish()
    }
}
