// src/pipeline.rs

//! End-to-end packaging run
//!
//! A run works on the mounted installer's archives folder and a work
//! directory:
//!
//! ```text
//! <work>/Network License Manager/   staged license manager + its zips
//! <work>/ROOT/                       package root, cleaned per product
//! <work>/ROOT/<staging_subpath>/     product payloads and manifests
//! <work>/packages/                   built packages
//! <work>/policy_definitions.json     persisted policy record
//! ```
//!
//! Setup failures (archives, installer, categories, scope group, license
//! inputs) abort the run. A failure while packaging or uploading one
//! product only skips that product, except for missing release data and
//! toolboxes without a controlling product, which abort. Policy creation
//! failures are logged per product.

use crate::archive::{Archive, Platform};
use crate::assembler::{build_package, clean_directory, Assembler, PackageBuilder, PackageStatus};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::installer::build_installer_package;
use crate::jamf::policy::{create_anchor_policy, create_self_service_policy};
use crate::jamf::{ensure_category, ensure_package, ensure_static_group, ManagementApi};
use crate::license::LicenseInfo;
use crate::license_manager::LicenseManagerBundle;
use crate::planner::{
    plan_product, Labels, PolicyDefinition, PolicyDefinitions, RemoteIds, RunContext,
    INSTALLER_KEY,
};
use crate::product::Product;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// File name of the persisted policy record inside the work directory
pub const DEFINITIONS_FILE: &str = "policy_definitions.json";

/// What a completed run did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub family: String,
    /// Products packaged and uploaded in this run
    pub packaged: Vec<String>,
    /// Products skipped, with the reason
    pub skipped: Vec<(String, String)>,
    /// Policies that could not be written, with the reason
    pub policy_failures: Vec<(String, String)>,
}

enum ProductFailure {
    /// Stop the whole run
    Abort(Error),
    /// Give up on this product only
    Skip(Error),
}

struct PlatformArchives {
    common: Arc<Archive>,
    maci64: Arc<Archive>,
}

impl PlatformArchives {
    fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            common: Arc::new(Archive::open(
                dir.join(Platform::Common.archive_file_name()),
                Platform::Common,
            )?),
            maci64: Arc::new(Archive::open(
                dir.join(Platform::Maci64.archive_file_name()),
                Platform::Maci64,
            )?),
        })
    }

    fn bind(&self, product: &mut Product) {
        product.bind_archive(Arc::clone(&self.common));
        product.bind_archive(Arc::clone(&self.maci64));
    }
}

/// One packaging run against a mounted installer
pub struct Pipeline<'a> {
    config: &'a Config,
    api: &'a dyn ManagementApi,
    builder: &'a dyn PackageBuilder,
    work_dir: PathBuf,
    skip_products: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        api: &'a dyn ManagementApi,
        builder: &'a dyn PackageBuilder,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            api,
            builder,
            work_dir: work_dir.into(),
            skip_products: false,
        }
    }

    /// Go straight to the policy phase using the persisted record
    pub fn skip_products(mut self, skip: bool) -> Self {
        self.skip_products = skip;
        self
    }

    pub fn pkg_root(&self) -> PathBuf {
        self.work_dir.join("ROOT")
    }

    /// Where product payloads are staged inside the package root
    pub fn staged_archives(&self) -> PathBuf {
        self.pkg_root().join(&self.config.staging_subpath)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.work_dir.join("packages")
    }

    pub fn definitions_path(&self) -> PathBuf {
        self.work_dir.join(DEFINITIONS_FILE)
    }

    /// Package `targets` from the installer's `archives_dir` and register
    /// their policies
    pub fn run(&self, archives_dir: &Path, targets: &[String]) -> Result<RunSummary> {
        if targets.is_empty() {
            return Err(Error::ConfigError("No products selected".to_string()));
        }
        info!("Targeting: {}", targets.join(", "));
        fs::create_dir_all(self.packages_dir())?;

        let archives = PlatformArchives::open(archives_dir)?;

        // The license manager goes into every package and fixes the family
        let nlm = self.prepare_license_manager(&archives, archives_dir)?;
        let labels = Labels::new(&self.config.vendor, &nlm.info.family);
        warn!("Release family: {}", labels.family);

        if clean_directory(&self.pkg_root())? {
            debug!("Cleaned up prior package root");
        }
        let (installer_name, installer_id) = self.installer(archives_dir, &labels)?;

        let ids = self.setup_remote(&labels)?;
        let license = LicenseInfo::load(&self.config.license_dir, &labels.family)?;
        info!("License key and hash loaded for {}", labels.family);
        let ctx = RunContext { labels, ids, license };

        let path = self.definitions_path();
        let mut definitions = PolicyDefinitions::load(&path)?;
        definitions.set(
            INSTALLER_KEY,
            PolicyDefinition::for_installer(&ctx, &installer_name, &installer_id),
        );

        let mut summary = RunSummary {
            family: ctx.labels.family.clone(),
            ..RunSummary::default()
        };

        if self.skip_products {
            warn!("Skipping product processing");
        } else {
            for name in targets {
                match self.process_product(name, &archives, archives_dir, &nlm, &ctx, &mut definitions) {
                    Ok(()) => summary.packaged.push(name.clone()),
                    Err(ProductFailure::Skip(e)) => {
                        error!("{}: {}; skipping further processing", name, e);
                        summary.skipped.push((name.clone(), e.to_string()));
                    }
                    Err(ProductFailure::Abort(e)) => {
                        definitions.save(&path)?;
                        return Err(e);
                    }
                }
                definitions.save(&path)?;
            }
        }
        warn!("Package creation phase complete, processing policy definitions");

        self.create_policies(targets, &ctx, &mut definitions, &mut summary);
        definitions.save(&path)?;
        Ok(summary)
    }

    fn prepare_license_manager(
        &self,
        archives: &PlatformArchives,
        archives_dir: &Path,
    ) -> Result<LicenseManagerBundle> {
        let root = self.work_dir.join(&self.config.license_manager_product);
        clean_directory(&root)?;
        let mut product = Product::new(&self.config.license_manager_product);
        archives.bind(&mut product);
        LicenseManagerBundle::prepare(&mut product, &root, archives_dir)
    }

    /// Build and upload the vendor installer package
    fn installer(&self, archives_dir: &Path, labels: &Labels) -> Result<(String, String)> {
        let installer = archives_dir
            .parent()
            .map(|dir| dir.join(&self.config.installer_binary))
            .ok_or_else(|| Error::InvalidPath(archives_dir.display().to_string()))?;
        let pkg_root = self.pkg_root();
        let dest = self
            .staged_archives()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| pkg_root.clone());
        let output = self
            .packages_dir()
            .join(format!("{}.pkg", labels.installer_name()));

        warn!("Installer: creating package");
        build_installer_package(self.builder, &installer, &pkg_root, &dest, &output)?;
        let id = ensure_package(self.api, &output)?;
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok((name, id))
    }

    /// Categories and the scope group every policy refers to
    fn setup_remote(&self, labels: &Labels) -> Result<RemoteIds> {
        let [category, toolbox, anchor, anchor_toolbox] = labels.categories();
        let ids = RemoteIds {
            category: ensure_category(self.api, category)?,
            toolbox_category: ensure_category(self.api, toolbox)?,
            anchor_category: ensure_category(self.api, anchor)?,
            anchor_toolbox_category: ensure_category(self.api, anchor_toolbox)?,
            scope_group: ensure_static_group(self.api, &labels.scope_group)?,
        };
        warn!(
            "Categories: {} ({}) :: {} ({}) :: {} ({}) :: {} ({})",
            category,
            ids.category,
            toolbox,
            ids.toolbox_category,
            anchor,
            ids.anchor_category,
            anchor_toolbox,
            ids.anchor_toolbox_category
        );
        warn!("Static group: {} ({})", labels.scope_group, ids.scope_group);
        Ok(ids)
    }

    fn process_product(
        &self,
        name: &str,
        archives: &PlatformArchives,
        archives_dir: &Path,
        nlm: &LicenseManagerBundle,
        ctx: &RunContext,
        definitions: &mut PolicyDefinitions,
    ) -> std::result::Result<(), ProductFailure> {
        use ProductFailure::{Abort, Skip};

        warn!("{}: beginning product creation", name);
        if clean_directory(&self.pkg_root()).map_err(Skip)? {
            debug!("Cleaned up prior package root");
        }

        let mut product = Product::new(name);
        archives.bind(&mut product);
        product.discover_manifest().map_err(Skip)?;

        let info = product.info().map_err(Abort)?;
        if info.family != ctx.labels.family {
            warn!(
                "{}: release family {} differs from {}",
                name, info.family, ctx.labels.family
            );
        }
        let plan = plan_product(&info, &ctx.labels, &self.config.aggregate_name).map_err(Abort)?;
        match &info.controlling_product {
            Some(controller) => info!("{}: controlled by {}", name, controller),
            None => info!("{}: is a controlling product", name),
        }

        warn!("{}: parsing components (this may take some time)", name);
        product.discover_components().map_err(Skip)?;
        let staged = self.staged_archives();
        Assembler::new(&staged, archives_dir)
            .assemble(&product)
            .map_err(Skip)?;
        nlm.install_into(&staged).map_err(Skip)?;

        let definition = definitions.upsert(name, PolicyDefinition::for_product(&plan, ctx));

        let package = self.packages_dir().join(plan.package_name());
        match build_package(self.builder, &self.pkg_root(), &package).map_err(Skip)? {
            PackageStatus::Built => info!("{}: built {}", name, package.display()),
            PackageStatus::AlreadyExists => {
                warn!("{}: skipping package creation, {} exists", name, package.display())
            }
        }

        let package_id = ensure_package(self.api, &package).map_err(Skip)?;
        definition.package_id = Some(package_id);
        Ok(())
    }

    fn create_policies(
        &self,
        targets: &[String],
        ctx: &RunContext,
        definitions: &mut PolicyDefinitions,
        summary: &mut RunSummary,
    ) {
        if let Some(installer) = definitions.get_mut(INSTALLER_KEY) {
            match create_anchor_policy(self.api, INSTALLER_KEY, installer) {
                Ok(id) => installer.anchor_id = Some(id),
                Err(e) => {
                    error!("{}: anchor policy failed: {}", INSTALLER_KEY, e);
                    summary.policy_failures.push((INSTALLER_KEY.to_string(), e.to_string()));
                }
            }
        }

        for name in targets {
            let Some(definition) = definitions.get_mut(name) else {
                warn!("{}: no policy definition recorded, skipping policies", name);
                summary
                    .policy_failures
                    .push((name.clone(), "no policy definition".to_string()));
                continue;
            };
            debug!("{}: dependencies: {}", name, definition.dependencies.join(", "));

            if let Err(e) = self.create_product_policies(name, definition) {
                error!("{}: {}; skipping further processing", name, e);
                summary.policy_failures.push((name.clone(), e.to_string()));
            }
        }

        let aggregate = &self.config.aggregate_name;
        let mut definition =
            PolicyDefinition::for_aggregate(ctx, targets, &self.config.primary_product);
        match create_self_service_policy(self.api, aggregate, &definition, self.config) {
            Ok(id) => {
                warn!("{}: policy created ({})", aggregate, id);
                definition.self_service_id = Some(id);
            }
            Err(e) => {
                error!("{}: self-service policy failed: {}", aggregate, e);
                summary.policy_failures.push((aggregate.clone(), e.to_string()));
            }
        }
        definitions.set(aggregate, definition);
    }

    fn create_product_policies(&self, name: &str, definition: &mut PolicyDefinition) -> Result<()> {
        let anchor_id = create_anchor_policy(self.api, name, definition)?;
        warn!(
            "{}: policy {} ({}) created",
            name,
            definition.anchor_name.as_deref().unwrap_or_default(),
            anchor_id
        );
        definition.anchor_id = Some(anchor_id);

        let self_service_id = create_self_service_policy(self.api, name, definition, self.config)?;
        warn!(
            "{}: policy {} ({}) created",
            name,
            definition.self_service_name.as_deref().unwrap_or_default(),
            self_service_id
        );
        definition.self_service_id = Some(self_service_id);
        Ok(())
    }
}
