// src/commands/build.rs
//! Full packaging run against an installer disk image

use anyhow::{Context, Result};
use mwpkg::dmg::{find_mount_point, MountedImage};
use mwpkg::{targets, Config, InMemoryApi, JamfClient, ManagementApi, Pipeline, Pkgbuild, RunSummary};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Options of `mwpkg build`
#[derive(Debug, Default)]
pub struct BuildOptions {
    pub dmg: PathBuf,
    pub folder: Option<PathBuf>,
    pub targets: Option<PathBuf>,
    pub products: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub skip: bool,
    pub dry_run: bool,
}

/// Package the selected products and register their policies
pub fn cmd_build(config: &Config, options: BuildOptions) -> Result<()> {
    let targets_file = options
        .targets
        .clone()
        .unwrap_or_else(|| config.targets_file.clone());
    let targets = targets::select(&options.products, &targets_file)
        .context("Failed to get a list of products to target")?;

    let api: Box<dyn ManagementApi> = if options.dry_run {
        warn!("Dry run: remote objects are kept in memory");
        Box::new(InMemoryApi::new())
    } else {
        let (user, password) = credentials(&Terminal, options.user.clone(), options.password.clone())?;
        Box::new(JamfClient::new(&config.api, &user, &password)?)
    };

    if !options.dmg.exists() {
        anyhow::bail!("Disk image {} does not exist", options.dmg.display());
    }
    let work_dir = work_folder(&options)?;

    let image = MountedImage::attach(&config.hdiutil, &options.dmg)
        .context("Unable to mount disk image")?;
    let result = run_mounted(config, api.as_ref(), &work_dir, &targets, options.skip);
    let detached = image.detach();

    let summary = result?;
    print_summary(&summary);
    if !detached {
        anyhow::bail!("Cannot unmount disk image {}", options.dmg.display());
    }
    Ok(())
}

fn run_mounted(
    config: &Config,
    api: &dyn ManagementApi,
    work_dir: &Path,
    targets: &[String],
    skip: bool,
) -> Result<RunSummary> {
    let mount_point = find_mount_point(&config.volume_glob)?;
    let archives = mount_point.join(&config.archives_subpath);
    info!("Installer archives: {}", archives.display());

    let builder = Pkgbuild::new(&config.pkgbuild);
    let summary = Pipeline::new(config, api, &builder, work_dir)
        .skip_products(skip)
        .run(&archives, targets)?;
    Ok(summary)
}

fn work_folder(options: &BuildOptions) -> Result<PathBuf> {
    let folder = match &options.folder {
        Some(folder) => folder.clone(),
        None => options
            .dmg
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("Unable to create work folder {}", folder.display()))?;
    Ok(folder)
}

/// Source of credentials not given on the command line
trait Prompter {
    fn user(&self) -> Result<String>;
    /// Read without echoing to the terminal
    fn password(&self, user: &str) -> Result<String>;
}

struct Terminal;

impl Prompter for Terminal {
    fn user(&self) -> Result<String> {
        let user: String = dialoguer::Input::new()
            .with_prompt("Enter a Jamf Pro user with API rights")
            .interact_text()?;
        Ok(user)
    }

    fn password(&self, user: &str) -> Result<String> {
        let password = dialoguer::Password::new()
            .with_prompt(format!("Enter the password for '{user}'"))
            .allow_empty_password(true)
            .interact()?;
        Ok(password)
    }
}

fn credentials(
    prompter: &dyn Prompter,
    user: Option<String>,
    password: Option<String>,
) -> Result<(String, String)> {
    let user = match user {
        Some(user) => user,
        None => prompter.user()?,
    };
    let password = match password {
        Some(password) => password,
        None => prompter.password(&user)?,
    };
    if password.is_empty() {
        anyhow::bail!("No password provided");
    }
    Ok((user, password))
}

fn print_summary(summary: &RunSummary) {
    println!("Release family: {}", summary.family);
    println!("Packaged: {}", summary.packaged.len());
    for name in &summary.packaged {
        println!("  {name}");
    }
    if !summary.skipped.is_empty() {
        println!("Skipped: {}", summary.skipped.len());
        for (name, reason) in &summary.skipped {
            error!("{}: {}", name, reason);
            println!("  {name}: {reason}");
        }
    }
    if !summary.policy_failures.is_empty() {
        println!("Policy failures: {}", summary.policy_failures.len());
        for (name, reason) in &summary.policy_failures {
            println!("  {name}: {reason}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Answers prompts from fixed values and records which were asked
    #[derive(Default)]
    struct Scripted {
        asked: RefCell<Vec<&'static str>>,
        password: String,
    }

    impl Prompter for Scripted {
        fn user(&self) -> Result<String> {
            self.asked.borrow_mut().push("user");
            Ok("jamf-admin".to_string())
        }

        fn password(&self, _user: &str) -> Result<String> {
            self.asked.borrow_mut().push("password");
            Ok(self.password.clone())
        }
    }

    #[test]
    fn test_credentials_from_arguments_do_not_prompt() {
        let prompter = Scripted::default();
        let (user, password) = credentials(
            &prompter,
            Some("admin".to_string()),
            Some("secret".to_string()),
        )
        .unwrap();
        assert_eq!((user.as_str(), password.as_str()), ("admin", "secret"));
        assert!(prompter.asked.borrow().is_empty());
    }

    #[test]
    fn test_missing_password_uses_hidden_prompt() {
        let prompter = Scripted {
            password: "secret".to_string(),
            ..Scripted::default()
        };
        let (user, password) =
            credentials(&prompter, Some("admin".to_string()), None).unwrap();
        assert_eq!((user.as_str(), password.as_str()), ("admin", "secret"));
        assert_eq!(*prompter.asked.borrow(), vec!["password"]);
    }

    #[test]
    fn test_missing_user_is_prompted_first() {
        let prompter = Scripted {
            password: "secret".to_string(),
            ..Scripted::default()
        };
        let (user, _) = credentials(&prompter, None, None).unwrap();
        assert_eq!(user, "jamf-admin");
        assert_eq!(*prompter.asked.borrow(), vec!["user", "password"]);
    }

    #[test]
    fn test_empty_password_is_rejected() {
        let prompter = Scripted::default();
        let err = credentials(&prompter, Some("admin".to_string()), None).unwrap_err();
        assert!(err.to_string().contains("No password"));
    }

    #[test]
    fn test_work_folder_defaults_to_image_folder() {
        let temp = tempfile::TempDir::new().unwrap();
        let options = BuildOptions {
            dmg: temp.path().join("R2021a.dmg"),
            ..BuildOptions::default()
        };
        assert_eq!(work_folder(&options).unwrap(), temp.path());
    }

    #[test]
    fn test_work_folder_is_created() {
        let temp = tempfile::TempDir::new().unwrap();
        let options = BuildOptions {
            dmg: temp.path().join("R2021a.dmg"),
            folder: Some(temp.path().join("work/R2021a")),
            ..BuildOptions::default()
        };
        let folder = work_folder(&options).unwrap();
        assert!(folder.is_dir());
    }

    #[test]
    fn test_missing_image_fails_before_mounting() {
        let temp = tempfile::TempDir::new().unwrap();
        let options = BuildOptions {
            dmg: temp.path().join("missing.dmg"),
            products: vec!["MATLAB".to_string()],
            dry_run: true,
            ..BuildOptions::default()
        };
        let err = cmd_build(&Config::default(), options).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
