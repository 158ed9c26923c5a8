use anyhow::{bail, Context, Result};
use packer_proxy_init::{bootstrap, detect_platform, manifest, Config, Installer};
use std::path::PathBuf;

pub struct InstallArgs {
    pub path: PathBuf,
    pub force: bool,
    pub github_source: Option<String>,
    pub releases_source: Option<String>,
    pub plugin_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub fn run(args: InstallArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;

    // Command-line flags override file and environment
    if let Some(url) = args.github_source {
        config.sources.github_url = Some(url);
    }
    if let Some(url) = args.releases_source {
        config.sources.releases_url = url;
    }
    if let Some(dir) = args.plugin_dir {
        config.install.plugin_directory = Some(dir.to_string_lossy().into_owned());
    }
    if args.force {
        config.install.force = true;
    }
    config.validate()?;

    let options = config.install_options()?;
    if config.install.copy_prestaged {
        let prestaged = config.prestaged_directory()?;
        bootstrap::copy_prestaged(&prestaged, &options.plugin_directory)
            .with_context(|| format!("Failed to copy plugins from {}", prestaged.display()))?;
    }

    let requirements = manifest::load_requirements(&args.path)?;
    if requirements.is_empty() {
        println!("No plugins required by {}", args.path.display());
        return Ok(());
    }

    let platform = detect_platform(config.api_version()?);
    let getters = config.getter_chain()?;
    tracing::debug!(
        platform = %platform,
        api = %platform.api_version.tag(),
        plugin_dir = %options.plugin_directory.display(),
        sources = ?getters,
        force = options.force,
        "starting install"
    );

    let installer = Installer::new(options, platform, getters);
    let report = installer.install_all(&requirements);

    println!(
        "{} installed, {} already present, {} failed",
        report.installed().count(),
        report.skipped_count(),
        report.failures().count()
    );

    if report.has_failures() {
        let details: Vec<String> = report.failures().map(|f| format!("  {}", f)).collect();
        bail!(
            "{} of {} plugins failed to install:\n{}",
            details.len(),
            requirements.len(),
            details.join("\n")
        );
    }

    Ok(())
}
