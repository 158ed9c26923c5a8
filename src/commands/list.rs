use anyhow::Result;
use packer_proxy_init::{detect_platform, list_installations, manifest, Config};
use std::path::PathBuf;

pub fn run(path: PathBuf, plugin_dir: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let mut config = Config::load(config.as_deref())?;
    if let Some(dir) = plugin_dir {
        config.install.plugin_directory = Some(dir.to_string_lossy().into_owned());
    }
    config.validate_install()?;

    let plugin_directory = config.plugin_directory()?;
    let platform = detect_platform(config.api_version()?);
    let requirements = manifest::load_requirements(&path)?;

    if requirements.is_empty() {
        println!("No plugins required by {}", path.display());
        return Ok(());
    }

    for req in &requirements {
        let constraints = if req.constraints.is_empty() {
            "any version".to_string()
        } else {
            req.constraints.to_string()
        };
        let installations = list_installations(&plugin_directory, req, &platform)?;

        if installations.is_empty() {
            println!("{} ({}): not installed", req.identifier(), constraints);
            continue;
        }

        println!("{} ({}):", req.identifier(), constraints);
        for installation in &installations {
            println!(
                "  {} {}",
                installation.version,
                installation.binary_path.display()
            );
        }
    }

    Ok(())
}
