/// Basic usage example demonstrating the installation manager
///
/// This example shows how to configure the manager, check the local
/// installation and decide whether an update is needed.

use cim::{InstallationConfig, InstallationManager, UpdateDecision};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    println!("Cursor Installation Manager Example");
    println!("====================================\n");

    // Create a basic configuration
    let config = InstallationConfig::new(PathBuf::from("/tmp/cursor-example"))
        .app_name("Cursor".to_string())
        .system_packages(vec![]); // skip the package-manager check here

    // Create the installation manager
    let mut manager = InstallationManager::new(config);

    println!("Configuration:");
    println!("  App Name:     {}", manager.config().get_app_name());
    println!("  Install Path: {}", manager.config().install_path.display());
    println!("  API Endpoint: {}", manager.config().get_api_url());
    println!();

    // Probe the local installation
    manager.refresh();
    println!("Installed version: {}", manager.current_version());

    // Ask the release API what is available
    match manager.check_for_updates()? {
        UpdateDecision::UpToDate => println!("Already up to date."),
        UpdateDecision::UpdateAvailable => {
            println!("Update available; manager.update()? would download it.");
        }
        UpdateDecision::NotInstalled => {
            println!("Nothing installed; manager.install()? would set it up.");
        }
        UpdateDecision::Unknown => {
            println!("Installed version unknown; an update is recommended.");
        }
    }

    Ok(())
}
