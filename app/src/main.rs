use anyhow::Result;
use cim::{
    InstallationConfig, InstallationManager, State, StateProgress, UpdateDecision, broadcast,
};
use clap::{Parser, Subcommand};
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::thread;

#[derive(Parser)]
#[command(
    name = "cursor-manager",
    about = "Install, update and remove the Cursor IDE AppImage",
    version
)]
struct Cli {
    /// Override the installation directory
    #[arg(long, value_name = "DIR", global = true)]
    install_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and install the latest release
    Install,
    /// Update an existing installation (installs when nothing is present)
    Update,
    /// Remove the application and its desktop/shell integration
    Uninstall,
    /// Show the installed version and the latest available release
    #[command(visible_alias = "check-version")]
    Version,
}

fn main() -> Result<()> {
    pretty_env_logger::env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let config = match cli.install_path {
        Some(path) => InstallationConfig::new(path),
        None => InstallationConfig::default_paths()?,
    };
    info!("managing installation at {}", config.install_path.display());

    let mut manager = InstallationManager::new(config);

    let progress_rx = manager.subscribe();
    let listener = thread::spawn(move || print_progress(progress_rx));

    // Default action: update, which installs when nothing is present yet.
    let result = match cli.command.unwrap_or(Commands::Update) {
        Commands::Install => manager.install(),
        Commands::Update => manager.update().map(|_| ()),
        Commands::Uninstall => manager.uninstall(),
        Commands::Version => show_version(&mut manager),
    };

    // Dropping the manager closes the progress channel and stops the listener.
    drop(manager);
    let _ = listener.join();

    result
}

/// Render progress updates from the manager on a single console line.
fn print_progress(mut rx: broadcast::Receiver<StateProgress>) {
    use cim::broadcast::error::RecvError;

    let mut last_percent: i32 = -1;

    loop {
        // A download broadcasts one update per chunk, which can outrun this
        // printer; lagging just skips stale updates, only a closed channel
        // ends the loop.
        let update = match rx.blocking_recv() {
            Ok(update) => update,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };

        if !matches!(update.state, State::Downloading) {
            continue;
        }

        let percent = (update.progress * 100.0) as i32;
        if percent == last_percent {
            continue;
        }
        last_percent = percent;

        print!("\rDownloading... {percent:>3}%");
        let _ = std::io::stdout().flush();
        if percent >= 100 {
            println!();
        }
    }
}

fn show_version(manager: &mut InstallationManager) -> Result<()> {
    let decision = manager.check_for_updates()?;

    println!("Installed version: {}", manager.current_version());
    if let Some(release) = manager.latest_release() {
        println!("Latest release:    {}", release.version);
    }

    match decision {
        UpdateDecision::UpToDate => println!("Up to date."),
        UpdateDecision::UpdateAvailable => {
            println!("Update available; run `cursor-manager update`.")
        }
        UpdateDecision::NotInstalled => {
            println!("Not installed; run `cursor-manager install`.")
        }
        UpdateDecision::Unknown => {
            println!("Installed version could not be determined; an update is recommended.")
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_progress_listener_survives_lagging_behind() {
        let (tx, rx) = broadcast::channel(1);

        // Overfill the channel so the first receive reports a lag.
        for i in 0..5 {
            let _ = tx.send(StateProgress::new(State::Downloading, i as f32 / 5.0));
        }

        let listener = thread::spawn(move || print_progress(rx));
        thread::sleep(Duration::from_millis(300));
        assert!(
            !listener.is_finished(),
            "listener exited while the sender was still alive"
        );

        drop(tx);
        listener.join().unwrap();
    }
}
