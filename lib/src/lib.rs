use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

pub mod decision;
pub mod deps;
pub mod desktop;
pub mod probe;
pub mod process;
pub mod release;
pub mod shell;
pub mod version;

pub use decision::{UpdateDecision, VersionOrdering};
pub use deps::DependencyMissing;
pub use process::RunningConflict;
pub use release::{FetchError, ReleaseInfo};
pub use shell::ShellKind;
pub use tokio::sync::broadcast;
pub use version::DetectedVersion;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[repr(u8)]
pub enum State {
    Downloading,
    Installing,
    Updating,
    Removing,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateProgress {
    pub state: State,
    /// The progress from 0.0 to 1.0
    pub progress: f32,
}

impl StateProgress {
    pub fn new(state: State, progress: f32) -> Self {
        Self { state, progress: progress.clamp(0.0, 1.0) }
    }
}

/// Configuration for the installation manager
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallationConfig {
    /// Directory holding the AppImage and its sidecar version file
    pub install_path: PathBuf,
    /// Release API endpoint (optional, defaults to the stable Linux track)
    pub api_url: Option<String>,
    /// Display name of the application (optional, defaults to "Cursor")
    pub app_name: Option<String>,
    /// AppImage file name inside the install directory (optional)
    pub binary_name: Option<String>,
    /// Sidecar version file name (optional, defaults to "version")
    pub version_file_name: Option<String>,
    /// Directory for the desktop entry (optional, defaults to the XDG
    /// applications directory)
    pub applications_dir: Option<PathBuf>,
    /// Icon referenced by the desktop entry (optional)
    pub icon_path: Option<PathBuf>,
    /// Shell profile receiving the wrapper function (optional, defaults to
    /// the detected login shell's profile)
    pub shell_profile: Option<PathBuf>,
    /// Process name matched by the running check (optional)
    pub process_name: Option<String>,
    /// System packages required before install/update (optional)
    pub system_packages: Option<Vec<String>>,
}

impl InstallationConfig {
    /// Create a new configuration for the given install directory
    pub fn new(install_path: PathBuf) -> Self {
        Self {
            install_path,
            api_url: None,
            app_name: None,
            binary_name: None,
            version_file_name: None,
            applications_dir: None,
            icon_path: None,
            shell_profile: None,
            process_name: None,
            system_packages: None,
        }
    }

    /// Create a configuration rooted in the user's local data directory
    pub fn default_paths() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .context("Could not determine the local data directory")?;
        Ok(Self::new(data_dir.join("cursor")))
    }

    /// Set a custom release API endpoint
    pub fn api_url(mut self, url: String) -> Self {
        self.api_url = Some(url);
        self
    }

    /// Set the application display name
    pub fn app_name(mut self, name: String) -> Self {
        self.app_name = Some(name);
        self
    }

    /// Set a custom AppImage file name
    pub fn binary_name(mut self, name: String) -> Self {
        self.binary_name = Some(name);
        self
    }

    /// Set a custom sidecar version file name
    pub fn version_file_name(mut self, name: String) -> Self {
        self.version_file_name = Some(name);
        self
    }

    /// Set a custom desktop-entry directory
    pub fn applications_dir(mut self, dir: PathBuf) -> Self {
        self.applications_dir = Some(dir);
        self
    }

    /// Set a custom icon path
    pub fn icon_path(mut self, path: PathBuf) -> Self {
        self.icon_path = Some(path);
        self
    }

    /// Set a fixed shell profile instead of detecting the login shell
    pub fn shell_profile(mut self, path: PathBuf) -> Self {
        self.shell_profile = Some(path);
        self
    }

    /// Set a custom process name for the running check
    pub fn process_name(mut self, name: String) -> Self {
        self.process_name = Some(name);
        self
    }

    /// Set the required system packages (empty disables the check)
    pub fn system_packages(mut self, packages: Vec<String>) -> Self {
        self.system_packages = Some(packages);
        self
    }

    /// Get the release API endpoint
    pub fn get_api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(release::DEFAULT_API_URL)
    }

    /// Get the application display name
    pub fn get_app_name(&self) -> &str {
        self.app_name.as_deref().unwrap_or("Cursor")
    }

    /// Get the AppImage file name
    pub fn get_binary_name(&self) -> &str {
        self.binary_name.as_deref().unwrap_or("cursor.AppImage")
    }

    /// Get the full path to the AppImage
    pub fn get_binary_path(&self) -> PathBuf {
        self.install_path.join(self.get_binary_name())
    }

    /// Get the full path to the sidecar version file
    pub fn get_version_file(&self) -> PathBuf {
        let name = self.version_file_name.as_deref().unwrap_or("version");
        self.install_path.join(name)
    }

    /// Get the desktop-entry directory
    pub fn get_applications_dir(&self) -> PathBuf {
        self.applications_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("/usr/share"))
                .join("applications")
        })
    }

    /// Get the icon path referenced by the desktop entry
    pub fn get_icon_path(&self) -> PathBuf {
        self.icon_path
            .clone()
            .unwrap_or_else(|| self.install_path.join("cursor.png"))
    }

    /// Get the shell profile receiving the wrapper, if one could be
    /// determined for the login shell
    pub fn get_shell_profile(&self) -> Option<PathBuf> {
        if let Some(profile) = &self.shell_profile {
            return Some(profile.clone());
        }
        let home = dirs::home_dir()?;
        ShellKind::detect().profile_path(&home)
    }

    /// Get the process name used by the running check
    pub fn get_process_name(&self) -> &str {
        self.process_name.as_deref().unwrap_or("cursor")
    }

    /// Get the required system packages
    pub fn get_system_packages(&self) -> Vec<String> {
        self.system_packages.clone().unwrap_or_else(|| {
            deps::REQUIRED_PACKAGES.iter().map(|s| s.to_string()).collect()
        })
    }
}

#[derive(Debug)]
/// Installation manager for the Cursor AppImage
pub struct InstallationManager {
    is_installed: bool,
    current_version: DetectedVersion,
    latest_release: Option<ReleaseInfo>,
    config: InstallationConfig,
    progress_tx: broadcast::Sender<StateProgress>,
    running_probe: fn(&str) -> bool,
}

impl InstallationManager {
    /// Create a new installation manager with configuration
    pub fn new(config: InstallationConfig) -> Self {
        let (tx, _) = broadcast::channel(100);
        Self {
            is_installed: false,
            current_version: DetectedVersion::NotInstalled,
            latest_release: None,
            config,
            progress_tx: tx,
            running_probe: process::is_running,
        }
    }

    /// Replace the process scan backing the running check, so the
    /// precondition is testable without a live process table
    pub fn with_running_probe(mut self, probe: fn(&str) -> bool) -> Self {
        self.running_probe = probe;
        self
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &InstallationConfig {
        &self.config
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<StateProgress> {
        self.progress_tx.subscribe()
    }

    /// Broadcast progress update (internal helper)
    fn broadcast_progress(&self, state: State, progress: f32) {
        let _ = self.progress_tx.send(StateProgress::new(state, progress));
    }

    /// Check if the application is currently installed
    pub fn is_installed(&self) -> bool {
        self.is_installed
    }

    /// Get the detected installed version
    pub fn current_version(&self) -> &DetectedVersion {
        &self.current_version
    }

    /// Get the latest release seen by the last API call, if any
    pub fn latest_release(&self) -> Option<&ReleaseInfo> {
        self.latest_release.as_ref()
    }

    /// Re-probe the local installation state
    pub fn refresh(&mut self) {
        self.current_version = probe::detect(&self.config);
        self.is_installed = self.current_version.is_installed();
        debug!("probe result: {}", self.current_version);
    }

    /// Fetch the latest release and decide what to do about it
    pub fn check_for_updates(&mut self) -> Result<UpdateDecision> {
        self.refresh();

        let release = release::fetch_latest(self.config.get_api_url())?;
        let decision = decision::decide(&self.current_version, &release.version);
        self.latest_release = Some(release);

        Ok(decision)
    }

    /// Install the application
    ///
    /// A no-op when something is already installed; integration (desktop
    /// entry, shell wrapper) is still re-applied so a broken entry heals.
    pub fn install(&mut self) -> Result<()> {
        deps::ensure_installed(&self.config.get_system_packages())?;
        self.refresh();

        if self.is_installed {
            println!(
                "{} is already installed (version: {}).",
                self.config.get_app_name(),
                self.current_version
            );
            self.apply_integration()?;
            return Ok(());
        }

        let release = release::fetch_latest(self.config.get_api_url())
            .context("Failed to fetch the latest release")?;

        println!(
            "Installing {} version {}...",
            self.config.get_app_name(),
            release.version
        );

        self.replace_binary(&release)?;
        self.apply_integration()?;

        self.current_version = DetectedVersion::Installed(release.version.clone());
        self.is_installed = true;
        self.latest_release = Some(release);

        println!("Installation complete!");
        Ok(())
    }

    /// Update an existing installation
    ///
    /// Transparently takes the install path when nothing is installed yet.
    /// Returns the decision that drove the action.
    pub fn update(&mut self) -> Result<UpdateDecision> {
        deps::ensure_installed(&self.config.get_system_packages())?;
        self.refresh();

        if !self.is_installed {
            self.install()?;
            return Ok(UpdateDecision::NotInstalled);
        }

        let release = release::fetch_latest(self.config.get_api_url())
            .context("Failed to fetch the latest release")?;
        let decision = decision::decide(&self.current_version, &release.version);

        match decision {
            UpdateDecision::UpToDate => {
                println!("Already up to date ({}).", self.current_version);
                self.apply_integration()?;
            }
            UpdateDecision::UpdateAvailable | UpdateDecision::Unknown => {
                self.ensure_not_running()?;

                println!(
                    "Updating from {} to {}...",
                    self.current_version, release.version
                );
                self.broadcast_progress(State::Updating, 0.0);

                self.replace_binary(&release)?;
                self.apply_integration()?;

                self.current_version =
                    DetectedVersion::Installed(release.version.clone());
                self.broadcast_progress(State::Updating, 1.0);
                println!("Update complete!");
            }
            // refresh() said installed, so this arm should not be reached;
            // fall back to the install path anyway.
            UpdateDecision::NotInstalled => self.install()?,
        }

        self.latest_release = Some(release);
        Ok(decision)
    }

    /// Uninstall the application
    pub fn uninstall(&mut self) -> Result<()> {
        self.refresh();

        if !self.is_installed {
            anyhow::bail!("No installation found.");
        }

        // Precondition check before anything is touched.
        self.ensure_not_running()?;

        println!("Uninstalling {}...", self.config.get_app_name());
        self.broadcast_progress(State::Removing, 0.0);

        let binary = self.config.get_binary_path();
        if binary.exists() {
            fs::remove_file(&binary).context("Failed to remove the application binary")?;
        }

        let version_file = self.config.get_version_file();
        if version_file.exists() {
            fs::remove_file(&version_file).context("Failed to remove the version file")?;
        }

        desktop::remove_desktop_entry(&self.config.get_applications_dir())
            .context("Failed to remove the desktop entry")?;

        if let Some(profile) = self.config.get_shell_profile() {
            shell::remove_from_profile(&profile)
                .context("Failed to remove the shell wrapper")?;
        }

        // Only goes away when nothing else lives in it.
        let _ = fs::remove_dir(&self.config.install_path);

        self.is_installed = false;
        self.current_version = DetectedVersion::NotInstalled;
        self.broadcast_progress(State::Removing, 1.0);

        println!("Uninstall complete!");
        Ok(())
    }

    /// Download the release and swap it into place, then record its version.
    ///
    /// The binary is staged next to its destination and renamed over it, and
    /// the sidecar is written only after the rename succeeds, so a failed
    /// download never corrupts the recorded installed version.
    fn replace_binary(&mut self, release: &ReleaseInfo) -> Result<()> {
        // Swapping the binary out from under a running instance would break it.
        self.ensure_not_running()?;

        fs::create_dir_all(&self.config.install_path)
            .context("Failed to create the installation directory")?;

        let binary = self.config.get_binary_path();
        let staging = self
            .config
            .install_path
            .join(format!("{}.partial", self.config.get_binary_name()));

        if let Err(e) = self.download_to(&release.download_url, &staging) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        let mut perms = fs::metadata(&staging)
            .context("Failed to stat the downloaded binary")?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&staging, perms)
            .context("Failed to mark the binary executable")?;

        fs::rename(&staging, &binary).context("Failed to move the binary into place")?;

        fs::write(self.config.get_version_file(), format!("{}\n", release.version))
            .context("Failed to write the version file")?;

        Ok(())
    }

    /// Download a release binary to the given path
    fn download_to(&self, url: &str, dest_path: &PathBuf) -> Result<()> {
        use std::io::Read;

        let client = reqwest::blocking::Client::builder()
            .user_agent("cursor-manager")
            .build()?;

        let mut response = client
            .get(url)
            .send()
            .context("Failed to download the release binary")?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed with status: {}", response.status());
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut file =
            fs::File::create(dest_path).context("Failed to create download file")?;

        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; 8192];

        self.broadcast_progress(State::Downloading, 0.0);

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .context("Failed to read from download stream")?;

            if bytes_read == 0 {
                break;
            }

            std::io::Write::write_all(&mut file, &buffer[..bytes_read])
                .context("Failed to write downloaded file")?;

            downloaded += bytes_read as u64;

            if total_size > 0 {
                let progress = downloaded as f32 / total_size as f32;
                self.broadcast_progress(State::Downloading, progress);
            }
        }

        self.broadcast_progress(State::Downloading, 1.0);
        Ok(())
    }

    /// Apply desktop and shell integration (idempotent housekeeping)
    fn apply_integration(&self) -> Result<()> {
        self.broadcast_progress(State::Installing, 0.0);

        let binary = self.config.get_binary_path();

        desktop::install_desktop_entry(
            &self.config.get_applications_dir(),
            self.config.get_app_name(),
            &binary,
            &self.config.get_icon_path(),
        )
        .context("Failed to write the desktop entry")?;

        match self.config.get_shell_profile() {
            Some(profile) => {
                if shell::apply_to_profile(&profile, &binary)
                    .context("Failed to update the shell profile")?
                {
                    info!("shell wrapper added to {}", profile.display());
                }
            }
            None => info!("no known shell profile; skipping wrapper installation"),
        }

        self.broadcast_progress(State::Installing, 1.0);
        Ok(())
    }

    fn ensure_not_running(&self) -> Result<()> {
        let name = self.config.get_process_name();
        if (self.running_probe)(name) {
            return Err(RunningConflict(name.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use tempfile::TempDir;

    fn offline_config(root: &TempDir) -> InstallationConfig {
        InstallationConfig::new(root.path().join("cursor"))
            .system_packages(vec![])
            .applications_dir(root.path().join("applications"))
            .shell_profile(root.path().join(".bashrc"))
            .process_name("cursor-manager-test-no-such-process".to_string())
    }

    fn seed_installation(config: &InstallationConfig, version: &str) {
        fs::create_dir_all(&config.install_path).unwrap();
        fs::write(config.get_binary_path(), b"fake appimage").unwrap();
        fs::write(config.get_version_file(), format!("{version}\n")).unwrap();
    }

    /// Serve one HTTP response on a loopback port and return its URL.
    fn serve_once(status: &'static str, body: Vec<u8>) -> String {
        use std::io::{Read as _, Write as _};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let header = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
            }
        });

        format!("http://{addr}/")
    }

    #[test]
    fn test_config_builder() {
        let config = InstallationConfig::new(PathBuf::from("/opt/cursor"))
            .app_name("Cursor Nightly".to_string())
            .binary_name("cursor-nightly.AppImage".to_string())
            .api_url("https://example.com/api/download".to_string());

        assert_eq!(config.get_app_name(), "Cursor Nightly");
        assert_eq!(
            config.get_binary_path(),
            PathBuf::from("/opt/cursor/cursor-nightly.AppImage")
        );
        assert_eq!(config.get_api_url(), "https://example.com/api/download");
    }

    #[test]
    fn test_config_defaults() {
        let config = InstallationConfig::new(PathBuf::from("/opt/cursor"));

        assert_eq!(config.get_app_name(), "Cursor");
        assert_eq!(config.get_binary_name(), "cursor.AppImage");
        assert_eq!(
            config.get_version_file(),
            PathBuf::from("/opt/cursor/version")
        );
        assert_eq!(config.get_process_name(), "cursor");
        assert_eq!(config.get_api_url(), release::DEFAULT_API_URL);
        assert_eq!(config.get_system_packages(), vec!["libfuse2".to_string()]);
    }

    #[test]
    fn test_installation_manager_creation() {
        let config = InstallationConfig::new(PathBuf::from("/opt/cursor"));
        let manager = InstallationManager::new(config);

        assert!(!manager.is_installed());
        assert_eq!(*manager.current_version(), DetectedVersion::NotInstalled);
        assert!(manager.latest_release().is_none());
    }

    #[test]
    fn test_refresh_picks_up_seeded_installation() {
        let root = TempDir::new().unwrap();
        let config = offline_config(&root);
        seed_installation(&config, "1.2.3");

        let mut manager = InstallationManager::new(config);
        manager.refresh();

        assert!(manager.is_installed());
        assert_eq!(
            *manager.current_version(),
            DetectedVersion::Installed(Version::new(1, 2, 3))
        );
    }

    #[test]
    fn test_install_is_idempotent_when_installed() {
        let root = TempDir::new().unwrap();
        let config = offline_config(&root);
        seed_installation(&config, "0.42.0");

        let mut manager = InstallationManager::new(config.clone());
        manager.install().unwrap();
        let first_version = manager.current_version().clone();
        let first_profile = fs::read_to_string(root.path().join(".bashrc")).unwrap();

        // Second run: same final state, no duplicated integration.
        manager.install().unwrap();
        let second_profile = fs::read_to_string(root.path().join(".bashrc")).unwrap();

        assert_eq!(*manager.current_version(), first_version);
        assert_eq!(first_profile, second_profile);
        assert_eq!(first_profile.matches(shell::MARKER_BEGIN).count(), 1);
        assert!(
            config
                .get_applications_dir()
                .join(desktop::DESKTOP_FILE_NAME)
                .is_file()
        );
        // The seeded binary was never replaced.
        assert_eq!(fs::read(config.get_binary_path()).unwrap(), b"fake appimage");
    }

    #[test]
    fn test_uninstall_removes_artifacts() {
        let root = TempDir::new().unwrap();
        let config = offline_config(&root);
        seed_installation(&config, "0.42.0");

        let mut manager = InstallationManager::new(config.clone());
        manager.install().unwrap();
        manager.uninstall().unwrap();

        assert!(!manager.is_installed());
        assert_eq!(*manager.current_version(), DetectedVersion::NotInstalled);
        assert!(!config.get_binary_path().exists());
        assert!(!config.get_version_file().exists());
        assert!(
            !config
                .get_applications_dir()
                .join(desktop::DESKTOP_FILE_NAME)
                .exists()
        );
        let profile = fs::read_to_string(root.path().join(".bashrc")).unwrap();
        assert!(!profile.contains(shell::MARKER_BEGIN));
    }

    #[test]
    fn test_uninstall_without_installation_fails() {
        let root = TempDir::new().unwrap();
        let mut manager = InstallationManager::new(offline_config(&root));

        assert!(manager.uninstall().is_err());
    }

    #[test]
    fn test_uninstall_blocked_while_running() {
        let root = TempDir::new().unwrap();
        let config = offline_config(&root);
        seed_installation(&config, "0.42.0");

        let mut manager =
            InstallationManager::new(config.clone()).with_running_probe(|_| true);

        let err = manager.uninstall().unwrap_err();
        assert!(
            err.downcast_ref::<RunningConflict>().is_some(),
            "expected a running conflict, got: {err:?}"
        );

        // Installation directory untouched.
        assert_eq!(fs::read(config.get_binary_path()).unwrap(), b"fake appimage");
        assert_eq!(
            fs::read_to_string(config.get_version_file()).unwrap().trim(),
            "0.42.0"
        );
    }

    #[test]
    fn test_install_full_path_records_new_version() {
        let root = TempDir::new().unwrap();

        let binary_url = serve_once("200 OK", b"new appimage bytes".to_vec());
        let api_body = format!(r#"{{"version":"1.2.3","downloadUrl":"{binary_url}"}}"#);
        let api_url = serve_once("200 OK", api_body.into_bytes());

        let config = offline_config(&root).api_url(api_url);
        let mut manager = InstallationManager::new(config.clone());

        manager.install().unwrap();

        assert!(manager.is_installed());
        assert_eq!(
            *manager.current_version(),
            DetectedVersion::Installed(Version::new(1, 2, 3))
        );
        assert_eq!(
            fs::read(config.get_binary_path()).unwrap(),
            b"new appimage bytes"
        );
        assert_eq!(
            fs::read_to_string(config.get_version_file()).unwrap().trim(),
            "1.2.3"
        );

        let mode = fs::metadata(config.get_binary_path())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o755);

        // Staging file was renamed away, not left behind.
        let staging = config
            .install_path
            .join(format!("{}.partial", config.get_binary_name()));
        assert!(!staging.exists());
    }

    #[test]
    fn test_failed_download_leaves_recorded_state_untouched() {
        let root = TempDir::new().unwrap();

        let binary_url = serve_once("500 Internal Server Error", Vec::new());
        let api_body = format!(r#"{{"version":"9.9.9","downloadUrl":"{binary_url}"}}"#);
        let api_url = serve_once("200 OK", api_body.into_bytes());

        let config = offline_config(&root).api_url(api_url);
        seed_installation(&config, "0.41.0");

        let mut manager = InstallationManager::new(config.clone());
        assert!(manager.update().is_err());

        // The sidecar is only rewritten after a successful replacement, so
        // the recorded installation must be exactly as seeded.
        assert_eq!(fs::read(config.get_binary_path()).unwrap(), b"fake appimage");
        assert_eq!(
            fs::read_to_string(config.get_version_file()).unwrap().trim(),
            "0.41.0"
        );
        let staging = config
            .install_path
            .join(format!("{}.partial", config.get_binary_name()));
        assert!(!staging.exists());
    }
}
