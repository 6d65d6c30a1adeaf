//! System-dependency check via the host package manager.
//!
//! AppImages need the FUSE 2 runtime; before any install or update the
//! required packages are checked and, when missing, one remediation attempt
//! is made. A second failure is fatal for the run.

use log::{info, warn};
use std::env;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Packages every install/update requires.
pub const REQUIRED_PACKAGES: &[&str] = &["libfuse2"];

#[derive(Debug, Error)]
#[error("required dependency `{0}` could not be installed")]
pub struct DependencyMissing(pub String);

/// The package managers this tool knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
    Zypper,
}

impl PackageManager {
    /// Detect the host package manager from the PATH.
    pub fn detect() -> Option<Self> {
        Self::detect_with(on_path)
    }

    /// Detection against an injected PATH probe, so the lookup itself is
    /// testable without a real system.
    pub fn detect_with(probe: impl Fn(&str) -> bool) -> Option<Self> {
        const CANDIDATES: &[(&str, PackageManager)] = &[
            ("apt-get", PackageManager::Apt),
            ("dnf", PackageManager::Dnf),
            ("pacman", PackageManager::Pacman),
            ("zypper", PackageManager::Zypper),
        ];
        CANDIDATES
            .iter()
            .find(|(bin, _)| probe(bin))
            .map(|(_, pm)| *pm)
    }

    fn query_command(self, package: &str) -> (&'static str, Vec<String>) {
        match self {
            PackageManager::Apt => ("dpkg", vec!["-s".into(), package.into()]),
            PackageManager::Dnf | PackageManager::Zypper => {
                ("rpm", vec!["-q".into(), package.into()])
            }
            PackageManager::Pacman => ("pacman", vec!["-Qi".into(), package.into()]),
        }
    }

    fn install_command(self, package: &str) -> (&'static str, Vec<String>) {
        match self {
            PackageManager::Apt => (
                "apt-get",
                vec!["install".into(), "-y".into(), package.into()],
            ),
            PackageManager::Dnf => ("dnf", vec!["install".into(), "-y".into(), package.into()]),
            PackageManager::Pacman => (
                "pacman",
                vec!["-S".into(), "--noconfirm".into(), package.into()],
            ),
            PackageManager::Zypper => (
                "zypper",
                vec!["install".into(), "-y".into(), package.into()],
            ),
        }
    }

    /// Whether the package is currently installed.
    pub fn is_installed(self, package: &str) -> bool {
        let (bin, args) = self.query_command(package);
        Command::new(bin)
            .args(&args)
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn install(self, package: &str) -> bool {
        let (bin, args) = self.install_command(package);
        let mut cmd = if on_path("sudo") {
            let mut c = Command::new("sudo");
            c.arg(bin);
            c
        } else {
            Command::new(bin)
        };
        cmd.args(&args)
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Ensure every named package is present, remediating each missing one with
/// a single package-manager invocation.
pub fn ensure_installed(packages: &[String]) -> Result<(), DependencyMissing> {
    if packages.is_empty() {
        return Ok(());
    }

    let Some(pm) = PackageManager::detect() else {
        warn!("no supported package manager found; skipping dependency check");
        return Ok(());
    };

    for package in packages {
        if pm.is_installed(package) {
            continue;
        }

        info!("installing missing dependency {package}");
        pm.install(package);

        if !pm.is_installed(package) {
            return Err(DependencyMissing(package.clone()));
        }
    }

    Ok(())
}

fn on_path(name: &str) -> bool {
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|dir| dir.join(Path::new(name)).is_file())
}
