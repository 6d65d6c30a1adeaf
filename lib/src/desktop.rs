//! Desktop-entry integration.

use log::debug;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const DESKTOP_TEMPLATE: &str = include_str!("../assets/cursor.desktop");

pub const DESKTOP_FILE_NAME: &str = "cursor.desktop";

/// Render the desktop entry for the given application name, executable and
/// icon paths.
pub fn render_desktop_entry(name: &str, exec: &Path, icon: &Path) -> String {
    DESKTOP_TEMPLATE
        .replace("{{NAME}}", name)
        .replace("{{EXEC}}", &exec.display().to_string())
        .replace("{{ICON}}", &icon.display().to_string())
}

/// Write the desktop entry into the applications directory. Overwrites any
/// previous entry, so re-applying integration is safe.
pub fn install_desktop_entry(
    applications_dir: &Path,
    name: &str,
    exec: &Path,
    icon: &Path,
) -> io::Result<PathBuf> {
    fs::create_dir_all(applications_dir)?;
    let dest = applications_dir.join(DESKTOP_FILE_NAME);
    fs::write(&dest, render_desktop_entry(name, exec, icon))?;

    let mut perms = fs::metadata(&dest)?.permissions();
    perms.set_mode(0o644);
    fs::set_permissions(&dest, perms)?;

    debug!("desktop entry written to {}", dest.display());
    Ok(dest)
}

/// Remove the desktop entry if present. Returns whether a file was removed.
pub fn remove_desktop_entry(applications_dir: &Path) -> io::Result<bool> {
    let dest = applications_dir.join(DESKTOP_FILE_NAME);
    match fs::remove_file(&dest) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
