//! Shell-profile integration for the `cursor` wrapper function.
//!
//! The wrapper lives in the user's shell profile between marker lines, so
//! applying it is idempotent and removing it strips exactly what was added.

use log::debug;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const WRAPPER_TEMPLATE: &str = include_str!("../assets/cursor-function.sh");

pub const MARKER_BEGIN: &str = "# >>> cursor-manager >>>";
pub const MARKER_END: &str = "# <<< cursor-manager <<<";

/// The shells this tool knows how to integrate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
    Other,
}

impl ShellKind {
    /// Detect the user's login shell from `$SHELL`.
    pub fn detect() -> Self {
        match env::var("SHELL") {
            Ok(shell) => Self::from_shell_var(&shell),
            Err(_) => ShellKind::Other,
        }
    }

    /// Classify a `$SHELL` value. Pure, so the detection is testable
    /// without touching the environment.
    pub fn from_shell_var(shell: &str) -> Self {
        let name = shell.rsplit('/').next().unwrap_or(shell);
        match name {
            "bash" => ShellKind::Bash,
            "zsh" => ShellKind::Zsh,
            "fish" => ShellKind::Fish,
            _ => ShellKind::Other,
        }
    }

    /// Profile file the wrapper goes into, relative to the given home
    /// directory. `Other` has no known profile and gets no integration.
    pub fn profile_path(self, home: &Path) -> Option<PathBuf> {
        match self {
            ShellKind::Bash => Some(home.join(".bashrc")),
            ShellKind::Zsh => Some(home.join(".zshrc")),
            ShellKind::Fish => Some(home.join(".config").join("fish").join("config.fish")),
            ShellKind::Other => None,
        }
    }
}

/// Render the wrapper function for the given binary path.
pub fn render_wrapper(binary: &Path) -> String {
    WRAPPER_TEMPLATE.replace("{{BINARY}}", &binary.display().to_string())
}

/// Append the marked wrapper block to the profile unless it is already
/// there. Returns whether anything was written.
pub fn apply_to_profile(profile: &Path, binary: &Path) -> io::Result<bool> {
    let existing = match fs::read_to_string(profile) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    if existing.contains(MARKER_BEGIN) {
        debug!("wrapper already present in {}", profile.display());
        return Ok(false);
    }

    if let Some(parent) = profile.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(profile)?;
    let separator = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    write!(
        file,
        "{separator}{MARKER_BEGIN}\n{}{MARKER_END}\n",
        render_wrapper(binary)
    )?;

    debug!("wrapper appended to {}", profile.display());
    Ok(true)
}

/// Remove the marked wrapper block from the profile. Returns whether a
/// block was found and removed.
pub fn remove_from_profile(profile: &Path) -> io::Result<bool> {
    let contents = match fs::read_to_string(profile) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if !contents.contains(MARKER_BEGIN) {
        return Ok(false);
    }

    let mut kept = Vec::new();
    let mut inside = false;
    for line in contents.lines() {
        if line.trim() == MARKER_BEGIN {
            inside = true;
            continue;
        }
        if line.trim() == MARKER_END {
            inside = false;
            continue;
        }
        if !inside {
            kept.push(line);
        }
    }

    let mut rewritten = kept.join("\n");
    if contents.ends_with('\n') && !rewritten.is_empty() {
        rewritten.push('\n');
    }
    fs::write(profile, rewritten)?;

    debug!("wrapper removed from {}", profile.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shell_kind_from_shell_var() {
        assert_eq!(ShellKind::from_shell_var("/bin/bash"), ShellKind::Bash);
        assert_eq!(ShellKind::from_shell_var("/usr/bin/zsh"), ShellKind::Zsh);
        assert_eq!(ShellKind::from_shell_var("/usr/bin/fish"), ShellKind::Fish);
        assert_eq!(ShellKind::from_shell_var("/bin/tcsh"), ShellKind::Other);
        assert_eq!(ShellKind::from_shell_var("zsh"), ShellKind::Zsh);
    }

    #[test]
    fn test_profile_lookup() {
        let home = Path::new("/home/someone");
        assert_eq!(
            ShellKind::Bash.profile_path(home),
            Some(PathBuf::from("/home/someone/.bashrc"))
        );
        assert_eq!(
            ShellKind::Fish.profile_path(home),
            Some(PathBuf::from("/home/someone/.config/fish/config.fish"))
        );
        assert_eq!(ShellKind::Other.profile_path(home), None);
    }

    #[test]
    fn test_render_substitutes_binary_path() {
        let rendered = render_wrapper(Path::new("/opt/cursor/cursor.AppImage"));
        assert!(rendered.contains("/opt/cursor/cursor.AppImage"));
        assert!(!rendered.contains("{{BINARY}}"));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join(".bashrc");
        let binary = Path::new("/opt/cursor/cursor.AppImage");

        assert!(apply_to_profile(&profile, binary).unwrap());
        let first = fs::read_to_string(&profile).unwrap();

        assert!(!apply_to_profile(&profile, binary).unwrap());
        let second = fs::read_to_string(&profile).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.matches(MARKER_BEGIN).count(), 1);
    }

    #[test]
    fn test_apply_preserves_existing_content() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join(".zshrc");
        fs::write(&profile, "export EDITOR=vim\n").unwrap();

        apply_to_profile(&profile, Path::new("/x/cursor.AppImage")).unwrap();

        let contents = fs::read_to_string(&profile).unwrap();
        assert!(contents.starts_with("export EDITOR=vim\n"));
        assert!(contents.contains(MARKER_BEGIN));
        assert!(contents.contains(MARKER_END));
    }

    #[test]
    fn test_remove_strips_only_the_marked_block() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join(".bashrc");
        fs::write(&profile, "alias ll='ls -l'\n").unwrap();

        apply_to_profile(&profile, Path::new("/x/cursor.AppImage")).unwrap();
        assert!(remove_from_profile(&profile).unwrap());

        let contents = fs::read_to_string(&profile).unwrap();
        assert_eq!(contents, "alias ll='ls -l'\n");
    }

    #[test]
    fn test_remove_without_block_is_noop() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join(".bashrc");
        fs::write(&profile, "alias ll='ls -l'\n").unwrap();

        assert!(!remove_from_profile(&profile).unwrap());
        assert!(!remove_from_profile(&dir.path().join("missing")).unwrap());
    }
}
