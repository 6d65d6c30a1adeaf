use semver::Version;
use std::fmt;

/// Result of probing the local installation for a version.
///
/// `Installed` always carries a fully resolved major.minor.patch triple;
/// the sentinels cover "nothing there" and "something there, but no
/// parseable version evidence".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectedVersion {
    NotInstalled,
    Unknown,
    Installed(Version),
}

impl DetectedVersion {
    pub fn as_version(&self) -> Option<&Version> {
        match self {
            DetectedVersion::Installed(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_installed(&self) -> bool {
        !matches!(self, DetectedVersion::NotInstalled)
    }
}

impl fmt::Display for DetectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectedVersion::NotInstalled => write!(f, "not installed"),
            DetectedVersion::Unknown => write!(f, "unknown"),
            DetectedVersion::Installed(v) => write!(f, "{v}"),
        }
    }
}

/// Parse a version string into a major.minor.patch triple.
///
/// More tolerant than `Version::parse`: accepts an optional `v` prefix and
/// ignores anything past the patch component ("1.2.3.4" and "1.2.3-nightly"
/// both resolve to 1.2.3). The distribution channel is not strict semver,
/// so strict parsing would reject real release strings.
///
/// Returns `None` when fewer than three numeric components are present.
pub fn parse_lenient(input: &str) -> Option<Version> {
    let trimmed = input.trim().trim_start_matches(['v', 'V']);
    let mut parts = trimmed.split('.');

    let major: u64 = parts.next()?.parse().ok()?;
    let minor: u64 = parts.next()?.parse().ok()?;

    // The patch component may carry a trailing tag; take the leading digits.
    let patch_raw = parts.next()?;
    let digits: String = patch_raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let patch: u64 = digits.parse().ok()?;

    Some(Version::new(major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_triple() {
        assert_eq!(parse_lenient("0.42.0"), Some(Version::new(0, 42, 0)));
        assert_eq!(parse_lenient("1.2.3"), Some(Version::new(1, 2, 3)));
    }

    #[test]
    fn test_parse_strips_prefix_and_whitespace() {
        assert_eq!(parse_lenient("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_lenient("  1.2.3\n"), Some(Version::new(1, 2, 3)));
    }

    #[test]
    fn test_parse_ignores_trailing_components() {
        assert_eq!(parse_lenient("1.2.3.4"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_lenient("1.2.3-nightly"), Some(Version::new(1, 2, 3)));
    }

    #[test]
    fn test_parse_rejects_incomplete_triples() {
        assert_eq!(parse_lenient(""), None);
        assert_eq!(parse_lenient("1"), None);
        assert_eq!(parse_lenient("1.2"), None);
        assert_eq!(parse_lenient("1.2.x"), None);
        assert_eq!(parse_lenient("garbage"), None);
    }

    #[test]
    fn test_detected_version_display() {
        assert_eq!(DetectedVersion::NotInstalled.to_string(), "not installed");
        assert_eq!(DetectedVersion::Unknown.to_string(), "unknown");
        assert_eq!(
            DetectedVersion::Installed(Version::new(0, 42, 0)).to_string(),
            "0.42.0"
        );
    }
}
