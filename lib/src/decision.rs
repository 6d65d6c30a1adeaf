//! Version comparison and the update decision it drives.

use crate::version::DetectedVersion;
use semver::Version;
use std::fmt;

/// Outcome of comparing the installed version against the latest release.
///
/// Deliberately coarse: "newer" and "equal" share an arm because no caller
/// distinguishes them. Absence of evidence (either sentinel) means the
/// latest release wins; an update is required, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrdering {
    CurrentIsNewerOrEqual,
    LatestIsNewer,
}

/// Compare to depth 3: major, then minor, then patch. Anything past the
/// patch component was already discarded by the lenient parser.
pub fn compare(current: &DetectedVersion, latest: &Version) -> VersionOrdering {
    let current = match current {
        DetectedVersion::Installed(v) => v,
        DetectedVersion::NotInstalled | DetectedVersion::Unknown => {
            return VersionOrdering::LatestIsNewer;
        }
    };

    let current_triple = (current.major, current.minor, current.patch);
    let latest_triple = (latest.major, latest.minor, latest.patch);

    if latest_triple > current_triple {
        VersionOrdering::LatestIsNewer
    } else {
        VersionOrdering::CurrentIsNewerOrEqual
    }
}

/// What the caller should do about the installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    NotInstalled,
    UpToDate,
    UpdateAvailable,
    Unknown,
}

impl UpdateDecision {
    /// Whether this decision leads to a download.
    pub fn needs_download(self) -> bool {
        matches!(
            self,
            UpdateDecision::NotInstalled
                | UpdateDecision::UpdateAvailable
                | UpdateDecision::Unknown
        )
    }
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateDecision::NotInstalled => "not installed",
            UpdateDecision::UpToDate => "up to date",
            UpdateDecision::UpdateAvailable => "update available",
            UpdateDecision::Unknown => "installed version unknown",
        };
        write!(f, "{s}")
    }
}

/// Map the probe result and the latest release onto an update decision.
pub fn decide(current: &DetectedVersion, latest: &Version) -> UpdateDecision {
    match current {
        DetectedVersion::NotInstalled => UpdateDecision::NotInstalled,
        DetectedVersion::Unknown => UpdateDecision::Unknown,
        DetectedVersion::Installed(_) => match compare(current, latest) {
            VersionOrdering::CurrentIsNewerOrEqual => UpdateDecision::UpToDate,
            VersionOrdering::LatestIsNewer => UpdateDecision::UpdateAvailable,
        },
    }
}
