//! Detection of the currently installed version.
//!
//! Resolution order, first success wins: sidecar version file, embedded
//! metadata in the AppImage head, raw content scan. A missing binary means
//! nothing is installed; a binary with no parseable version evidence
//! degrades to `Unknown`. Every step is read-only and no error escapes.

use crate::InstallationConfig;
use crate::version::{self, DetectedVersion};
use log::debug;
use semver::Version;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// How much of the binary head is scanned for embedded metadata before
/// falling back to a full raw scan.
const HEAD_SCAN_BYTES: usize = 512 * 1024;

const RAW_SCAN_CHUNK: usize = 64 * 1024;

/// Detect the installed version for the given configuration.
pub fn detect(config: &InstallationConfig) -> DetectedVersion {
    detect_at(
        &config.get_binary_path(),
        &config.get_version_file(),
        &format!("{}-", config.get_app_name()),
    )
}

/// Path-injected variant of [`detect`].
pub fn detect_at(binary: &Path, sidecar: &Path, needle: &str) -> DetectedVersion {
    if !binary.exists() {
        return DetectedVersion::NotInstalled;
    }

    if let Some(v) = read_sidecar(sidecar) {
        return DetectedVersion::Installed(v);
    }

    if let Some(v) = scan_embedded(binary, needle) {
        debug!("version {v} recovered from embedded metadata");
        return DetectedVersion::Installed(v);
    }

    if let Some(v) = scan_raw(binary, needle) {
        debug!("version {v} recovered from raw content scan");
        return DetectedVersion::Installed(v);
    }

    DetectedVersion::Unknown
}

fn read_sidecar(sidecar: &Path) -> Option<Version> {
    let contents = fs::read_to_string(sidecar).ok()?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return None;
    }
    version::parse_lenient(trimmed)
}

/// Look for a `Name-X.Y.Z` pattern in the head of the binary, gated on the
/// file actually being an ELF (AppImages are ELF executables).
fn scan_embedded(binary: &Path, needle: &str) -> Option<Version> {
    let mut file = File::open(binary).ok()?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).ok()?;
    if magic != ELF_MAGIC {
        return None;
    }

    let mut head = vec![0u8; HEAD_SCAN_BYTES];
    let mut filled = 4;
    head[..4].copy_from_slice(&magic);
    while filled < head.len() {
        let n = file.read(&mut head[filled..]).ok()?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    find_version(&head[..filled], needle.as_bytes())
}

/// Stream the whole binary looking for the same pattern, first match wins.
/// A tail of the previous chunk is kept so matches spanning a chunk
/// boundary are not missed.
fn scan_raw(binary: &Path, needle: &str) -> Option<Version> {
    let mut file = File::open(binary).ok()?;
    let needle_bytes = needle.as_bytes();
    let overlap = needle_bytes.len() + 32;

    let mut window = Vec::with_capacity(RAW_SCAN_CHUNK + overlap);
    let mut chunk = vec![0u8; RAW_SCAN_CHUNK];

    loop {
        let n = file.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        window.extend_from_slice(&chunk[..n]);

        if let Some(v) = find_version(&window, needle_bytes) {
            return Some(v);
        }

        if window.len() > overlap {
            let keep = window.len() - overlap;
            window.drain(..keep);
        }
    }
}

/// Extract the first `<needle>X.Y.Z` occurrence from a byte buffer.
fn find_version(haystack: &[u8], needle: &[u8]) -> Option<Version> {
    let mut offset = 0;
    while let Some(pos) = find_subslice(&haystack[offset..], needle) {
        let start = offset + pos + needle.len();
        let end = haystack[start..]
            .iter()
            .position(|b| !b.is_ascii_digit() && *b != b'.')
            .map(|i| start + i)
            .unwrap_or(haystack.len());

        if let Ok(candidate) = std::str::from_utf8(&haystack[start..end])
            && let Some(v) = version::parse_lenient(candidate)
        {
            return Some(v);
        }

        offset = start;
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
