//! Free space probing for archive filesystems.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::ProbeError;

/// Size units, each 1024 times the previous one.
const SIZE_UNITS: &str = "bkmgtpezy";

/// Reports how many bytes can still be written on the filesystem holding a path.
pub trait FreeSpaceProbe: Send + Sync {
    fn bytes_free(&self, path: &Path) -> Result<u64, ProbeError>;
}

/// `statvfs(2)` backed probe. Reports the space available to unprivileged
/// writers, the same figure `df` prints as "Available".
#[derive(Clone, Copy, Debug, Default)]
pub struct StatvfsProbe;

impl FreeSpaceProbe for StatvfsProbe {
    fn bytes_free(&self, path: &Path) -> Result<u64, ProbeError> {
        let target = nearest_existing(path);
        statvfs_available(&target)
    }
}

#[cfg(unix)]
fn statvfs_available(path: &Path) -> Result<u64, ProbeError> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|error| ProbeError {
        path: path.to_path_buf(),
        details: error.to_string(),
    })?;
    #[allow(clippy::unnecessary_cast)]
    let available = (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64);
    Ok(available)
}

#[cfg(not(unix))]
fn statvfs_available(path: &Path) -> Result<u64, ProbeError> {
    Err(ProbeError {
        path: path.to_path_buf(),
        details: "statvfs is not available on this platform".to_string(),
    })
}

/// Archive directories are created lazily, so probe the closest ancestor that exists.
fn nearest_existing(path: &Path) -> PathBuf {
    let mut current = path;
    loop {
        if current.exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return PathBuf::from("."),
        }
    }
}

/// Parses a size such as `"500m"` or `"2G"` into bytes.
///
/// Malformed input and values that overflow `u64` yield 0.
pub fn parse_size(text: &str) -> u64 {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<amount>[0-9]+)(?P<unit>[bkmgtpezy])$").expect("size pattern is valid")
    });

    let lowered = text.trim().to_lowercase();
    let Some(caps) = pattern.captures(&lowered) else {
        return 0;
    };
    let Ok(amount) = caps["amount"].parse::<u64>() else {
        return 0;
    };
    let Some(exponent) = SIZE_UNITS.find(&caps["unit"]) else {
        return 0;
    };
    1024u64
        .checked_pow(exponent as u32)
        .and_then(|scale| amount.checked_mul(scale))
        .unwrap_or(0)
}
