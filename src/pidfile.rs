//! Single-instance marker.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Holds the pidfile for the life of the process; removes it on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Refuses to start when the pidfile already exists.
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    anyhow!("pidfile already exists: {}", path.display())
                }
                _ => anyhow!("failed to create pidfile {}: {}", path.display(), e),
            })?;
        write!(file, "{}", std::process::id())
            .with_context(|| format!("write pidfile {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log::warn!("failed to remove pidfile {}: {}", self.path.display(), err);
        }
    }
}
