//! Poll loop over the registered camera/archive pairs.
//!
//! The server is the only driver: it visits every source in registration
//! order, one fetch per source per sweep, and hands each frame straight to
//! that source's archive. Pacing comes from the fetches themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ServerError;
use crate::freespace::FreeSpaceProbe;
use crate::ingest::{FrameSource, FrameSourceConfig};
use crate::storage::ArchiveStore;

/// Practical ceiling on concurrently polled sources.
pub const MAX_SOURCES: usize = 8;
/// How long `stop()` waits for each archive to release its container.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause after a sweep in which no source produced a frame.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(100);

struct SourcePair {
    source: FrameSource,
    archive: Option<ArchiveStore>,
}

pub struct Server {
    pairs: Vec<SourcePair>,
    index: HashMap<String, usize>,
    close_timeout: Duration,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Self {
            pairs: Vec::with_capacity(MAX_SOURCES),
            index: HashMap::new(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Registers an HTTP camera and, if configured, its archive.
    pub fn add_source(
        &mut self,
        config: FrameSourceConfig,
        probe: Arc<dyn FreeSpaceProbe>,
    ) -> Result<(), ServerError> {
        let archive = config
            .archive
            .clone()
            .map(|archive| ArchiveStore::new(config.id.clone(), archive, probe));
        self.register(FrameSource::new(config), archive)
    }

    pub fn register(
        &mut self,
        source: FrameSource,
        archive: Option<ArchiveStore>,
    ) -> Result<(), ServerError> {
        let id = source.id().to_string();
        if self.index.contains_key(&id) {
            return Err(ServerError::DuplicateSource(id));
        }
        if self.pairs.len() >= MAX_SOURCES {
            return Err(ServerError::CapacityExceeded {
                id,
                limit: MAX_SOURCES,
            });
        }
        if archive.is_none() {
            log::warn!("{:?}: no storage configured, frames will be discarded", id);
        }
        self.index.insert(id, self.pairs.len());
        self.pairs.push(SourcePair { source, archive });
        Ok(())
    }

    /// Opens every archive and polls until `shutdown` is raised, then stops.
    pub fn start(&mut self, shutdown: &AtomicBool) -> Result<(), ServerError> {
        log::info!("Starting server ...");
        if self.pairs.is_empty() {
            log::error!("CRITICAL No cameras");
            return Err(ServerError::NoSources);
        }

        self.open_archives();

        loop {
            match self.sweep_until(shutdown) {
                Some(0) => std::thread::sleep(IDLE_BACKOFF),
                Some(_) => {}
                None => {
                    log::warn!("Aborted by user");
                    break;
                }
            }
        }
        self.stop();
        Ok(())
    }

    pub fn open_archives(&mut self) {
        for pair in &mut self.pairs {
            if let Some(archive) = pair.archive.as_mut() {
                if !archive.open() {
                    log::warn!("{:?}: storage did not open", archive.id());
                }
            }
        }
    }

    /// One round-robin pass. Returns how many frames were fetched.
    pub fn sweep(&mut self) -> usize {
        self.sweep_until(&AtomicBool::new(false)).unwrap_or(0)
    }

    /// Like `sweep`, but checks `shutdown` before each source and returns
    /// `None` once it is raised.
    fn sweep_until(&mut self, shutdown: &AtomicBool) -> Option<usize> {
        let mut fetched = 0;
        for pair in &mut self.pairs {
            if shutdown.load(Ordering::SeqCst) {
                return None;
            }
            let Some(frame) = pair.source.fetch() else {
                continue;
            };
            fetched += 1;
            if let Some(archive) = pair.archive.as_mut() {
                archive.write(&frame);
            }
        }
        Some(fetched)
    }

    /// Locks every source and archive and waits for each container to be released.
    pub fn stop(&mut self) {
        log::warn!("Shutdown server ...");
        for pair in &mut self.pairs {
            pair.source.lock();
            let Some(archive) = pair.archive.as_mut() else {
                continue;
            };
            archive.lock_all();
            archive.close();
            if !archive.wait_closed(self.close_timeout) {
                log::warn!(
                    "{:?}: storage not closed after {:?}, forcing release",
                    archive.id(),
                    self.close_timeout
                );
                archive.force_release();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn source(&self, id: &str) -> Option<&FrameSource> {
        self.index.get(id).map(|&i| &self.pairs[i].source)
    }

    pub fn archive(&self, id: &str) -> Option<&ArchiveStore> {
        self.index
            .get(id)
            .and_then(|&i| self.pairs[i].archive.as_ref())
    }

    pub fn archive_mut(&mut self, id: &str) -> Option<&mut ArchiveStore> {
        let i = *self.index.get(id)?;
        self.pairs[i].archive.as_mut()
    }
}
