//! Frame ingestion sources.
//!
//! A `FrameSource` polls one camera snapshot URL. Each call to `fetch()` is one
//! blocking HTTP request; the optional timestamp overlay runs in-process.
//!
//! Sources never fail the caller: transport and overlay errors are logged
//! with the source id and surface as "no frame this cycle".

pub mod http;
pub mod overlay;

use chrono::NaiveDateTime;
use std::time::Duration;

pub use http::{HttpFetcher, DEFAULT_FETCH_TIMEOUT, MAX_FRAME_BYTES};

use crate::error::{FetchError, SourceError};
use crate::frame::{now_local, Frame};
use crate::storage::ArchiveConfig;

/// Transport that retrieves one encoded frame from a URL.
pub trait FrameFetcher: Send {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Configuration for one camera source.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSourceConfig {
    /// Unique source name; also names the source's archive directory.
    pub id: String,
    /// Snapshot URL (e.g. "http://192.168.1.20/snapshot.jpg").
    pub url: String,
    /// strftime pattern burned into each frame; `None` disables the overlay.
    pub timestamp_format: Option<String>,
    /// Where frames are persisted; `None` means fetched frames are discarded.
    pub archive: Option<ArchiveConfig>,
    /// Free-form label from the config file.
    pub description: Option<String>,
    pub fetch_timeout: Duration,
}

impl FrameSourceConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            timestamp_format: None,
            archive: None,
            description: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = Some(format.into());
        self
    }

    pub fn with_archive(mut self, archive: ArchiveConfig) -> Self {
        self.archive = Some(archive);
        self
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_fetched: u64,
    pub last_frame_at: Option<NaiveDateTime>,
}

/// One polled camera.
pub struct FrameSource {
    config: FrameSourceConfig,
    fetcher: Box<dyn FrameFetcher>,
    /// Administrative kill switch; disables all activity.
    locked: bool,
    /// Skips fetching while keeping the source registered.
    fetch_suspended: bool,
    stats: SourceStats,
}

impl FrameSource {
    pub fn new(config: FrameSourceConfig) -> Self {
        let fetcher = HttpFetcher::new(config.fetch_timeout);
        Self::with_fetcher(config, Box::new(fetcher))
    }

    pub fn with_fetcher(config: FrameSourceConfig, fetcher: Box<dyn FrameFetcher>) -> Self {
        Self {
            config,
            fetcher,
            locked: false,
            fetch_suspended: false,
            stats: SourceStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &FrameSourceConfig {
        &self.config
    }

    /// Fetch one frame. Returns `None` when locked, suspended, or on any failure.
    pub fn fetch(&mut self) -> Option<Frame> {
        if self.locked || self.fetch_suspended {
            return None;
        }
        match self.try_fetch() {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::error!("{:?}: {}", self.config.id, err);
                None
            }
        }
    }

    fn try_fetch(&mut self) -> Result<Frame, SourceError> {
        let bytes = self.fetcher.fetch(&self.config.url)?;
        let captured_at = now_local();
        self.stats.last_frame_at = Some(captured_at);
        self.stats.frames_fetched += 1;

        // Overlay errors cost this frame only; the counters above still advance.
        let bytes = match self.config.timestamp_format.as_deref() {
            Some(format) => overlay::stamp_frame(&bytes, captured_at, format)?,
            None => bytes,
        };
        Ok(Frame::new(bytes, captured_at))
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn suspend_fetch(&mut self) {
        self.fetch_suspended = true;
    }

    pub fn resume_fetch(&mut self) {
        self.fetch_suspended = false;
    }

    pub fn is_fetch_suspended(&self) -> bool {
        self.fetch_suspended
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("id", &self.config.id)
            .field("frames", &self.stats.frames_fetched)
            .field("locked", &self.locked)
            .field("fetch_suspended", &self.fetch_suspended)
            .finish()
    }
}
