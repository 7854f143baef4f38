//! HTTP snapshot transport.
//!
//! Each fetch is one GET of a still image. Bodies are read fully into memory
//! up to `MAX_FRAME_BYTES`.

use std::io::Read;
use std::time::Duration;

use super::FrameFetcher;
use crate::error::FetchError;

pub const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking HTTP client used by camera sources.
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            agent,
            max_bytes: MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl FrameFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| FetchError::Http(Box::new(e)))?;
        read_bounded(response.into_reader(), self.max_bytes)
    }
}

fn read_bounded(reader: impl Read, limit: usize) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    // One byte past the limit tells an exact-size body apart from an oversized one.
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut bytes)?;
    if bytes.len() > limit {
        return Err(FetchError::TooLarge { limit });
    }
    if bytes.is_empty() {
        return Err(FetchError::Empty);
    }
    Ok(bytes)
}
