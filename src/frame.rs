//! Captured frames.
//!
//! A `Frame` is handed from a source to its archive by value and dropped once
//! the archive has copied it into a container entry.

use chrono::{Local, NaiveDateTime};

/// One captured image plus the local wall-clock time it was fetched at.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    /// Capture time, microsecond resolution.
    pub captured_at: NaiveDateTime,
}

impl Frame {
    pub fn new(data: Vec<u8>, captured_at: NaiveDateTime) -> Self {
        Self { data, captured_at }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Current local wall-clock time, the clock every archive name is derived from.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}
