//! Error kinds for the capture-and-archive pipeline.
//!
//! None of these escape the poll loop: sources and archives log them and turn
//! them into "no frame this cycle" or "frame dropped".

use std::io;
use std::path::PathBuf;

/// Transport failure while fetching a frame.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] Box<ureq::Error>),
    #[error("read frame body: {0}")]
    Io(#[from] io::Error),
    #[error("frame body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("empty frame body")]
    Empty,
}

/// Failure while burning the timestamp into a fetched frame.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("unrecognized image format: {0}")]
    Format(#[source] image::ImageError),
    #[error("decode frame: {0}")]
    Decode(#[source] image::ImageError),
    #[error("encode frame: {0}")]
    Encode(#[source] image::ImageError),
    #[error("invalid timestamp format {0:?}")]
    TimestampFormat(String),
}

/// Anything that costs a source its frame for the current cycle.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("create container {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("append entry {entry}: {source}")]
    Append {
        entry: String,
        #[source]
        source: io::Error,
    },
    #[error("finish container {path}: {source}")]
    Finish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("stat container {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Free space on a filesystem could not be determined.
#[derive(Debug, thiserror::Error)]
#[error("free space probe failed for {path}: {details}")]
pub struct ProbeError {
    pub path: PathBuf,
    pub details: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("no sources registered")]
    NoSources,
    #[error("source limit of {limit} reached, cannot register {id:?}")]
    CapacityExceeded { id: String, limit: usize },
    #[error("source {0:?} already registered")]
    DuplicateSource(String),
}
