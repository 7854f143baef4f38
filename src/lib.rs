//! Frame recorder
//!
//! Polls HTTP snapshot cameras and archives every frame into rotating tar
//! containers, one directory tree per camera.
//!
//! # Architecture
//!
//! - `freespace`: free space probing and size parsing
//! - `ingest`: `FrameSource`, the HTTP fetch and the timestamp overlay
//! - `storage`: `ArchiveStore`, container rotation and space lockout
//! - `server`: the round-robin poll loop and coordinated shutdown
//! - `config`, `logging`, `pidfile`: process plumbing for `recorderd`
//!
//! Data flows one way: `Server` -> `FrameSource::fetch` -> `Frame` ->
//! `ArchiveStore::write`. Every fault below the server is logged and turned
//! into a dropped frame; only configuration problems stop the process.

pub mod config;
pub mod error;
pub mod frame;
pub mod freespace;
pub mod ingest;
pub mod logging;
pub mod pidfile;
pub mod server;
pub mod storage;

pub use config::RecorderConfig;
pub use error::{
    ArchiveError, FetchError, OverlayError, ProbeError, ServerError, SourceError,
};
pub use frame::Frame;
pub use freespace::{parse_size, FreeSpaceProbe, StatvfsProbe};
pub use ingest::{FrameFetcher, FrameSource, FrameSourceConfig, HttpFetcher, SourceStats};
pub use pidfile::PidFile;
pub use server::{Server, MAX_SOURCES};
pub use storage::{ArchiveConfig, ArchiveState, ArchiveStore};
