//! Rotating per-source frame archives.
//!
//! Each source owns one `ArchiveStore`, which keeps at most one tar container
//! open under `{root}/{source id}`. Frames are appended as individual entries.
//! A container is rotated once it grows past `max_archive_bytes`, and intake
//! stops for good (until an operator resumes it) once free space on the
//! backing filesystem drops to `min_free_bytes`.
//!
//! State transitions:
//!
//! ```text
//! Uninitialized --open--> Open --lock_all--> ShuttingDown --close--> (released)
//!                          |  \--size >= max--> ShuttingDown -> Closed -> Open
//!                          \--free <= min--> LowSpace --resume--> Open
//! ```

pub mod layout;

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::ArchiveError;
use crate::frame::{now_local, Frame};
use crate::freespace::FreeSpaceProbe;

/// Successful writes between free-space and size checks.
pub const HOUSEKEEPING_INTERVAL: u64 = 100;
/// Successful writes between container size log lines.
pub const SIZE_LOG_INTERVAL: u64 = 500;
/// How many times rotation retries a refused close before giving up.
pub const CLOSE_ATTEMPTS: usize = 3;

const MIB: f64 = 1024.0 * 1024.0;

/// Archive settings for one source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Directory under which each source gets its own subdirectory.
    pub root_path: PathBuf,
    /// Container size that triggers rotation.
    pub max_archive_bytes: u64,
    /// Free space at or below which intake stops.
    pub min_free_bytes: u64,
}

impl ArchiveConfig {
    /// Directory exclusively owned by source `id`.
    pub fn source_home(&self, id: &str) -> PathBuf {
        self.root_path.join(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveState {
    /// Nothing opened yet; writes refused.
    Uninitialized,
    /// Container open and accepting writes.
    Open,
    /// Free space exhausted; all operations locked until `resume()`.
    LowSpace,
    /// Shutdown or rotation in progress; all operations locked.
    ShuttingDown,
    /// Container released; may be reopened.
    Closed,
}

/// Completion signal published every time a store releases its container.
#[derive(Debug)]
pub struct CloseSignal {
    closed: Mutex<bool>,
    cond: Condvar,
}

impl CloseSignal {
    fn new(closed: bool) -> Self {
        Self {
            closed: Mutex::new(closed),
            cond: Condvar::new(),
        }
    }

    fn set(&self, closed: bool) {
        let mut guard = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        *guard = closed;
        if closed {
            self.cond.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks until the container is released or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |closed| !*closed)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

type ContainerWriter = Box<dyn Write + Send>;

struct OpenContainer {
    builder: tar::Builder<ContainerWriter>,
    path: PathBuf,
    opened_at: NaiveDateTime,
}

pub struct ArchiveStore {
    id: String,
    config: ArchiveConfig,
    home: PathBuf,
    probe: Arc<dyn FreeSpaceProbe>,
    state: ArchiveState,
    /// Administrative guard: while set, `close()` is refused.
    close_locked: bool,
    container: Option<OpenContainer>,
    frames_since_open: u64,
    close_signal: Arc<CloseSignal>,
}

impl ArchiveStore {
    pub fn new(id: impl Into<String>, config: ArchiveConfig, probe: Arc<dyn FreeSpaceProbe>) -> Self {
        let id = id.into();
        let home = config.source_home(&id);
        Self {
            id,
            config,
            home,
            probe,
            state: ArchiveState::Uninitialized,
            close_locked: false,
            container: None,
            frames_since_open: 0,
            close_signal: Arc::new(CloseSignal::new(true)),
        }
    }

    /// Opens a fresh container. Refused while shutting down or locked out.
    pub fn open(&mut self) -> bool {
        if self.is_locked() {
            return false;
        }
        if let Some(previous) = self.container.take() {
            log::warn!(
                "{:?}: replacing open storage: {}",
                self.id,
                previous.path.display()
            );
            self.finish(previous);
        }

        self.frames_since_open = 0;
        let container = match self.create_container(now_local()) {
            Ok(container) => container,
            Err(err) => {
                log::error!("{:?}: {}", self.id, err);
                return false;
            }
        };
        log::info!("{:?}: Opening storage: {}", self.id, container.path.display());
        self.container = Some(container);
        self.state = ArchiveState::Open;
        self.close_locked = false;
        self.close_signal.set(false);

        self.check_freespace();
        true
    }

    fn create_container(&self, mut opened_at: NaiveDateTime) -> Result<OpenContainer, ArchiveError> {
        let mut path = layout::container_path(&self.home, opened_at);
        while path.exists() {
            opened_at += ChronoDuration::microseconds(1);
            path = layout::container_path(&self.home, opened_at);
        }

        if let Some(dir) = path.parent() {
            if !dir.is_dir() {
                log::warn!("{:?}: Creating directory: {}", self.id, dir.display());
                fs::create_dir_all(dir).map_err(|source| ArchiveError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| ArchiveError::Create {
                path: path.clone(),
                source,
            })?;
        Ok(OpenContainer {
            builder: tar::Builder::new(Box::new(file)),
            path,
            opened_at,
        })
    }

    /// Releases the current container. Only permitted once all operations
    /// have been locked by a shutdown, rotation or space lockout.
    pub fn close(&mut self) -> bool {
        if self.close_locked || !self.is_locked() {
            return false;
        }
        if let Some(container) = self.container.take() {
            log::info!("{:?}: Closing storage: {}", self.id, container.path.display());
            self.finish(container);
        }
        self.close_signal.set(true);
        true
    }

    fn finish(&self, container: OpenContainer) {
        let OpenContainer { builder, path, .. } = container;
        let result = builder.into_inner().and_then(|mut file| file.flush());
        if let Err(source) = result {
            log::error!("{:?}: {}", self.id, ArchiveError::Finish { path, source });
        }
    }

    /// Appends `frame` as one entry. Errors are logged; the frame is dropped.
    pub fn write(&mut self, frame: &Frame) {
        if self.state != ArchiveState::Open {
            return;
        }
        let Some(container) = self.container.as_mut() else {
            return;
        };

        let entry = layout::entry_name(frame.captured_at);
        if let Err(source) = append_entry(&mut container.builder, &entry, frame) {
            log::error!("{:?}: {}", self.id, ArchiveError::Append { entry, source });
            return;
        }
        self.frames_since_open += 1;

        if self.frames_since_open % HOUSEKEEPING_INTERVAL == 0 {
            self.check_freespace();
            self.check_storage_size();
        }
    }

    /// Rotates the container once it reaches `max_archive_bytes`.
    /// Returns true when a new container was opened. Only an `Open` store rotates.
    pub fn check_storage_size(&mut self) -> bool {
        if self.state != ArchiveState::Open {
            return false;
        }
        let Some(container) = self.container.as_ref() else {
            return false;
        };
        let size = match fs::metadata(&container.path) {
            Ok(meta) => meta.len(),
            Err(source) => {
                let path = container.path.clone();
                log::error!("{:?}: {}", self.id, ArchiveError::Metadata { path, source });
                return false;
            }
        };

        if self.frames_since_open % SIZE_LOG_INTERVAL == 0 {
            log::info!(
                "{:?}: Storage size = {} bytes ({:.02} Mb)",
                self.id,
                size,
                size as f64 / MIB
            );
        }

        if size < self.config.max_archive_bytes {
            return false;
        }
        self.rotate()
    }

    fn rotate(&mut self) -> bool {
        let previous = self.state;
        self.state = ArchiveState::ShuttingDown;
        if !(0..CLOSE_ATTEMPTS).any(|_| self.close()) {
            log::error!("{:?}: rotation aborted, storage refused to close", self.id);
            self.state = previous;
            return false;
        }
        self.state = ArchiveState::Closed;
        log::info!("{:?}: Rotating storage", self.id);
        if !self.open() {
            log::error!("{:?}: rotation left the source without storage", self.id);
            return false;
        }
        true
    }

    /// Locks the store out if free space is at or below `min_free_bytes`.
    /// A failed probe counts as no free space.
    pub fn check_freespace(&mut self) {
        let dir = self
            .container
            .as_ref()
            .and_then(|c| c.path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.home.clone());

        let free = match self.probe.bytes_free(&dir) {
            Ok(free) => free,
            Err(err) => {
                log::error!("{:?}: {}; assuming no free space", self.id, err);
                0
            }
        };
        if free > self.config.min_free_bytes || self.state == ArchiveState::LowSpace {
            return;
        }

        log::error!(
            "CRITICAL {:?}: not enough space on the media: {} (free {} bytes, {:.02} Mb)",
            self.id,
            dir.display(),
            free,
            free as f64 / MIB
        );
        self.state = ArchiveState::LowSpace;
        self.close();
    }

    /// Operator entry point after a space lockout: reopen with a fresh container.
    pub fn resume(&mut self) -> bool {
        if self.is_locked() {
            log::info!("{:?}: resuming storage from {:?}", self.id, self.state);
            self.state = ArchiveState::Closed;
        }
        self.open()
    }

    /// Locks all operations ahead of a `close()`.
    pub fn lock_all(&mut self) {
        if self.state != ArchiveState::LowSpace {
            self.state = ArchiveState::ShuttingDown;
        }
    }

    /// Waits for the container to be released.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        self.close_signal.wait(timeout)
    }

    pub fn close_signal(&self) -> Arc<CloseSignal> {
        self.close_signal.clone()
    }

    /// Drops the container without honoring the close guard.
    pub fn force_release(&mut self) {
        if let Some(container) = self.container.take() {
            log::warn!(
                "{:?}: forcing release of storage: {}",
                self.id,
                container.path.display()
            );
            drop(container);
        }
        self.close_signal.set(true);
    }

    pub fn set_close_locked(&mut self, locked: bool) {
        self.close_locked = locked;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn state(&self) -> ArchiveState {
        self.state
    }

    /// The "all operations locked" condition.
    pub fn is_locked(&self) -> bool {
        matches!(
            self.state,
            ArchiveState::ShuttingDown | ArchiveState::LowSpace
        )
    }

    pub fn is_out_of_space(&self) -> bool {
        self.state == ArchiveState::LowSpace
    }

    pub fn accepts_writes(&self) -> bool {
        self.state == ArchiveState::Open && self.container.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.container.as_ref().map(|c| c.path.as_path())
    }

    pub fn opened_at(&self) -> Option<NaiveDateTime> {
        self.container.as_ref().map(|c| c.opened_at)
    }

    pub fn frames_since_open(&self) -> u64 {
        self.frames_since_open
    }
}

impl std::fmt::Debug for ArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStore")
            .field("id", &self.id)
            .field("home", &self.home)
            .field("state", &self.state)
            .field("current_path", &self.current_path())
            .field("frames_since_open", &self.frames_since_open)
            .finish()
    }
}

fn append_entry(builder: &mut tar::Builder<ContainerWriter>, entry: &str, frame: &Frame) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(frame.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    let mtime = frame
        .captured_at
        .and_local_timezone(Local)
        .earliest()
        .map(|stamp| stamp.timestamp())
        .unwrap_or_else(|| frame.captured_at.and_utc().timestamp());
    header.set_mtime(mtime.max(0) as u64);
    builder.append_data(&mut header, entry, frame.bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use std::fs::File;
    use std::sync::atomic::{AtomicU64, Ordering};

    const PLENTY: u64 = 1 << 40;

    struct FixedProbe(AtomicU64);

    impl FixedProbe {
        fn new(free: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(free)))
        }

        fn set(&self, free: u64) {
            self.0.store(free, Ordering::SeqCst);
        }
    }

    impl FreeSpaceProbe for FixedProbe {
        fn bytes_free(&self, _path: &Path) -> Result<u64, ProbeError> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    struct BrokenProbe;

    impl FreeSpaceProbe for BrokenProbe {
        fn bytes_free(&self, path: &Path) -> Result<u64, ProbeError> {
            Err(ProbeError {
                path: path.to_path_buf(),
                details: "df unavailable".to_string(),
            })
        }
    }

    struct RejectingWriter;

    impl Write for RejectingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn config(root: &Path, max_archive_bytes: u64) -> ArchiveConfig {
        ArchiveConfig {
            root_path: root.to_path_buf(),
            max_archive_bytes,
            min_free_bytes: 1024 * 1024,
        }
    }

    fn frame(micro: u32, len: usize) -> Frame {
        let stamp = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(14, 7, 9, micro)
            .unwrap();
        Frame::new(vec![0xAB; len], stamp)
    }

    fn entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mut data = Vec::new();
                io::Read::read_to_end(&mut entry, &mut data).unwrap();
                (name, data)
            })
            .collect()
    }

    fn tar_files(dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let Ok(read) = fs::read_dir(dir) else {
            return out;
        };
        for entry in read.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(tar_files(&path));
            } else if path.extension().is_some_and(|ext| ext == "tar") {
                out.push(path);
            }
        }
        out.sort();
        out
    }

    fn shut(store: &mut ArchiveStore) -> PathBuf {
        let path = store.current_path().unwrap().to_path_buf();
        store.lock_all();
        assert!(store.close());
        path
    }

    #[test]
    fn open_creates_container_under_source_home() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        assert_eq!(store.state(), ArchiveState::Uninitialized);
        assert!(store.open());

        assert_eq!(store.state(), ArchiveState::Open);
        assert!(store.accepts_writes());
        let path = store.current_path().unwrap();
        assert!(path.starts_with(dir.path().join("gate")));
        assert!(path.is_file());
        assert_eq!(path.extension().unwrap(), "tar");
        assert_eq!(
            path,
            layout::container_path(store.home(), store.opened_at().unwrap())
        );
    }

    #[test]
    fn writes_frames_as_named_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.write(&frame(1, 10));
        store.write(&frame(2, 20));
        assert_eq!(store.frames_since_open(), 2);

        let path = shut(&mut store);
        let written = entries(&path);
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].0, "2024.03/05/1407/09.000001.jpg");
        assert_eq!(written[0].1, vec![0xAB; 10]);
        assert_eq!(written[1].0, "2024.03/05/1407/09.000002.jpg");
        assert_eq!(written[1].1.len(), 20);
    }

    #[test]
    fn write_is_refused_before_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        store.write(&frame(1, 10));
        assert_eq!(store.frames_since_open(), 0);
        assert!(tar_files(dir.path()).is_empty());
    }

    #[test]
    fn write_is_refused_while_shutting_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.lock_all();
        assert!(store.is_locked());
        store.write(&frame(1, 10));
        assert_eq!(store.frames_since_open(), 0);

        let path = store.current_path().unwrap().to_path_buf();
        assert!(store.close());
        assert!(entries(&path).is_empty());
    }

    #[test]
    fn write_is_refused_when_out_of_space() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(10);
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), probe);
        assert!(store.open());
        assert!(store.is_out_of_space());
        store.write(&frame(1, 10));
        assert_eq!(store.frames_since_open(), 0);
        let files = tar_files(dir.path());
        assert_eq!(files.len(), 1);
        assert!(entries(&files[0]).is_empty());
    }

    #[test]
    fn close_requires_locked_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        assert!(store.open());
        assert!(!store.close());
        assert!(store.current_path().is_some());

        store.lock_all();
        store.set_close_locked(true);
        assert!(!store.close());
        store.set_close_locked(false);
        assert!(store.close());
        assert!(store.current_path().is_none());
        assert!(store.opened_at().is_none());
    }

    #[test]
    fn open_is_refused_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.lock_all();
        assert!(!store.open());
    }

    #[test]
    fn rotates_once_container_reaches_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), 4096), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.write(&frame(1, 100));
        assert!(!store.check_storage_size());

        store.write(&frame(2, 8000));
        let first = store.current_path().unwrap().to_path_buf();
        assert!(store.check_storage_size());

        let second = store.current_path().unwrap().to_path_buf();
        assert_ne!(first, second);
        assert_eq!(store.frames_since_open(), 0);
        assert_eq!(store.state(), ArchiveState::Open);
        assert_eq!(tar_files(dir.path()), {
            let mut both = vec![first.clone(), second];
            both.sort();
            both
        });
        assert_eq!(entries(&first).len(), 2);
    }

    #[test]
    fn rotation_is_aborted_when_close_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), 1024), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.write(&frame(1, 4000));
        store.set_close_locked(true);
        let path = store.current_path().unwrap().to_path_buf();

        assert!(!store.check_storage_size());
        assert_eq!(store.state(), ArchiveState::Open);
        assert_eq!(store.current_path(), Some(path.as_path()));
        store.write(&frame(2, 10));
        assert_eq!(store.frames_since_open(), 2);
    }

    #[test]
    fn failed_rotation_keeps_space_lockout() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(PLENTY);
        let mut store = ArchiveStore::new("gate", config(dir.path(), 1024), probe.clone());
        assert!(store.open());
        store.write(&frame(1, 4000));
        store.set_close_locked(true);

        probe.set(0);
        store.check_freespace();
        assert_eq!(store.state(), ArchiveState::LowSpace);
        assert!(store.current_path().is_some());

        assert!(!store.check_storage_size());
        assert_eq!(store.state(), ArchiveState::LowSpace);
        store.write(&frame(2, 10));
        assert_eq!(store.frames_since_open(), 1);
    }

    #[test]
    fn shutting_down_store_does_not_rotate() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), 1024), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.write(&frame(1, 4000));
        store.lock_all();
        store.set_close_locked(true);

        assert!(!store.check_storage_size());
        assert_eq!(store.state(), ArchiveState::ShuttingDown);
        assert!(!store.accepts_writes());
    }

    #[test]
    fn rotation_reports_failed_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), 1024), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.write(&frame(1, 4000));

        // Next container would land under a plain file.
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, b"not a directory").unwrap();
        store.home = blocked;

        assert!(!store.check_storage_size());
        assert_eq!(store.state(), ArchiveState::Closed);
        assert!(store.current_path().is_none());
        assert!(!store.accepts_writes());
    }

    #[test]
    fn append_failure_drops_frame_and_keeps_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.write(&frame(1, 10));
        let path = store.current_path().unwrap().to_path_buf();

        store.container.as_mut().unwrap().builder = tar::Builder::new(Box::new(RejectingWriter));
        store.write(&frame(2, 10));

        assert_eq!(store.frames_since_open(), 1);
        assert_eq!(store.state(), ArchiveState::Open);
        assert_eq!(store.current_path(), Some(path.as_path()));
        assert!(store.accepts_writes());
    }

    #[test]
    fn open_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("archive");
        fs::write(&root, b"occupied").unwrap();
        let mut store = ArchiveStore::new("gate", config(&root, PLENTY), FixedProbe::new(PLENTY));

        assert!(!store.open());
        assert_eq!(store.state(), ArchiveState::Uninitialized);
        assert!(store.current_path().is_none());
        store.write(&frame(1, 10));
        assert_eq!(store.frames_since_open(), 0);
    }

    #[test]
    fn every_hundredth_write_runs_housekeeping() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), 16 * 1024), FixedProbe::new(PLENTY));
        assert!(store.open());
        for i in 0..99 {
            store.write(&frame(i, 512));
        }
        assert_eq!(store.frames_since_open(), 99);
        assert_eq!(tar_files(dir.path()).len(), 1);

        store.write(&frame(99, 512));
        assert_eq!(store.frames_since_open(), 0);
        assert_eq!(tar_files(dir.path()).len(), 2);
    }

    #[test]
    fn low_space_locks_out_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(PLENTY);
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), probe.clone());
        assert!(store.open());

        probe.set(1024 * 1024);
        store.check_freespace();
        assert!(store.is_out_of_space());
        assert!(store.is_locked());
        assert!(store.current_path().is_none());
        assert!(store.wait_closed(Duration::from_millis(10)));

        // Space coming back does not reopen on its own.
        probe.set(PLENTY);
        store.check_freespace();
        assert!(store.is_out_of_space());
        assert!(!store.open());
        assert!(store.current_path().is_none());
    }

    #[test]
    fn ample_space_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(1024 * 1024 + 1);
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), probe);
        assert!(store.open());
        store.check_freespace();
        assert!(!store.is_out_of_space());
        assert!(!store.is_locked());
        assert!(store.accepts_writes());
    }

    #[test]
    fn probe_failure_counts_as_no_space() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), Arc::new(BrokenProbe));
        assert!(store.open());
        assert!(store.is_out_of_space());
        assert!(!store.accepts_writes());
    }

    #[test]
    fn resume_reopens_after_lockout() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(0);
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), probe.clone());
        assert!(store.open());
        assert!(store.is_out_of_space());

        probe.set(PLENTY);
        assert!(store.resume());
        assert_eq!(store.state(), ArchiveState::Open);
        store.write(&frame(1, 10));
        assert_eq!(store.frames_since_open(), 1);
    }

    #[test]
    fn reopening_finishes_previous_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        assert!(store.open());
        store.write(&frame(1, 10));
        let first = store.current_path().unwrap().to_path_buf();
        assert!(store.open());
        assert_ne!(store.current_path().unwrap(), first.as_path());
        assert_eq!(entries(&first).len(), 1);
    }

    #[test]
    fn close_signal_tracks_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::new("gate", config(dir.path(), PLENTY), FixedProbe::new(PLENTY));
        let signal = store.close_signal();
        assert!(signal.is_closed());
        assert!(store.open());
        assert!(!signal.is_closed());
        assert!(!store.wait_closed(Duration::from_millis(10)));

        store.lock_all();
        store.set_close_locked(true);
        assert!(!store.close());
        store.force_release();
        assert!(signal.is_closed());
        assert!(store.current_path().is_none());
    }
}
