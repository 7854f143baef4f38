//! Process-wide logging setup.
//!
//! The logger is installed first thing in `main`, before the config is read,
//! so config warnings are not lost. Lines always go to stderr. Until the log
//! directory is known they are also held in memory. `attach` then moves them
//! into a per-run file under `{dir}/{YYYY.MM.DD}/`, or drops them when no
//! directory is configured.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::frame::now_local;

static SINK: OnceLock<Arc<Mutex<Sink>>> = OnceLock::new();

/// `{dir}/{YYYY.MM.DD}/{YYYY.MM.DD_HHMMSS}.log`
pub fn log_file_path(dir: &Path, started_at: NaiveDateTime) -> PathBuf {
    dir.join(started_at.format("%Y.%m.%d").to_string())
        .join(started_at.format("%Y.%m.%d_%H%M%S.log").to_string())
}

/// Installs the global logger. `RUST_LOG` filters, defaulting to `info`.
pub fn init() -> Result<()> {
    let sink = Arc::new(Mutex::new(Sink::Pending(Vec::new())));

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{}: {:<8}:{}: {}",
            now_local().format("%H:%M:%S%.6f"),
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.target(env_logger::Target::Pipe(Box::new(Tee { sink: sink.clone() })));
    builder.try_init().context("install logger")?;

    SINK.set(sink)
        .map_err(|_| anyhow!("logger already installed"))?;
    Ok(())
}

/// Opens the run's log file under `log_dir` and flushes the lines logged so
/// far into it. With no directory, buffering stops and stderr is the only target.
pub fn attach(log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let sink = SINK.get().ok_or_else(|| anyhow!("logger not installed"))?;
    attach_sink(sink, log_dir)
}

fn attach_sink(sink: &Mutex<Sink>, log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let Some(dir) = log_dir else {
        *lock(sink) = Sink::Off;
        return Ok(None);
    };

    let path = log_file_path(dir, now_local());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let mut file =
        File::create(&path).with_context(|| format!("create log file {}", path.display()))?;

    let mut sink = lock(sink);
    if let Sink::Pending(early) = &*sink {
        file.write_all(early)
            .with_context(|| format!("write log file {}", path.display()))?;
    }
    *sink = Sink::File(file);
    Ok(Some(path))
}

fn lock(sink: &Mutex<Sink>) -> std::sync::MutexGuard<'_, Sink> {
    sink.lock().unwrap_or_else(|e| e.into_inner())
}

/// Where log lines go besides stderr.
enum Sink {
    /// Log directory not known yet.
    Pending(Vec<u8>),
    File(File),
    Off,
}

/// Copies every log line to stderr and the current sink.
struct Tee {
    sink: Arc<Mutex<Sink>>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A closed stderr must not stop the file copy.
        let _ = io::stderr().write_all(buf);
        match &mut *lock(&self.sink) {
            Sink::Pending(early) => early.extend_from_slice(buf),
            Sink::File(file) => file.write_all(buf)?,
            Sink::Off => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        match &mut *lock(&self.sink) {
            Sink::File(file) => file.flush(),
            _ => Ok(()),
        }
    }
}
