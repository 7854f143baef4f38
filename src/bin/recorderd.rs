//! recorderd - frame recorder daemon
//!
//! This daemon:
//! 1. Loads camera and storage sections from the config file
//! 2. Refuses to start if another instance holds the pidfile
//! 3. Polls every camera round-robin and archives frames into tar containers
//! 4. Closes every open container on Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_recorder::{logging, PidFile, RecorderConfig, Server, ServerError, StatvfsProbe};

/// Exit status when the config registers no cameras.
const EXIT_NO_SOURCES: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "Archive HTTP camera snapshots into rotating tar files")]
struct Args {
    /// Path to the recorder config file.
    #[arg(long, env = "RECORDER_CONFIG", default_value = "recorder.toml")]
    config: PathBuf,
    /// Override the pidfile location from the config file.
    #[arg(long, env = "RECORDER_PIDFILE")]
    pidfile: Option<PathBuf>,
    /// Override the log directory from the config file.
    #[arg(long, env = "RECORDER_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = logging::init() {
        eprintln!("recorderd: {:#}", err);
        return ExitCode::FAILURE;
    }
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let mut cfg = RecorderConfig::load_from(&args.config)?;
    if let Some(pidfile) = args.pidfile {
        cfg.pidfile = pidfile;
    }
    if let Some(log_dir) = args.log_dir {
        cfg.log_dir = Some(log_dir);
    }

    if let Some(path) = logging::attach(cfg.log_dir.as_deref())? {
        log::info!("logging to {}", path.display());
    }

    let _pidfile = PidFile::acquire(&cfg.pidfile)?;

    let probe = Arc::new(StatvfsProbe);
    let mut server = Server::new();
    for source in cfg.sources {
        let id = source.id.clone();
        if let Err(err) = server.add_source(source, probe.clone()) {
            log::warn!("camera {:?} not registered: {}", id, err);
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    match server.start(&shutdown) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(ServerError::NoSources) => Ok(ExitCode::from(EXIT_NO_SOURCES)),
        Err(err) => Err(err.into()),
    }
}
