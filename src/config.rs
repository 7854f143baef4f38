use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::freespace::parse_size;
use crate::ingest::overlay::is_valid_format;
use crate::ingest::{FrameSourceConfig, DEFAULT_FETCH_TIMEOUT};
use crate::storage::ArchiveConfig;

const DEFAULT_CONFIG_PATH: &str = "recorder.toml";
const DEFAULT_PIDFILE: &str = "/tmp/.recorder.pid";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RecorderConfigFile {
    pidfile: Option<String>,
    logger: Option<LoggerConfigFile>,
    defaults: Option<DefaultsConfigFile>,
    #[serde(default)]
    storage: BTreeMap<String, StorageConfigFile>,
    #[serde(default)]
    camera: BTreeMap<String, CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LoggerConfigFile {
    path: Option<String>,
}

/// Values applied to every `[storage.*]` / `[camera.*]` section that omits them.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DefaultsConfigFile {
    storage: Option<StorageConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
struct StorageConfigFile {
    path: Option<String>,
    max_storage_filesize: Option<String>,
    min_freespace_in_storage: Option<String>,
}

impl StorageConfigFile {
    fn or(self, defaults: &Self) -> Self {
        Self {
            path: self.path.or_else(|| defaults.path.clone()),
            max_storage_filesize: self
                .max_storage_filesize
                .or_else(|| defaults.max_storage_filesize.clone()),
            min_freespace_in_storage: self
                .min_freespace_in_storage
                .or_else(|| defaults.min_freespace_in_storage.clone()),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    url: Option<String>,
    description: Option<String>,
    timestamp: Option<String>,
    storage_name: Option<String>,
    timeout_secs: Option<u64>,
}

impl CameraConfigFile {
    fn or(self, defaults: &Self) -> Self {
        Self {
            url: self.url.or_else(|| defaults.url.clone()),
            description: self.description.or_else(|| defaults.description.clone()),
            timestamp: self.timestamp.or_else(|| defaults.timestamp.clone()),
            storage_name: self.storage_name.or_else(|| defaults.storage_name.clone()),
            timeout_secs: self.timeout_secs.or(defaults.timeout_secs),
        }
    }
}

/// Fully resolved recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub pidfile: PathBuf,
    pub log_dir: Option<PathBuf>,
    /// Sources in camera-name order.
    pub sources: Vec<FrameSourceConfig>,
}

impl RecorderConfig {
    /// Loads from `RECORDER_CONFIG` (default `recorder.toml`) and applies env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("RECORDER_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut cfg = Self::from_toml(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Parses and resolves a TOML document without consulting the environment.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: RecorderConfigFile = toml::from_str(raw)?;
        Self::from_file(file)
    }

    fn from_file(file: RecorderConfigFile) -> Result<Self> {
        let defaults = file.defaults.unwrap_or_default();
        let storage_defaults = defaults.storage.unwrap_or_default();
        let camera_defaults = defaults.camera.unwrap_or_default();

        let mut storages = HashMap::new();
        for (name, section) in file.storage {
            let archive = resolve_storage(&name, section.or(&storage_defaults))?;
            storages.insert(name, archive);
        }

        let mut urls = HashSet::new();
        let mut sources = Vec::new();
        for (name, section) in file.camera {
            let section = section.or(&camera_defaults);
            let Some(url) = section.url.clone().filter(|url| !url.trim().is_empty()) else {
                log::warn!("camera {:?} has no url, skipped", name);
                continue;
            };
            if !urls.insert(url.clone()) {
                log::warn!("Ignored duplicate in section {:?}: {:?}", name, url);
                continue;
            }
            sources.push(resolve_camera(&name, url, section, &storages)?);
        }

        Ok(Self {
            pidfile: expand_home(file.pidfile.as_deref().unwrap_or(DEFAULT_PIDFILE)),
            log_dir: file
                .logger
                .and_then(|logger| logger.path)
                .filter(|path| !path.trim().is_empty())
                .map(|path| expand_home(&path)),
            sources,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("RECORDER_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.log_dir = Some(expand_home(&dir));
            }
        }
        if let Ok(path) = std::env::var("RECORDER_PIDFILE") {
            if !path.trim().is_empty() {
                self.pidfile = expand_home(&path);
            }
        }
    }
}

fn resolve_storage(name: &str, section: StorageConfigFile) -> Result<ArchiveConfig> {
    let path = section
        .path
        .filter(|path| !path.trim().is_empty())
        .ok_or_else(|| anyhow!("storage {:?}: path is required", name))?;

    let max_text = section
        .max_storage_filesize
        .ok_or_else(|| anyhow!("storage {:?}: max_storage_filesize is required", name))?;
    let max_archive_bytes = parse_size(&max_text);
    if max_archive_bytes == 0 {
        return Err(anyhow!(
            "storage {:?}: invalid max_storage_filesize {:?}",
            name,
            max_text
        ));
    }

    let min_text = section.min_freespace_in_storage.unwrap_or_default();
    let min_free_bytes = parse_size(&min_text);
    if min_free_bytes == 0 {
        log::warn!(
            "storage {:?}: min_freespace_in_storage {:?} resolves to 0 bytes",
            name,
            min_text
        );
    }

    Ok(ArchiveConfig {
        root_path: expand_home(&path),
        max_archive_bytes,
        min_free_bytes,
    })
}

fn resolve_camera(
    name: &str,
    url: String,
    section: CameraConfigFile,
    storages: &HashMap<String, ArchiveConfig>,
) -> Result<FrameSourceConfig> {
    validate_source_id(name)?;

    let parsed = url::Url::parse(&url).with_context(|| format!("camera {:?}: parse url", name))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!(
            "camera {:?}: unsupported url scheme '{}'; expected http(s)",
            name,
            parsed.scheme()
        ));
    }

    // A single character is treated as "no stamp".
    let timestamp_format = section.timestamp.filter(|stamp| stamp.chars().count() > 1);
    if let Some(format) = &timestamp_format {
        if !is_valid_format(format) {
            return Err(anyhow!(
                "camera {:?}: invalid timestamp format {:?}",
                name,
                format
            ));
        }
    }

    let archive = match section.storage_name.as_deref() {
        Some(storage) => {
            let archive = storages.get(storage).cloned();
            if archive.is_none() {
                log::warn!("camera {:?}: unknown storage {:?}", name, storage);
            }
            archive
        }
        None => None,
    };

    let fetch_timeout = match section.timeout_secs {
        Some(0) => return Err(anyhow!("camera {:?}: timeout_secs must be greater than zero", name)),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_FETCH_TIMEOUT,
    };

    Ok(FrameSourceConfig {
        id: name.to_string(),
        url,
        timestamp_format,
        archive,
        description: section.description,
        fetch_timeout,
    })
}

/// Source ids become directory names under the archive root.
pub fn validate_source_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(anyhow!("camera name cannot be empty"));
    }
    if id == "." || id == ".." {
        return Err(anyhow!("camera name {:?} is not a valid directory name", id));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(anyhow!(
            "camera name {:?} may only contain ASCII letters, digits, '_', '-' and '.'",
            id
        ));
    }
    Ok(())
}

fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").filter(|home| !home.is_empty());
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => PathBuf::from(home),
        (Some(rest), Some(home)) if rest.starts_with('/') => {
            PathBuf::from(home).join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}
