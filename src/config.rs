use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::EngineDescriptor;

const DEFAULT_PORT: u16 = 8200;
const DEFAULT_CHAPTER_INTERVAL: u32 = 5;
const DEFAULT_MAX_TRANSCODES: usize = 4;
const DEFAULT_ABORT_TIMEOUT_SECS: u64 = 5;

/// `repcast@<hostname>`, or plain `repcast` when the hostname is unusable.
fn default_name() -> String {
    match hostname::get().ok().and_then(|os| os.into_string().ok()) {
        Some(host) if !host.is_empty() => format!("repcast@{host}"),
        _ => "repcast".to_string(),
    }
}

/// One `[[renderer]]` table.
#[derive(Deserialize, Default, Debug, Clone)]
pub struct RendererConfig {
    pub name: String,
    /// Case-insensitive substrings of the User-Agent header that identify the renderer.
    #[serde(default)]
    pub user_agent: Vec<String>,
    /// Comma-separated protocolInfo tuples.
    pub capabilities: Option<String>,
    #[serde(default)]
    pub stream_subtitles: bool,
    /// Minutes. Overrides the top-level `chapter_interval` for this renderer.
    pub chapter_interval: Option<u32>,
}

#[derive(Deserialize, Default, Debug)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub name: Option<String>,
    pub localhost: Option<bool>,
    /// Minutes between chapter entries; 0 disables chapters.
    pub chapter_interval: Option<u32>,
    pub max_transcodes: Option<usize>,
    pub abort_timeout_secs: Option<u64>,
    #[serde(default, rename = "engine")]
    pub engines: Vec<EngineDescriptor>,
    #[serde(default, rename = "renderer")]
    pub renderers: Vec<RendererConfig>,
}

#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub name: String,
    pub paths: Vec<PathBuf>,
    pub localhost: bool,
    pub chapter_interval: u32,
    pub max_transcodes: usize,
    pub abort_timeout: Duration,
    /// Empty means "use the built-in engines".
    pub engines: Vec<EngineDescriptor>,
    pub renderers: Vec<RendererConfig>,
}

impl Config {
    pub fn resolve(file: Option<FileConfig>, args: &crate::cli::Args) -> Self {
        let file = file.unwrap_or_default();
        Config {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            name: args.name.clone().or(file.name).unwrap_or_else(default_name),
            paths: args.paths.clone(),
            localhost: args.localhost || file.localhost.unwrap_or(false),
            chapter_interval: args
                .chapter_interval
                .or(file.chapter_interval)
                .unwrap_or(DEFAULT_CHAPTER_INTERVAL),
            max_transcodes: args
                .max_transcodes
                .or(file.max_transcodes)
                .unwrap_or(DEFAULT_MAX_TRANSCODES)
                .max(1),
            abort_timeout: Duration::from_secs(
                file.abort_timeout_secs.unwrap_or(DEFAULT_ABORT_TIMEOUT_SECS),
            ),
            engines: file.engines,
            renderers: file.renderers,
        }
    }
}

/// An explicit `--config` path is used as given, even if missing, so the
/// read error gets reported. Otherwise `./repcast.toml` and then
/// `<config dir>/repcast/config.toml`, whichever exists first.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let user = dirs::config_dir().map(|dir| dir.join("repcast").join("config.toml"));
    std::iter::once(PathBuf::from("repcast.toml"))
        .chain(user)
        .find(|candidate| candidate.is_file())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("engine {0:?} is defined more than once")]
    DuplicateEngine(String),
}

/// Parses a config file. Engine ids must be unique since representations
/// refer to engines by id.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let config: FileConfig = toml::from_str(&std::fs::read_to_string(path)?)?;
    let mut seen = std::collections::HashSet::new();
    for engine in &config.engines {
        if !seen.insert(engine.id.as_str()) {
            return Err(ConfigError::DuplicateEngine(engine.id.clone()));
        }
    }
    Ok(config)
}
