//!
//! Configuration loading and validation
//! ------------------------------------
//! TOML configuration with layered precedence: built-in defaults, then the
//! config file, then `DENDRITE_*` environment variables, then CLI overrides.
//! A missing config file is not an error; an invalid one is. All validation
//! failures are fatal at startup, before the server binds.

use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_LISTEN: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub main: MainConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(rename = "file-root", default)]
    pub file_roots: Vec<FileRoot>,
}

/// Network binding.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MainConfig {
    pub listen: String,
    pub port: u16,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Logging options. An empty `file` logs to stdout, as does `-`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub file: String,
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: String::new(),
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

/// Maps a virtual folder name to a source directory.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FileRoot {
    #[serde(rename = "virtual")]
    pub virtual_name: String,
    pub source: String,
}

/// Validation errors; every variant aborts startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid listen address: {0}")]
    InvalidListen(String),

    #[error("invalid port: {0}")]
    InvalidPort(u16),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("no file roots configured")]
    NoFileRoots,

    #[error("file root {index}: {reason}")]
    InvalidFileRoot { index: usize, reason: String },

    #[error("file root definition {0}: expected format virtual:source")]
    BadRootDefinition(String),
}

/// CLI-level overrides; applied last, after file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub log_format: Option<String>,
    pub file_roots: Vec<String>,
}

/// Resolve configuration with precedence: defaults < file < env < overrides,
/// then validate.
pub fn load(path: &str, overrides: &Overrides) -> anyhow::Result<Config> {
    let mut cfg = match fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).with_context(|| format!("parse config: {path}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e).with_context(|| format!("read config: {path}")),
    };

    apply_env_from(&mut cfg, |name| std::env::var(name).ok())?;
    apply_overrides(&mut cfg, overrides)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Environment overrides through an injectable lookup, so tests can supply
/// values without touching the process environment.
fn apply_env_from(
    cfg: &mut Config,
    get: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(listen) = get("DENDRITE_MAIN_LISTEN") {
        cfg.main.listen = listen;
    }
    if let Some(port) = get("DENDRITE_MAIN_PORT") {
        cfg.main.port = port
            .parse()
            .with_context(|| format!("DENDRITE_MAIN_PORT: {port}"))?;
    }
    if let Some(level) = get("DENDRITE_LOG_LEVEL") {
        cfg.log.level = level;
    }
    if let Some(file) = get("DENDRITE_LOG_FILE") {
        cfg.log.file = file;
    }
    if let Some(format) = get("DENDRITE_LOG_FORMAT") {
        cfg.log.format = format;
    }
    if let Some(defs) = get("DENDRITE_FILE_ROOT") {
        let roots = parse_file_root_definitions(&[defs])?;
        if !roots.is_empty() {
            cfg.file_roots = roots;
        }
    }
    Ok(())
}

fn apply_overrides(cfg: &mut Config, overrides: &Overrides) -> anyhow::Result<()> {
    if let Some(listen) = &overrides.listen {
        cfg.main.listen = listen.clone();
    }
    if let Some(port) = overrides.port {
        cfg.main.port = port;
    }
    if let Some(level) = &overrides.log_level {
        cfg.log.level = level.clone();
    }
    if let Some(file) = &overrides.log_file {
        cfg.log.file = file.clone();
    }
    if let Some(format) = &overrides.log_format {
        cfg.log.format = format.clone();
    }
    if !overrides.file_roots.is_empty() {
        cfg.file_roots = parse_file_root_definitions(&overrides.file_roots)?;
    }
    Ok(())
}

/// Parse `virtual:source` definitions, each possibly comma-separated.
pub fn parse_file_root_definitions(defs: &[String]) -> Result<Vec<FileRoot>, ConfigError> {
    let mut roots = Vec::new();
    for def in defs {
        if def.is_empty() {
            return Err(ConfigError::BadRootDefinition(def.clone()));
        }
        for entry in def.split(',') {
            let (virtual_name, source) = entry
                .split_once(':')
                .ok_or_else(|| ConfigError::BadRootDefinition(entry.to_string()))?;
            if virtual_name.is_empty() || source.is_empty() {
                return Err(ConfigError::BadRootDefinition(entry.to_string()));
            }
            roots.push(FileRoot {
                virtual_name: virtual_name.to_string(),
                source: source.to_string(),
            });
        }
    }
    Ok(roots)
}

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.main.listen.parse::<IpAddr>().is_err() {
        return Err(ConfigError::InvalidListen(cfg.main.listen.clone()));
    }
    if cfg.main.port == 0 {
        return Err(ConfigError::InvalidPort(cfg.main.port));
    }

    match cfg.log.level.to_lowercase().as_str() {
        "debug" | "info" | "warn" | "error" => {}
        _ => return Err(ConfigError::InvalidLogLevel(cfg.log.level.clone())),
    }
    match cfg.log.format.to_lowercase().as_str() {
        "text" | "json" => {}
        _ => return Err(ConfigError::InvalidLogFormat(cfg.log.format.clone())),
    }

    validate_file_roots(&cfg.file_roots)
}

fn validate_file_roots(roots: &[FileRoot]) -> Result<(), ConfigError> {
    if roots.is_empty() {
        return Err(ConfigError::NoFileRoots);
    }

    let invalid = |index: usize, reason: &str| ConfigError::InvalidFileRoot {
        index,
        reason: reason.to_string(),
    };

    let mut seen = HashSet::new();
    for (i, root) in roots.iter().enumerate() {
        if root.virtual_name.trim() != root.virtual_name || root.source.trim() != root.source {
            return Err(invalid(i, "leading or trailing whitespace is not allowed"));
        }
        if root.virtual_name.is_empty() {
            return Err(invalid(i, "virtual cannot be empty"));
        }
        if root.source.is_empty() {
            return Err(invalid(i, "source cannot be empty"));
        }
        if !root.virtual_name.starts_with('/') {
            return Err(invalid(i, "virtual must start with '/'"));
        }
        // "/" itself, or a single folder such as "/public".
        if root.virtual_name != "/" && root.virtual_name.matches('/').count() != 1 {
            return Err(invalid(
                i,
                "virtual must be '/' or a single folder (e.g. '/public')",
            ));
        }
        // Colons collide with the virtual:source CLI syntax.
        if root.virtual_name.contains(':') {
            return Err(invalid(i, "virtual path cannot contain a colon"));
        }
        if root.source.contains(':') {
            return Err(invalid(i, "source path cannot contain a colon"));
        }
        if !Path::new(&root.source).is_absolute() {
            return Err(invalid(i, "source must be an absolute path"));
        }

        match fs::metadata(&root.source) {
            Ok(info) if info.is_dir() => {}
            Ok(_) => return Err(invalid(i, "source is not a directory")),
            Err(_) => return Err(invalid(i, "cannot stat source")),
        }

        if !seen.insert(root.virtual_name.clone()) {
            return Err(invalid(i, "duplicate virtual path"));
        }
    }

    Ok(())
}
