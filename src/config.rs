//! Configuration management for illumex.
//!
//! This module handles loading, merging, and validating configuration from
//! files and CLI arguments. It supports YAML, JSON, and TOML formats; CLI
//! arguments override file values, file values override defaults.

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::cli::{Args, ConfigFormat};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9290;
pub const DEFAULT_MAX_INSTANCE_ID: i32 = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("unable to parse config file {path}: {msg}")]
    Parse { path: String, msg: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How much of a metric class gets emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Skip the class entirely.
    Off,
    /// The basic field set.
    Normal,
    /// Basic plus extended fields.
    Extended,
    /// Everything the kernel records provide.
    All,
}

impl DetailLevel {
    pub fn is_off(self) -> bool {
        matches!(self, DetailLevel::Off)
    }
}

/// Per-protocol detail levels for the protocol-stack collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MibLevels {
    pub ip: DetailLevel,
    pub icmp: DetailLevel,
    pub tcp: DetailLevel,
    pub udp: DetailLevel,
}

impl Default for MibLevels {
    fn default() -> Self {
        Self {
            ip: DetailLevel::Extended,
            icmp: DetailLevel::Extended,
            tcp: DetailLevel::Normal,
            udp: DetailLevel::Normal,
        }
    }
}

/// Parse a `proto=level` list, e.g. `tcp=extended,udp=off`. Protocols not
/// mentioned keep their defaults; an empty string is all defaults.
pub fn parse_mib_levels(spec: &str) -> Result<MibLevels, ConfigError> {
    let mut levels = MibLevels::default();
    for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (proto, level) = item.split_once('=').ok_or_else(|| {
            ConfigError::Invalid(format!("mib entry '{item}' is not of the form proto=level"))
        })?;
        let level = DetailLevel::from_str(level.trim(), true)
            .map_err(|_| ConfigError::Invalid(format!("unknown mib level '{level}'")))?;
        match proto.trim() {
            "ip" => levels.ip = level,
            "icmp" => levels.icmp = level,
            "tcp" => levels.tcp = level,
            "udp" => levels.udp = level,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown mib protocol '{other}'"
                )))
            }
        }
    }
    Ok(levels)
}

/// Enhanced configuration structure. Every field is optional so a config
/// file only needs the values it wants to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Logging
    pub log_level: Option<String>,

    // Output shaping
    /// Suppress all `# HELP`/`# TYPE` preambles.
    pub compact: Option<bool>,

    // Collector toggles
    #[serde(alias = "enable-load")]
    pub enable_load: Option<bool>,
    #[serde(alias = "enable-mem")]
    pub enable_mem: Option<bool>,
    #[serde(alias = "enable-fs")]
    pub enable_fs: Option<bool>,
    #[serde(alias = "enable-rates")]
    pub enable_rates: Option<bool>,

    // Detail levels and per-strand switches
    /// cpu:*:sys counter detail.
    pub sysinfo: Option<DetailLevel>,
    #[serde(alias = "sysinfo-mp")]
    pub sysinfo_mp: Option<bool>,
    /// cpu:*:vm counter detail.
    pub vmstats: Option<DetailLevel>,
    #[serde(alias = "vmstats-mp")]
    pub vmstats_mp: Option<bool>,
    /// NIC link counter detail.
    pub nicstat: Option<DetailLevel>,
    /// Protocol-stack levels, `proto=level` list.
    pub mib: Option<String>,

    // NIC name filters (plain regex match against the link name)
    #[serde(alias = "nic-include")]
    pub nic_include: Option<String>,
    #[serde(alias = "nic-exclude")]
    pub nic_exclude: Option<String>,

    // Sanity bound for matched instance ids
    #[serde(alias = "max-instance-id")]
    pub max_instance_id: Option<i32>,

    // TLS
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Config {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn effective_bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    /// Help/type preambles are on unless compact mode asks them off.
    pub fn with_help(&self) -> bool {
        !self.compact.unwrap_or(false)
    }

    pub fn sysinfo_level(&self) -> DetailLevel {
        self.sysinfo.unwrap_or(DetailLevel::Normal)
    }

    pub fn vmstats_level(&self) -> DetailLevel {
        self.vmstats.unwrap_or(DetailLevel::Normal)
    }

    pub fn nicstat_level(&self) -> DetailLevel {
        self.nicstat.unwrap_or(DetailLevel::Normal)
    }

    pub fn mib_levels(&self) -> Result<MibLevels, ConfigError> {
        match &self.mib {
            Some(spec) => parse_mib_levels(spec),
            None => Ok(MibLevels::default()),
        }
    }

    pub fn max_instance_id(&self) -> i32 {
        self.max_instance_id.unwrap_or(DEFAULT_MAX_INSTANCE_ID)
    }
}

fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let path_str = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path_str.clone(),
        source,
    })?;

    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&raw).map_err(|e| (path_str.clone(), e.to_string()))
        }
        Some("json") => serde_json::from_str(&raw).map_err(|e| (path_str.clone(), e.to_string())),
        Some("toml") => toml::from_str(&raw).map_err(|e| (path_str.clone(), e.to_string())),
        _ => {
            // no recognized extension: try YAML first (it subsumes JSON),
            // then TOML
            serde_yaml::from_str(&raw)
                .or_else(|_| toml::from_str(&raw))
                .map_err(|e| (path_str.clone(), e.to_string()))
        }
    };

    let config = parsed.map_err(|(path, msg)| ConfigError::Parse { path, msg })?;
    info!("Loaded configuration from {}", path_str);
    Ok(config)
}

/// Build the effective configuration: file (unless `--no-config`), then CLI
/// overrides on top.
pub fn resolve_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(path) if !args.no_config => load_file(path)?,
        _ => Config::default(),
    };

    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(bind) = &args.bind {
        config.bind = Some(bind.to_string());
    }
    if args.compact {
        config.compact = Some(true);
    }
    if args.no_load {
        config.enable_load = Some(false);
    }
    if args.no_mem {
        config.enable_mem = Some(false);
    }
    if args.no_fs {
        config.enable_fs = Some(false);
    }
    if args.no_rates {
        config.enable_rates = Some(false);
    }
    if let Some(level) = args.sysinfo {
        config.sysinfo = Some(level);
    }
    if args.sysinfo_mp {
        config.sysinfo_mp = Some(true);
    }
    if let Some(level) = args.vmstats {
        config.vmstats = Some(level);
    }
    if args.vmstats_mp {
        config.vmstats_mp = Some(true);
    }
    if let Some(level) = args.nicstat {
        config.nicstat = Some(level);
    }
    if let Some(spec) = &args.mib {
        config.mib = Some(spec.clone());
    }
    if let Some(re) = &args.nic_include {
        config.nic_include = Some(re.clone());
    }
    if let Some(re) = &args.nic_exclude {
        config.nic_exclude = Some(re.clone());
    }
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert) = &args.tls_cert {
        config.tls_cert_path = Some(cert.display().to_string());
    }
    if let Some(key) = &args.tls_key {
        config.tls_key_path = Some(key.display().to_string());
    }

    Ok(config)
}

/// Reject configurations the server could not start (or run sanely) with.
pub fn validate_effective_config(config: &Config) -> Result<(), ConfigError> {
    if config.effective_port() == 0 {
        return Err(ConfigError::Invalid("port must not be 0".into()));
    }
    if config.effective_bind().parse::<std::net::IpAddr>().is_err() {
        return Err(ConfigError::Invalid(format!(
            "bind address '{}' is not an IP address",
            config.effective_bind()
        )));
    }
    if let Some(re) = &config.nic_include {
        regex::Regex::new(re)
            .map_err(|e| ConfigError::Invalid(format!("nic include filter: {e}")))?;
    }
    if let Some(re) = &config.nic_exclude {
        regex::Regex::new(re)
            .map_err(|e| ConfigError::Invalid(format!("nic exclude filter: {e}")))?;
    }
    config.mib_levels()?;
    if config.max_instance_id() < 1 {
        return Err(ConfigError::Invalid(
            "max-instance-id must be at least 1".into(),
        ));
    }
    if config.enable_tls.unwrap_or(false)
        && (config.tls_cert_path.is_none() || config.tls_key_path.is_none())
    {
        return Err(ConfigError::Invalid(
            "enable-tls requires tls-cert-path and tls-key-path".into(),
        ));
    }
    Ok(())
}

/// Serialize the effective configuration for `--show-config`.
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String, ConfigError> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
        ConfigFormat::Toml => toml::to_string(config).map_err(|e| e.to_string()),
    };
    rendered.map_err(|msg| ConfigError::Invalid(format!("unable to render config: {msg}")))
}
