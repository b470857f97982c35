//! CLI arguments for illumex.
//!
//! This module defines the command-line interface structure using the clap
//! library, including all flags and options.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::DetailLevel;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "illumex",
    about = "Prometheus exporter for Solaris/illumos kernel statistics",
    long_about = "Prometheus exporter for Solaris/illumos kernel statistics.\n\n\
                  Polls the kstat chain once per scrape and exposes CPU, memory, paging,\n\
                  NIC and protocol-stack metrics in Prometheus text exposition format.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version,
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("VERGEN_GIT_SHA"), " ", env!("VERGEN_BUILD_TIMESTAMP"), ")"
    ),
    after_help = "Project: https://github.com/cansp-dev/illumex — Support: exporter@herakles.now"
)]
pub struct Args {
    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(short = 's', long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(short = 'v', long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Run one collection pass, print it to stdout and exit
    #[arg(long)]
    pub oneshot: bool,

    /// Omit all # HELP/# TYPE comments from the output
    #[arg(long)]
    pub compact: bool,

    /// Disable load average, CPU count and boot time metrics
    #[arg(long)]
    pub no_load: bool,

    /// Disable system memory page metrics
    #[arg(long)]
    pub no_mem: bool,

    /// Disable per-filesystem-type vnode operation metrics
    #[arg(long)]
    pub no_fs: bool,

    /// Disable run/swap-queue and swap-space average metrics
    #[arg(long)]
    pub no_rates: bool,

    /// CPU counter (cpu:*:sys) detail level
    #[arg(short = 'i', long, value_enum)]
    pub sysinfo: Option<DetailLevel>,

    /// Emit per-strand CPU counter lines, not just the sum
    #[arg(long)]
    pub sysinfo_mp: bool,

    /// Paging counter (cpu:*:vm) detail level
    #[arg(short = 'm', long, value_enum)]
    pub vmstats: Option<DetailLevel>,

    /// Emit per-strand paging counter lines, not just the sum
    #[arg(long)]
    pub vmstats_mp: bool,

    /// NIC link counter detail level
    #[arg(short = 'n', long, value_enum)]
    pub nicstat: Option<DetailLevel>,

    /// Export only NICs whose link name matches this regex
    #[arg(long)]
    pub nic_include: Option<String>,

    /// Skip NICs whose link name matches this regex
    #[arg(short = 'x', long)]
    pub nic_exclude: Option<String>,

    /// Protocol-stack detail as a proto=level list, e.g. tcp=extended,udp=off
    #[arg(long)]
    pub mib: Option<String>,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}
