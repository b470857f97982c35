//! illumex - Solaris/illumos kstat exporter
//!
//! Main entry point: resolves the configuration, builds the collector
//! registry on top of the platform's kstat chain and serves the metrics
//! over HTTP until SIGINT/SIGTERM.

mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio::{net::TcpListener, signal, sync::Mutex};
use tracing::{error, info, warn, Level};

use illumex::cli::{Args, LogLevel};
use illumex::collectors::{
    cpu::CpuSysCollector, fs::FsCollector, load::LoadCollector, mem::MemCollector,
    mib::MibCollector, net::NetCollector, rates::RatesCollector, vm::VmStatCollector,
    CollectorRegistry,
};
use illumex::config::{
    render_config, resolve_config, validate_effective_config, Config, ConfigError,
};
use illumex::kstat::{mono_now_ns, ChainHandle, StatChain};

use handlers::{bad_request_handler, metrics_handler, root_handler};
use state::AppState;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", args.log_level);
}

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
fn platform_chain() -> Option<Box<dyn StatChain>> {
    Some(Box::new(illumex::kstat::ffi::KernelChain::new()))
}

#[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
fn platform_chain() -> Option<Box<dyn StatChain>> {
    None
}

/// log2 of the system page size; the kernel counts memory in pages.
fn page_shift() -> u32 {
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz > 0 {
        (sz as u64).trailing_zeros()
    } else {
        12 // assume 4 KiB
    }
}

/// Configured CPU strand count, for the offline-strand derivation.
fn cpu_count() -> Option<u32> {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    u32::try_from(n).ok().filter(|&n| n > 0)
}

fn build_registry(config: &Config) -> Result<CollectorRegistry, ConfigError> {
    let handle = match platform_chain() {
        Some(chain) => ChainHandle::new(chain),
        None => {
            warn!(
                "kernel statistics are only available on illumos/Solaris - \
                 serving exporter metrics only"
            );
            ChainHandle::detached()
        }
    };

    let max_id = config.max_instance_id();
    let mut registry = CollectorRegistry::new(handle, page_shift());

    if config.enable_load.unwrap_or(true) {
        registry.register(Box::new(LoadCollector::new(cpu_count())));
    }
    if config.enable_rates.unwrap_or(true) {
        registry.register(Box::new(RatesCollector::new()));
    }
    if config.enable_mem.unwrap_or(true) {
        registry.register(Box::new(MemCollector::new()));
    }
    if !config.vmstats_level().is_off() {
        registry.register(Box::new(VmStatCollector::new(
            config.vmstats_level(),
            config.vmstats_mp.unwrap_or(false),
            max_id,
        )));
    }
    if !config.sysinfo_level().is_off() {
        registry.register(Box::new(CpuSysCollector::new(
            config.sysinfo_level(),
            config.sysinfo_mp.unwrap_or(false),
            max_id,
        )));
    }
    if !config.nicstat_level().is_off() {
        // validated at startup, compile cannot fail here
        let include = config
            .nic_include
            .as_deref()
            .and_then(|re| regex::Regex::new(re).ok());
        let exclude = config
            .nic_exclude
            .as_deref()
            .and_then(|re| regex::Regex::new(re).ok());
        registry.register(Box::new(NetCollector::new(
            config.nicstat_level(),
            include,
            exclude,
            max_id,
        )));
    }
    registry.register(Box::new(MibCollector::new(config.mib_levels()?)));
    if config.enable_fs.unwrap_or(true) {
        registry.register(Box::new(FsCollector::new()));
    }

    Ok(registry)
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        print!("{}", render_config(&config, args.config_format)?);
        return Ok(());
    }

    let config = resolve_config(&args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&args);

    info!("Starting illumex");

    let mut registry = build_registry(&config)?;

    if args.oneshot {
        let mut out = String::new();
        registry.scrape(&mut out, config.with_help(), mono_now_ns());
        print!("{out}");
        return Ok(());
    }

    let bind_ip_str = config.effective_bind().to_string();
    let port = config.effective_port();

    let state = Arc::new(AppState {
        registry: Mutex::new(registry),
        config: Arc::new(config.clone()),
        requests_total: AtomicU64::new(0),
        scrapes_total: AtomicU64::new(0),
        start_time: Instant::now(),
    });

    // Setup graceful shutdown signal handlers
    let shutdown_signal = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    };

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(bad_request_handler)
        .with_state(state.clone());

    // Check if TLS is enabled
    let enable_tls = state.config.enable_tls.unwrap_or(false);

    if enable_tls {
        // These paths are guaranteed to exist since validate_effective_config() was called earlier
        let cert_path = state
            .config
            .tls_cert_path
            .clone()
            .expect("tls-cert-path should be set when enable-tls is true (validated at startup)");
        let key_path = state
            .config
            .tls_key_path
            .clone()
            .expect("tls-key-path should be set when enable-tls is true (validated at startup)");

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!("illumex listening on https://{}:{}", bind_ip_str, port);

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!("illumex listening on http://{}:{}", bind_ip_str, port);

        let server = axum::serve(listener, app);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal => {
                info!("Shutdown signal received, exiting...");
            }
        }
    }

    info!("illumex stopped gracefully");
    Ok(())
}
