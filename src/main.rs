//! procscrape - exports host memory and per-process CPU/RSS metrics.
//!
//! Serves `/metrics` for Prometheus to scrape. Every scrape reads `/proc`
//! afresh; there is no background polling.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use clap::Parser;
use prometheus::Registry;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use procscrape::collector::RealFs;
use procscrape::exposition::build_registry;
use procscrape::metrics::{HostLabel, Units};
use procscrape::server;

const PROC_PATH: &str = "/proc";

/// Prometheus exporter for host memory and per-process metrics.
#[derive(Parser)]
#[command(name = "procscrape", about = "Prometheus exporter for /proc metrics", version)]
struct Args {
    /// Hostname to pass to exported metrics. Defaults to the machine's hostname.
    #[arg(long)]
    hostname: Option<String>,

    /// Port to bind program.
    #[arg(long, default_value = "9100")]
    port: u16,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber. `RUST_LOG`, when set, takes precedence.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("procscrape={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("procscrape {} starting", env!("CARGO_PKG_VERSION"));

    let host = match HostLabel::resolve(args.hostname) {
        Ok(host) => host,
        Err(e) => {
            error!(error = %e, "cannot determine host label; pass --hostname");
            process::exit(1);
        }
    };

    let units = Units::from_system();
    info!(
        clk_tck = units.clk_tck,
        page_size = units.page_size,
        "kernel units"
    );

    let registry = match build_registry(RealFs::new(), PROC_PATH, host.clone(), units) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "failed to register collectors");
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    runtime.block_on(async_main(args.port, host, registry));
}

async fn async_main(port: u16, host: HostLabel, registry: Registry) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };

    info!(%addr, "exporting on port {}", port);
    info!(%host, "metrics will have \"{}\" set as the hostname", host);

    if let Err(e) = server::serve(listener, Arc::new(registry), server::shutdown_signal()).await {
        error!(error = %e, "server error");
        process::exit(1);
    }

    info!("stopped");
}
