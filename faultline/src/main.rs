//! Faultline entry point: parse flags, pick the injector, run the proxy
//! until ctrl-c.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use faultline::cli::Cli;
use faultline::proxy::{FaultProxy, ProxyOptions};

/// Trace file name inside the logs directory.
const TRACE_FILE: &str = "faultline-traffic.json";
/// TLS key-log file name inside the logs directory.
const TLS_KEY_LOG_FILE: &str = "faultline-tlskeys.txt";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let local_endpoint = if cli.address_file.is_some() {
        tracing::info!("proxy will start on the next free port");
        "localhost:0".to_string()
    } else {
        "localhost:5671".to_string()
    };

    let options = ProxyOptions {
        trace_file: Some(cli.logs.join(TRACE_FILE)),
        tls_key_log_file: Some(cli.logs.join(TLS_KEY_LOG_FILE)),
        address_file: cli.address_file.clone(),
    };

    let proxy = match FaultProxy::new(local_endpoint, cli.host, cli.command.injector(), options) {
        Ok(proxy) => proxy,
        Err(e) => {
            tracing::error!(error = %e, "failed to configure proxy");
            eprintln!("faultline: {e}");
            std::process::exit(1);
        }
    };

    let cancel = proxy.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    if let Err(e) = proxy.listen_and_serve().await {
        tracing::error!(error = %e, "proxy failed");
        eprintln!("faultline: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
