mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use tally_node::dispatch::Dispatcher;
use tally_node::ledger::Ledger;
use tally_transport::adapter::TransportAdapter;
use tally_transport::lossy::LossyAdapter;
use tally_transport::udp::UdpAdapter;
use tracing::{error, info};

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (.toml or .env)
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// UDP port to listen on; keeps the configured host
    #[arg(long, short)]
    port: Option<u16>,
    /// Simulated packet loss percentage, applied in both directions
    #[arg(long, short, value_parser = clap::value_parser!(u8).range(0..=100))]
    loss: Option<u8>,
}

type ServerAdapter = LossyAdapter<UdpAdapter>;

fn log_stats(dispatcher: &Dispatcher<SocketAddr>, adapter: &ServerAdapter) {
    let stats = dispatcher.stats();
    let health = adapter.health_snapshot();
    info!(
        "stats: received={} executed={} replayed={} errors={} malformed={} ignored={} callbacks={} accounts={} sessions={} subscribers={}",
        stats.received,
        stats.executed,
        stats.replayed,
        stats.error_replies,
        stats.malformed,
        stats.ignored_non_request,
        stats.callbacks_sent,
        dispatcher.service().account_count(),
        dispatcher.semantics().session_count(),
        dispatcher.subscriptions().len(),
    );
    info!(
        "transport: sent={} send_err={} received={} dropped_in={} dropped_out={}",
        health.outbound_send_ok,
        health.outbound_send_err,
        health.inbound_received,
        health.inbound_dropped,
        health.outbound_dropped,
    );
}

fn serve(
    dispatcher: &Dispatcher<SocketAddr>,
    adapter: &mut ServerAdapter,
    shutdown: &AtomicBool,
    stats_interval: Duration,
) {
    let mut last_stats = Instant::now();
    while !shutdown.load(Ordering::Relaxed) {
        dispatcher.serve_tick(adapter);
        if !stats_interval.is_zero() && last_stats.elapsed() >= stats_interval {
            log_stats(dispatcher, adapter);
            last_stats = Instant::now();
        }
    }
}

fn main() {
    let filter = std::env::var("TALLY_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let mut config = match ServerConfig::new(cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            std::process::exit(1);
        }
    };
    config.apply_overrides(cli.port, cli.loss);

    let udp = match UdpAdapter::bind(config.udp_config()) {
        Ok(udp) => udp,
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };
    match udp.local_addr() {
        Ok(addr) => info!("tally server listening on udp {addr}"),
        Err(_) => info!("tally server listening on udp {}", config.bind),
    }
    if config.loss_percent > 0 {
        info!("simulating {}% packet loss", config.loss_percent);
    }

    let mut adapter = LossyAdapter::new(udp, config.loss_config());
    let dispatcher: Dispatcher<SocketAddr> =
        Dispatcher::new(Ledger::new(), &config.node_config());

    let shutdown = Arc::new(AtomicBool::new(false));
    let _ = flag::register(SIGTERM, Arc::clone(&shutdown));
    let _ = flag::register(SIGINT, Arc::clone(&shutdown));

    serve(&dispatcher, &mut adapter, &shutdown, config.stats_interval);

    info!("shutting down");
    log_stats(&dispatcher, &adapter);
}
