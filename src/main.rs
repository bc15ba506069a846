//! Topology watcher daemon.
//!
//! Connects to etcd, watches the topology document and prints every
//! resulting route spec to stdout as one JSON object per line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use topology_watcher::admin::setup_admin_router;
use topology_watcher::cli::WatcherArgs;
use topology_watcher::config::loader::{check_config, read_config};
use topology_watcher::config::WatcherConfig;
use topology_watcher::lifecycle::signals::wait_for_shutdown_signal;
use topology_watcher::lifecycle::Shutdown;
use topology_watcher::observability::{logging, metrics};
use topology_watcher::store::EtcdConnector;
use topology_watcher::watcher::WatcherSettings;
use topology_watcher::{TopologyWatcher, WatcherPlugin};

#[derive(Parser)]
#[command(name = "topology-watcher")]
#[command(about = "Watch the etcd topology document and emit route specs", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    args: WatcherArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => WatcherConfig::default(),
    };
    cli.args.apply(&mut config);

    logging::init_logging(&config.observability);

    if let Err(e) = check_config(&config) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    tracing::info!(
        addr = %config.store.addr,
        port = config.store.port,
        watch_mode = %config.store.watch_mode,
        "topology-watcher v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let settings = WatcherSettings::from_config(&config);
    let connector = EtcdConnector::new(settings.call_timeout)
        .with_retry(settings.poll_retry_base, settings.poll_retry_max);
    let watcher = Arc::new(TopologyWatcher::new(&config, Arc::new(connector))?);

    let admin_shutdown = Shutdown::new();
    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin endpoint listening");
        let app = setup_admin_router(watcher.clone(), &config.admin.api_key);
        let mut stop = admin_shutdown.subscribe();
        Some(tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.wait().await });
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Admin endpoint failed");
            }
        }))
    } else {
        None
    };

    let mut route_specs = watcher
        .output_queue()
        .ok_or("route spec queue already taken")?;
    watcher.start();

    let signal = wait_for_shutdown_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            spec = route_specs.recv() => match spec {
                Some(spec) => println!("{}", serde_json::to_string(&spec)?),
                None => break,
            },
            _ = &mut signal => break,
        }
    }

    watcher.stop().await;
    admin_shutdown.trigger();
    if let Some(task) = admin_task {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
