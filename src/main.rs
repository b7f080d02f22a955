//! relief-sync: headless client for the relief directory
//!
//! - `run` keeps the local cache in sync until Ctrl-C
//! - `centers` prints the merged center view from seed + cache
//! - `route` plans a hazard-aware route, optionally simulating the delivery

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use relief_sync::geo::{filter_centers, CenterChip};
use relief_sync::routing::parse_lat_lng;
use relief_sync::sync::{EngineOptions, SyncNotice};
use relief_sync::{
    CacheStore, ClientState, Config, Connectivity, HttpDirectory, HttpRouting, LatLng,
    ResourceKind, RoutePlanner, SyncEngine, SyncScheduler, TransitSimulator,
};

#[derive(Parser)]
#[command(name = "relief-sync")]
#[command(about = "Offline-tolerant sync and hazard-aware routing for relief clients")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "relief-sync.toml")]
    config: PathBuf,

    /// Data directory (overrides config file)
    #[arg(short, long, env = "RELIEF_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Directory service base URL (overrides config file)
    #[arg(long, env = "RELIEF_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the directory and keep the cache current until Ctrl-C
    Run,

    /// List relief centers from seed data and the local cache
    Centers {
        /// Origin for distance sorting, as LAT,LNG
        #[arg(long, value_parser = parse_lat_lng)]
        near: Option<LatLng>,

        /// Search name, address and menu
        #[arg(long, default_value = "")]
        search: String,

        /// Quick filter: open, low, hot or nearest
        #[arg(long)]
        chip: Option<CenterChip>,
    },

    /// Plan a hazard-aware route
    Route {
        #[arg(long, value_parser = parse_lat_lng)]
        from: LatLng,

        #[arg(long, value_parser = parse_lat_lng)]
        to: LatLng,

        /// Animate a delivery along the planned path
        #[arg(long)]
        simulate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relief_sync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(api_url) = cli.api_url {
        config.api.base_url = api_url;
    }
    debug!(config = %cli.config.display(), api = %config.api.base_url, "Configuration loaded");

    let engine = Arc::new(build_engine(&config)?);
    engine.restore_from_cache().await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(engine, &config).await,
        Command::Centers { near, search, chip } => {
            let centers = engine.state().centers.snapshot().await;
            for center in filter_centers(&centers, &search, chip, near) {
                println!(
                    "{:>3}  {:<32} {:<7} crowd={:<6} items={:<4} {}",
                    center.id.as_str(),
                    center.name,
                    center.status.as_str(),
                    center.crowd.as_str(),
                    center.item_count,
                    center.location()
                );
            }
            Ok(())
        }
        Command::Route { from, to, simulate } => route(engine, &config, from, to, simulate).await,
    }
}

fn build_engine(config: &Config) -> anyhow::Result<SyncEngine> {
    let store = CacheStore::open(&config.storage.data_dir)?;
    let directory = HttpDirectory::new(config.api.base_url.clone(), config.api.request_timeout());
    Ok(SyncEngine::new(
        Arc::new(directory),
        Arc::new(Mutex::new(store)),
        Arc::new(ClientState::with_seed()),
        Connectivity::default(),
        EngineOptions {
            fetch_timeout: config.api.request_timeout(),
            request_center_id: config.sync.request_center_id.clone(),
        },
    ))
}

async fn run(engine: Arc<SyncEngine>, config: &Config) -> anyhow::Result<()> {
    info!(api = %config.api.base_url, "Starting relief-sync");
    let mut notices = engine.subscribe();

    // Every kind is fetched once at startup
    for kind in ResourceKind::ALL {
        let outcome = engine.tick(kind).await;
        debug!(%kind, ?outcome, "Initial fetch");
    }

    let mut scheduler = SyncScheduler::new(engine.clone(), config.sync.refresh_on_reconnect);
    let intervals = [
        (ResourceKind::Centers, config.sync.centers_interval_ms),
        (ResourceKind::Requests, config.sync.requests_interval_ms),
        (ResourceKind::HazardZones, config.sync.hazards_interval_ms),
        (ResourceKind::SosAlerts, config.sync.sos_interval_ms),
    ];
    for (kind, interval_ms) in intervals {
        if interval_ms > 0 {
            scheduler.start_polling(kind, std::time::Duration::from_millis(interval_ms))?;
        }
    }

    let probe = (config.sync.probe_interval_ms > 0).then(|| {
        engine.connectivity().spawn_probe(
            config.api.base_url.clone(),
            std::time::Duration::from_millis(config.sync.probe_interval_ms),
            config.api.request_timeout(),
        )
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            notice = notices.recv() => match notice {
                Ok(SyncNotice::Updated { kind, records }) => debug!(%kind, records, "Collection updated"),
                Ok(SyncNotice::RequestRejected { request_id, item_name, reason }) => {
                    println!(
                        "Request {} for {} was rejected: {}",
                        request_id,
                        item_name,
                        reason.as_deref().unwrap_or("no reason given")
                    );
                }
                Ok(SyncNotice::RequestFulfilled { request_id, item_name }) => {
                    println!("Request {} for {} was fulfilled", request_id, item_name);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notice listener fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    scheduler.shutdown();
    if let Some(probe) = probe {
        probe.abort();
    }
    Ok(())
}

async fn route(
    engine: Arc<SyncEngine>,
    config: &Config,
    from: LatLng,
    to: LatLng,
    simulate: bool,
) -> anyhow::Result<()> {
    let service = HttpRouting::new(config.api.base_url.clone(), config.api.route_timeout());
    let planner = RoutePlanner::new(Arc::new(service), config.api.route_timeout());
    let hazards = engine.state().hazards.snapshot().await;

    let outcome = planner.plan_route(Some(from), Some(to), &hazards).await?;
    if let Some(advisory) = &outcome.advisory {
        println!("{}", advisory);
    }
    for (i, point) in outcome.plan.waypoints.iter().enumerate() {
        println!("{:>3}  {}", i, point);
    }

    if simulate {
        let mut transit = TransitSimulator::new(config.transit.tick());
        let mut updates = transit.subscribe();
        transit.start_transit(outcome.plan.waypoints.clone())?;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if let Some(at) = state.position() {
                println!("{:>3}%  {}", state.progress_percent, at);
            }
            if state.is_arrived() {
                break;
            }
        }
    }
    Ok(())
}
