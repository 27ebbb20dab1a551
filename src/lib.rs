pub mod db;
pub mod error;
pub mod geo;
pub mod layout;
pub mod maintenance;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod session;
pub mod settings;
mod utils;
pub mod wire;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use db::{Database, Sight};
use layout::SightLayout;
use maintenance::{cleanup_channel, MaintenanceController, MaintenanceWorker};
use orchestrator::{collect_reference_images, Orchestrator};
use pipeline::{CommandPipeline, LocalizationPipeline};
use registry::SightRegistry;
use server::AppState;
use session::SessionCache;
use settings::ServiceSettings;

pub use error::{LocError, LocResult};

/// Initializes `env_logger`. `RUST_LOG` wins when set; otherwise the
/// level is info, or debug with `SIGHTLOC_DEBUG`.
pub fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    if let Some(level) = default_log_level(rust_log_set, settings::debug_mode()) {
        builder.filter_level(level);
    }
    builder.init();
}

fn default_log_level(rust_log_set: bool, debug: bool) -> Option<log::LevelFilter> {
    match (rust_log_set, debug) {
        (true, _) => None,
        (false, true) => Some(log::LevelFilter::Debug),
        (false, false) => Some(log::LevelFilter::Info),
    }
}

async fn open_registry(settings: &ServiceSettings) -> Result<Arc<SightRegistry>> {
    let database = Database::open(settings.registry_file.clone())?;
    let registry = SightRegistry::open(database)
        .await
        .context("failed to load sight registry")?;
    Ok(Arc::new(registry))
}

/// Builds the model of `sight_id` from `datasets/<sight>/images`.
pub async fn create_model(settings: ServiceSettings, sight_id: &str) -> Result<Sight> {
    let settings = Arc::new(settings);
    let registry = open_registry(&settings).await?;
    let pipeline: Arc<dyn LocalizationPipeline> = Arc::new(CommandPipeline::new(&settings.pipeline));
    let orchestrator = Orchestrator::new(pipeline, registry, settings.clone());

    let image_dir = SightLayout::from_settings(&settings, sight_id).images;
    let references = {
        let image_dir = image_dir.clone();
        tokio::task::spawn_blocking(move || collect_reference_images(&image_dir))
            .await
            .context("reference image scan aborted")??
    };
    let tagged = references.iter().filter(|r| r.gps.is_some()).count();
    info!(
        "found {} reference image(s) in {}, {tagged} with GPS",
        references.len(),
        image_dir.display()
    );

    let sight = orchestrator.run_model_creation(sight_id, references).await?;
    Ok(sight)
}

pub async fn list_sights(settings: ServiceSettings) -> Result<Vec<Sight>> {
    let registry = open_registry(&settings).await?;
    Ok(registry.sights())
}

/// Runs the localization service until Ctrl-C.
///
/// With `pinned_sight`, GPS-based sight selection is bypassed and that
/// sight's session is created before the first request arrives.
pub async fn run_server(settings: ServiceSettings, pinned_sight: Option<String>) -> Result<()> {
    info!("sightloc starting up...");
    let settings = Arc::new(settings);
    let registry = open_registry(&settings).await?;
    if registry.is_empty() && pinned_sight.is_none() {
        warn!("no sights registered yet; every request will get the default pose");
    }

    let pipeline: Arc<dyn LocalizationPipeline> = Arc::new(CommandPipeline::new(&settings.pipeline));
    let sessions = Arc::new(SessionCache::new(settings.clone()));
    let (notifier, inbox) = cleanup_channel();
    let orchestrator = Arc::new(
        Orchestrator::new(pipeline.clone(), registry.clone(), settings.clone())
            .with_cleanup_notifier(notifier),
    );

    if let Some(sight_id) = &pinned_sight {
        if !registry.contains(sight_id) {
            warn!("pinned sight {sight_id} is not registered");
        }
        sessions
            .get_or_create(sight_id)
            .await
            .with_context(|| format!("failed to prepare session for {sight_id}"))?;
        info!("serving every request against {sight_id}");
    }

    let mut maintenance = MaintenanceController::new();
    maintenance.start(
        MaintenanceWorker::new(inbox, pipeline, settings.number_of_matches),
        settings.cleanup_interval(),
    )?;

    let listener = TcpListener::bind(&settings.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_address))?;
    let app = server::router(
        AppState::new(registry, sessions, orchestrator, pinned_sight),
        settings.max_payload_bytes,
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(err) => error!("failed to listen for Ctrl-C: {err}"),
            }
            shutdown.cancel();
        });
    }

    let served = server::serve(listener, app, shutdown).await;
    if let Err(err) = maintenance.stop().await {
        error!("maintenance did not stop cleanly: {err:#}");
    }
    served
}
