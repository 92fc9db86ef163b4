mod api;
mod config;
mod range;
mod scan;
mod scheduler;
mod state;
mod streaming;
mod utils;

use std::path::Path;

use api::api_router;
use config::{
    config_path_from_env, load_or_create_config, resolve_audio_dirs, resolve_path, ServerConfig,
};
use library::{IndexOutcome, Library, RootRegistry};
use scan::start_reindex;
use scheduler::{spawn_scheduler, IndexSchedule};
use state::AppState;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (mut config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }
    config.apply_env_overrides()?;

    let library = open_library(&config_path, &config)?;
    for root in library.roots().roots() {
        info!(
            "Audio root {:?} ({}) at {:?}",
            root.display_name,
            root.slug,
            root.path
        );
    }

    if std::env::args().nth(1).as_deref() == Some("reindex") {
        return reindex_once(library).await;
    }

    let state = AppState::new(library, config.clone());

    if config.index_on_startup {
        info!("Indexing on startup...");
        start_reindex(state.clone());
    }

    let schedule_expr = config.index_schedule.trim();
    if !schedule_expr.is_empty() {
        match IndexSchedule::parse(schedule_expr) {
            Ok(schedule) => {
                spawn_scheduler(state.clone(), schedule, schedule_expr.to_string());
            }
            Err(err) => warn!("Scheduled reindex disabled: {}", err),
        }
    }

    let app = api_router(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let bind_addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn open_library(config_path: &Path, config: &ServerConfig) -> Result<Library, Box<dyn std::error::Error>> {
    let roots = RootRegistry::parse(&resolve_audio_dirs(config_path, &config.audio_dir));
    let db_path = resolve_path(config_path, config.db_path.trim());
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    info!("Opening index database at {:?}", db_path);
    let library = Library::open(&db_path, roots)?.with_lock_stale_after(config.lock_stale_after());
    Ok(library)
}

async fn reindex_once(library: Library) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = tokio::task::spawn_blocking(move || library.rebuild_index()).await??;
    match outcome {
        IndexOutcome::Completed(report) => {
            info!(
                "Reindex finished: {} folders, {} audio files in {} ms",
                report.folders, report.audio_files, report.elapsed_ms
            );
        }
        IndexOutcome::Skipped { holder } => match holder {
            Some(holder) => info!("Reindex skipped; lock held by pid {}", holder.pid),
            None => info!("Reindex skipped; another process holds the lock"),
        },
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
