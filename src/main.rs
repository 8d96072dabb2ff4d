//! Felarr application entry point
//!
//! Wires the store, the four service clients, the coordinator and the
//! monitor loop together, then serves the control-plane API until
//! interrupted.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use felarr_core::{ProgressFn, ScanProgress, UpgradePolicy};
use felarr_downloaders::{QBittorrentClient, QBittorrentConfig};
use felarr_infrastructure::{
    create_pool, DatabaseConfig, RadarrClient, RadarrConfig, SqliteCapabilityRepository,
    SqliteHistoryRepository, SqlitePendingRepository, SqliteSettingsRepository,
};
use felarr_notifications::{CallbackPoller, TelegramClient, TelegramConfig, TelegramNotifier};
use felarr_plex::{PlexClient, PlexConfig, PlexService};
use felarr_tracker::{TrackerClient, TrackerConfig};
use felarr_workflow::{
    CoreServices, DownloadCoordinator, MonitorConfig, MonitorLoop, StateView,
};

mod config;

use config::AppConfig;
use felarr_core::SettingsStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::parse();
    info!("starting felarr");

    // -- store --
    let pool = create_pool(DatabaseConfig {
        database_url: config.database_url.clone(),
        ..DatabaseConfig::default()
    })
    .await
    .context("opening database")?;
    felarr_infrastructure::database::migrate(&pool)
        .await
        .context("running migrations")?;

    let capabilities = Arc::new(SqliteCapabilityRepository::new(pool.clone()));
    let pendings = Arc::new(SqlitePendingRepository::new(pool.clone()));
    let history = Arc::new(SqliteHistoryRepository::new(pool.clone()));
    let settings = Arc::new(SqliteSettingsRepository::new(pool.clone()));

    let policy = settings
        .load_policy()
        .await
        .context("loading policy")?
        .unwrap_or_else(UpgradePolicy::default);
    let policy = Arc::new(RwLock::new(policy));

    // -- shared state --
    let state = StateView::new();
    let scan_gate = Arc::new(Mutex::new(()));
    let shutdown = CancellationToken::new();

    // -- service clients --
    let plex = Arc::new(
        PlexClient::new(PlexConfig {
            base_url: config.plex_url.clone(),
            token: config.plex_token.clone(),
            library_name: config.plex_library.clone(),
            ..PlexConfig::default()
        })
        .context("building plex client")?,
    );

    let radarr = Arc::new(
        RadarrClient::new(RadarrConfig {
            base_url: config.radarr_url.clone(),
            api_key: config.radarr_api_key.clone(),
            ..RadarrConfig::default()
        })
        .context("building radarr client")?,
    );

    let qbittorrent = Arc::new(
        QBittorrentClient::new(QBittorrentConfig {
            base_url: config.qbit_url.clone(),
            username: config.qbit_username.clone(),
            password: config.qbit_password.clone(),
            ..QBittorrentConfig::default()
        })
        .context("building qbittorrent client")?,
    );

    let telegram = Arc::new(
        TelegramClient::new(TelegramConfig {
            bot_token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
            ..TelegramConfig::default()
        })
        .context("building telegram client")?,
    );

    let tracker = Arc::new(
        TrackerClient::new(TrackerConfig {
            base_url: config.tracker_url.clone(),
            search_term: config.tracker_search_term.clone(),
            uid: config.tracker_uid.clone(),
            pass: config.tracker_pass.clone(),
            ..TrackerConfig::default()
        })
        .context("building tracker client")?,
    );

    connectivity_checks(&plex, &radarr, &qbittorrent, &telegram).await;

    // -- core wiring --
    let progress_state = state.clone();
    let progress: Arc<ProgressFn> = Arc::new(move |progress: ScanProgress| {
        progress_state.update(|s| s.progress = Some(progress));
    });

    let plex_service = Arc::new(
        PlexService::new(
            plex.clone(),
            capabilities.clone(),
            config.collections(),
            shutdown.child_token(),
        )
        .with_progress(progress),
    );

    let notifier = Arc::new(TelegramNotifier::new(telegram.clone()));

    let coordinator = Arc::new(DownloadCoordinator::new(
        capabilities.clone(),
        pendings.clone(),
        history.clone(),
        radarr.clone(),
        qbittorrent.clone(),
        notifier.clone(),
        policy.clone(),
    ));

    let services = Arc::new(CoreServices {
        capabilities: capabilities.clone(),
        pendings: pendings.clone(),
        history: history.clone(),
        settings: settings.clone(),
        coordinator: coordinator.clone(),
        scan_runner: plex_service.clone(),
        policy: policy.clone(),
        state: state.clone(),
        scan_gate: scan_gate.clone(),
    });

    // -- background tasks --
    let monitor = MonitorLoop::new(
        plex_service.clone(),
        tracker.clone(),
        coordinator.clone(),
        state.clone(),
        scan_gate.clone(),
        MonitorConfig {
            scan_frequency_hours: config.scan_frequency_hours,
            tracker_poll_minutes: config.tracker_poll_minutes,
            ..MonitorConfig::default()
        },
    );
    let monitor_cancel = shutdown.child_token();
    let monitor_task = tokio::spawn(async move { monitor.run(monitor_cancel).await });

    let poller = CallbackPoller::new(
        telegram.clone(),
        coordinator.clone(),
        notifier.clone(),
        pendings.clone(),
    );
    let poller_cancel = shutdown.child_token();
    let poller_task = tokio::spawn(async move { poller.run(poller_cancel).await });

    // -- control plane --
    let app = felarr_api::router(services);
    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(listen = config.listen.as_str(), "control plane listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .context("serving control plane")?;

    let _ = monitor_task.await;
    let _ = poller_task.await;
    info!("felarr stopped");
    Ok(())
}

/// Probe every external service once at startup. Failures are warnings;
/// the monitor will keep retrying on its own schedule.
async fn connectivity_checks(
    plex: &PlexClient,
    radarr: &RadarrClient,
    qbittorrent: &QBittorrentClient,
    telegram: &TelegramClient,
) {
    match plex.test_connection().await {
        Ok(()) => info!("plex reachable"),
        Err(err) => warn!(%err, "plex connectivity check failed"),
    }
    match radarr.test_connection().await {
        Ok(()) => info!("radarr reachable"),
        Err(err) => warn!(%err, "radarr connectivity check failed"),
    }
    match qbittorrent.test_connection().await {
        Ok(()) => info!("qbittorrent reachable"),
        Err(err) => warn!(%err, "qbittorrent connectivity check failed"),
    }
    match telegram.test_connection().await {
        Ok(username) => info!(bot = username.as_str(), "telegram reachable"),
        Err(err) => warn!(%err, "telegram connectivity check failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
