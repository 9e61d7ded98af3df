//! Daemon lifecycle: startup, health checks, sweeper, systemd notify, HTTP server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bitdrop_core::{AuthSecret, BitdropConfig};
use bitdrop_storage::StagingArea;
use bitdrop_transfer::{build_notifier, Services};
use prometheus_client::registry::Registry;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::metrics::{self, HealthState, Metrics};

pub async fn run(config: BitdropConfig) -> Result<()> {
    info!("daemon starting");
    config.validate()?;

    // ── Finalize secret and notifier ─────────────────────────────────────
    let auth = AuthSecret::load(&config.auth)?;
    let notifier = build_notifier(&config.notify)?;
    info!(
        backend = ?config.notify.backend,
        auth_configured = auth.is_configured(),
        "finalize collaborators ready"
    );

    // ── Storage ──────────────────────────────────────────────────────────
    tokio::fs::create_dir_all(&config.storage.root)
        .await
        .with_context(|| format!("creating storage root {}", config.storage.root.display()))?;
    let services = Arc::new(Services::open(&config, auth, notifier).await?);

    match bitdrop_storage::check_health(&services.layout).await {
        Ok(()) => info!(root = %services.layout.root().display(), "storage: writable"),
        Err(e) => warn!(root = %services.layout.root().display(), "storage: {e:#}"),
    }

    // ── Metrics ──────────────────────────────────────────────────────────
    let mut registry = Registry::default();
    let metrics = Metrics::register(&mut registry);
    if let Some(addr) = config.server.metrics_addr.clone() {
        let state = HealthState {
            registry: Arc::new(registry),
            layout: services.layout.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(addr, state).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    // ── Staging sweeper ──────────────────────────────────────────────────
    if config.storage.sweep_interval_secs > 0 {
        spawn_sweeper(
            services.staging.clone(),
            Duration::from_secs(config.storage.sweep_interval_secs),
            Duration::from_secs(config.storage.staging_max_age_secs),
        );
    } else {
        info!("staging sweeper disabled");
    }

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = api::router(
        AppState { services, metrics },
        config.server.max_body_bytes,
    );
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(addr = %config.server.listen, "http: listening");

    notify_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    info!("daemon exiting cleanly");
    Ok(())
}

fn spawn_sweeper(staging: StagingArea, every: Duration, max_age: Duration) {
    info!(
        interval_secs = every.as_secs(),
        max_age_secs = max_age.as_secs(),
        "staging sweeper started"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match staging.sweep(max_age).await {
                Ok(0) => {}
                Ok(n) => info!(removed = n, "swept abandoned staging areas"),
                Err(e) => warn!("staging sweep failed: {e}"),
            }
        }
    });
}

async fn shutdown_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!("registering signal handlers: {e}");
            std::future::pending::<()>().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

fn notify_ready() {
    // sd_notify(READY=1) via $NOTIFY_SOCKET; no-op outside systemd
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
