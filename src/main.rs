use anyhow::Context;
use controlmyspa_porssari::{
    api,
    config::{Config, TelemetryConfig},
    controlmyspa::{ControlMySpaClient, SpaDevice},
    jobs,
    porssari::{PorssariClient, ScheduleSource},
    scheduler::Scheduler,
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration comes first so error reporting is live before anything can fail
    let config = Config::from_env();
    let _sentry = init_sentry(
        config
            .as_ref()
            .map(|c| c.telemetry.clone())
            .unwrap_or_default(),
    );

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,controlmyspa_porssari=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(sentry::integrations::tracing::layer())
        .init();

    info!("Starting controlmyspa-porssari");

    let config = config.context("Invalid configuration")?;
    info!("Configuration loaded");
    info!("Porssari device: {}", config.porssari.device_mac);
    info!(
        "Temperatures: low={} high={} override={:?}",
        config.control.temp_low, config.control.temp_high, config.control.temp_override
    );
    info!("Time zone: {}", config.control.timezone);

    let device: Arc<dyn SpaDevice> = Arc::new(ControlMySpaClient::new(&config.device)?);
    let source: Arc<dyn ScheduleSource> = Arc::new(PorssariClient::new(&config.porssari)?);

    let state = AppState::new(device, config.control.clone());

    let scheduler = Scheduler::new();
    jobs::schedule_jobs(&scheduler, state.clone(), source);

    let app = api::create_router(state);

    let bind_addr = config.api_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("Status page listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.shutdown();

    info!("Application shutdown complete");
    Ok(())
}

fn init_sentry(telemetry: TelemetryConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = telemetry.sentry_url?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            traces_sample_rate: 1.0,
            ..Default::default()
        },
    )))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
