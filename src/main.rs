use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use color_eyre::eyre::{eyre, WrapErr};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use weatherplaces::{config::Config, routes, weather::retention, AppState};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().wrap_err("invalid configuration")?;
    let addr = config.socket_addr()?;
    let weather_config = config.weather.clone();

    let state = AppState::connect(config).await?;

    if weather_config.scheduler_enabled {
        state.scheduler.start();
    } else {
        info!("weather scheduler disabled");
    }

    let mut retention = retention::start_retention_job(
        state.pool.clone(),
        weather_config.retention_days,
        &weather_config.retention_cron,
    )
    .await?;

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let scheduler = state.scheduler.clone();
    let app = routes::router(state)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    if let Err(err) = retention
        .shutdown()
        .await
        .map_err(|err| eyre!("{err:?}"))
    {
        warn!("failed to stop retention job: {err}");
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
