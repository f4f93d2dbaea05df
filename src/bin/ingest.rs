use color_eyre::eyre::WrapErr;
use tracing::info;
use weatherplaces::{config::Config, AppState};

/// Runs one ingestion pass and prints its summary as JSON.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    std::env::set_var(
        "RUST_LOG",
        std::env::var("RUST_LOG").unwrap_or_else(|_| String::from("info")),
    );

    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::from_env().wrap_err("invalid configuration")?;
    let state = AppState::connect(config).await?;

    let summary = state.weather.run_cycle().await?;
    info!(
        "ingested {}/{} provinces in {}ms",
        summary.succeeded, summary.total, summary.duration_ms
    );

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
