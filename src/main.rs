use anyhow::Result;
use loadshedding_predictor::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }
    init_tracing();

    let cfg = Config::load()?;

    if cfg.auth.clients.is_empty() {
        warn!("no API clients configured; every authenticated endpoint will answer 401");
    }
    if cfg.auth.clients.iter().any(|c| c.token == "change-me") {
        warn!("Using the sample 'change-me' token - this is only safe for local development!");
    }

    let app_state = controller::AppState::new(cfg.clone())?;
    let app = api::router(app_state.clone());

    let addr = cfg.server.socket_addr()?;
    info!(%addr, models = ?app_state.resolver.registry().available_models(), "starting load shedding predictor");

    controller::spawn_controller_tasks(&app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
