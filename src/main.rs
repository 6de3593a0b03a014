// src/main.rs
use beam_stacker::api;
use beam_stacker::config::AppConfig;
use beam_stacker::logging::{LogFormat, init_logger};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();

    init_logger(LogFormat::from_env());

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();

    info!("🚀 Load planning service starting...");
    if let Err(err) = api::start_api_server(app_config.api, app_config.planner, app_config.remote).await {
        error!("❌ API server terminated with an error: {err}");
        std::process::exit(1);
    }
}
