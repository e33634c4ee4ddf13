use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::infrastructure::bootstrap;
use crate::infrastructure::config::AppConfig;
use crate::interfaces::http::start_server;

pub fn run() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
            error!(error = %err, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    if let Err(err) = actix_web::rt::System::new().block_on(serve(config)) {
        error!(error = %err, "Server stopped with error");
        std::process::exit(1);
    }
}

async fn serve(config: AppConfig) -> std::io::Result<()> {
    let state = bootstrap::setup(&config)
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    let server = start_server(state.clone(), &config.server.host, config.server.port)?;
    state.events.info(
        "System",
        &format!(
            "Backend initialized and HTTP server started on {}:{}",
            config.server.host, config.server.port
        ),
    );
    info!(host = %config.server.host, port = config.server.port, "AIO Hub listening");

    server.await
}
