use actix_web::{web, App, HttpServer};
use actix_cors::Cors;
use cartgate::{AppState, Settings, AppError};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn cors(config: &Settings) -> Cors {
    if !config.cors.enabled {
        // CORS disabled - use most restrictive settings
        return Cors::default();
    }

    let cors = if config.cors.allow_any_origin {
        Cors::default().allow_any_origin()
    } else {
        config
            .cors
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec!["Content-Type"])
        .supports_credentials()
        .max_age(config.cors.max_age as usize)
}

#[actix_web::main]
async fn main() -> cartgate::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Load configuration; a missing secret stops the process here.
    let config = Settings::new()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    info!(environment = %config.environment, "Configuration loaded successfully");
    if config.is_production() && !config.auth.secure_cookies {
        warn!("auth.secure_cookies is off in production; session cookies will be sent over plain HTTP");
    }
    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let state = AppState::new(config.clone()).await?;
    let sweeper = state.spawn_rate_limit_sweeper();
    let data = web::Data::new(state.clone());

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;

    let result = HttpServer::new(move || {
        App::new()
            .wrap(cors(&config))
            .app_data(data.clone())
            .configure(cartgate::configure)
    })
    .listen(listener)?
    .workers(state.config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()));

    info!("Server stopped, shutting down");
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    state.shutdown().await?;

    result
}
