pub mod assets;
pub mod auth;
pub mod cart;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use auth::{PasswordHasher, RateLimitConfig, RateLimiter, TokenSecret, TokenService};
pub use db::{DbOperations, InMemoryUserStore, User, UserStore};

/// Health check endpoint handler
/// Reports whether accounts can be served, plus Postgres pool usage when a
/// database is connected. Answers 503 while the user store is unavailable.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store_up = state.users.is_some();
    let body = serde_json::json!({
        "status": if store_up { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "userStore": if store_up { "available" } else { "unavailable" },
        "database": state.db.as_ref().map(|db| db.pool_status()),
    });

    if store_up {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Application state shared across all workers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub tokens: Arc<TokenService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub passwords: Arc<PasswordHasher>,
    /// `None` when the configured database could not be reached.
    pub users: Option<Arc<dyn UserStore>>,
    db: Option<Arc<DbOperations>>,
}

impl AppState {
    /// Builds the state from configuration, connecting to Postgres when a
    /// database URL is set and falling back to an in-memory store otherwise.
    pub async fn new(config: Settings) -> Result<Self> {
        let db = match config.database.url.as_deref() {
            Some(url) => match connect_database(url, config.database.max_connections).await {
                Ok(db) => Some(Arc::new(db)),
                Err(e) => {
                    error!("Database unavailable, account routes will answer 503: {}", e);
                    None
                }
            },
            None => None,
        };

        let users: Option<Arc<dyn UserStore>> = match (&db, config.database.url.is_some()) {
            (Some(db), _) => Some(db.clone()),
            (None, true) => None,
            (None, false) => {
                warn!("No database configured, accounts are kept in memory only");
                Some(Arc::new(InMemoryUserStore::new()))
            }
        };

        let mut state = Self::build(config, users)?;
        state.db = db;
        Ok(state)
    }

    /// Assembles the state around an explicit user store.
    pub fn build(config: Settings, users: Option<Arc<dyn UserStore>>) -> Result<Self> {
        let secret = TokenSecret::new(config.auth.secret_key.clone())?;
        let tokens = TokenService::with_lifetime(
            secret,
            config.auth.issuer.clone(),
            Duration::seconds(config.auth.token_lifetime_secs),
        )?;
        if config.auth.pepper.is_empty() {
            return Err(AppError::ConfigError("auth.pepper must not be empty".into()));
        }
        let passwords = PasswordHasher::new(config.auth.pepper.clone(), config.auth.bcrypt_cost);
        let rate_limiter = RateLimiter::new(RateLimitConfig {
            window_size: Duration::seconds(config.rate_limit.window_secs),
            max_requests: config.rate_limit.max_requests,
        });

        Ok(Self {
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            rate_limiter: Arc::new(rate_limiter),
            passwords: Arc::new(passwords),
            users,
            db: None,
        })
    }

    /// Records the request against `client` and fails with `RateLimited` once
    /// the client is over its limit.
    pub fn admit(&self, client: &str) -> Result<()> {
        if self.rate_limiter.check_and_record(client, Utc::now()).is_admitted() {
            Ok(())
        } else {
            warn!(client, "Too many requests");
            Err(error::AuthError::RateLimited.into())
        }
    }

    pub fn user_store(&self) -> Result<Arc<dyn UserStore>> {
        self.users
            .clone()
            .ok_or_else(|| AppError::ServiceUnavailable("user store unavailable".into()))
    }

    /// Periodically drops stale rate limit entries. Returns `None` when the
    /// sweep is disabled.
    pub fn spawn_rate_limit_sweeper(&self) -> Option<JoinHandle<()>> {
        let every = self.config.rate_limit.sweep_interval_secs;
        if every == 0 {
            return None;
        }
        let limiter = self.rate_limiter.clone();
        let retention = Duration::seconds(self.config.rate_limit.retention_secs);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(every));
            loop {
                interval.tick().await;
                limiter.sweep(Utc::now(), retention);
            }
        }))
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.close().await;
        }
        self.rate_limiter.clear();
        info!("Application state shut down");
        Ok(())
    }
}

async fn connect_database(url: &str, max_connections: u32) -> Result<DbOperations> {
    let db = DbOperations::new_with_options(url, max_connections, std::time::Duration::from_secs(5)).await?;
    db.migrate().await?;
    Ok(db)
}

/// Registers every route. Account and cart routes come before the static
/// fallbacks.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AppError::ValidationError(err.to_string()).into()),
    )
    .route("/health", web::get().to(health_check))
    .service(
        web::resource("/login")
            .route(web::get().to(assets::index))
            .route(web::post().to(auth::handlers::login)),
    )
    .service(
        web::resource("/register")
            .route(web::get().to(assets::index))
            .route(web::post().to(auth::handlers::register)),
    )
    .route("/verify-token", web::post().to(auth::handlers::verify_token))
    .route("/logout", web::post().to(auth::handlers::logout))
    .route("/checkout", web::post().to(cart::checkout))
    .configure(assets::configure);
}
