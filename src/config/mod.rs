use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres URL. When absent, accounts live in memory for the lifetime of
    /// the process.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC secret for session tokens. No default on purpose.
    pub secret_key: String,
    /// Appended to every password before hashing.
    pub pepper: String,
    pub issuer: String,
    pub token_lifetime_secs: i64,
    pub secure_cookies: bool,
    pub bcrypt_cost: u32,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .field("pepper", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .field("secure_cookies", &self.secure_cookies)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: i64,
    /// How often stale entries are swept. 0 disables the sweep.
    pub sweep_interval_secs: u64,
    pub retention_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StaticFilesConfig {
    pub root: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub log_level: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub static_files: StaticFilesConfig,
    pub cors: CorsConfig,
}

fn with_defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("environment", environment)?
        .set_default("log_level", "info")?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 18080)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("database.max_connections", 5)?
        .set_default("auth.issuer", "cartapp")?
        .set_default("auth.token_lifetime_secs", 60 * 60 * 24 * 7)?
        .set_default("auth.secure_cookies", environment == "production")?
        .set_default("auth.bcrypt_cost", bcrypt::DEFAULT_COST as i64)?
        .set_default("rate_limit.max_requests", 5)?
        .set_default("rate_limit.window_secs", 60)?
        .set_default("rate_limit.sweep_interval_secs", 300)?
        .set_default("rate_limit.retention_secs", 600)?
        .set_default("static_files.root", "dist")?
        .set_default("cors.enabled", false)?
        .set_default("cors.allow_any_origin", false)?
        .set_default("cors.allowed_origins", Vec::<String>::new())?
        .set_default("cors.max_age", 3600)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults(&run_mode)?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_AUTH__SECRET_KEY=...` would set `Settings.auth.secret_key`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Deterministic settings for tests: no environment, no files, cheap bcrypt.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        let settings: Settings = with_defaults("test")?
            .set_override("auth.secret_key", "test_secret")?
            .set_override("auth.pepper", "test_pepper")?
            .set_override("auth.bcrypt_cost", 4)?
            .set_override("server.workers", 1)?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret_key.trim().is_empty() {
            return Err(ConfigError::Message("auth.secret_key must not be empty".into()));
        }
        if self.auth.pepper.is_empty() {
            return Err(ConfigError::Message("auth.pepper must not be empty".into()));
        }
        if self.auth.token_lifetime_secs <= 0 {
            return Err(ConfigError::Message("auth.token_lifetime_secs must be positive".into()));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs <= 0 {
            return Err(ConfigError::Message("rate_limit.max_requests and rate_limit.window_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigBuilder<DefaultState> {
        with_defaults("test").unwrap()
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new_for_test().expect("Failed to load settings");
        assert_eq!(settings.environment, "test");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 18080);
        assert!(settings.database.url.is_none());
        assert_eq!(settings.auth.issuer, "cartapp");
        assert_eq!(settings.auth.token_lifetime_secs, 604_800);
        assert!(!settings.auth.secure_cookies);
        assert_eq!(settings.rate_limit.max_requests, 5);
        assert_eq!(settings.rate_limit.window_secs, 60);
        assert_eq!(settings.static_files.root, "dist");
    }

    #[test]
    fn test_production_defaults_to_secure_cookies() {
        let settings: Settings = with_defaults("production").unwrap()
            .set_override("auth.secret_key", "k").unwrap()
            .set_override("auth.pepper", "p").unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(settings.is_production());
        assert!(settings.auth.secure_cookies);
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let result = base()
            .set_override("auth.pepper", "p").unwrap()
            .build()
            .and_then(|c| c.try_deserialize::<Settings>());
        assert!(result.is_err(), "secret_key has no default");
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let settings: Settings = base()
            .set_override("auth.secret_key", "   ").unwrap()
            .set_override("auth.pepper", "p").unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_port() {
        let result = base()
            .set_override("auth.secret_key", "k").unwrap()
            .set_override("auth.pepper", "p").unwrap()
            .set_override("server.port", "invalid").unwrap()
            .build()
            .and_then(|config| config.try_deserialize::<Settings>());

        assert!(result.is_err(), "Expected error for invalid port");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = Settings::new_for_test().unwrap();
        let rendered = format!("{:?}", settings.auth);
        assert!(!rendered.contains("test_secret"));
        assert!(!rendered.contains("test_pepper"));
    }
}
