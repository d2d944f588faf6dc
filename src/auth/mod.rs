//! Authentication module
//!
//! Session token issuance/verification, per-client rate limiting of the
//! account routes, and the password hashing those routes rely on.

pub mod handlers;
mod password;
mod rate_limit;
mod token;

pub use password::PasswordHasher;
pub use rate_limit::{Decision, RateLimitConfig, RateLimitEntry, RateLimiter};
pub use token::{SessionClaims, TokenRejection, TokenSecret, TokenService, DEFAULT_TOKEN_LIFETIME_SECS};

/// Cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "jwtToken";
