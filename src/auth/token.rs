//! Signed session tokens.
//!
//! Tokens are compact HS256 JWS values carrying `iss`, `email`, `uid`, `iat`
//! and `exp`. Verification needs only a good signature, the expected `iss`
//! and an unexpired `exp`. Every failure to verify collapses to "invalid" for
//! the caller; the reason is only logged.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use jsonwebtoken::errors::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AuthError;

/// Default lifetime of an issued token: 7 days.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60 * 60 * 24 * 7;

const TOKEN_TYPE: &str = "JWS";

/// Claims of a session token. Only `iss` and `exp` are required to verify;
/// everything else, `email` and `uid` included, is looked up after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Looks up a string claim by its wire name.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "iss" => Some(&self.iss),
            _ => self.extra.get(name).and_then(Value::as_str),
        }
    }
}

/// Why a token was refused. Diagnostics only; never sent to clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    BadSignature,

    #[error("issuer mismatch")]
    WrongIssuer,

    #[error("token expired")]
    Expired,

    #[error("token issued in the future")]
    NotYetValid,
}

impl From<jsonwebtoken::errors::Error> for TokenRejection {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenRejection::BadSignature,
            ErrorKind::InvalidIssuer => TokenRejection::WrongIssuer,
            ErrorKind::ExpiredSignature => TokenRejection::Expired,
            ErrorKind::ImmatureSignature => TokenRejection::NotYetValid,
            _ => TokenRejection::Malformed(err.to_string()),
        }
    }
}

/// Secret used to sign and verify tokens. Never printed.
#[derive(Clone)]
pub struct TokenSecret(String);

impl TokenSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(AuthError::TokenIssue("signing secret is empty".into()));
        }
        Ok(Self(secret))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSecret(<redacted>)")
    }
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: Duration,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: TokenSecret, issuer: impl Into<String>) -> Result<Self, AuthError> {
        Self::with_lifetime(secret, issuer, Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS))
    }

    pub fn with_lifetime(
        secret: TokenSecret,
        issuer: impl Into<String>,
        lifetime: Duration,
    ) -> Result<Self, AuthError> {
        let issuer = issuer.into();
        if issuer.is_empty() {
            return Err(AuthError::TokenIssue("issuer is empty".into()));
        }
        if lifetime <= Duration::zero() {
            return Err(AuthError::TokenIssue("token lifetime must be positive".into()));
        }

        // Signature and issuer are checked by the library; time checks are
        // done against the caller's clock in `decode`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            lifetime,
            validation,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, email: &str, uid: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let iat = now.timestamp();
        let mut extra = Map::new();
        extra.insert("email".to_string(), Value::from(email));
        extra.insert("uid".to_string(), Value::from(uid));
        let claims = SessionClaims {
            iss: self.issuer.clone(),
            exp: iat + self.lifetime.num_seconds(),
            iat: Some(iat),
            extra,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some(TOKEN_TYPE.to_string());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenIssue(e.to_string()))
    }

    /// Verifies the signature, issuer and lifetime window, then hands back the
    /// claims. A token is valid for `iat <= now < exp`; without `iat` only the
    /// expiry bounds it.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenRejection> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        let now = now.timestamp();
        if now >= claims.exp {
            return Err(TokenRejection::Expired);
        }
        if claims.iat.is_some_and(|iat| now < iat) {
            return Err(TokenRejection::NotYetValid);
        }
        Ok(claims)
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.decode(token, now) {
            Ok(claims) => {
                debug!(uid = ?claims.get("uid"), "token verified");
                true
            }
            Err(reason) => {
                warn!(%reason, "token verification failed");
                false
            }
        }
    }

    /// Returns the named claim of a verified token. Empty values count as absent.
    pub fn extract_claim(&self, token: &str, now: DateTime<Utc>, claim: &str) -> Option<String> {
        let claims = match self.decode(token, now) {
            Ok(claims) => claims,
            Err(reason) => {
                warn!(%reason, claim, "claim extraction refused");
                return None;
            }
        };
        claims
            .get(claim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}
