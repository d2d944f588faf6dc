use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::TOKEN_COOKIE;
use crate::db::User;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::AppState;

#[derive(Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    /// Both fields present and non-empty, email trimmed.
    fn filled(self) -> Option<(String, String)> {
        let email = self.email?.trim().to_string();
        let password = self.password?;
        if email.is_empty() || password.is_empty() {
            return None;
        }
        Some((email, password))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub login_success: bool,
    pub res_string: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub register_success: bool,
    pub res_string: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub email: String,
    pub uid: String,
    pub verification_success: bool,
}

/// Shared limiter key for requests whose peer address is not known. All such
/// requests count against one window.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiting key for a request: the peer IP address.
pub fn client_key(req: &HttpRequest) -> String {
    match req.peer_addr() {
        Some(addr) => addr.ip().to_string(),
        None => {
            warn!(path = %req.path(), "peer address unavailable, using the shared rate limit bucket");
            UNKNOWN_CLIENT.to_string()
        }
    }
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build(TOKEN_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.config.auth.secure_cookies)
        .max_age(CookieDuration::seconds(state.tokens.lifetime().num_seconds()))
        .finish()
}

fn issue_session(state: &AppState, user: &User) -> Result<Cookie<'static>, AppError> {
    let token = state.tokens.issue(&user.email, &user.uid(), Utc::now())?;
    Ok(session_cookie(state, token))
}

async fn verify_password(state: &AppState, password: String, hash: String) -> Result<bool, AppError> {
    let hasher = state.passwords.clone();
    web::block(move || hasher.verify(&password, &hash))
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
}

async fn hash_password(state: &AppState, password: String) -> Result<String, AppError> {
    let hasher = state.passwords.clone();
    web::block(move || hasher.hash(&password))
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
}

pub async fn login(
    req: HttpRequest,
    body: web::Json<Credentials>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let client = client_key(&req);
    state.admit(&client)?;
    let users = state.user_store()?;

    let Some((email, password)) = body.into_inner().filled() else {
        info!(%client, "login rejected: missing email or password");
        return Ok(HttpResponse::Ok().json(LoginResponse {
            login_success: false,
            res_string: "Unable to log into account, make sure all info is filled in",
        }));
    };

    let Some(user) = users.find_by_email(&email).await? else {
        info!(%client, "login rejected: unknown email");
        return Ok(HttpResponse::Ok().json(LoginResponse {
            login_success: false,
            res_string: "Email not found",
        }));
    };

    if !verify_password(&state, password, user.password_hash.clone()).await? {
        info!(%client, uid = %user.uid(), "login rejected: incorrect password");
        return Ok(HttpResponse::Ok().json(LoginResponse {
            login_success: false,
            res_string: "Incorrect password",
        }));
    }

    let cookie = issue_session(&state, &user)?;
    info!(uid = %user.uid(), "user logged in");
    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        login_success: true,
        res_string: "Logged in",
    }))
}

pub async fn register(
    req: HttpRequest,
    body: web::Json<Credentials>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let client = client_key(&req);
    state.admit(&client)?;
    let users = state.user_store()?;

    let Some((email, password)) = body.into_inner().filled() else {
        info!(%client, "registration rejected: missing email or password");
        return Ok(HttpResponse::Ok().json(RegisterResponse {
            register_success: false,
            res_string: "Unable to register, make sure both email and password are provided",
        }));
    };

    let already_exists = RegisterResponse {
        register_success: false,
        res_string: "An account already exists with this email!",
    };

    if users.find_by_email(&email).await?.is_some() {
        info!(%client, "registration rejected: email taken");
        return Ok(HttpResponse::Ok().json(already_exists));
    }

    let password_hash = hash_password(&state, password).await?;
    let user = match users.insert(&User::new(email, password_hash)).await {
        Ok(user) => user,
        // Lost a race with a concurrent registration for the same email.
        Err(DatabaseError::Duplicate) => return Ok(HttpResponse::Ok().json(already_exists)),
        Err(e) => return Err(e.into()),
    };

    let cookie = issue_session(&state, &user)?;
    info!(uid = %user.uid(), "user registered");
    Ok(HttpResponse::Ok().cookie(cookie).json(RegisterResponse {
        register_success: true,
        res_string: "Registered successfully",
    }))
}

pub async fn verify_token(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = req
        .cookie(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default();
    let now = Utc::now();

    if !state.tokens.verify(&token, now) {
        return Err(AuthError::InvalidToken.into());
    }

    let email = state.tokens.extract_claim(&token, now, "email").ok_or_else(|| {
        warn!("verified token without email");
        AuthError::MissingClaim("email")
    })?;
    let uid = state.tokens.extract_claim(&token, now, "uid").ok_or_else(|| {
        warn!("verified token without uid");
        AuthError::MissingClaim("uid")
    })?;

    Ok(HttpResponse::Ok().json(VerifyResponse {
        email,
        uid,
        verification_success: true,
    }))
}

pub async fn logout(state: web::Data<AppState>) -> HttpResponse {
    let mut cookie = session_cookie(&state, String::new());
    cookie.make_removal();
    HttpResponse::Ok().cookie(cookie).finish()
}
