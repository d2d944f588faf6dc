use actix_web::{web, HttpResponse};
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub res_string: &'static str,
    pub database_available: bool,
}

/// Accepts a cart payload. Orders are not persisted yet; the route only
/// confirms the body parsed and storage is reachable.
pub async fn checkout(
    body: web::Json<serde_json::Value>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.user_store()?;
    info!(items = body.get("items").and_then(|i| i.as_array()).map(Vec::len), "cart checked out");

    Ok(HttpResponse::Ok().json(CheckoutResponse {
        res_string: "Successfully checked out a cart",
        database_available: true,
    }))
}
