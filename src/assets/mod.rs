//! Static frontend files.
//!
//! Everything is read from `static_files.root`; bundled assets live under its
//! `assets/` directory.

use std::path::{Path, PathBuf};
use actix_web::{web, HttpResponse};
use tracing::{debug, warn};

use crate::AppState;

const NOT_FOUND_PAGE: &str = "<html><body><h1>404 Not Found</h1></body></html>";

pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    match ext.to_ascii_lowercase().as_str() {
        "html" => Some("text/html"),
        "js" => Some("text/javascript"),
        "css" => Some("text/css"),
        "json" => Some("application/json"),
        "png" => Some("image/png"),
        "svg" => Some("image/svg+xml"),
        "ico" => Some("image/x-icon"),
        _ => None,
    }
}

/// A single path segment that cannot climb out of the asset root.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound()
        .content_type("text/html")
        .body(NOT_FOUND_PAGE)
}

async fn send_file(root: &Path, relative: PathBuf, content_type: &str) -> HttpResponse {
    let path = root.join(relative);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!(path = %path.display(), "serving static file");
            HttpResponse::Ok().content_type(content_type).body(bytes)
        }
        Err(e) => {
            warn!(path = %path.display(), "static file unavailable: {}", e);
            not_found()
        }
    }
}

fn root(state: &AppState) -> PathBuf {
    PathBuf::from(&state.config.static_files.root)
}

async fn send_asset(state: &AppState, file_name: &str, content_type: &str) -> HttpResponse {
    if !is_plain_file_name(file_name) {
        warn!(file_name, "refusing suspicious asset name");
        return not_found();
    }
    send_file(&root(state), Path::new("assets").join(file_name), content_type).await
}

pub async fn index(state: web::Data<AppState>) -> HttpResponse {
    send_file(&root(&state), PathBuf::from("index.html"), "text/html").await
}

async fn manifest(state: web::Data<AppState>) -> HttpResponse {
    send_file(&root(&state), PathBuf::from("manifest.json"), "application/json").await
}

async fn asset_manifest(state: web::Data<AppState>) -> HttpResponse {
    send_file(&root(&state), PathBuf::from("asset-manifest.json"), "application/json").await
}

async fn favicon(state: web::Data<AppState>) -> HttpResponse {
    send_file(&root(&state), PathBuf::from("assets/favicon.ico"), "image/x-icon").await
}

async fn style(state: web::Data<AppState>, file: web::Path<String>) -> HttpResponse {
    send_asset(&state, &file, "text/css").await
}

async fn script(state: web::Data<AppState>, file: web::Path<String>) -> HttpResponse {
    send_asset(&state, &file, "text/javascript").await
}

async fn media(state: web::Data<AppState>, file: web::Path<String>) -> HttpResponse {
    let content_type = content_type_for(&file).unwrap_or("image/png");
    send_asset(&state, &file, content_type).await
}

async fn asset(state: web::Data<AppState>, file: web::Path<String>) -> HttpResponse {
    match content_type_for(&file) {
        Some(content_type) => send_asset(&state, &file, content_type).await,
        None => {
            warn!(file = %file, "unable to serve asset with unknown type");
            not_found()
        }
    }
}

async fn unmatched(path: web::Path<String>) -> HttpResponse {
    debug!(path = %path, "unmatched route");
    not_found()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/index.html", web::get().to(index))
        .route("/manifest.json", web::get().to(manifest))
        .route("/asset-manifest.json", web::get().to(asset_manifest))
        .route("/favicon.ico", web::get().to(favicon))
        .route("/static/css/{file}", web::get().to(style))
        .route("/static/js/{file}", web::get().to(script))
        .route("/static/media/{file}", web::get().to(media))
        .route("/assets/{file}", web::get().to(asset))
        .route("/{path}", web::get().to(unmatched));
}
