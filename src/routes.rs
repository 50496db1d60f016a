use crate::config::AppConfig;
use crate::handlers;
use crate::security;
use crate::swagger;
use chrono::Utc;
use serde::de::DeserializeOwned;
use utoipa::OpenApi;
use warp::{self, Filter};
use warp_rate_limit::{with_rate_limit, RateLimitConfig};

pub fn all_routes(
    cfg: AppConfig,
    db: mongodb::Database,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let swagger_config = swagger::doc_config();

    let root = warp::path::end().map(|| "HydroIoT server is running.");

    let health = warp::path!("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({ "ok": true, "time": Utc::now().to_rfc3339() }))
    });

    let ready = warp::path!("ready")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "ready": true })));

    let api_doc = warp::path("api-doc.json")
        .and(warp::get())
        .map(|| warp::reply::json(&swagger::HydroIotDoc::openapi()));

    let swagger_ui = warp::path("docs")
        .and(warp::get())
        .and(warp::path::full())
        .and(warp::path::tail())
        .and(warp::any().map(move || swagger_config.clone()))
        .and_then(swagger::serve_swagger);

    let webhook_route = warp::path!("webhook" / "telemetry")
        .and(warp::post())
        .and(security::with_token(cfg.clone()))
        .and(with_json_body())
        .and(with_db(db.clone()))
        .and_then(handlers::webhook::webhook_telemetry_handler);

    let latest_route = warp::path!("api" / "telemetry" / "latest")
        .and(warp::get())
        .and(security::with_token(cfg.clone()))
        .and(warp::query())
        .and(with_db(db.clone()))
        .and_then(handlers::telemetry::telemetry_latest_handler);

    let list_route = warp::path!("api" / "telemetry" / "list")
        .and(warp::get())
        .and(security::with_token(cfg.clone()))
        .and(warp::query())
        .and(with_db(db.clone()))
        .and_then(handlers::telemetry::telemetry_list_handler);

    let stream_route = warp::path!("api" / "telemetry" / "stream")
        .and(warp::get())
        .and(warp::query())
        .and(with_cfg(cfg.clone()))
        .and(with_db(db.clone()))
        .and_then(handlers::telemetry::telemetry_stream_handler);

    // 60 requests per 60 seconds
    let stream_url_rate_limit = RateLimitConfig::max_per_window(60, 60);

    let stream_url_route = warp::path!("api" / "telemetry" / "stream-url")
        .and(warp::post())
        .and(security::with_token(cfg.clone()))
        .and(with_rate_limit(stream_url_rate_limit))
        .and(with_json_body())
        .and(with_cfg(cfg))
        .and_then(handlers::telemetry::stream_url_handler);

    root.or(health)
        .or(ready)
        .or(api_doc)
        .or(swagger_ui)
        .or(webhook_route)
        .or(latest_route)
        .or(list_route)
        .or(stream_route)
        .or(stream_url_route)
}

fn with_db(
    db: mongodb::Database,
) -> impl Filter<Extract = (mongodb::Database,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || db.clone())
}

fn with_cfg(
    cfg: AppConfig,
) -> impl Filter<Extract = (AppConfig,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || cfg.clone())
}

fn with_json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(1024 * 1024).and(warp::body::json())
}
