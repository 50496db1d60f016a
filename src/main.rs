mod config;
mod db;
mod errors;
mod handlers;
mod idempotency;
mod logger;
mod models;
mod normalize;
mod routes;
mod security;
mod store;
mod swagger;
mod validation;

use config::{AppConfig, Configs};
use db::get_db;
use std::path::Path;
use warp::Filter;

#[tokio::main]
async fn main() -> mongodb::error::Result<()> {
    logger::start_log();

    let cfg = AppConfig::from_env();
    let db = get_db().await?;

    // MQTT ingress runs beside the HTTP server for the process lifetime
    let mqtt_db = db.clone();
    tokio::spawn(async move {
        let config = std::env::var("MQTT_CONFIG")
            .expect("You must set the MQTT_CONFIG environment var!");
        let config_path = Path::new(&config);
        match Configs::load_from_file(config_path) {
            Ok(configs) => {
                log::info!("MQTT configurations loaded");
                handlers::mqtt_handlers::mqtt::run_mqtt(configs.mqtt, mqtt_db).await;
            }
            Err(e) => {
                log::error!("Failed to load MQTT configurations: {}", e);
                std::process::exit(1);
            }
        }
    });

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "x-hydroiot-token"])
        .allow_methods(vec!["GET", "POST", "HEAD"]);

    let port = cfg.port;
    let routes = routes::all_routes(cfg, db)
        .recover(errors::handle_rejection)
        .with(cors);

    log::info!("Server listening on 0.0.0.0:{}", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
