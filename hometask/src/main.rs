use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, web};
use std::sync::Arc;

use hometask::api;
use hometask::config::Config;
use hometask::db;
use hometask::integrations::{RestClient, Sources, TaskWriter};
use hometask::services::alarm_store::{AlarmStore, SqliteAlarmStore};
use hometask::services::session::SessionStore;

#[get("/")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "HomeTask",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match db::init_pool(&config.database_url) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Could not open alarm store {}: {}", config.database_url, e);
            std::process::exit(1);
        }
    };

    let client = Arc::new(
        RestClient::new(&config.api_url, SessionStore::new(&config.session_file))
            .with_credentials(config.credentials.clone()),
    );
    let sources = Sources::from_client(client.clone());
    let writer: Arc<dyn TaskWriter> = client;
    let store: Arc<dyn AlarmStore> = Arc::new(SqliteAlarmStore::new(pool));

    log::info!("Starting HomeTask at http://{}", config.bind);
    log::info!("Scheduling server: {}", config.api_url);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(sources.clone()))
            .app_data(web::Data::new(writer.clone()))
            .app_data(web::Data::new(store.clone()))
            .service(health_check)
            .configure(api::config)
    })
    .bind(config.bind.as_str())?
    .run()
    .await
}
