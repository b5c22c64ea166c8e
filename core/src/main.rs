mod cors;

use std::sync::Arc;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use common::env_config::Config;
use db::{DynStore, PgStore};
use plans::PlanCatalog;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // configuration and plan table fail fast, before anything binds
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
    };
    let catalog = match PlanCatalog::from_config(&config) {
        Ok(catalog) => catalog,
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
    };
    let config_data = config.clone();

    let is_production = config.environment == "production";
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup().expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, is_production)
        .await
        .expect("Failed to set up database");
    let store: DynStore = Arc::new(PgStore::new(pool, config.webhook_event_retention_days));

    let admin_enabled = config.admin_token.is_some();

    HttpServer::new(move || {
        let mut api = web::scope("/api")
            .service(api_billing::mount_billing())
            .service(web::scope("/secured").service(api_billing::mount_secured_billing()))
            .service(
                web::scope("/v1")
                    .wrap(limiter::usage_middleware())
                    .service(explainer::mount_explainer()),
            );
        if admin_enabled {
            api = api.service(api_billing::mount_admin());
        }

        App::new()
            .wrap(logger::middleware())
            .wrap(cors::middleware(&origin))
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(catalog.clone()))
            // Stripe posts here; mounted at the root, outside /api
            .service(api_billing::routes::webhook::post_webhook)
            .service(api)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
