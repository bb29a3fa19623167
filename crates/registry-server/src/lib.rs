//! Bootstrap/wiring for the fulcrum registry: reads [`RegistryConfig`],
//! connects the routing store and the external document store,
//! constructs every service crate named in spec §2, spawns a consumer
//! task per inbound message-bus channel plus the purge sweeper, and
//! serves a `/health` endpoint.
//!
//! Grounded on `crates/server/src/lib.rs` (`rbp-server`) — the teacher's
//! own `HttpServer::new(move || App::new()...)` shape, `Logger`/`Cors`
//! middleware, and `web::Data` app-state injection — generalized from a
//! database-pool health check to one that pings the routing store, the
//! registry's one critical dependency.
pub mod console;
pub mod wiring;

pub use wiring::RegistryApp;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::web;
use actix_web::App;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::Responder;
use registry_core::RegistryConfig;
use std::sync::Arc;

async fn health(app: web::Data<Arc<RegistryApp>>) -> impl Responder {
    match app.store.get_occupancy(&registry_core::SlotId::from("__health__")).await {
        Ok(_) => HttpResponse::Ok().body("ok"),
        Err(err) => {
            log::error!("[server] health check failed: {err}");
            HttpResponse::ServiceUnavailable().body("routing store unavailable")
        }
    }
}

/// Builds the full dependency graph, spawns the bus consumers and the
/// purge sweeper, and serves `/health` until the process is signalled
/// to stop. Mirrors `rbp_server::run()`'s shape exactly, generalized
/// from a single actix app-data struct to the registry's own wiring
/// struct.
#[rustfmt::skip]
pub async fn run() -> std::io::Result<()> {
    let config = RegistryConfig::from_env();
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".to_string());

    let app = wiring::RegistryApp::connect(config)
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    let app = Arc::new(app);

    app.spawn_bus_consumers();
    app.sweeper.clone().spawn();

    let data = web::Data::new(app);
    log::info!("[server] starting fulcrum registry on {bind_addr}");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%r %s %Ts"))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header(),
            )
            .app_data(data.clone())
            .route("/health", web::get().to(health))
    })
    .bind(bind_addr)?
    .run()
    .await
}
