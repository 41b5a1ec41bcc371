//! HTTP surface
//!
//! Thin actix-web wiring over the orchestration core: the unified chat
//! endpoints, the OpenAI-compatible facade, and CRUD for connections and
//! sessions. Authentication is an external collaborator; the authenticated
//! identity arrives in the `x-user-id` header and crosses into the core
//! through exactly one extractor.

pub mod routes;
pub mod state;

pub use state::AppState;

use actix_web::{App, HttpServer, web};

use crate::config::GatewayConfig;
use crate::core::orchestrator::Orchestrator;

/// Serve until shutdown
pub async fn run(config: &GatewayConfig, orchestrator: Orchestrator) -> std::io::Result<()> {
    let state = AppState::new(orchestrator);
    tracing::info!(bind = %config.bind_addr, "gateway listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
