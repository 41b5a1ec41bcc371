//! Shared application state

use crate::core::orchestrator::Orchestrator;

/// State handed to every route handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}
