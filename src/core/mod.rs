//! Request orchestration core
//!
//! Layered strictly top-down: the orchestrator drives adapters, drivers,
//! middleware, and context assembly over the unified type system. Nothing
//! below this module knows about HTTP transport.

pub mod adapters;
pub mod context;
pub mod drivers;
pub mod middleware;
pub mod orchestrator;
pub mod pricing;
pub mod types;
