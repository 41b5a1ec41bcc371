//! Gateway configuration
//!
//! Everything arrives through flags or environment variables; `.env` files
//! are honored at startup. Per-user provider credentials live in connection
//! rows, never here — the optional process-level API keys only backstop
//! connections created without one.

use clap::Parser;

use crate::core::context::ContextStrategy;

#[derive(Debug, Clone, Parser)]
#[command(name = "gateway", about = "Multi-tenant LLM gateway", version)]
pub struct GatewayConfig {
    /// Address the HTTP surface binds
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: String,

    /// Database DSN (sqlite or postgres)
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://unigate.db?mode=rwc")]
    pub database_url: String,

    /// Context selection: "recent" or "smart"
    #[arg(long, env = "CONTEXT_STRATEGY", default_value = "recent")]
    pub context_strategy: String,

    /// Per-user request budget per minute
    #[arg(long, env = "RATE_LIMIT_RPM", default_value_t = 100)]
    pub requests_per_minute: u32,
}

impl GatewayConfig {
    pub fn strategy(&self) -> ContextStrategy {
        match self.context_strategy.as_str() {
            "smart" => ContextStrategy::Smart,
            _ => ContextStrategy::Recent,
        }
    }
}
