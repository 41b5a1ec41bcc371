//! Model pricing table and cost estimation
//!
//! Two-level lookup: provider → model → cost per 1K tokens. Models absent
//! from the table cost zero, which also covers the whole openai-compatible
//! family (local servers bill nobody).

use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::types::Usage;

/// Cost per 1K tokens for one model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

const fn price(input: f64, output: f64) -> ModelPrice {
    ModelPrice { input, output }
}

static PRICING: Lazy<HashMap<&'static str, HashMap<&'static str, ModelPrice>>> = Lazy::new(|| {
    let mut table = HashMap::new();

    let mut openai = HashMap::new();
    openai.insert("gpt-4", price(0.03, 0.06));
    openai.insert("gpt-4-32k", price(0.06, 0.12));
    openai.insert("gpt-4-turbo", price(0.01, 0.03));
    openai.insert("gpt-4o", price(0.005, 0.015));
    openai.insert("gpt-4o-mini", price(0.00015, 0.0006));
    openai.insert("gpt-3.5-turbo", price(0.0005, 0.0015));
    table.insert("openai", openai);

    let mut anthropic = HashMap::new();
    anthropic.insert("claude-3-opus", price(0.015, 0.075));
    anthropic.insert("claude-3-5-sonnet", price(0.003, 0.015));
    anthropic.insert("claude-3-sonnet", price(0.003, 0.015));
    anthropic.insert("claude-3-5-haiku", price(0.0008, 0.004));
    anthropic.insert("claude-3-haiku", price(0.00025, 0.00125));
    table.insert("anthropic", anthropic);

    table
});

/// Price entry for a model, tolerating dated variants
///
/// Exact match first, then the longest table key the model name starts with
/// ("claude-3-haiku-20240307" resolves to "claude-3-haiku").
pub fn lookup(provider: &str, model: &str) -> Option<ModelPrice> {
    let models = PRICING.get(provider)?;
    if let Some(p) = models.get(model) {
        return Some(*p);
    }
    models
        .iter()
        .filter(|(key, _)| model.starts_with(*key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, p)| *p)
}

/// Estimated dollar cost of a usage record
pub fn estimate_cost(usage: &Usage, provider: &str, model: &str) -> f64 {
    match lookup(provider, model) {
        Some(p) => {
            p.input * f64::from(usage.prompt_tokens) / 1000.0
                + p.output * f64::from(usage.completion_tokens) / 1000.0
        }
        None => 0.0,
    }
}
