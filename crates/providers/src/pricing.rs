//! Built-in pricing table used to fill `estimated_cost` in the LLM log.
//!
//! Prices are in USD per 1 million tokens. Unknown models cost 0.0 — the
//! estimate is observability data, never a gate.

use std::collections::HashMap;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Pricing table with built-in model prices.
pub struct PricingTable {
    prices: HashMap<&'static str, ModelPricing>,
}

impl PricingTable {
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // ── Anthropic ──────────────────────────────────────────────
        prices.insert("claude-sonnet-4", ModelPricing::new(3.0, 15.0));
        prices.insert("claude-opus-4", ModelPricing::new(15.0, 75.0));
        prices.insert("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0));
        prices.insert("claude-3-5-haiku", ModelPricing::new(0.8, 4.0));
        prices.insert("claude-haiku-35", ModelPricing::new(0.8, 4.0));

        // ── OpenAI ─────────────────────────────────────────────────
        prices.insert("gpt-4o", ModelPricing::new(2.5, 10.0));
        prices.insert("gpt-4o-mini", ModelPricing::new(0.15, 0.6));
        prices.insert("gpt-4-turbo", ModelPricing::new(10.0, 30.0));
        prices.insert("o1", ModelPricing::new(15.0, 60.0));
        prices.insert("o3-mini", ModelPricing::new(1.1, 4.4));

        // ── Hosted open-weight ─────────────────────────────────────
        prices.insert("moonshotai/kimi-k2.5", ModelPricing::new(0.6, 2.5));
        prices.insert("deepseek-r1", ModelPricing::new(0.55, 2.19));
        prices.insert("deepseek-v3", ModelPricing::new(0.27, 1.1));

        // Local inference is free.
        prices.insert("llama3", ModelPricing::new(0.0, 0.0));

        Self { prices }
    }

    /// Compute cost for a model call; 0.0 when the model is unknown.
    ///
    /// Matching is flexible: exact first, then the longest table key that is
    /// a prefix of the model name (so "claude-sonnet-4-20250514" matches
    /// "claude-sonnet-4").
    pub fn compute_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        if let Some(p) = self.prices.get(model) {
            return p.cost(input_tokens, output_tokens);
        }

        let model_lower = model.to_lowercase();
        let mut best: Option<(&str, &ModelPricing)> = None;
        for (key, pricing) in &self.prices {
            if model_lower.starts_with(&key.to_lowercase())
                && best.map(|(k, _)| key.len() > k.len()).unwrap_or(true)
            {
                best = Some((key, pricing));
            }
        }

        best.map(|(_, p)| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Convenience over a default table.
pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    PricingTable::with_defaults().compute_cost(model, input_tokens, output_tokens)
}
