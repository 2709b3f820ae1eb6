//! Static provider and model registry
//!
//! Descriptors are compiled in and read-only for the process lifetime. API
//! keys are resolved from the environment variable each descriptor names.

use super::TokenUsage;

/// Model capability tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Balanced,
    Reasoning,
}

/// One LLM backend known to the router
#[derive(Debug, Clone, Copy)]
pub struct ProviderDescriptor {
    /// Stable id used in config and fallback lists
    pub id: &'static str,

    /// Display name
    pub name: &'static str,

    /// Default base URL
    pub base_url: &'static str,

    /// Environment variable holding the API key
    pub api_key_env: &'static str,

    /// Default model when no override is given
    pub default_model: &'static str,

    /// Whether a key must be present for the provider to count as configured
    pub requires_key: bool,
}

impl ProviderDescriptor {
    /// A provider is configured when its key env var is set (or no key is needed)
    pub fn is_configured(&self) -> bool {
        !self.requires_key || std::env::var(self.api_key_env).map(|v| !v.is_empty()).unwrap_or(false)
    }
}

/// One model known to the router
#[derive(Debug, Clone, Copy)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub provider: &'static str,
    pub tier: ModelTier,
    pub capabilities: &'static [&'static str],
    pub free: bool,
    pub context_window: u32,
    /// USD per million input tokens
    pub input_price: f64,
    /// USD per million output tokens
    pub output_price: f64,
}

pub static PROVIDERS: &[ProviderDescriptor] = &[
    ProviderDescriptor {
        id: "anthropic",
        name: "Anthropic",
        base_url: "https://api.anthropic.com",
        api_key_env: "ANTHROPIC_API_KEY",
        default_model: "claude-sonnet-4-20250514",
        requires_key: true,
    },
    ProviderDescriptor {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com",
        api_key_env: "OPENAI_API_KEY",
        default_model: "gpt-4o",
        requires_key: true,
    },
    ProviderDescriptor {
        id: "gemini",
        name: "Google Gemini",
        base_url: "https://generativelanguage.googleapis.com",
        api_key_env: "GEMINI_API_KEY",
        default_model: "gemini-2.0-flash",
        requires_key: true,
    },
    ProviderDescriptor {
        id: "ollama",
        name: "Ollama",
        base_url: "http://localhost:11434",
        api_key_env: "OLLAMA_API_KEY",
        default_model: "llama3.1",
        requires_key: false,
    },
    ProviderDescriptor {
        id: "compat",
        name: "OpenAI-compatible",
        base_url: "http://localhost:8000",
        api_key_env: "COMPAT_API_KEY",
        default_model: "default",
        requires_key: false,
    },
];

pub static MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "claude-sonnet-4-20250514",
        provider: "anthropic",
        tier: ModelTier::Balanced,
        capabilities: &["chat", "tools", "code"],
        free: false,
        context_window: 200_000,
        input_price: 3.0,
        output_price: 15.0,
    },
    ModelDescriptor {
        id: "claude-opus-4-20250514",
        provider: "anthropic",
        tier: ModelTier::Reasoning,
        capabilities: &["chat", "tools", "code", "reasoning"],
        free: false,
        context_window: 200_000,
        input_price: 15.0,
        output_price: 75.0,
    },
    ModelDescriptor {
        id: "claude-3-5-haiku-20241022",
        provider: "anthropic",
        tier: ModelTier::Fast,
        capabilities: &["chat", "tools"],
        free: false,
        context_window: 200_000,
        input_price: 0.8,
        output_price: 4.0,
    },
    ModelDescriptor {
        id: "gpt-4o",
        provider: "openai",
        tier: ModelTier::Balanced,
        capabilities: &["chat", "tools", "code"],
        free: false,
        context_window: 128_000,
        input_price: 2.5,
        output_price: 10.0,
    },
    ModelDescriptor {
        id: "gpt-4o-mini",
        provider: "openai",
        tier: ModelTier::Fast,
        capabilities: &["chat", "tools"],
        free: false,
        context_window: 128_000,
        input_price: 0.15,
        output_price: 0.6,
    },
    ModelDescriptor {
        id: "o3-mini",
        provider: "openai",
        tier: ModelTier::Reasoning,
        capabilities: &["chat", "reasoning"],
        free: false,
        context_window: 200_000,
        input_price: 1.1,
        output_price: 4.4,
    },
    ModelDescriptor {
        id: "gemini-2.0-flash",
        provider: "gemini",
        tier: ModelTier::Fast,
        capabilities: &["chat", "tools"],
        free: true,
        context_window: 1_000_000,
        input_price: 0.1,
        output_price: 0.4,
    },
    ModelDescriptor {
        id: "gemini-2.5-pro",
        provider: "gemini",
        tier: ModelTier::Reasoning,
        capabilities: &["chat", "tools", "reasoning"],
        free: false,
        context_window: 1_000_000,
        input_price: 1.25,
        output_price: 10.0,
    },
    ModelDescriptor {
        id: "llama3.1",
        provider: "ollama",
        tier: ModelTier::Balanced,
        capabilities: &["chat"],
        free: true,
        context_window: 128_000,
        input_price: 0.0,
        output_price: 0.0,
    },
];

/// Look up a provider descriptor by id
pub fn provider(id: &str) -> Option<&'static ProviderDescriptor> {
    PROVIDERS.iter().find(|p| p.id == id)
}

/// Look up a model descriptor by id
pub fn model(id: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.id == id)
}

/// Pick a model tier from task wording. Reasoning words win over speed words;
/// code-related tasks land on the balanced tier.
pub fn tier_for_intent(task: &str) -> ModelTier {
    let lower = task.to_lowercase();

    if ["reason", "think", "plan", "architect"].iter().any(|w| lower.contains(w)) {
        ModelTier::Reasoning
    } else if ["fast", "quick", "summarize", "title"].iter().any(|w| lower.contains(w)) {
        ModelTier::Fast
    } else {
        ModelTier::Balanced
    }
}

/// Choose a model for a provider and task: the first provider model matching
/// the intent tier, falling back to the provider default.
pub fn model_for_intent(provider_id: &str, task: &str) -> &'static str {
    let tier = tier_for_intent(task);

    MODELS
        .iter()
        .find(|m| m.provider == provider_id && m.tier == tier)
        .map(|m| m.id)
        .or_else(|| provider(provider_id).map(|p| p.default_model))
        .unwrap_or("default")
}

/// Cost of a usage record under a model's per-million pricing. Unknown
/// models cost nothing rather than guessing.
pub fn cost_usd(model_id: &str, usage: &TokenUsage) -> f64 {
    match model(model_id) {
        Some(m) => {
            (usage.input_tokens as f64 / 1_000_000.0) * m.input_price
                + (usage.output_tokens as f64 / 1_000_000.0) * m.output_price
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_model_has_a_provider() {
        for m in MODELS {
            assert!(provider(m.provider).is_some(), "model {} orphaned", m.id);
        }
    }

    #[test]
    fn test_provider_defaults_are_registered() {
        for p in PROVIDERS {
            if p.id == "compat" {
                continue; // catch-all, model set is user-defined
            }
            assert!(model(p.default_model).is_some(), "provider {} default missing", p.id);
        }
    }

    #[test]
    fn test_intent_heuristic() {
        assert_eq!(tier_for_intent("think hard about the architecture"), ModelTier::Reasoning);
        assert_eq!(tier_for_intent("quick summary of the readme"), ModelTier::Fast);
        assert_eq!(tier_for_intent("refactor the parser"), ModelTier::Balanced);
    }

    #[test]
    fn test_model_for_intent_picks_tier() {
        assert_eq!(model_for_intent("anthropic", "plan the migration"), "claude-opus-4-20250514");
        assert_eq!(model_for_intent("openai", "quick check"), "gpt-4o-mini");
        // No matching tier falls back to the provider default
        assert_eq!(model_for_intent("ollama", "think about it"), "llama3.1");
    }

    #[test]
    fn test_cost_per_million() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };

        let cost = cost_usd("claude-sonnet-4-20250514", &usage);
        assert!((cost - 4.5).abs() < 1e-9);

        assert_eq!(cost_usd("unknown-model", &usage), 0.0);
    }
}
