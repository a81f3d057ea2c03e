use chrono::TimeZone;
use chrono::Utc;

use crate::model::{Features, Limits, Modalities, Modality, Model, Provider};

/// A point-in-time view of what a registry knows about.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub providers: Vec<Provider>,
    pub models: Vec<Model>,
}

/// Upstream source of catalog truth. The built-in registry is an in-process
/// seed; real deployments swap in a remote-backed implementation.
pub trait ProviderRegistry: Send + Sync {
    fn snapshot(&self) -> RegistrySnapshot;
}

/// Static seed registry used by default and in tests.
pub struct BuiltinRegistry;

impl ProviderRegistry for BuiltinRegistry {
    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            providers: seed_providers(),
            models: seed_models(),
        }
    }
}

fn seed_providers() -> Vec<Provider> {
    vec![
        Provider {
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            homepage: Some("https://openai.com".to_string()),
        },
        Provider {
            id: "anthropic".to_string(),
            name: "Anthropic".to_string(),
            homepage: Some("https://anthropic.com".to_string()),
        },
        Provider {
            id: "meta".to_string(),
            name: "Meta".to_string(),
            homepage: Some("https://ai.meta.com".to_string()),
        },
    ]
}

fn seed_models() -> Vec<Model> {
    let text_io = Modalities {
        input: vec![Modality::Text],
        output: vec![Modality::Text],
    };
    let multimodal_in = Modalities {
        input: vec![Modality::Text, Modality::Image],
        output: vec![Modality::Text],
    };

    vec![
        Model {
            id: "gpt-4o".to_string(),
            name: "GPT-4o".to_string(),
            provider: "openai".to_string(),
            description: Some("Flagship multimodal model".to_string()),
            modalities: multimodal_in.clone(),
            features: Features {
                streaming: true,
                function_calling: true,
                vision: true,
                json_mode: true,
                ..Default::default()
            },
            tags: vec!["flagship".to_string(), "multimodal".to_string()],
            open_weights: false,
            limits: Limits {
                context_window: 128_000,
                output_tokens: 16_384,
            },
            released_at: Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).single(),
        },
        Model {
            id: "gpt-4o-mini".to_string(),
            name: "GPT-4o mini".to_string(),
            provider: "openai".to_string(),
            description: Some("Small, fast multimodal model".to_string()),
            modalities: multimodal_in.clone(),
            features: Features {
                streaming: true,
                function_calling: true,
                vision: true,
                json_mode: true,
                ..Default::default()
            },
            tags: vec!["small".to_string(), "multimodal".to_string()],
            open_weights: false,
            limits: Limits {
                context_window: 128_000,
                output_tokens: 16_384,
            },
            released_at: Utc.with_ymd_and_hms(2024, 7, 18, 0, 0, 0).single(),
        },
        Model {
            id: "claude-3-5-sonnet".to_string(),
            name: "Claude 3.5 Sonnet".to_string(),
            provider: "anthropic".to_string(),
            description: Some("Balanced intelligence and speed".to_string()),
            modalities: multimodal_in,
            features: Features {
                streaming: true,
                function_calling: true,
                vision: true,
                ..Default::default()
            },
            tags: vec!["flagship".to_string()],
            open_weights: false,
            limits: Limits {
                context_window: 200_000,
                output_tokens: 8_192,
            },
            released_at: Utc.with_ymd_and_hms(2024, 6, 20, 0, 0, 0).single(),
        },
        Model {
            id: "llama-3-70b".to_string(),
            name: "Llama 3 70B".to_string(),
            provider: "meta".to_string(),
            description: Some("Open-weights instruction model".to_string()),
            modalities: text_io,
            features: Features {
                streaming: true,
                ..Default::default()
            },
            tags: vec!["open".to_string()],
            open_weights: true,
            limits: Limits {
                context_window: 8_192,
                output_tokens: 4_096,
            },
            released_at: Utc.with_ymd_and_hms(2024, 4, 18, 0, 0, 0).single(),
        },
    ]
}
