use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input/output channel a model can consume or produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
            Modality::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modalities {
    pub input: Vec<Modality>,
    pub output: Vec<Modality>,
}

/// Capability bits, addressable by snake_case name on the query surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub streaming: bool,
    pub function_calling: bool,
    pub vision: bool,
    pub json_mode: bool,
    pub embeddings: bool,
    pub reasoning: bool,
}

impl Features {
    /// Look up a capability bit by its wire name. Unknown names yield `None`.
    pub fn get(&self, name: &str) -> Option<bool> {
        match name {
            "streaming" => Some(self.streaming),
            "function_calling" => Some(self.function_calling),
            "vision" => Some(self.vision),
            "json_mode" => Some(self.json_mode),
            "embeddings" => Some(self.embeddings),
            "reasoning" => Some(self.reasoning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub context_window: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    /// Provider id this model belongs to.
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub modalities: Modalities,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub open_weights: bool,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
}
