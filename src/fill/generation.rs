//! Contract between the fill loop and a text-generation backend.
//! Transport, retries and backoff belong to the implementation; the fill loop only
//! sees the final outcome of each call.
use crate::fill::OptionsError;
use crate::fill::Usage;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Message reported for failures the client could not categorize.
pub const GENERIC_FAILURE: &str = "Failed to generate content";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    #[default]
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

impl Model {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }

    /// Parses a model name, case-insensitive. Accepts:
    /// - Gpt4o: "gpt-4o", "gpt4o"
    /// - Gpt4oMini: "gpt-4o-mini", "gpt4o-mini", "mini"
    /// - Gpt4Turbo: "gpt-4-turbo", "gpt-4", "gpt4"
    /// - Gpt35Turbo: "gpt-3.5-turbo", "gpt-35-turbo", "gpt-3.5"
    pub fn parse(name: &str) -> Result<Self, OptionsError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gpt-4o" | "gpt4o" => Ok(Self::Gpt4o),
            "gpt-4o-mini" | "gpt4o-mini" | "mini" => Ok(Self::Gpt4oMini),
            "gpt-4-turbo" | "gpt-4" | "gpt4" => Ok(Self::Gpt4Turbo),
            "gpt-3.5-turbo" | "gpt-35-turbo" | "gpt-3.5" => Ok(Self::Gpt35Turbo),
            _ => Err(OptionsError::UnknownModel(name.to_string())),
        }
    }
}

/// Model settings, passed to the client unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationSettings {
    pub model: Model,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: Model::default(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// A reference file supplied by the user.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_context: String,
    pub attachments: Vec<Attachment>,
    pub settings: GenerationSettings,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Generated {
    pub text: String,
    pub usage: Option<Usage>,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited by the generation backend")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Generation request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Generation backend error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error(transparent)]
    Uncategorized(#[from] anyhow::Error),
}

impl GenerationError {
    /// Whether the failure was transient upstream, as opposed to a rejected request.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } | Self::Server { .. }
        )
    }

    /// Message recorded on the failed cell.
    pub fn cell_message(&self) -> String {
        match self {
            Self::Uncategorized(_) => GENERIC_FAILURE.to_owned(),
            error => error.to_string(),
        }
    }
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Generated, GenerationError>;
}
