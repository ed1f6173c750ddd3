use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reasoning backend provider
///
/// Each provider maps onto one of two wire shapes: a completion endpoint that
/// takes `inputs` and returns generated text, or a chat endpoint that returns
/// an OpenAI-style `choices` list.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    /// Hugging Face inference API (completion shape)
    ///
    /// `endpoint` is the full model URL; the request is posted to it as-is.
    #[default]
    HuggingFace,

    /// OpenRouter or any other OpenAI-compatible API (chat shape)
    ///
    /// `endpoint` is the API base; `/chat/completions` is appended.
    OpenRouter,
}

/// Wire shape used to talk to a provider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiShape {
    Completion,
    Chat,
}

impl Provider {
    pub fn shape(&self) -> ApiShape {
        match self {
            Provider::HuggingFace => ApiShape::Completion,
            Provider::OpenRouter => ApiShape::Chat,
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "huggingface" | "hf" | "completion" => Ok(Provider::HuggingFace),
            "openrouter" | "openai" | "chat" => Ok(Provider::OpenRouter),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.to_string()
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::HuggingFace => write!(f, "huggingface"),
            Provider::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// Connection settings for one negotiating agent.
///
/// Field aliases accept the `api_url` / `api_token` spelling used by existing
/// `hemisphere_api.json` files.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub model: String,
    #[serde(alias = "api_url")]
    pub endpoint: String,
    #[serde(alias = "api_token", default)]
    pub credential: String,
    /// Extra generation parameters, forwarded verbatim (completion shape only)
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Extra request options, forwarded verbatim (completion shape only)
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Mapping from role name (`left`, `right`, ...) to agent settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct AgreementConfig {
    pub agents: BTreeMap<String, AgentConfig>,
}

impl AgreementConfig {
    pub fn get(&self, role: &str) -> Option<&AgentConfig> {
        self.agents.get(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }
}
