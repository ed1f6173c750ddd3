//! HTTP reasoning backend
//!
//! Supports the two provider shapes found in agreement configs:
//! - Completion (Hugging Face inference): `{"inputs", "parameters", "options"}`
//!   answered by `[{"generated_text"}]` or `{"generated_text"|"text"}`
//! - Chat (OpenRouter / OpenAI-compatible): `/chat/completions` answered by
//!   `{"choices": [{"message": {"content"}}]}`

use super::{BackendError, ReasoningBackend};
use crate::config::{AgentConfig, AgreementConfig, ApiShape};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client as HttpClient,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Longest response body kept in an HTTP error
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    inputs: &'a str,
    parameters: &'a Map<String, Value>,
    options: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Backend that reaches each configured agent over HTTP
pub struct HttpBackend {
    agents: AgreementConfig,
    http_client: HttpClient,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(agents: AgreementConfig, timeout: Duration) -> Result<Self, BackendError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("accord/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            agents,
            http_client,
            timeout,
        })
    }

    pub fn agents(&self) -> &AgreementConfig {
        &self.agents
    }

    fn build_headers(&self, agent: &AgentConfig) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let credential = agent.credential.trim();
        if !credential.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", credential)).map_err(|_| {
                BackendError::InvalidCredential(format!(
                    "credential contains characters not valid in an HTTP header ({} chars)",
                    credential.len()
                ))
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn post_json<B: Serialize>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<String, BackendError> {
        let response = self
            .http_client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }
        Ok(text)
    }

    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else {
            BackendError::Transport(e.to_string())
        }
    }

    async fn infer_completion(&self, agent: &AgentConfig, prompt: &str) -> Result<String, BackendError> {
        let body = CompletionRequest {
            inputs: prompt,
            parameters: &agent.parameters,
            options: &agent.options,
        };
        let text = self.post_json(&agent.endpoint, self.build_headers(agent)?, &body).await?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| BackendError::MalformedResponse(format!("{}: {}", e, text)))?;
        Ok(extract_generated_text(&value))
    }

    async fn infer_chat(&self, agent: &AgentConfig, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", agent.endpoint.trim_end_matches('/'));
        let body = ChatRequest {
            model: &agent.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let text = self.post_json(&url, self.build_headers(agent)?, &body).await?;
        let response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::MalformedResponse(format!("{}: {}", e, text)))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::MalformedResponse("response has no message content".to_string()))
    }
}

#[async_trait]
impl ReasoningBackend for HttpBackend {
    async fn infer(&self, agent: &str, prompt: &str) -> Result<String, BackendError> {
        let config = self
            .agents
            .get(agent)
            .ok_or_else(|| BackendError::UnknownAgent(agent.to_string()))?;

        tracing::debug!(
            "Inference request: agent={} provider={} model={} prompt_chars={}",
            agent,
            config.provider,
            config.model,
            prompt.len()
        );

        let started = std::time::Instant::now();
        let result = match config.provider.shape() {
            ApiShape::Completion => self.infer_completion(config, prompt).await,
            ApiShape::Chat => self.infer_chat(config, prompt).await,
        };

        match &result {
            Ok(text) => tracing::debug!(
                "Inference for {} completed in {:?} ({} chars)",
                agent,
                started.elapsed(),
                text.len()
            ),
            Err(e) => tracing::warn!("Inference for {} failed after {:?}: {}", agent, started.elapsed(), e),
        }
        result
    }
}

/// Pull generated text out of a completion-shape body, falling back to the
/// raw JSON when neither known field is present.
pub fn extract_generated_text(value: &Value) -> String {
    let field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    match value {
        Value::Array(items) => items
            .first()
            .and_then(|first| field(first, "generated_text"))
            .unwrap_or_else(|| value.to_string()),
        Value::Object(_) => field(value, "generated_text")
            .or_else(|| field(value, "text"))
            .unwrap_or_else(|| value.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn agent(provider: Provider, endpoint: String) -> AgentConfig {
        AgentConfig {
            provider,
            model: "test-model".to_string(),
            endpoint,
            credential: "secret-token".to_string(),
            parameters: Map::new(),
            options: Map::new(),
        }
    }

    fn backend_with(role: &str, config: AgentConfig) -> HttpBackend {
        let mut agents = AgreementConfig::default();
        agents.agents.insert(role.to_string(), config);
        HttpBackend::new(agents, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_extract_generated_text_shapes() {
        assert_eq!(extract_generated_text(&json!([{"generated_text": "a"}])), "a");
        assert_eq!(extract_generated_text(&json!({"generated_text": "b"})), "b");
        assert_eq!(extract_generated_text(&json!({"text": "c"})), "c");
        assert_eq!(extract_generated_text(&json!({"other": 1})), r#"{"other":1}"#);
        assert_eq!(extract_generated_text(&json!([{"label": "x"}])), r#"[{"label":"x"}]"#);
    }

    #[tokio::test]
    async fn test_completion_shape_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gpt2"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_partial_json(json!({"inputs": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"generated_text": "world"}])))
            .mount(&server)
            .await;

        let backend = backend_with(
            "right",
            agent(Provider::HuggingFace, format!("{}/models/gpt2", server.uri())),
        );
        assert_eq!(backend.infer("right", "hello").await.unwrap(), "world");
    }

    #[tokio::test]
    async fn test_chat_shape_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
            })))
            .mount(&server)
            .await;

        let backend = backend_with(
            "left",
            agent(Provider::OpenRouter, format!("{}/api/v1/", server.uri())),
        );
        assert_eq!(backend.infer("left", "hello").await.unwrap(), "hi there");
    }

    #[tokio::test]
    async fn test_http_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = backend_with("left", agent(Provider::OpenRouter, server.uri()));
        let err = backend.infer("left", "hello").await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Http {
                status: 503,
                body: "overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_chat_without_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let backend = backend_with("left", agent(Provider::OpenRouter, server.uri()));
        assert!(matches!(
            backend.infer("left", "hello").await,
            Err(BackendError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"text": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut agents = AgreementConfig::default();
        agents
            .agents
            .insert("right".to_string(), agent(Provider::HuggingFace, server.uri()));
        let backend = HttpBackend::new(agents, Duration::from_millis(200)).unwrap();
        assert!(matches!(
            backend.infer("right", "hello").await,
            Err(BackendError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let backend = HttpBackend::new(AgreementConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(
            backend.infer("middle", "hello").await.unwrap_err(),
            BackendError::UnknownAgent("middle".to_string())
        );
    }

    #[test]
    fn test_invalid_credential_rejected() {
        let mut config = agent(Provider::OpenRouter, "http://localhost".to_string());
        config.credential = "bad\ntoken".to_string();
        let backend = backend_with("left", config.clone());
        assert!(matches!(
            backend.build_headers(&config),
            Err(BackendError::InvalidCredential(_))
        ));
    }
}
