//! HTTP chat provider. One client, three wire formats.

use async_trait::async_trait;
use evgate_core::config::{LlmConfig, OllamaConfig};
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{LlmError, LlmProvider, Message, Role};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub enum ChatBackend {
    OpenAi { api_key: String, base_url: String },
    Anthropic { api_key: String },
    Ollama { url: String },
}

impl ChatBackend {
    fn name(&self) -> &'static str {
        match self {
            ChatBackend::OpenAi { .. } => "openai",
            ChatBackend::Anthropic { .. } => "anthropic",
            ChatBackend::Ollama { .. } => "ollama",
        }
    }

    fn endpoint(&self) -> String {
        match self {
            ChatBackend::OpenAi { base_url, .. } => format!("{}/v1/chat/completions", base_url),
            ChatBackend::Anthropic { .. } => ANTHROPIC_URL.to_string(),
            ChatBackend::Ollama { url } => format!("{}/api/chat", url),
        }
    }

    /// Request body in this backend's wire format.
    pub fn request_body(&self, model: &str, messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        let turns = |include_system: bool| -> Vec<Value> {
            messages
                .iter()
                .filter(|m| include_system || m.role != Role::System)
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
                .collect()
        };
        match self {
            ChatBackend::OpenAi { .. } => json!({
                "model": model,
                "messages": turns(true),
                "temperature": temperature,
                "max_tokens": max_tokens,
            }),
            ChatBackend::Anthropic { .. } => {
                // System prompt travels as a top-level field.
                let system: Vec<&str> = messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str())
                    .collect();
                let mut body = json!({
                    "model": model,
                    "messages": turns(false),
                    "temperature": temperature,
                    "max_tokens": max_tokens,
                });
                if !system.is_empty() {
                    body["system"] = json!(system.join("\n\n"));
                }
                body
            }
            ChatBackend::Ollama { .. } => json!({
                "model": model,
                "messages": turns(true),
                "stream": false,
                "options": { "temperature": temperature, "num_predict": max_tokens },
            }),
        }
    }

    /// Pull the reply text out of a response body.
    pub fn extract_text(&self, resp: &Value) -> Result<String, LlmError> {
        let (text, path) = match self {
            ChatBackend::OpenAi { .. } => (resp["choices"][0]["message"]["content"].as_str(), "choices[0].message.content"),
            ChatBackend::Anthropic { .. } => (resp["content"][0]["text"].as_str(), "content[0].text"),
            ChatBackend::Ollama { .. } => (resp["message"]["content"].as_str(), "message.content"),
        };
        text.map(str::to_string)
            .ok_or_else(|| LlmError::ParseError(format!("missing {}", path)))
    }
}

pub struct HttpChatProvider {
    client: reqwest::Client,
    backend: ChatBackend,
    model: String,
}

impl HttpChatProvider {
    pub fn new(backend: ChatBackend, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for HttpChatProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let url = self.backend.endpoint();
        let body = self.backend.request_body(&self.model, &messages, temperature, max_tokens);

        debug!(backend = self.backend.name(), model = %self.model, "LLM request to {}", url);

        let mut request = self.client.post(&url).header("Content-Type", "application/json");
        request = match &self.backend {
            ChatBackend::OpenAi { api_key, .. } => request.header("Authorization", format!("Bearer {}", api_key)),
            ChatBackend::Anthropic { api_key } => request
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ChatBackend::Ollama { .. } => request,
        };

        let response = request.json(&body).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, body });
        }

        let resp: Value = response.json().await?;
        self.backend.extract_text(&resp)
    }

    fn label(&self) -> String {
        format!("{}:{}", self.backend.name(), self.model)
    }
}

/// Build the configured provider. `None` when the provider is `none`.
pub fn create_provider(
    llm_config: &LlmConfig,
    ollama_config: &OllamaConfig,
) -> Result<Option<Box<dyn LlmProvider>>, LlmError> {
    let provider = match llm_config.provider.as_str() {
        "" | "none" => return Ok(None),
        "openai" => {
            let api_key = llm_config
                .openai_api_key
                .clone()
                .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            let base_url = llm_config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string());
            HttpChatProvider::new(ChatBackend::OpenAi { api_key, base_url }, &llm_config.openai_model)
        }
        "anthropic" | "claude" => {
            let api_key = llm_config
                .anthropic_api_key
                .clone()
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
            HttpChatProvider::new(ChatBackend::Anthropic { api_key }, &llm_config.anthropic_model)
        }
        "ollama" => HttpChatProvider::new(
            ChatBackend::Ollama {
                url: ollama_config.url.clone(),
            },
            &ollama_config.model,
        ),
        other => {
            return Err(LlmError::NotConfigured(format!(
                "unknown LLM provider: '{}'",
                other
            )))
        }
    };
    Ok(Some(Box::new(provider)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<Message> {
        vec![Message::system("You are the Skeptic."), Message::user("Claim: X")]
    }

    #[test]
    fn anthropic_moves_system_prompt_out_of_messages() {
        let backend = ChatBackend::Anthropic { api_key: "k".into() };
        let body = backend.request_body("m", &conversation(), 0.1, 100);
        assert_eq!(body["system"], "You are the Skeptic.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn openai_keeps_system_turn() {
        let backend = ChatBackend::OpenAi {
            api_key: "k".into(),
            base_url: "http://localhost".into(),
        };
        let body = backend.request_body("gpt", &conversation(), 0.2, 50);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["max_tokens"], 50);
        assert_eq!(backend.endpoint(), "http://localhost/v1/chat/completions");
    }

    #[test]
    fn extract_text_per_backend() {
        let ollama = ChatBackend::Ollama { url: "u".into() };
        let text = ollama
            .extract_text(&json!({ "message": { "content": "hi" } }))
            .unwrap();
        assert_eq!(text, "hi");
        let err = ollama.extract_text(&json!({})).unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
    }

    #[test]
    fn none_provider_yields_no_client() {
        let mut llm = LlmConfig {
            provider: "none".into(),
            openai_api_key: None,
            openai_model: "gpt-4o".into(),
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_model: "claude".into(),
            temperature: 0.1,
            max_tokens: 256,
        };
        let ollama = OllamaConfig {
            url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
        };
        assert!(create_provider(&llm, &ollama).unwrap().is_none());

        llm.provider = "openai".into();
        assert!(matches!(
            create_provider(&llm, &ollama),
            Err(LlmError::NotConfigured(_))
        ));

        llm.provider = "ollama".into();
        let p = create_provider(&llm, &ollama).unwrap().unwrap();
        assert_eq!(p.label(), "ollama:llama3.2");
    }
}
