// src/provider/openai.rs — OpenAI / Azure OpenAI chat + embeddings provider

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelProvider, Role, StopReason, TokenUsage, ToolCall};
use crate::infra::config::ModelsConfig;
use crate::infra::errors::CopilotError;

/// Which flavour of the chat-completions API to speak.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFlavor {
    /// `Authorization: Bearer`, model in the body.
    OpenAI,
    /// `api-key` header, model is the deployment name in the path.
    Azure { api_version: String },
}

pub struct OpenAIProvider {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    flavor: ApiFlavor,
    embedding_model: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com/v1".into())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            flavor: ApiFlavor::OpenAI,
            embedding_model: "text-embedding-3-small".into(),
        }
    }

    /// Build from the `[models]` config section. The API key is read from
    /// the configured environment variable.
    pub fn from_config(cfg: &ModelsConfig) -> Result<Self, CopilotError> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            CopilotError::Config(format!(
                "Missing API key: set the {} environment variable",
                cfg.api_key_env
            ))
        })?;
        let flavor = match cfg.provider.as_str() {
            "openai" => ApiFlavor::OpenAI,
            "azure" => ApiFlavor::Azure {
                api_version: cfg.api_version.clone(),
            },
            other => {
                return Err(CopilotError::Config(format!(
                    "Unknown model provider '{other}' (expected \"openai\" or \"azure\")"
                )))
            }
        };
        let mut provider = Self::with_base_url(api_key, cfg.base_url.clone());
        provider.flavor = flavor;
        provider.embedding_model = cfg.embedding_model.clone();
        Ok(provider)
    }

    fn endpoint(&self, operation: &str, model: &str) -> String {
        match &self.flavor {
            ApiFlavor::OpenAI => format!("{}/{}", self.base_url, operation),
            ApiFlavor::Azure { api_version } => format!(
                "{}/openai/deployments/{}/{}?api-version={}",
                self.base_url, model, operation, api_version
            ),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.flavor {
            ApiFlavor::OpenAI => builder.header("Authorization", format!("Bearer {}", self.api_key)),
            ApiFlavor::Azure { .. } => builder.header("api-key", &self.api_key),
        }
    }

    async fn post_json(
        &self,
        url: String,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, CopilotError> {
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| CopilotError::Provider {
                provider: self.id().into(),
                message: e.to_string(),
                retriable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(5000);
            return Err(CopilotError::RateLimited {
                provider: self.id().into(),
                retry_after_ms,
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CopilotError::Provider {
                provider: self.id().into(),
                message: format!(
                    "HTTP {}: {}",
                    status,
                    crate::util::truncate_str(&error_body, 500)
                ),
                retriable: status.is_server_error(),
            });
        }

        response.json().await.map_err(|e| CopilotError::Provider {
            provider: self.id().into(),
            message: format!("Failed to parse response: {}", e),
            retriable: false,
        })
    }
}

/// Serialize the role-tagged conversation into chat-completions messages.
pub(crate) fn build_messages(request: &ChatRequest) -> Vec<serde_json::Value> {
    let mut msgs = Vec::new();

    if let Some(system) = &request.system {
        msgs.push(serde_json::json!({
            "role": "system",
            "content": system,
        }));
    }

    for m in &request.messages {
        let role = match m.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let mut msg = serde_json::json!({
            "role": role,
            "content": m.content,
        });
        if let Some(tc_id) = &m.tool_call_id {
            msg["tool_call_id"] = serde_json::json!(tc_id);
        }
        msgs.push(msg);
    }
    msgs
}

/// Pull content, tool calls, usage and stop reason out of a completion body.
pub(crate) fn parse_chat_response(resp: &serde_json::Value) -> ChatResponse {
    let choice = &resp["choices"][0];
    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let tool_calls = choice["message"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|tc| ToolCall {
                    id: tc["id"].as_str().unwrap_or("").to_string(),
                    name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                    arguments: serde_json::from_str(
                        tc["function"]["arguments"].as_str().unwrap_or("{}"),
                    )
                    .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let count = |field: &str| {
        let n = resp["usage"][field].as_u64().unwrap_or(0);
        u32::try_from(n).unwrap_or(u32::MAX)
    };
    let usage = TokenUsage {
        input_tokens: count("prompt_tokens"),
        output_tokens: count("completion_tokens"),
    };

    let stop_reason = match choice["finish_reason"].as_str() {
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") => StopReason::ToolUse,
        _ => StopReason::Unknown,
    };

    ChatResponse {
        content,
        tool_calls,
        usage,
        stop_reason,
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn id(&self) -> &str {
        match self.flavor {
            ApiFlavor::OpenAI => "openai",
            ApiFlavor::Azure { .. } => "azure",
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, CopilotError> {
        let mut body = serde_json::json!({
            "messages": build_messages(&request),
        });
        if self.flavor == ApiFlavor::OpenAI {
            body["model"] = serde_json::json!(request.model);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        let resp = self
            .post_json(self.endpoint("chat/completions", &request.model), &body)
            .await?;
        Ok(parse_chat_response(&resp))
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CopilotError> {
        let mut body = serde_json::json!({ "input": texts });
        if self.flavor == ApiFlavor::OpenAI {
            body["model"] = serde_json::json!(self.embedding_model);
        }

        let resp = self
            .post_json(self.endpoint("embeddings", &self.embedding_model), &body)
            .await?;

        let embeddings = resp["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|d| {
                        d["embedding"]
                            .as_array()
                            .map(|v| v.iter().map(|x| x.as_f64().unwrap_or(0.0) as f32).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    fn azure() -> OpenAIProvider {
        let mut p = OpenAIProvider::with_base_url("k".into(), "https://acme.openai.azure.com/".into());
        p.flavor = ApiFlavor::Azure {
            api_version: "2024-02-01".into(),
        };
        p
    }

    #[test]
    fn test_openai_endpoint() {
        let p = OpenAIProvider::new("k".into());
        assert_eq!(
            p.endpoint("chat/completions", "gpt-4.1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(p.id(), "openai");
    }

    #[test]
    fn test_azure_endpoint_uses_deployment() {
        let p = azure();
        assert_eq!(
            p.endpoint("chat/completions", "layout-gpt"),
            "https://acme.openai.azure.com/openai/deployments/layout-gpt/chat/completions?api-version=2024-02-01"
        );
        assert_eq!(p.id(), "azure");
    }

    #[test]
    fn test_build_messages_with_system() {
        let req = ChatRequest {
            system: Some("be terse".into()),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let msgs = build_messages(&req);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["role"], "user");
        assert_eq!(msgs[1]["content"], "hi");
    }

    #[test]
    fn test_parse_chat_response_content() {
        let body = serde_json::json!({
            "choices": [{
                "message": {"content": "{\"ok\": true}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        });
        let resp = parse_chat_response(&body);
        assert_eq!(resp.content, "{\"ok\": true}");
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.usage.total(), 16);
        assert!(matches!(resp.stop_reason, StopReason::EndTurn));
    }

    #[test]
    fn test_parse_chat_response_oversized_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": ""}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 5_000_000_000u64, "completion_tokens": 7}
        });
        let resp = parse_chat_response(&body);
        assert_eq!(resp.usage.input_tokens, u32::MAX);
        assert_eq!(resp.usage.output_tokens, 7);
        assert_eq!(resp.usage.total(), u32::MAX);
    }

    #[test]
    fn test_parse_chat_response_tool_call() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {
                            "name": "rag_tool",
                            "arguments": "{\"query\": \"aisle width\", \"top_k\": 4}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let resp = parse_chat_response(&body);
        assert_eq!(resp.content, "");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "rag_tool");
        assert_eq!(resp.tool_calls[0].arguments["top_k"], 4);
        assert!(matches!(resp.stop_reason, StopReason::ToolUse));
    }

    #[test]
    fn test_from_config_unknown_provider() {
        std::env::set_var("LAYOUT_COPILOT_TEST_KEY", "secret");
        let cfg = ModelsConfig {
            provider: "bogus".into(),
            api_key_env: "LAYOUT_COPILOT_TEST_KEY".into(),
            ..Default::default()
        };
        assert!(matches!(
            OpenAIProvider::from_config(&cfg),
            Err(CopilotError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_missing_key() {
        let cfg = ModelsConfig {
            api_key_env: "LAYOUT_COPILOT_DEFINITELY_UNSET".into(),
            ..Default::default()
        };
        let err = OpenAIProvider::from_config(&cfg).err().unwrap();
        assert!(err.to_string().contains("LAYOUT_COPILOT_DEFINITELY_UNSET"));
    }
}
