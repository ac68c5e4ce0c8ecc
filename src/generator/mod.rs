// src/generator/mod.rs — Structured-output generator
//
// One model call per `generate`. Transport problems come back as
// `Err(CopilotError)`; text that can't be decoded into the target schema
// comes back as `Ok(Generated::Failure)` carrying the raw text.

pub mod extract;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use crate::core::types::{AuditKind, AuditLog, Stage};
use crate::infra::errors::CopilotError;
use crate::provider::{ChatRequest, ChatResponse, Message, ModelProvider};

pub use schema::{OutputSchema, SchemaContext};

/// Model text that did not decode into the requested schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTextFailure {
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generated<T> {
    Success(T),
    Failure(RawTextFailure),
}

impl<T> Generated<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Generated::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Generated::Success(v) => Some(v),
            Generated::Failure(_) => None,
        }
    }
}

/// Decode raw model text into `T`. Never panics, never errors.
pub fn decode<T: OutputSchema>(raw: &str, ctx: &SchemaContext) -> Generated<T> {
    let result = extract::parse_document(raw).and_then(|doc| schema::decode_document::<T>(doc, ctx));
    match result {
        Ok(value) => Generated::Success(value),
        Err(reason) => Generated::Failure(RawTextFailure {
            raw: raw.to_string(),
            reason,
        }),
    }
}

pub struct StructuredGenerator {
    provider: Arc<dyn ModelProvider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    call_timeout: Option<Duration>,
}

impl StructuredGenerator {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 2000,
            call_timeout: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Bound each model call, including any retries the provider performs.
    /// A call that overruns fails with `CopilotError::Timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Single user-turn request with this generator's model settings.
    pub fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            system: None,
        }
    }

    /// Send `request`, applying the per-call timeout.
    pub async fn call(&self, request: ChatRequest, stage: Stage) -> Result<ChatResponse, CopilotError> {
        let fut = self.provider.chat(request);
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                CopilotError::Timeout {
                    stage: stage.to_string(),
                    after_ms: limit.as_millis() as u64,
                }
            })?,
            None => fut.await,
        }
    }

    /// Ask the model for a `T`. The raw reply is appended to `audit` whatever
    /// the outcome; a decode failure is additionally recorded as `Malformed`.
    pub async fn generate<T: OutputSchema>(
        &self,
        prompt: &str,
        ctx: &SchemaContext,
        audit: &mut AuditLog,
        iteration: u32,
        stage: Stage,
    ) -> Result<Generated<T>, CopilotError> {
        let response = self.call(self.request(prompt), stage).await?;

        tracing::debug!(
            stage = %stage,
            model = %self.model,
            tokens = response.usage.total(),
            "Model reply received"
        );
        audit.record(iteration, stage, AuditKind::ModelMessage, response.content.clone());

        let generated = decode::<T>(&response.content, ctx);
        if let Generated::Failure(ref failure) = generated {
            tracing::warn!(
                stage = %stage,
                iteration,
                reason = %failure.reason,
                raw = %crate::util::preview(&failure.raw, 500),
                "Unusable {} from model",
                T::NAME
            );
            audit.record(
                iteration,
                stage,
                AuditKind::Malformed,
                format!("{}: {}", T::NAME, failure.reason),
            );
        }
        Ok(generated)
    }
}
