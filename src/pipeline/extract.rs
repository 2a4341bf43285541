//! Extraction client: send one encoded invoice to the VLM and parse the reply.
//!
//! [`InvoiceExtractor`] is the seam the orchestrator depends on. The
//! production implementation, [`LlmExtractor`], sits on top of any
//! `edgequake_llm` provider; tests plug in scripted extractors instead.
//!
//! ## One attempt per call
//!
//! Unlike bulk conversion pipelines, an extraction here is never retried
//! internally. A failed document shows up as ERROR in the session and the
//! user decides whether to analyse it again.

use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, InvoiceError};
use crate::model::InvoiceData;
use crate::pipeline::encode::EncodedDocument;
use crate::prompts::{extraction_request_text, DEFAULT_EXTRACTION_PROMPT, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Turns one encoded document into structured invoice fields.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    /// Perform a single extraction attempt.
    async fn extract(&self, document: &EncodedDocument) -> Result<InvoiceData, ExtractionError>;
}

/// [`InvoiceExtractor`] backed by a vision-capable LLM provider.
pub struct LlmExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    request_text: String,
    options: CompletionOptions,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let instruction = config
            .extraction_prompt
            .as_deref()
            .unwrap_or(DEFAULT_EXTRACTION_PROMPT);

        Self {
            provider,
            system_prompt,
            request_text: extraction_request_text(instruction),
            options: build_options(config),
        }
    }

    /// Resolve a provider from the config / environment and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, InvoiceError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn build_messages(&self, image: ImageData) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(self.request_text.as_str(), vec![image]),
        ]
    }
}

#[async_trait]
impl InvoiceExtractor for LlmExtractor {
    async fn extract(&self, document: &EncodedDocument) -> Result<InvoiceData, ExtractionError> {
        let (content_type, payload) = document.parts().map_err(|e| ExtractionError::Encoding {
            detail: e.to_string(),
        })?;
        let image = ImageData::new(payload.to_string(), content_type).with_detail("high");
        let messages = self.build_messages(image);

        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ExtractionError::Provider {
                detail: e.to_string(),
            })?;

        debug!(
            "Extraction: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        parse_invoice(&response.content)
    }
}

// ── Response parsing ─────────────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*?)\n?```$").unwrap());

/// Parse the model's reply into [`InvoiceData`].
///
/// Models sometimes wrap JSON in a ```json fence despite being told not to;
/// that outer fence is stripped before parsing.
pub fn parse_invoice(text: &str) -> Result<InvoiceData, ExtractionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    let json = match RE_JSON_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => trimmed,
    };

    serde_json::from_str(json).map_err(|e| ExtractionError::InvalidResponse {
        detail: e.to_string(),
    })
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InvoiceError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the API key is
///    read from the provider's usual variable (`OPENAI_API_KEY`, …).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| InvoiceError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;

    const WELL_FORMED: &str = r#"{
        "invoiceDate": "2024-05-02",
        "invoiceNumber": "A-100",
        "poNumber": "PO-9",
        "totalAmount": 1000,
        "currency": "USD",
        "items": [
            {"description": "Widget", "quantity": 2, "unitPrice": 500, "total": 1000}
        ]
    }"#;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn parses_well_formed_reply() {
        let data = parse_invoice(WELL_FORMED).unwrap();
        assert_eq!(data.invoice_number, "A-100");
        assert_eq!(data.po_number, "PO-9");
        assert_eq!(data.quotation_number, "");
        assert_eq!(data.total_amount, 1000.0);
        assert_eq!(data.items, vec![LineItem::new("Widget", 2.0, 500.0, 1000.0)]);
    }

    #[test]
    fn strips_json_fence() {
        let fenced = format!("```json\n{WELL_FORMED}\n```");
        assert_eq!(parse_invoice(&fenced).unwrap().invoice_number, "A-100");
        let bare_fence = format!("```\n{WELL_FORMED}\n```");
        assert_eq!(parse_invoice(&bare_fence).unwrap().currency, "USD");
    }

    #[test]
    fn empty_reply_is_empty_response() {
        assert_eq!(parse_invoice(""), Err(ExtractionError::EmptyResponse));
        assert_eq!(parse_invoice(" \n\t"), Err(ExtractionError::EmptyResponse));
    }

    #[test]
    fn non_json_reply_is_invalid() {
        let err = parse_invoice("Sorry, I cannot read this invoice.").unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidResponse { .. }));
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let err = parse_invoice(r#"{"invoiceNumber": "X", "totalAmount": 1, "items": []}"#)
            .unwrap_err();
        match err {
            ExtractionError::InvalidResponse { detail } => assert!(detail.contains("invoiceDate")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
