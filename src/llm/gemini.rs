use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::analysis::types::{ContentPart, ModelInvocation};
use crate::config::Config;
use crate::llm::media::gemini_supports_image_mime;
use crate::llm::AdviceModel;
use crate::utils::http::build_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: i32,
    pub safety_profile: String,
    pub timeout: Duration,
}

impl GeminiSettings {
    pub fn from_config(config: &Config) -> Self {
        GeminiSettings {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.clone(),
            temperature: config.gemini_temperature,
            max_output_tokens: config.gemini_max_output_tokens,
            safety_profile: config.gemini_safety_settings.clone(),
            timeout: Duration::from_secs(config.gemini_timeout_seconds),
        }
    }
}

/// `generateContent` client. One HTTP call per invocation, no retries.
pub struct GeminiClient {
    http: Client,
    settings: GeminiSettings,
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using standard defaults.",
                profile
            );
            "BLOCK_MEDIUM_AND_ABOVE"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn build_gemini_parts(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::InlineImage { mime_type, data } => {
                if !gemini_supports_image_mime(mime_type) {
                    warn!("Sending image with mime type {} that Gemini may reject", mime_type);
                }
                json!({
                    "inlineData": {
                        "mimeType": mime_type,
                        "data": general_purpose::STANDARD.encode(data)
                    }
                })
            }
        })
        .collect()
}

fn summarize_gemini_parts(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "text": truncate_for_log(text, 200) }),
            ContentPart::InlineImage { mime_type, data } => {
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data.len() } })
            }
        })
        .collect()
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    let finish_reasons: Vec<&str> = candidates
        .iter()
        .filter_map(|candidate| candidate.finish_reason.as_deref())
        .collect();
    let text_parts = candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .map(|parts| parts.iter().filter(|part| part.text.is_some()).count())
        .sum::<usize>();

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "finishReasons": finish_reasons,
        "blockReason": response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone()),
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn extract_text_from_response(response: GeminiResponse) -> Result<String> {
    let block_reason = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.clone());

    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        let parts = candidate
            .content
            .and_then(|content| content.parts)
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.text {
                if !text.trim().is_empty() {
                    text_parts.push(text);
                }
            }
        }
    }

    if text_parts.is_empty() {
        return Err(match block_reason {
            Some(reason) => anyhow!("Gemini blocked the request: {}", reason),
            None => anyhow!("Gemini returned no text"),
        });
    }

    Ok(text_parts.join("\n"))
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(anyhow!("Gemini API key is empty"));
        }
        let http = build_http_client(settings.timeout)?;
        Ok(GeminiClient { http, settings })
    }

    fn redact_api_key(&self, text: &str) -> String {
        let key = self.settings.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn build_payload(&self, invocation: &ModelInvocation) -> Value {
        let mut generation_config = Map::new();
        generation_config.insert("temperature".to_string(), json!(self.settings.temperature));
        generation_config.insert(
            "maxOutputTokens".to_string(),
            json!(self.settings.max_output_tokens),
        );
        if let Some(mime_type) = invocation.response_mime_type.as_deref() {
            generation_config.insert("responseMimeType".to_string(), json!(mime_type));
        }

        json!({
            "systemInstruction": { "parts": [{ "text": invocation.system_instruction }] },
            "contents": [{ "role": "user", "parts": build_gemini_parts(&invocation.parts) }],
            "generationConfig": Value::Object(generation_config),
            "safetySettings": build_safety_settings(&self.settings.safety_profile),
        })
    }

    async fn call_gemini_api(&self, payload: &Value) -> Result<GeminiResponse> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.base_url, self.settings.model
        );

        let response = match self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = self.redact_api_key(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                return Err(anyhow!("Gemini request failed: {}", err_text));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                self.redact_api_key(&detail)
            ));
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| anyhow!("Gemini response could not be decoded: {}", err))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = %self.settings.model, response = %summary);
        }
        Ok(value)
    }
}

#[async_trait]
impl AdviceModel for GeminiClient {
    async fn invoke(&self, invocation: &ModelInvocation) -> Result<String> {
        let payload = self.build_payload(invocation);
        if tracing::enabled!(tracing::Level::DEBUG) {
            let parts = Value::Array(summarize_gemini_parts(&invocation.parts));
            debug!(
                target: "llm.gemini",
                model = %self.settings.model,
                parts = %parts,
                response_mime_type = ?invocation.response_mime_type
            );
        }

        let metadata = json!({ "parts": invocation.parts.len() });
        log_llm_timing(
            "gemini",
            &self.settings.model,
            "generate_care_advice",
            Some(metadata),
            || async {
                let response = self.call_gemini_api(&payload).await?;
                extract_text_from_response(response)
            },
        )
        .await
    }
}
