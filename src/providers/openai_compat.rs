//! OpenAI-compatible HTTP provider: `/chat/completions` for text,
//! `/audio/transcriptions` for STT, `/audio/speech` for TTS.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::providers::{AiProvider, CompletionRequest, CompletionResponse, Role};

/// Default timeout for the underlying HTTP client. Individual calls
/// override this with their own per-request timeout.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Provider speaking the OpenAI HTTP API shape. Works against any
/// compatible endpoint via `base_url`.
pub struct OpenAiCompatProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    chat_model: String,
    stt_model: String,
    tts_model: String,
    tts_voice: String,
    stt_timeout: Duration,
    tts_timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(name: &str, base_url: &str, api_key: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            name: name.to_string(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: "gpt-4o-mini".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            stt_timeout: Duration::from_secs(15),
            tts_timeout: Duration::from_secs(15),
        }
    }

    /// Per-call timeouts for the audio endpoints. Chat completions carry
    /// their own timeout on the request.
    pub fn with_call_timeouts(mut self, stt: Duration, tts: Duration) -> Self {
        self.stt_timeout = stt;
        self.tts_timeout = tts;
        self
    }

    pub fn with_chat_model(mut self, model: &str) -> Self {
        self.chat_model = model.to_string();
        self
    }

    pub fn with_stt_model(mut self, model: &str) -> Self {
        self.stt_model = model.to_string();
        self
    }

    pub fn with_tts_model(mut self, model: &str, voice: &str) -> Self {
        self.tts_model = model.to_string();
        self.tts_voice = voice.to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn map_status(&self, status: reqwest::StatusCode, body: String) -> ProviderError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return ProviderError::AuthFailed {
                provider: self.name.clone(),
            };
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return ProviderError::RateLimited {
                provider: self.name.clone(),
            };
        }
        ProviderError::RequestFailed {
            provider: self.name.clone(),
            reason: format!("HTTP {status}: {body}"),
        }
    }

    fn map_transport(&self, e: reqwest::Error, timeout: Duration) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                provider: self.name.clone(),
                timeout,
            }
        } else {
            ProviderError::RequestFailed {
                provider: self.name.clone(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({"role": role, "content": m.content})
            })
            .collect();

        let mut body = json!({
            "model": self.chat_model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        debug!(provider = %self.name, model = %self.chat_model, "Chat completion call");

        let resp = self
            .client
            .post(self.url("/chat/completions"))
            .timeout(request.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e, request.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.map_status(status, body));
        }

        let payload: serde_json::Value = resp.json().await.map_err(|e| {
            ProviderError::InvalidResponse {
                provider: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.name.clone(),
                reason: "missing choices[0].message.content".to_string(),
            })?
            .to_string();

        Ok(CompletionResponse { content })
    }

    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String, ProviderError> {
        let timeout = self.stt_timeout;
        let part = Part::bytes(audio.to_vec()).file_name(filename.to_string());
        let form = Form::new()
            .part("file", part)
            .text("model", self.stt_model.clone());

        let resp = self
            .client
            .post(self.url("/audio/transcriptions"))
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.map_status(status, body));
        }

        let payload: serde_json::Value = resp.json().await.map_err(|e| {
            ProviderError::InvalidResponse {
                provider: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        payload["text"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.name.clone(),
                reason: "missing text field".to_string(),
            })
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        let timeout = self.tts_timeout;
        let body = json!({
            "model": self.tts_model,
            "voice": self.tts_voice,
            "input": text,
        });

        let resp = self
            .client
            .post(self.url("/audio/speech"))
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.map_status(status, body));
        }

        let bytes = resp.bytes().await.map_err(|e| ProviderError::RequestFailed {
            provider: self.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let provider = OpenAiCompatProvider::new(
            "openai",
            "https://api.openai.com/v1/",
            SecretString::from("sk-test"),
        );
        assert_eq!(
            provider.url("/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn maps_auth_and_rate_limit_statuses() {
        let provider = OpenAiCompatProvider::new(
            "openai",
            "https://api.openai.com/v1",
            SecretString::from("sk-test"),
        );
        let err = provider.map_status(reqwest::StatusCode::UNAUTHORIZED, String::new());
        assert!(matches!(err, ProviderError::AuthFailed { .. }));
        let err = provider.map_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[test]
    fn call_timeouts_are_configurable() {
        let provider = OpenAiCompatProvider::new(
            "openai",
            "https://api.openai.com/v1",
            SecretString::from("sk-test"),
        )
        .with_call_timeouts(Duration::from_secs(20), Duration::from_secs(25));
        assert_eq!(provider.stt_timeout, Duration::from_secs(20));
        assert_eq!(provider.tts_timeout, Duration::from_secs(25));
    }
}
