//! Chat-completion client for OpenAI-compatible endpoints.
//!
//! Fred sends one user message per question to
//! `POST {base_url}/v1/chat/completions` and reads back
//! `choices[0].message.content`.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::ChatConfig;
use crate::embedding::resolve_api_key;

pub struct ChatClient {
    client: reqwest::Client,
    config: ChatConfig,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Send a single-turn prompt and return the model's reply.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = resolve_api_key(&self.config.api_key_env)?;
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("LLM request failed: {} {}", status.as_u16(), text);
        }

        let json: serde_json::Value = response.json().await?;
        Ok(extract_reply(&json))
    }
}

/// Pull the assistant text out of a completion response.
///
/// Falls back to the raw JSON when the response has no usable
/// `choices[0].message.content`.
pub fn extract_reply(json: &serde_json::Value) -> String {
    match json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
    {
        Some(content) if !content.is_empty() => content.trim().to_string(),
        _ => json.to_string(),
    }
}
