//! Minimal OpenAI-style client backing the /api/assistant endpoint.
//!
//! We only call chat.completions and request plain text. Calls are
//! instrumented and log model names and response sizes, never contents.
//! When no API key is configured the endpoint still answers with a local
//! stub so the flow can be exercised end to end.
//!
//! Which variant steers the model is decided entirely by the system prompt
//! handed in by the caller; hints vs. solutions is not enforced here.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::util::trunc_for_log;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant request failed: {0}")]
    Transport(String),
    #[error("assistant returned status {0}")]
    Status(u16),
    #[error("assistant response was empty or malformed")]
    Malformed,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a Python coding assistant embedded in a learning \
environment. Answer questions about the participant's code concisely.";

#[derive(Clone)]
pub struct Assistant {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessageReq {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessageReq>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

impl Assistant {
    /// Construct the client if we find OPENAI_API_KEY; otherwise return None
    /// and callers fall back to the stub.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .ok()?;

        Some(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }

    #[instrument(level = "info", skip(self, system_prompt, prompt, code), fields(model = %self.model, prompt_len = prompt.len()))]
    pub async fn reply(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        code: Option<&str>,
    ) -> Result<String, AssistantError> {
        let url = format!("{}/chat/completions", self.base_url);
        let user = build_user_message(prompt, code);
        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessageReq {
                    role: "system".into(),
                    content: system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT).into(),
                },
                ChatMessageReq {
                    role: "user".into(),
                    content: user,
                },
            ],
            temperature: 0.3,
        };

        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, "coach-survey-backend")
            .json(&req)
            .send()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            error!(target: "coach_backend", status = status.as_u16(), "Assistant call failed");
            return Err(AssistantError::Status(status.as_u16()));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(AssistantError::Malformed)?;

        info!(target: "coach_backend", reply_len = text.len(), "Assistant reply received");
        Ok(text)
    }
}

fn build_user_message(prompt: &str, code: Option<&str>) -> String {
    match code {
        Some(code) if !code.trim().is_empty() => {
            format!("{prompt}\n\nCurrent code:\n```python\n{code}\n```")
        }
        _ => prompt.to_string(),
    }
}

/// Local fallback used when no API key is configured. Keeps answers generic
/// enough to avoid pretending to be a real model.
pub fn assistant_stub(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return "Ask a question about your code and I will try to help.".into();
    }
    tracing::debug!(target: "coach_backend", prompt = %trunc_for_log(trimmed, 120), "Assistant stub reply");
    "The assistant is running without a model backend. Re-read the error message in the \
terminal output: it names the line and the operation that failed, which is usually \
enough to locate the bug."
        .into()
}
