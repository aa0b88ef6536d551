//! HTTP rewrite client against an OpenAI-compatible chat completions API.
//!
//! Failures never escape as panics or process errors; they become
//! `RewriteFailure` strings the handlers surface to the operator verbatim.

use serde::{Deserialize, Serialize};

use pressroom_core::config::RewriteConfig;
use pressroom_core::rewrite::{RewriteFailure, Rewriter};

const REWRITE_PROMPT: &str = "You are an editor for a news channel. Rewrite the following post \
     in a clear, neutral editorial voice. Keep every fact, name, number and link. Return only \
     the rewritten text, without markup.";

const DIGEST_PROMPT: &str = "You are an editor for a news channel. Combine the numbered posts \
     below into one concise daily digest: one short paragraph or bullet per post, in the given \
     order. Return only the digest text, without markup.";

#[derive(Clone)]
pub struct HttpRewriter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpRewriter {
    pub fn new(config: &RewriteConfig) -> Self {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var("PRESSROOM_REWRITE_API_KEY")
                    .ok()
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty())
            });
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        }
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, RewriteFailure> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(RewriteFailure::new(
                "rewrite.api_key or PRESSROOM_REWRITE_API_KEY is not configured",
            ));
        };

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatRequestMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| RewriteFailure::new(format!("rewrite request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RewriteFailure::new(format!(
                "rewrite service answered {status}"
            )));
        }

        let payload: ChatResponse = response.json().await.map_err(|err| {
            RewriteFailure::new(format!("failed to decode rewrite response: {err}"))
        })?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| RewriteFailure::new("rewrite service returned no text"))?;
        Ok(text)
    }
}

impl Rewriter for HttpRewriter {
    async fn rewrite(&self, text: &str) -> Result<String, RewriteFailure> {
        self.complete(REWRITE_PROMPT, text.to_string()).await
    }

    async fn rewrite_batch(&self, texts: &[String]) -> Result<String, RewriteFailure> {
        self.complete(DIGEST_PROMPT, number_posts(texts)).await
    }
}

/// Numbers the posts so the model keeps the given order.
fn number_posts(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| format!("{}. {}", index + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage>,
}

#[derive(Serialize)]
struct ChatRequestMessage {
    role: &'static str,
    content: String,
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
    content: String,
}
