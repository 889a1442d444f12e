use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatMessage, Completion, CompletionBackend, UpstreamError, MAX_TOKENS, TEMPERATURE};

const SERVICE: &str = "research";

/// Credentials for the research upstream carry a fixed prefix; anything else
/// is rejected before dialing out so the caller can fall back immediately.
const KEY_PREFIX: &str = "pplx-";

/// Client for the research-oriented model endpoint.
#[derive(Debug, Clone)]
pub struct ResearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
struct ResearchRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ResearchResponse {
    choices: Vec<ResearchChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResearchChoice {
    message: ResearchChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResearchChoiceMessage {
    content: Option<String>,
}

impl ResearchClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }
}

impl CompletionBackend for ResearchClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, UpstreamError> {
        if !self.api_key.starts_with(KEY_PREFIX) {
            return Err(UpstreamError::Credential { service: SERVICE });
        }

        let request = ResearchRequest {
            model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            top_p: 0.9,
            stream: false,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                service: SERVICE,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                service: SERVICE,
                status,
                body,
            });
        }

        let api_response: ResearchResponse =
            response
                .json()
                .await
                .map_err(|source| UpstreamError::Transport {
                    service: SERVICE,
                    source,
                })?;

        let text = api_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| UpstreamError::Malformed {
                service: SERVICE,
                detail: "no choices with content in response".to_string(),
            })?
            .to_string();

        Ok(Completion {
            text,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}
