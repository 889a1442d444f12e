pub mod chat;
pub mod gateway;
pub mod research;

pub use chat::ChatClient;
pub use gateway::{Gateway, ModelSet, ModelTier};
pub use research::ResearchClient;

use serde::Serialize;
use std::future::Future;
use thiserror::Error;

/// Sampling parameters shared by both upstreams.
pub(crate) const TEMPERATURE: f32 = 0.2;
pub(crate) const MAX_TOKENS: u32 = 1000;

// Both upstreams speak the OpenAI-style chat completions format.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Failures talking to a text-generation upstream. Callers recover from
/// these (fallback path or apology entry); they never tear down a session.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {service} upstream failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} upstream returned {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{service} upstream response was malformed: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },
    #[error("missing or malformed credential for {service} upstream")]
    Credential { service: &'static str },
}

/// A chat-completions upstream. Implemented by the HTTP clients here and by
/// scripted backends in tests.
pub trait CompletionBackend {
    fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<Completion, UpstreamError>> + Send;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed list of replies, recording every call it sees.
    pub(crate) struct ScriptedBackend {
        service: &'static str,
        queue: Mutex<VecDeque<Result<String, String>>>,
        pub(crate) models: Mutex<Vec<String>>,
        pub(crate) requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(service: &'static str, replies: &[Result<&str, &str>]) -> Arc<Self> {
            let queue = replies
                .iter()
                .map(|r| match r {
                    Ok(text) => Ok((*text).to_string()),
                    Err(detail) => Err((*detail).to_string()),
                })
                .collect();
            Arc::new(Self {
                service,
                queue: Mutex::new(queue),
                models: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn failing(service: &'static str) -> Arc<Self> {
            Self::new(service, &[])
        }

        pub(crate) fn calls(&self) -> usize {
            self.models.lock().unwrap().len()
        }
    }

    impl CompletionBackend for Arc<ScriptedBackend> {
        fn complete(
            &self,
            model: &str,
            messages: &[ChatMessage],
        ) -> impl std::future::Future<Output = Result<Completion, UpstreamError>> + Send {
            self.models.lock().unwrap().push(model.to_string());
            self.requests.lock().unwrap().push(messages.to_vec());
            let next = self.queue.lock().unwrap().pop_front();
            let result = match next {
                Some(Ok(text)) => Ok(Completion {
                    text,
                    input_tokens: 0,
                    output_tokens: 0,
                }),
                Some(Err(detail)) => Err(UpstreamError::Malformed {
                    service: self.service,
                    detail,
                }),
                None => Err(UpstreamError::Malformed {
                    service: self.service,
                    detail: "script exhausted".to_string(),
                }),
            };
            async move { result }
        }
    }
}
