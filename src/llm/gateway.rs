use std::time::Instant;

use super::{ChatMessage, CompletionBackend, UpstreamError};
use crate::config::Config;
use crate::consultation::parser::DiagnosisCandidate;
use crate::consultation::prompts;
use crate::consultation::transcript::{Sender, Transcript};

/// Which chat model a call should use. Diagnostic turns get the full model;
/// follow-up chatter gets the lighter one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Light,
    Full,
}

#[derive(Debug, Clone)]
pub struct ModelSet {
    pub full: String,
    pub light: String,
    pub research: String,
}

impl From<&Config> for ModelSet {
    fn from(config: &Config) -> Self {
        Self {
            full: config.chat_model.clone(),
            light: config.chat_model_light.clone(),
            research: config.research_model.clone(),
        }
    }
}

/// Front door to both text-generation upstreams. Owns the one piece of
/// resilience the consultation relies on: when the research upstream fails
/// for any reason, `research_differential` reroutes through the chat model
/// instead of propagating the error.
#[derive(Debug, Clone)]
pub struct Gateway<C, R> {
    chat: C,
    research: R,
    models: ModelSet,
}

impl<C: CompletionBackend, R: CompletionBackend> Gateway<C, R> {
    pub fn new(chat: C, research: R, models: ModelSet) -> Self {
        Self {
            chat,
            research,
            models,
        }
    }

    /// Sends the system prompt plus the transcript, mapped to alternating
    /// user/assistant turns, to the chat model.
    pub async fn converse(
        &self,
        system_prompt: &str,
        transcript: &Transcript,
        tier: ModelTier,
    ) -> Result<String, UpstreamError> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        for entry in transcript.entries() {
            messages.push(match entry.sender {
                Sender::User => ChatMessage::user(&entry.content),
                Sender::System => ChatMessage::assistant(&entry.content),
            });
        }

        let model = match tier {
            ModelTier::Light => &self.models.light,
            ModelTier::Full => &self.models.full,
        };

        let start = Instant::now();
        let completion = self.chat.complete(model, &messages).await?;
        tracing::debug!(
            model,
            latency_ms = start.elapsed().as_millis() as u64,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "chat completion finished"
        );
        Ok(completion.text)
    }

    /// Asks the research model for questions that discriminate between the
    /// candidate diagnoses. Returns the reply text and whether the fallback
    /// path had to run.
    pub async fn research_differential(
        &self,
        symptoms: &str,
        diagnoses: &[DiagnosisCandidate],
    ) -> Result<(String, bool), UpstreamError> {
        let messages = [
            ChatMessage::system(prompts::research_questions(symptoms, diagnoses)),
            ChatMessage::user(prompts::research_user_message(symptoms)),
        ];

        match self.research.complete(&self.models.research, &messages).await {
            Ok(completion) => Ok((completion.text, false)),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "research upstream failed, falling back to chat model"
                );
                let fallback = [
                    ChatMessage::system(prompts::research_fallback(symptoms)),
                    ChatMessage::user(prompts::research_user_message(symptoms)),
                ];
                let completion = self.chat.complete(&self.models.full, &fallback).await?;
                Ok((completion.text, true))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;

    fn models() -> ModelSet {
        ModelSet {
            full: "chat-full".to_string(),
            light: "chat-light".to_string(),
            research: "research-1".to_string(),
        }
    }

    fn transcript_with(turns: &[(&str, Sender)]) -> Transcript {
        let mut transcript = Transcript::default();
        for (content, sender) in turns {
            match sender {
                Sender::User => {
                    transcript.push_user(*content, crate::consultation::stage::Stage::Greeting)
                }
                Sender::System => {
                    transcript.push_system(*content, crate::consultation::stage::Stage::Greeting)
                }
            };
        }
        transcript
    }

    #[tokio::test]
    async fn converse_maps_transcript_to_alternating_roles() {
        let chat = ScriptedBackend::new("chat", &[Ok("hello there")]);
        let research = ScriptedBackend::failing("research");
        let gateway = Gateway::new(chat.clone(), research, models());

        let transcript = transcript_with(&[
            ("hi", Sender::System),
            ("I have a headache", Sender::User),
        ]);
        let reply = gateway
            .converse("be a doctor", &transcript, ModelTier::Full)
            .await
            .unwrap();
        assert_eq!(reply, "hello there");

        let requests = chat.requests.lock().unwrap();
        let roles: Vec<&str> = requests[0].iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "assistant", "user"]);
        assert_eq!(requests[0][0].content, "be a doctor");
    }

    #[tokio::test]
    async fn converse_tier_selects_model() {
        let chat = ScriptedBackend::new("chat", &[Ok("a"), Ok("b")]);
        let research = ScriptedBackend::failing("research");
        let gateway = Gateway::new(chat.clone(), research, models());
        let transcript = Transcript::default();

        gateway
            .converse("sys", &transcript, ModelTier::Light)
            .await
            .unwrap();
        gateway
            .converse("sys", &transcript, ModelTier::Full)
            .await
            .unwrap();

        let seen = chat.models.lock().unwrap();
        assert_eq!(*seen, ["chat-light", "chat-full"]);
    }

    #[tokio::test]
    async fn research_failure_falls_back_to_chat() {
        let chat = ScriptedBackend::new("chat", &[Ok("1. Does light worsen it?")]);
        let research = ScriptedBackend::failing("research");
        let gateway = Gateway::new(chat.clone(), research.clone(), models());

        let diagnoses = vec![DiagnosisCandidate {
            name: "Migraine".to_string(),
            confidence: 72,
        }];
        let (text, fell_back) = gateway
            .research_differential("headache and nausea", &diagnoses)
            .await
            .unwrap();

        assert!(fell_back);
        assert_eq!(text, "1. Does light worsen it?");
        assert_eq!(research.calls(), 1);
        assert_eq!(chat.calls(), 1);
        assert_eq!(*chat.models.lock().unwrap(), ["chat-full"]);
    }

    #[tokio::test]
    async fn research_success_skips_fallback() {
        let chat = ScriptedBackend::failing("chat");
        let research = ScriptedBackend::new("research", &[Ok("1. Any fever?")]);
        let gateway = Gateway::new(chat.clone(), research, models());

        let (text, fell_back) = gateway
            .research_differential("cough", &[])
            .await
            .unwrap();

        assert!(!fell_back);
        assert_eq!(text, "1. Any fever?");
        assert_eq!(chat.calls(), 0);
    }
}
