use serde::{Deserialize, Serialize};

use super::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    System,
}

/// One message in the consultation log. Entries carry the stage that
/// produced them, so report assembly filters by tag instead of sniffing
/// message text for keywords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sender: Sender,
    pub content: String,
    pub timestamp: String,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_thinking: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// Append-only, ordered message log. Insertion order is conversation order
/// and is replayed verbatim into follow-up prompts.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn push_user(&mut self, content: impl Into<String>, stage: Stage) -> &TranscriptEntry {
        self.push(Sender::User, content.into(), stage, false)
    }

    pub fn push_system(&mut self, content: impl Into<String>, stage: Stage) -> &TranscriptEntry {
        self.push(Sender::System, content.into(), stage, false)
    }

    pub fn push_error(&mut self, content: impl Into<String>, stage: Stage) -> &TranscriptEntry {
        self.push(Sender::System, content.into(), stage, true)
    }

    fn push(
        &mut self,
        sender: Sender,
        content: String,
        stage: Stage,
        is_error: bool,
    ) -> &TranscriptEntry {
        self.entries.push(TranscriptEntry {
            sender,
            content,
            timestamp: chrono::Utc::now().to_rfc3339(),
            stage,
            is_thinking: false,
            is_error,
        });
        self.entries.last().expect("entry just pushed")
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First thing the patient said; the report treats it as the chief
    /// complaint.
    pub fn first_user(&self) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| e.sender == Sender::User)
    }

    /// Everything the patient has reported so far, joined for prompts that
    /// want the symptom picture as one string.
    pub fn user_symptoms(&self) -> String {
        self.entries
            .iter()
            .filter(|e| e.sender == Sender::User)
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Non-error system entries tagged with the given stage.
    pub fn system_tagged(&self, stage: Stage) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries
            .iter()
            .filter(move |e| e.sender == Sender::System && e.stage == stage && !e.is_error)
    }

    /// The last `n` non-error system entries, oldest first.
    pub fn last_system(&self, n: usize) -> Vec<&TranscriptEntry> {
        let mut recent: Vec<&TranscriptEntry> = self
            .entries
            .iter()
            .rev()
            .filter(|e| e.sender == Sender::System && !e.is_error)
            .take(n)
            .collect();
        recent.reverse();
        recent
    }
}
