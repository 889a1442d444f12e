//! Pulls structured diagnosis candidates out of model replies. The contract
//! is JSON-block-first with a regex fallback, and it never fails: on total
//! extraction failure the caller gets an empty list, not an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisCandidate {
    pub name: String,
    pub confidence: u8,
}

impl std::fmt::Display for DiagnosisCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}% confidence)", self.name, self.confidence)
    }
}

#[derive(Debug, Deserialize)]
struct DiagnosisPayload {
    diagnoses: Vec<DiagnosisCandidate>,
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?(.*?)```").expect("fenced block pattern"))
}

fn diagnosis_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:\d+\.\s*|[-*]\s*)?([A-Za-z][A-Za-z \-']*?)\s*(?:\(|:)?\s*(\d{1,3})\s*%\s*(?:confidence|probability|likelihood)?",
        )
        .expect("diagnosis line pattern")
    })
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("blank run pattern"))
}

/// Extracts diagnosis candidates from a raw model reply.
///
/// Tries, in order, first success wins:
/// 1. a fenced code block (optionally tagged `json`) holding an object with
///    a `diagnoses` array, returned verbatim;
/// 2. a scan for `<name> <int>%` lines, with optional list marker and
///    optional confidence/probability/likelihood suffix;
/// 3. an empty list.
pub fn extract_diagnoses(raw: &str) -> Vec<DiagnosisCandidate> {
    if let Some(captures) = fenced_block_re().captures(raw) {
        let body = captures[1].trim();
        if let Ok(payload) = serde_json::from_str::<DiagnosisPayload>(body) {
            tracing::debug!(count = payload.diagnoses.len(), "parsed fenced diagnosis block");
            return payload.diagnoses;
        }
        tracing::debug!("fenced block present but not a diagnosis payload, trying pattern scan");
    }

    let candidates: Vec<DiagnosisCandidate> = diagnosis_line_re()
        .captures_iter(raw)
        .filter_map(|c| {
            let name = c[1].trim().trim_end_matches('-').trim().to_string();
            let confidence: u8 = c[2].parse().ok()?;
            if name.is_empty() || confidence > 100 {
                return None;
            }
            Some(DiagnosisCandidate { name, confidence })
        })
        .collect();

    if candidates.is_empty() {
        tracing::debug!("no diagnoses found by either strategy");
    }
    candidates
}

/// Prepares a diagnosis reply for display: the raw fenced JSON is stripped,
/// and if that leaves nothing, a numbered summary is synthesized from the
/// extracted candidates. With no candidates the trimmed input passes
/// through unchanged.
pub fn format_for_display(raw: &str, diagnoses: &[DiagnosisCandidate]) -> String {
    if diagnoses.is_empty() {
        return raw.trim().to_string();
    }

    let stripped = fenced_block_re().replace_all(raw, "");
    let cleaned = blank_run_re().replace_all(&stripped, "\n\n");
    let cleaned = cleaned.trim();
    if !cleaned.is_empty() {
        return cleaned.to_string();
    }

    let mut summary =
        String::from("Based on your symptoms, I've identified the following potential diagnoses:\n\n");
    for (i, d) in diagnoses.iter().enumerate() {
        let _ = writeln!(summary, "{}. **{}** ({}% confidence)", i + 1, d.name, d.confidence);
    }
    summary.push_str("\nLet me ask you a few more questions to narrow this down.");
    summary
}
