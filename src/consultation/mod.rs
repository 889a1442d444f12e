//! The consultation state machine. A single owning controller drives the
//! five-stage flow, holds the transcript, and decides which prompt and
//! model each transition invokes. Views read stage and transcript through
//! projections; mutation happens only inside the named turn handlers.

pub mod parser;
pub mod prompts;
pub mod stage;
pub mod transcript;

use std::time::Duration;

use crate::llm::{CompletionBackend, Gateway, ModelTier, UpstreamError};
use crate::patient::PatientProfile;
use crate::report::{self, ReportDocument, ReportError};

use parser::DiagnosisCandidate;
use stage::{DifferentialPhase, DifferentialState, Stage};
use transcript::{Transcript, TranscriptEntry};

/// Pause between the final diagnosis appearing and the automatic
/// treatment-plan continuation, so the patient reads one before the other.
pub const AUTO_CONTINUE_DELAY: Duration = Duration::from_secs(2);

const APOLOGY: &str =
    "I'm sorry, I ran into a problem processing that. Please try again in a moment.";

/// What one user turn produced, for the driver to render and log.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub replies: Vec<TranscriptEntry>,
    /// When set, the driver should wait this long and then call
    /// [`Consultation::continue_treatment`]. The continuation is owned by
    /// the driver: dropping the session before the delay elapses suppresses
    /// it.
    pub auto_continue: Option<Duration>,
    /// Whether the research fallback path ran during this turn.
    pub fell_back: bool,
}

impl TurnOutcome {
    fn reply(entry: TranscriptEntry) -> Self {
        Self {
            replies: vec![entry],
            ..Self::default()
        }
    }
}

pub struct Consultation<C, R> {
    id: String,
    gateway: Gateway<C, R>,
    patient: PatientProfile,
    transcript: Transcript,
    stage: Stage,
    differential: DifferentialState,
}

impl<C: CompletionBackend, R: CompletionBackend> Consultation<C, R> {
    pub fn new(gateway: Gateway<C, R>, patient: PatientProfile) -> Self {
        let mut transcript = Transcript::default();
        transcript.push_system(
            format!(
                "Welcome {}! I'm your AI doctor. What brings you in today and how may I help?",
                patient.nickname
            ),
            Stage::Greeting,
        );
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            gateway,
            patient,
            transcript,
            stage: Stage::Greeting,
            differential: DifferentialState::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn differential_phase(&self) -> DifferentialPhase {
        self.differential.phase
    }

    pub fn diagnoses(&self) -> &[DiagnosisCandidate] {
        &self.differential.diagnoses
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn patient(&self) -> &PatientProfile {
        &self.patient
    }

    /// Handles one user message. Gateway failures never escape: they become
    /// a single apology entry and the stage stays where it was.
    pub async fn handle_message(&mut self, input: &str) -> TurnOutcome {
        self.transcript.push_user(input, self.stage);

        match self.stage {
            Stage::Greeting => {
                self.interview_turn(prompts::interview(&self.patient), Stage::Symptoms)
                    .await
            }
            Stage::Symptoms => {
                self.interview_turn(prompts::symptom_followup(&self.patient), Stage::Differential)
                    .await
            }
            Stage::Differential => match self.differential.phase {
                DifferentialPhase::Initial => self.differential_initial_turn().await,
                DifferentialPhase::Questions => self.differential_questions_turn(input).await,
                DifferentialPhase::Complete => self.treatment_followup_turn(input).await,
            },
            Stage::Treatment => self.treatment_followup_turn(input).await,
            Stage::Report => TurnOutcome::reply(
                self.transcript
                    .push_system(
                        "Your consultation is complete. Use /report to download your medical report.",
                        Stage::Report,
                    )
                    .clone(),
            ),
        }
    }

    /// Issues the deferred treatment plan after the final diagnosis. Called
    /// by the driver once the auto-continue delay has elapsed; a no-op
    /// unless the diagnosis actually settled.
    pub async fn continue_treatment(&mut self) -> TurnOutcome {
        if self.stage != Stage::Treatment || self.differential.phase != DifferentialPhase::Complete
        {
            return TurnOutcome::default();
        }

        match self
            .gateway
            .converse(&prompts::treatment_plan(), &self.transcript, ModelTier::Full)
            .await
        {
            Ok(text) => {
                let entry = self.transcript.push_system(text, Stage::Treatment).clone();
                self.advance(Stage::Report);
                TurnOutcome::reply(entry)
            }
            Err(err) => self.apologize(err),
        }
    }

    /// Renders the consultation into an exportable document. Gated on the
    /// terminal stage by the caller; the renderer itself only needs the
    /// transcript.
    pub async fn generate_report(&self) -> Result<ReportDocument, ReportError> {
        report::build_report(&self.gateway, &self.transcript, &self.patient).await
    }

    async fn interview_turn(&mut self, system_prompt: String, next: Stage) -> TurnOutcome {
        match self
            .gateway
            .converse(&system_prompt, &self.transcript, ModelTier::Full)
            .await
        {
            Ok(text) => {
                let entry = self.transcript.push_system(text, self.stage).clone();
                self.advance(next);
                TurnOutcome::reply(entry)
            }
            Err(err) => self.apologize(err),
        }
    }

    /// First differential round: generate candidates, then discriminating
    /// questions. Total extraction failure gets one stricter retry; if that
    /// also yields nothing the phase stays Initial and the retry text is
    /// shown so the patient can answer and trigger another round.
    async fn differential_initial_turn(&mut self) -> TurnOutcome {
        let raw = match self
            .gateway
            .converse(
                &prompts::differential_generation(),
                &self.transcript,
                ModelTier::Full,
            )
            .await
        {
            Ok(text) => text,
            Err(err) => return self.apologize(err),
        };

        let mut diagnoses = parser::extract_diagnoses(&raw);
        let mut raw = raw;
        if diagnoses.is_empty() {
            tracing::warn!("no diagnoses extracted, retrying with stricter prompt");
            raw = match self
                .gateway
                .converse(
                    &prompts::differential_retry(),
                    &self.transcript,
                    ModelTier::Full,
                )
                .await
            {
                Ok(text) => text,
                Err(err) => return self.apologize(err),
            };
            diagnoses = parser::extract_diagnoses(&raw);
            if diagnoses.is_empty() {
                let entry = self
                    .transcript
                    .push_system(raw.trim().to_string(), self.stage)
                    .clone();
                return TurnOutcome::reply(entry);
            }
        }

        tracing::info!(count = diagnoses.len(), "diagnosis candidates extracted");
        self.differential.diagnoses = diagnoses;

        let display = parser::format_for_display(&raw, &self.differential.diagnoses);
        let symptoms = self.transcript.user_symptoms();
        let mut fell_back = false;
        let combined = match self
            .gateway
            .research_differential(&symptoms, &self.differential.diagnoses)
            .await
        {
            Ok((questions, used_fallback)) => {
                fell_back = used_fallback;
                format!("{display}\n\n{questions}")
            }
            // Both upstreams down: the diagnosis summary still goes out and
            // the patient's next answer re-enters the questions phase.
            Err(err) => {
                tracing::error!(error = %err, "differential questions unavailable");
                display
            }
        };

        self.differential.phase = DifferentialPhase::Questions;
        let entry = self.transcript.push_system(combined, self.stage).clone();
        TurnOutcome {
            replies: vec![entry],
            auto_continue: None,
            fell_back,
        }
    }

    /// The patient answered the discriminating questions: settle the final
    /// diagnosis, move to treatment, and schedule the automatic plan.
    async fn differential_questions_turn(&mut self, latest_answer: &str) -> TurnOutcome {
        let system_prompt =
            prompts::final_diagnosis(&self.patient, &self.differential.diagnoses, latest_answer);
        match self
            .gateway
            .converse(&system_prompt, &self.transcript, ModelTier::Full)
            .await
        {
            Ok(text) => {
                self.differential.phase = DifferentialPhase::Complete;
                let entry = self.transcript.push_system(text, self.stage).clone();
                self.advance(Stage::Treatment);
                TurnOutcome {
                    replies: vec![entry],
                    auto_continue: Some(AUTO_CONTINUE_DELAY),
                    fell_back: false,
                }
            }
            Err(err) => self.apologize(err),
        }
    }

    async fn treatment_followup_turn(&mut self, question: &str) -> TurnOutcome {
        match self
            .gateway
            .converse(
                &prompts::treatment_followup(question),
                &self.transcript,
                ModelTier::Light,
            )
            .await
        {
            Ok(text) => TurnOutcome::reply(self.transcript.push_system(text, self.stage).clone()),
            Err(err) => self.apologize(err),
        }
    }

    fn apologize(&mut self, err: UpstreamError) -> TurnOutcome {
        tracing::error!(error = %err, stage = %self.stage, "gateway call failed");
        TurnOutcome::reply(self.transcript.push_error(APOLOGY, self.stage).clone())
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next >= self.stage, "stage must never move backwards");
        tracing::info!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::llm::ModelSet;
    use chrono::NaiveDate;
    use std::sync::Arc;

    const FENCED_MIGRAINE: &str = "```json\n{\"diagnoses\": [{\"name\": \"Migraine\", \"confidence\": 72}]}\n```\nHere is my thinking about each candidate.";

    fn jane() -> PatientProfile {
        PatientProfile {
            id: "jane-1".to_string(),
            nickname: "Jane".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).expect("valid date"),
            gender: "female".to_string(),
            medical_history: None,
            allergies: None,
            current_medications: None,
        }
    }

    fn consultation(
        chat: Arc<ScriptedBackend>,
        research: Arc<ScriptedBackend>,
    ) -> Consultation<Arc<ScriptedBackend>, Arc<ScriptedBackend>> {
        let models = ModelSet {
            full: "chat-full".to_string(),
            light: "chat-light".to_string(),
            research: "research-1".to_string(),
        };
        Consultation::new(Gateway::new(chat, research, models), jane())
    }

    #[tokio::test]
    async fn stage_advances_monotonically_through_interview() {
        let chat = ScriptedBackend::new(
            "chat",
            &[Ok("Tell me more about the pain."), Ok("When did it start?")],
        );
        let research = ScriptedBackend::failing("research");
        let mut c = consultation(chat, research);

        assert_eq!(c.stage(), Stage::Greeting);
        c.handle_message("I have a headache and nausea").await;
        assert_eq!(c.stage(), Stage::Symptoms);
        c.handle_message("it started 2 days ago, worse in the morning")
            .await;
        assert_eq!(c.stage(), Stage::Differential);
        assert_eq!(c.differential_phase(), DifferentialPhase::Initial);
    }

    #[tokio::test]
    async fn gateway_failure_appends_apology_and_keeps_stage() {
        let chat = ScriptedBackend::failing("chat");
        let research = ScriptedBackend::failing("research");
        let mut c = consultation(chat, research);

        let outcome = c.handle_message("hello").await;
        assert_eq!(c.stage(), Stage::Greeting);
        assert_eq!(outcome.replies.len(), 1);
        assert!(outcome.replies[0].is_error);
        assert!(outcome.replies[0].content.contains("sorry"));
    }

    #[tokio::test]
    async fn differential_extracts_diagnoses_and_hides_raw_json() {
        let chat = ScriptedBackend::new(
            "chat",
            &[
                Ok("Tell me more."),
                Ok("A few focused questions."),
                Ok(FENCED_MIGRAINE),
            ],
        );
        let research =
            ScriptedBackend::new("research", &[Ok("1. Does bright light make it worse?")]);
        let mut c = consultation(chat, research);

        c.handle_message("I have a headache and nausea").await;
        c.handle_message("it started 2 days ago, worse in the morning")
            .await;
        let outcome = c.handle_message("what could this be?").await;

        assert_eq!(c.diagnoses().len(), 1);
        assert_eq!(c.diagnoses()[0].name, "Migraine");
        assert_eq!(c.differential_phase(), DifferentialPhase::Questions);
        assert!(!outcome.fell_back);

        let reply = &outcome.replies[0].content;
        assert!(!reply.contains("```"));
        assert!(!reply.contains("\"diagnoses\""));
        assert!(reply.contains("bright light"));
    }

    #[tokio::test]
    async fn research_failure_still_appends_diagnosis_summary() {
        // Research errors and the chat fallback replies instead.
        let chat = ScriptedBackend::new(
            "chat",
            &[
                Ok("Tell me more."),
                Ok("A few focused questions."),
                Ok(FENCED_MIGRAINE),
                Ok("1. Any visual aura before the pain?"),
            ],
        );
        let research = ScriptedBackend::failing("research");
        let mut c = consultation(chat, research);

        c.handle_message("I have a headache").await;
        c.handle_message("two days now").await;
        let outcome = c.handle_message("what is it?").await;

        assert!(outcome.fell_back);
        assert_eq!(c.differential_phase(), DifferentialPhase::Questions);
        let reply = &outcome.replies[0].content;
        assert!(reply.contains("visual aura"));
        assert!(reply.contains("thinking about each candidate"));
    }

    #[tokio::test]
    async fn both_upstreams_down_still_appends_summary_entry() {
        // Chat serves the interview turns and the diagnosis, then dries up,
        // so the research call and its fallback both fail.
        let chat = ScriptedBackend::new(
            "chat",
            &[
                Ok("Tell me more."),
                Ok("A few focused questions."),
                Ok(FENCED_MIGRAINE),
            ],
        );
        let research = ScriptedBackend::failing("research");
        let mut c = consultation(chat, research);

        c.handle_message("I have a headache").await;
        c.handle_message("two days now").await;
        let outcome = c.handle_message("what is it?").await;

        assert_eq!(c.differential_phase(), DifferentialPhase::Questions);
        assert_eq!(outcome.replies.len(), 1);
        assert!(!outcome.replies[0].is_error);
        assert!(outcome.replies[0]
            .content
            .contains("thinking about each candidate"));
    }

    #[tokio::test]
    async fn extraction_failure_retries_once_and_stays_initial() {
        let chat = ScriptedBackend::new(
            "chat",
            &[
                Ok("Tell me more."),
                Ok("A few focused questions."),
                Ok("I would need more information to say."),
                Ok("Still nothing structured here."),
            ],
        );
        let research = ScriptedBackend::failing("research");
        let mut c = consultation(chat.clone(), research);

        c.handle_message("I have a headache").await;
        c.handle_message("two days now").await;
        let outcome = c.handle_message("what is it?").await;

        assert_eq!(c.differential_phase(), DifferentialPhase::Initial);
        assert!(c.diagnoses().is_empty());
        // Two differential calls: the first attempt and the stricter retry.
        assert_eq!(chat.calls(), 4);
        assert!(outcome.replies[0].content.contains("nothing structured"));
    }

    #[tokio::test]
    async fn answering_questions_settles_diagnosis_and_schedules_treatment() {
        let chat = ScriptedBackend::new(
            "chat",
            &[
                Ok("Tell me more."),
                Ok("A few focused questions."),
                Ok(FENCED_MIGRAINE),
                Ok("Final diagnosis: migraine, high confidence."),
                Ok("1. Treatment Plan\n2. Lifestyle Recommendations"),
            ],
        );
        let research = ScriptedBackend::new("research", &[Ok("1. Any aura?")]);
        let mut c = consultation(chat, research);

        c.handle_message("I have a headache").await;
        c.handle_message("two days now").await;
        c.handle_message("what is it?").await;
        let outcome = c.handle_message("no aura, light makes it worse").await;

        assert_eq!(c.differential_phase(), DifferentialPhase::Complete);
        assert_eq!(c.stage(), Stage::Treatment);
        assert_eq!(outcome.auto_continue, Some(AUTO_CONTINUE_DELAY));
        assert!(outcome.replies[0].content.contains("Final diagnosis"));
        // Final diagnosis entry is tagged differential for report assembly.
        assert_eq!(outcome.replies[0].stage, Stage::Differential);

        let continued = c.continue_treatment().await;
        assert_eq!(c.stage(), Stage::Report);
        assert!(continued.replies[0].content.contains("Treatment Plan"));
        assert_eq!(continued.replies[0].stage, Stage::Treatment);
    }

    #[tokio::test]
    async fn continue_treatment_is_a_noop_before_diagnosis_settles() {
        let chat = ScriptedBackend::new("chat", &[]);
        let research = ScriptedBackend::failing("research");
        let mut c = consultation(chat.clone(), research);

        let outcome = c.continue_treatment().await;
        assert!(outcome.replies.is_empty());
        assert_eq!(chat.calls(), 0);
        assert_eq!(c.stage(), Stage::Greeting);
    }

    #[tokio::test]
    async fn stage_never_reverts_after_differential() {
        let chat = ScriptedBackend::new(
            "chat",
            &[
                Ok("Tell me more."),
                Ok("A few focused questions."),
                Ok(FENCED_MIGRAINE),
                Ok("Final diagnosis: migraine."),
                Ok("Plan text."),
                Ok("Follow-up answer."),
            ],
        );
        let research = ScriptedBackend::new("research", &[Ok("1. Any aura?")]);
        let mut c = consultation(chat, research);

        c.handle_message("I have a headache").await;
        c.handle_message("two days now").await;
        c.handle_message("what is it?").await;
        c.handle_message("no aura").await;
        c.continue_treatment().await;
        assert_eq!(c.stage(), Stage::Report);

        // Terminal stage: more messages never move the stage anywhere.
        c.handle_message("thanks!").await;
        assert_eq!(c.stage(), Stage::Report);
    }
}
