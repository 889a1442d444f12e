//! Turns a finished consultation into an exportable document: assemble the
//! stage-tagged transcript into sections, summarize them through the chat
//! model, and render the markdown body to HTML and PDF.

pub mod markdown;
pub mod pdf;

use thiserror::Error;

use crate::consultation::prompts;
use crate::consultation::stage::Stage;
use crate::consultation::transcript::Transcript;
use crate::llm::{CompletionBackend, Gateway, ModelTier, UpstreamError};
use crate::patient::PatientProfile;

pub const NOT_SPECIFIED: &str = "Not specified";

const DISCLAIMER: &str = "This report was generated by an AI virtual healthcare assistant. \
     It is not a substitute for professional medical advice, diagnosis, or treatment. \
     Always seek the advice of your physician or another qualified health provider with \
     any questions you may have regarding a medical condition.";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("failed to render PDF: {0}")]
    Pdf(String),
}

/// The clinically relevant slices of the transcript, selected by the stage
/// tag each entry was created with.
#[derive(Debug, Clone)]
pub struct ReportSections {
    pub chief_complaint: String,
    pub diagnosis_notes: Vec<String>,
    pub treatment_notes: Vec<String>,
    pub follow_up_notes: Vec<String>,
}

pub fn assemble(transcript: &Transcript) -> ReportSections {
    let chief_complaint = transcript
        .first_user()
        .map(|e| e.content.clone())
        .unwrap_or_else(|| NOT_SPECIFIED.to_string());

    let diagnosis_notes = transcript
        .system_tagged(Stage::Differential)
        .map(|e| e.content.clone())
        .collect();

    let treatment_notes = transcript
        .system_tagged(Stage::Treatment)
        .map(|e| e.content.clone())
        .collect();

    let follow_up_notes = transcript
        .last_system(2)
        .into_iter()
        .map(|e| e.content.clone())
        .collect();

    ReportSections {
        chief_complaint,
        diagnosis_notes,
        treatment_notes,
        follow_up_notes,
    }
}

#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub html: String,
    pub pdf: Vec<u8>,
    pub file_stem: String,
}

/// Builds the full report. Empty sections become placeholders, never
/// errors; a document always comes out unless an upstream or the PDF layer
/// fails outright.
pub async fn build_report<C: CompletionBackend, R: CompletionBackend>(
    gateway: &Gateway<C, R>,
    transcript: &Transcript,
    patient: &PatientProfile,
) -> Result<ReportDocument, ReportError> {
    let sections = assemble(transcript);
    let system_prompt = prompts::report_summary(patient, &sections);
    let body = gateway
        .converse(&system_prompt, transcript, ModelTier::Full)
        .await?;

    let blocks = markdown::parse(&body);
    let html = render_html_document(patient, &sections, &blocks);
    let pdf = pdf::render(patient, &sections, &blocks)?;

    Ok(ReportDocument {
        html,
        pdf,
        file_stem: file_stem(patient),
    })
}

fn file_stem(patient: &PatientProfile) -> String {
    let safe: String = patient
        .nickname
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{safe}_medical_report")
}

fn render_html_document(
    patient: &PatientProfile,
    sections: &ReportSections,
    blocks: &[markdown::Block],
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Medical Consultation Report - {nickname}</title>
<style>
body {{ font-family: Helvetica, Arial, sans-serif; color: #333; line-height: 1.6; }}
.container {{ max-width: 800px; margin: 0 auto; padding: 20px; }}
h1 {{ color: #2c3e50; text-align: center; }}
h2 {{ color: #3498db; border-bottom: 1px solid #eee; padding-bottom: 5px; }}
.patient-info {{ background-color: #f8f9fa; padding: 15px; border-left: 4px solid #3498db; }}
.footer {{ text-align: center; font-size: 0.8em; color: #7f8c8d; border-top: 1px solid #eee; }}
</style>
</head>
<body>
<div class="container">
<div class="header">
<h1>Medical Consultation Report</h1>
<p>Date: {date}</p>
</div>
<div class="patient-info">
<h2>Patient Information</h2>
<p><strong>Name:</strong> {nickname}</p>
<p><strong>Date of Birth:</strong> {dob}</p>
<p><strong>Gender:</strong> {gender}</p>
<p><strong>Chief Complaint:</strong> {chief}</p>
</div>
<div class="report-content">
{content}</div>
<div class="footer">
<p>{disclaimer}</p>
</div>
</div>
</body>
</html>
"#,
        nickname = patient.nickname,
        date = chrono::Local::now().date_naive(),
        dob = patient.date_of_birth,
        gender = patient.gender,
        chief = sections.chief_complaint,
        content = markdown::render_blocks(blocks),
        disclaimer = DISCLAIMER,
    )
}
