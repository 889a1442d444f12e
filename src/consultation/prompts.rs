//! System-prompt construction for each consultation stage. Pure string
//! assembly: deterministic for identical inputs apart from the embedded
//! current date, no I/O, and absent profile fields render as placeholders
//! rather than failing.

use super::parser::DiagnosisCandidate;
use crate::patient::PatientProfile;
use crate::report::ReportSections;

const PERSONA: &str = "You are an experienced physician conducting a remote text consultation.";

fn field_or(value: &Option<String>, placeholder: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => placeholder.to_string(),
    }
}

fn diagnosis_list(diagnoses: &[DiagnosisCandidate]) -> String {
    if diagnoses.is_empty() {
        return "unknown conditions based on the reported symptoms".to_string();
    }
    diagnoses
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Opening interview: gather the chief complaint.
pub fn interview(patient: &PatientProfile) -> String {
    format!(
        "{PERSONA} The patient goes by {nickname}, is {gender}, and was born on {dob}. \
         Today's date is {today}; work out the patient's approximate age and keep it in mind \
         for risk assessment. Medical history: {history}. Allergies: {allergies}. \
         Current medications: {medications}. \
         Interview the patient compassionately and professionally, and ask relevant \
         follow-up questions focused on understanding their symptoms.",
        nickname = patient.nickname,
        gender = patient.gender,
        dob = patient.date_of_birth,
        today = chrono::Local::now().date_naive(),
        history = field_or(&patient.medical_history, "None reported"),
        allergies = field_or(&patient.allergies, "None reported"),
        medications = field_or(&patient.current_medications, "None reported"),
    )
}

/// Second pass: targeted questions to complete the clinical picture.
pub fn symptom_followup(patient: &PatientProfile) -> String {
    format!(
        "{PERSONA} You are interviewing {nickname} and have already heard their chief \
         complaint. Ask 2-3 targeted questions at a time based on their previous responses \
         to build a complete clinical picture. Be medically accurate and focused: ask about \
         duration, severity, and factors that make the symptoms better or worse.",
        nickname = patient.nickname,
    )
}

/// Asks the model for candidate diagnoses in the machine-readable shape the
/// parser expects, followed by a patient-facing explanation.
pub fn differential_generation() -> String {
    r#"You are a diagnostic physician. Based on the patient's reported symptoms in the conversation so far, identify the three most likely diagnoses with confidence levels.

Respond with a fenced code block tagged json containing exactly:
```json
{"diagnoses": [{"name": "<diagnosis>", "confidence": <integer 0-100>}]}
```
followed by a brief plain-language explanation of each candidate. Be medically accurate and comprehensive."#
        .to_string()
}

/// Stricter retry used when nothing could be extracted from the first
/// differential reply.
pub fn differential_retry() -> String {
    r#"Your previous answer could not be parsed. Analyze the patient's symptoms again and list the three most likely diagnoses with confidence levels. Respond with ONLY a fenced code block tagged json of the form:
```json
{"diagnoses": [{"name": "<diagnosis>", "confidence": <integer 0-100>}]}
```
and nothing else."#
        .to_string()
}

/// Research-model prompt requesting questions that discriminate between the
/// candidate diagnoses.
pub fn research_questions(symptoms: &str, diagnoses: &[DiagnosisCandidate]) -> String {
    format!(
        "You are a medical research expert specializing in differential diagnosis. \
         The patient has reported the following symptoms: \"{symptoms}\". \
         Based on these symptoms, the candidate diagnoses are: {candidates}.\n\n\
         Generate 3-5 specific questions whose answers would differ depending on which \
         diagnosis is correct. Begin your response with: \"To help me determine which \
         diagnosis is most accurate, I need to ask you a few more specific questions:\" \
         and after that line provide ONLY the numbered questions, no commentary.",
        candidates = diagnosis_list(diagnoses),
    )
}

pub fn research_user_message(symptoms: &str) -> String {
    format!(
        "Generate specific differential diagnosis questions for a patient reporting: \"{symptoms}\""
    )
}

/// Equivalent prompt for the chat model when the research upstream is
/// unavailable.
pub fn research_fallback(symptoms: &str) -> String {
    format!(
        "You are a physician narrowing a differential diagnosis. Based on the symptoms \
         \"{symptoms}\", write 3-5 specific questions that would help distinguish between \
         the possible diagnoses, as a numbered list. Start with: \"To help me determine \
         which diagnosis is most accurate, I need to ask you a few more specific questions:\""
    )
}

/// Settles the differential after the patient answers the discriminating
/// questions.
pub fn final_diagnosis(
    patient: &PatientProfile,
    diagnoses: &[DiagnosisCandidate],
    latest_answer: &str,
) -> String {
    format!(
        "You are a diagnostic physician. Based on the entire conversation history, including \
         the patient's answers to the differential questions, determine the final diagnosis \
         for {nickname}. The candidates under discussion were: {candidates}. \
         The patient's latest answer was: \"{latest_answer}\".\n\n\
         State the final diagnosis clearly with your confidence, explain in patient-friendly \
         language why it is the most likely, and briefly note which candidates have been \
         ruled out and why.",
        nickname = patient.nickname,
        candidates = diagnosis_list(diagnoses),
    )
}

/// Treatment plan issued automatically once the diagnosis is settled.
pub fn treatment_plan() -> String {
    "You are a physician. The patient's diagnosis has been settled. Based on the entire \
     conversation history, lay out a treatment plan and next steps: medications if \
     appropriate, lifestyle recommendations, and when to seek follow-up care. Be medically \
     accurate, thorough, and compassionate. Format your response clearly with sections for:\n\
     1. Treatment Plan\n\
     2. Lifestyle Recommendations\n\
     3. Follow-up Care\n\
     4. When to Seek Immediate Medical Attention"
        .to_string()
}

/// Free-form follow-up once diagnosis and plan are settled.
pub fn treatment_followup(question: &str) -> String {
    format!(
        "You are a physician. The patient has already received a diagnosis and a treatment \
         plan. This is a follow-up question from the patient: \"{question}\". \
         Provide a helpful, medically accurate response. Be compassionate but professional."
    )
}

fn section_or_placeholder(notes: &[String]) -> String {
    if notes.is_empty() {
        crate::report::NOT_SPECIFIED.to_string()
    } else {
        notes.join("\n\n")
    }
}

/// Final summarization prompt that turns the consultation into a report
/// body for rendering.
pub fn report_summary(patient: &PatientProfile, sections: &ReportSections) -> String {
    format!(
        "You are a physician writing a consultation report for {nickname}, with all key \
         details a human clinician needs to understand the patient's condition and the \
         analysis performed.\n\n\
         The patient's chief complaint is: \"{chief}\"\n\n\
         The diagnostic process found:\n{diagnosis}\n\n\
         The treatment recommendations were:\n{treatment}\n\n\
         Additional follow-up information:\n{follow_up}\n\n\
         Format this as a professional medical document in markdown with clear sections for:\n\
         1. Patient Information\n\
         2. Chief Complaint\n\
         3. Diagnosis\n\
         4. Treatment Plan\n\
         5. Follow-up Recommendations",
        nickname = patient.nickname,
        chief = sections.chief_complaint,
        diagnosis = section_or_placeholder(&sections.diagnosis_notes),
        treatment = section_or_placeholder(&sections.treatment_notes),
        follow_up = section_or_placeholder(&sections.follow_up_notes),
    )
}
