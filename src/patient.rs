//! Patient profile, intake validation, and the single-record local store.
//! The store mirrors the one-patient-at-a-time model: intake writes the
//! record once, each consultation reads it back and checks the identifier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const STORE_FILE: &str = "current_patient.json";

/// Immutable for the session once intake succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: String,
    pub nickname: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub current_medications: Option<String>,
}

/// Per-field intake failures, surfaced together so a form can show all of
/// them at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("date of birth is not a valid date: {value}")]
    InvalidDate { value: String },
    #[error("date of birth lies in the future: {0}")]
    FutureDate(NaiveDate),
}

/// Raw intake fields as submitted, before validation.
#[derive(Debug, Clone, Default)]
pub struct IntakeForm {
    pub nickname: String,
    pub date_of_birth: String,
    pub gender: String,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub current_medications: Option<String>,
}

impl IntakeForm {
    /// Validates every field and either produces a profile with a fresh
    /// identifier or the full list of per-field failures.
    pub fn validate(self) -> Result<PatientProfile, Vec<IntakeError>> {
        let mut errors = Vec::new();

        let nickname = self.nickname.trim().to_string();
        if nickname.is_empty() {
            errors.push(IntakeError::Missing { field: "nickname" });
        }

        let gender = self.gender.trim().to_string();
        if gender.is_empty() {
            errors.push(IntakeError::Missing { field: "gender" });
        }

        let dob_raw = self.date_of_birth.trim();
        let mut date_of_birth = None;
        if dob_raw.is_empty() {
            errors.push(IntakeError::Missing {
                field: "date of birth",
            });
        } else {
            match dob_raw.parse::<NaiveDate>() {
                Ok(date) if date > chrono::Local::now().date_naive() => {
                    errors.push(IntakeError::FutureDate(date));
                }
                Ok(date) => date_of_birth = Some(date),
                Err(_) => errors.push(IntakeError::InvalidDate {
                    value: dob_raw.to_string(),
                }),
            }
        }

        match date_of_birth {
            Some(date_of_birth) if errors.is_empty() => Ok(PatientProfile {
                id: uuid::Uuid::new_v4().to_string(),
                nickname,
                date_of_birth,
                gender,
                medical_history: normalize(self.medical_history),
                allergies: normalize(self.allergies),
                current_medications: normalize(self.current_medications),
            }),
            _ => Err(errors),
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Failures loading the stored patient record. Fatal to the command that
/// needed the record, not to the program.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no stored patient record; run `intake` first")]
    NotFound,
    #[error("stored patient {found} does not match requested {expected}; run `intake` again")]
    Mismatch { expected: String, found: String },
    #[error("failed to access the patient record")]
    Io(#[from] io::Error),
    #[error("stored patient record is corrupt")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct PatientStore {
    path: PathBuf,
}

impl PatientStore {
    pub fn open(dir: &Path) -> Self {
        Self {
            path: dir.join(STORE_FILE),
        }
    }

    pub fn save(&self, patient: &PatientProfile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(patient)?;
        fs::write(&self.path, json)?;
        tracing::info!(path = %self.path.display(), patient = %patient.id, "patient record saved");
        Ok(())
    }

    pub fn load(&self) -> Result<PatientProfile, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound)
            }
            Err(err) => return Err(StorageError::Io(err)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Loads the record and refuses identifiers that don't match, so a
    /// stale link can't open a consultation for the wrong patient.
    pub fn load_checked(&self, expected_id: &str) -> Result<PatientProfile, StorageError> {
        let patient = self.load()?;
        if patient.id != expected_id {
            return Err(StorageError::Mismatch {
                expected: expected_id.to_string(),
                found: patient.id,
            });
        }
        Ok(patient)
    }
}
