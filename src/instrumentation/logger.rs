use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One user turn as seen by the driver: which stage handled it, how long
/// the round trip took, and whether the research fallback ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnLog {
    pub stage: String,
    pub latency_ms: u64,
    pub fell_back: bool,
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: String,
    pub timestamp: String,
    pub patient_id: String,
    pub turns: Vec<TurnLog>,
    pub final_stage: String,
    pub diagnosis_count: usize,
    pub report_generated: bool,
}

impl SessionLog {
    pub fn summary(&self) -> String {
        format!(
            "Turns: {} | Final stage: {} | Diagnoses: {} | Errors: {} | Fallback used: {}",
            self.turns.len(),
            self.final_stage,
            self.diagnosis_count,
            self.turns.iter().filter(|t| t.is_error).count(),
            self.turns.iter().any(|t| t.fell_back),
        )
    }
}

pub struct SessionLogger {
    dir: PathBuf,
}

impl SessionLogger {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).context("Failed to create logs directory")?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn write(&self, session: &SessionLog) -> Result<()> {
        let path = self.dir.join("sessions.jsonl");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open log file")?;

        let json = serde_json::to_string(session).context("Failed to serialize session log")?;
        writeln!(file, "{}", json).context("Failed to write log")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionLog {
        SessionLog {
            id: "s-1".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            patient_id: "p-1".to_string(),
            turns: vec![
                TurnLog {
                    stage: "greeting".to_string(),
                    latency_ms: 900,
                    fell_back: false,
                    is_error: false,
                },
                TurnLog {
                    stage: "differential".to_string(),
                    latency_ms: 2400,
                    fell_back: true,
                    is_error: false,
                },
            ],
            final_stage: "report".to_string(),
            diagnosis_count: 3,
            report_generated: true,
        }
    }

    #[test]
    fn summary_counts_turns_and_fallbacks() {
        let s = session().summary();
        assert!(s.contains("Turns: 2"));
        assert!(s.contains("Final stage: report"));
        assert!(s.contains("Fallback used: true"));
    }

    #[test]
    fn writes_one_json_line_per_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logger = SessionLogger::new(dir.path()).expect("logger");
        logger.write(&session()).expect("write");
        logger.write(&session()).expect("write");

        let raw = fs::read_to_string(dir.path().join("sessions.jsonl")).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: SessionLog = serde_json::from_str(lines[0]).expect("parse");
        assert_eq!(parsed.final_stage, "report");
    }
}
