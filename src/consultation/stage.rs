use serde::{Deserialize, Serialize};

use super::parser::DiagnosisCandidate;

/// One step of the consultation's linear progression. The derived ordering
/// is the progression order; transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Greeting,
    Symptoms,
    Differential,
    Treatment,
    Report,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        self == Stage::Report
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Greeting => "greeting",
            Stage::Symptoms => "symptoms",
            Stage::Differential => "differential",
            Stage::Treatment => "treatment",
            Stage::Report => "report",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the differential sub-flow stands: no diagnoses yet, waiting on the
/// patient's answers to the discriminating questions, or settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DifferentialPhase {
    #[default]
    Initial,
    Questions,
    Complete,
}

#[derive(Debug, Clone, Default)]
pub struct DifferentialState {
    pub diagnoses: Vec<DiagnosisCandidate>,
    pub phase: DifferentialPhase,
}
