//! Outcome of an orchestration run

use std::fmt;

use serde::Serialize;

use super::phase::Phase;
use crate::error::{Error, ErrorKind};

/// One failed operation during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFailure {
    /// Phase the failure happened in
    pub phase: Phase,
    /// Resource the failing command targeted
    pub resource: Option<String>,
    /// Error classification
    pub kind: ErrorKind,
    /// Human readable message
    pub message: String,
}

impl PhaseFailure {
    pub(crate) fn new(phase: Phase, error: &Error) -> Self {
        Self {
            phase,
            resource: error.resource().map(str::to_string),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed on {}: {} ({})",
            self.phase,
            self.resource.as_deref().unwrap_or("<none>"),
            self.kind,
            self.message
        )
    }
}

/// Summary of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Phases that finished without failures
    pub completed: Vec<Phase>,
    /// Every recorded failure, in order
    pub failures: Vec<PhaseFailure>,
    /// Phase whose failure sent the run straight to drain/teardown, or the
    /// phase that was skipped because shutdown was requested
    pub aborted_at: Option<Phase>,
    /// Shutdown was requested before the script finished
    pub interrupted: bool,
    /// Output locations assigned during the run
    pub artifacts: Vec<String>,
}

impl RunReport {
    /// True when every phase completed and nothing failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.aborted_at.is_none() && !self.interrupted
    }

    /// First failure of the run, usually the interesting one
    pub fn first_failure(&self) -> Option<&PhaseFailure> {
        self.failures.first()
    }

    /// Serializable view for machine-readable output
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            success: self.is_success(),
            completed: self.completed.iter().map(|p| p.to_string()).collect(),
            aborted_at: self.aborted_at.map(|p| p.to_string()),
            interrupted: self.interrupted,
            failures: self.failures.iter().map(|f| f.to_string()).collect(),
            artifacts: self.artifacts.clone(),
        }
    }
}

/// JSON-friendly rendering of a [`RunReport`]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Whether the run succeeded
    pub success: bool,
    /// Completed phases
    pub completed: Vec<String>,
    /// Aborting phase, if any
    pub aborted_at: Option<String>,
    /// Whether shutdown cut the run short
    pub interrupted: bool,
    /// Rendered failures
    pub failures: Vec<String>,
    /// Output locations
    pub artifacts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Operation;

    #[test]
    fn test_failure_carries_resource_and_kind() {
        let error = Error::InvalidState {
            name: "rec".into(),
            operation: Operation::SendEndOfStream,
            detail: "pipeline is created".into(),
        };
        let failure = PhaseFailure::new(Phase::RewireAndReRecord, &error);

        assert_eq!(failure.resource.as_deref(), Some("rec"));
        assert_eq!(failure.kind, ErrorKind::InvalidState);
        assert!(failure.to_string().starts_with("RewireAndReRecord failed on rec"));
    }

    #[test]
    fn test_summary_json() {
        let report = RunReport {
            completed: vec![Phase::Provision],
            failures: vec![PhaseFailure::new(
                Phase::BaseUp,
                &Error::NotFound { name: "cam".into() },
            )],
            aborted_at: Some(Phase::BaseUp),
            interrupted: false,
            artifacts: vec![],
        };
        assert!(!report.is_success());

        let json = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["aborted_at"], "BaseUp");
        assert_eq!(json["completed"][0], "Provision");
        assert_eq!(json["failures"].as_array().unwrap().len(), 1);
    }
}
