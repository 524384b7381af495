//! Phases of an orchestration run

use std::fmt;

/// Position of a run in its fixed script
///
/// Phases are strictly sequential; there is no branching other than
/// skipping ahead to [`Phase::Drain`] when a run aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Nothing issued yet
    Idle,
    /// Register every declared pipeline
    Provision,
    /// Play the base group
    BaseUp,
    /// Assign recording locations, play recordings then encodings
    RecordingAndEncodingUp,
    /// First snapshot
    SnapshotPhase1,
    /// Rebind the snapshot encoder and take a second snapshot
    ResnapshotPhase2,
    /// Flush, rewire encoders and start a second recording session
    RewireAndReRecord,
    /// Flush and stop everything, consumers first
    Drain,
    /// Delete everything, consumers first
    Teardown,
    /// Run finished
    Done,
}

impl Phase {
    /// Phases run before draining, in order
    pub const SCRIPT: [Phase; 6] = [
        Phase::Provision,
        Phase::BaseUp,
        Phase::RecordingAndEncodingUp,
        Phase::SnapshotPhase1,
        Phase::ResnapshotPhase2,
        Phase::RewireAndReRecord,
    ];

    /// Whether a failure in this phase aborts the run
    ///
    /// Snapshots are best-effort; everything that feeds recordings is not,
    /// since continuing would write incorrect media.
    pub fn is_critical(self) -> bool {
        !matches!(self, Phase::SnapshotPhase1 | Phase::ResnapshotPhase2)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "Idle",
            Phase::Provision => "Provision",
            Phase::BaseUp => "BaseUp",
            Phase::RecordingAndEncodingUp => "RecordingAndEncodingUp",
            Phase::SnapshotPhase1 => "SnapshotPhase1",
            Phase::ResnapshotPhase2 => "ResnapshotPhase2",
            Phase::RewireAndReRecord => "RewireAndReRecord",
            Phase::Drain => "Drain",
            Phase::Teardown => "Teardown",
            Phase::Done => "Done",
        };
        f.write_str(s)
    }
}
