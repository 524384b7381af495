//! Orchestrator sequencer
//!
//! Owns the pipeline groups of a run and executes the fixed script:
//!
//! ```text
//! Idle → Provision → BaseUp → RecordingAndEncodingUp → SnapshotPhase1
//!      → ResnapshotPhase2 → RewireAndReRecord → Drain → Teardown → Done
//! ```
//!
//! Commands are issued one at a time and each is awaited before the next,
//! so ordering follows the listens-to edges:
//!
//! - producers are started before (or, for recordings, bound before) their
//!   consumers, and start-up waits on engine-confirmed `PLAYING`;
//! - drain and teardown walk snapshot → recording → encoding → base and
//!   each group in reverse insertion order, so every consumer is stopped and
//!   deleted before its producer.
//!
//! A failure in a critical phase (or any transport/timeout failure) skips
//! the rest of the script. Drain and teardown always run and only touch
//! resources whose tracked state allows it.

mod phase;
mod report;

pub use phase::Phase;
pub use report::{PhaseFailure, RunReport, RunSummary};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::control::{ControlPlane, TargetState};
use crate::error::{Error, Result};
use crate::group::{GroupRole, PipelineGroup};
use crate::handle::{HandleOptions, LiveMutation, PipelineHandle};
use crate::lifecycle::LifecycleState;
use crate::naming::{LocationScheme, SessionCounter};
use crate::readiness::{settle, wait_for_state, ReadinessOptions};
use crate::topology::Topology;

/// Groups are drained and deleted in this order: deepest consumers first
const DRAIN_ORDER: [GroupRole; 4] = [
    GroupRole::Snapshot,
    GroupRole::Recording,
    GroupRole::Encoding,
    GroupRole::Base,
];

/// Fixed margins applied after each start-up phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDelays {
    /// After the base group is up
    pub base: Duration,
    /// After recordings and encodings are up
    pub recording: Duration,
    /// After the first snapshot
    pub snapshot: Duration,
    /// After the second recording session starts
    pub rewire: Duration,
}

impl PhaseDelays {
    /// No extra margins; readiness polling alone gates the phases
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            recording: Duration::ZERO,
            snapshot: Duration::ZERO,
            rewire: Duration::ZERO,
        }
    }
}

impl Default for PhaseDelays {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            recording: Duration::from_secs(20),
            snapshot: Duration::from_secs(5),
            rewire: Duration::from_secs(10),
        }
    }
}

/// Everything that tunes a run apart from the topology
#[derive(Debug, Clone)]
pub struct SequencerOptions {
    /// Options handed to every handle
    pub handle: HandleOptions,
    /// Engine-confirmed readiness; `None` falls back to the delays alone
    pub readiness: Option<ReadinessOptions>,
    /// Fixed margins per phase
    pub delays: PhaseDelays,
    /// Output file naming
    pub locations: LocationScheme,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            handle: HandleOptions::default(),
            readiness: Some(ReadinessOptions::default()),
            delays: PhaseDelays::default(),
            locations: LocationScheme::default(),
        }
    }
}

/// The four groups of a run
#[derive(Debug)]
pub struct Groups {
    base: PipelineGroup,
    recording: PipelineGroup,
    encoding: PipelineGroup,
    snapshot: PipelineGroup,
}

impl Groups {
    fn new() -> Self {
        Self {
            base: PipelineGroup::new(GroupRole::Base),
            recording: PipelineGroup::new(GroupRole::Recording),
            encoding: PipelineGroup::new(GroupRole::Encoding),
            snapshot: PipelineGroup::new(GroupRole::Snapshot),
        }
    }

    /// Group for `role`
    pub fn get(&self, role: GroupRole) -> &PipelineGroup {
        match role {
            GroupRole::Base => &self.base,
            GroupRole::Recording => &self.recording,
            GroupRole::Encoding => &self.encoding,
            GroupRole::Snapshot => &self.snapshot,
        }
    }

    fn get_mut(&mut self, role: GroupRole) -> &mut PipelineGroup {
        match role {
            GroupRole::Base => &mut self.base,
            GroupRole::Recording => &mut self.recording,
            GroupRole::Encoding => &mut self.encoding,
            GroupRole::Snapshot => &mut self.snapshot,
        }
    }

    fn seal(&mut self) {
        for role in GroupRole::ALL {
            self.get_mut(role).seal();
        }
    }
}

/// Runs the orchestration script against one engine
pub struct Sequencer {
    client: Arc<dyn ControlPlane>,
    topology: Topology,
    options: SequencerOptions,
    groups: Groups,
    counter: SessionCounter,
    phase: Phase,
    report: RunReport,
    shutdown: Option<watch::Receiver<bool>>,
}

fn missing(name: &str) -> Error {
    Error::Config(format!("pipeline '{}' is not part of the run", name))
}

async fn play_all(group: &mut PipelineGroup) -> Result<()> {
    for handle in group.iter_mut() {
        handle.play().await?;
    }
    Ok(())
}

async fn await_playing<'a>(
    handles: impl IntoIterator<Item = &'a PipelineHandle>,
    readiness: Option<ReadinessOptions>,
) -> Result<()> {
    if let Some(readiness) = readiness {
        for handle in handles {
            wait_for_state(handle, TargetState::Playing, &readiness).await?;
        }
    }
    Ok(())
}

impl Sequencer {
    /// Validate `topology` and prepare an idle run
    pub fn new(
        client: Arc<dyn ControlPlane>,
        topology: Topology,
        options: SequencerOptions,
    ) -> Result<Self> {
        topology.validate()?;

        Ok(Self {
            client,
            topology,
            options,
            groups: Groups::new(),
            counter: SessionCounter::new(),
            phase: Phase::Idle,
            report: RunReport::default(),
            shutdown: None,
        })
    }

    /// Stop the script early once `shutdown` turns `true`
    ///
    /// The flag is checked between phases and interrupts settle delays; a
    /// command already in flight is allowed to finish. Drain and teardown
    /// still run.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Group for `role`
    pub fn group(&self, role: GroupRole) -> &PipelineGroup {
        self.groups.get(role)
    }

    /// All groups
    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// Report accumulated so far
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().map_or(false, |rx| *rx.borrow())
    }

    /// Settle delay that ends early on shutdown
    async fn pause(&self, label: &str, duration: Duration) {
        match self.shutdown.clone() {
            Some(mut rx) if !duration.is_zero() => {
                tokio::select! {
                    _ = settle(label, duration) => {}
                    _ = rx.wait_for(|stop| *stop) => {
                        info!(phase = label, "Settle cut short by shutdown");
                    }
                }
            }
            _ => settle(label, duration).await,
        }
    }

    fn enter(&mut self, phase: Phase) {
        info!(%phase, "Entering phase");
        self.phase = phase;
    }

    /// Execute the whole script, then drain and tear down
    ///
    /// Drain and teardown run even when a phase fails. A sequencer runs once;
    /// calling this again fails with `Error::Config`.
    pub async fn run(&mut self) -> Result<RunReport> {
        if self.phase != Phase::Idle {
            return Err(Error::Config(format!(
                "sequencer already ran (phase {})",
                self.phase
            )));
        }

        for phase in Phase::SCRIPT {
            if self.shutdown_requested() {
                warn!(%phase, "Shutdown requested, draining and tearing down");
                self.report.interrupted = true;
                self.report.aborted_at = Some(phase);
                break;
            }

            self.enter(phase);
            let result = match phase {
                Phase::Provision => self.provision().await,
                Phase::BaseUp => self.base_up().await,
                Phase::RecordingAndEncodingUp => self.recording_and_encoding_up().await,
                Phase::SnapshotPhase1 => self.snapshot_phase_1().await,
                Phase::ResnapshotPhase2 => self.resnapshot_phase_2().await,
                Phase::RewireAndReRecord => self.rewire_and_rerecord().await,
                _ => Ok(()),
            };

            match result {
                Ok(()) => self.report.completed.push(phase),
                Err(e) => {
                    error!(%phase, error = %e, pipeline = e.resource().unwrap_or("-"), "Phase failed");
                    self.report.failures.push(PhaseFailure::new(phase, &e));

                    if e.is_fatal() || phase.is_critical() {
                        warn!(%phase, "Aborting run, draining and tearing down");
                        self.report.aborted_at = Some(phase);
                        break;
                    }
                }
            }
        }

        self.groups.seal();

        self.enter(Phase::Drain);
        let drained = self.drain().await;
        if drained {
            self.report.completed.push(Phase::Drain);
        }

        self.enter(Phase::Teardown);
        let torn_down = self.teardown().await;
        if torn_down {
            self.report.completed.push(Phase::Teardown);
        }

        self.enter(Phase::Done);
        Ok(self.report.clone())
    }

    async fn provision(&mut self) -> Result<()> {
        for spec in &self.topology.pipelines {
            let handle = PipelineHandle::create(
                self.client.clone(),
                spec.name.as_str(),
                spec.description.as_str(),
                self.options.handle.clone(),
            )
            .await?;

            if let Err(rejected) = self.groups.get_mut(spec.group).push(handle) {
                return Err(Error::Config(format!(
                    "{} group is sealed, cannot add '{}'",
                    spec.group,
                    rejected.name()
                )));
            }
        }

        self.groups.seal();
        Ok(())
    }

    async fn base_up(&mut self) -> Result<()> {
        let readiness = self.options.readiness;

        // Insertion order is producer-first; confirm each producer before its consumers start
        for handle in self.groups.base.iter_mut() {
            handle.play().await?;
            await_playing([&*handle], readiness).await?;
        }

        self.pause("BaseUp", self.options.delays.base).await;
        Ok(())
    }

    async fn recording_and_encoding_up(&mut self) -> Result<()> {
        let index = self.counter.advance(GroupRole::Recording);

        // Sinks are always bound before the file-writing pipeline starts
        for handle in self.groups.recording.iter_mut() {
            let location =
                self.options
                    .locations
                    .location(GroupRole::Recording, handle.name(), index);
            handle.set_output_location(&location).await?;
            self.report.artifacts.push(location);
        }

        play_all(&mut self.groups.recording).await?;
        play_all(&mut self.groups.encoding).await?;

        let readiness = self.options.readiness;
        await_playing(self.groups.recording.iter(), readiness).await?;
        await_playing(self.groups.encoding.iter(), readiness).await?;

        self.pause("RecordingAndEncodingUp", self.options.delays.recording).await;
        Ok(())
    }

    async fn snapshot_phase_1(&mut self) -> Result<()> {
        let writer = self.topology.snapshot.writer.as_str();
        let index = self.counter.advance(GroupRole::Snapshot);
        let location = self
            .options
            .locations
            .location(GroupRole::Snapshot, writer, index);

        let handle = self.groups.snapshot.get_mut(writer).ok_or_else(|| missing(writer))?;
        handle.set_output_location(&location).await?;
        self.report.artifacts.push(location);

        play_all(&mut self.groups.snapshot).await?;
        await_playing(self.groups.snapshot.iter(), self.options.readiness).await?;

        self.pause("SnapshotPhase1", self.options.delays.snapshot).await;
        Ok(())
    }

    async fn resnapshot_phase_2(&mut self) -> Result<()> {
        let spec = self.topology.snapshot.clone();

        self.groups
            .snapshot
            .get_mut(&spec.writer)
            .ok_or_else(|| missing(&spec.writer))?
            .stop()
            .await?;

        let encoder = self
            .groups
            .snapshot
            .get_mut(&spec.encoder)
            .ok_or_else(|| missing(&spec.encoder))?;

        // Without live handoff the encoder is cycled around the rebind; its consumer is already stopped
        let cycle = encoder.state() == LifecycleState::Playing
            && self.options.handle.rebind_while_playing != LiveMutation::Apply;
        if cycle {
            encoder.stop().await?;
        }
        encoder.rebind_source(&spec.alternate_source).await?;
        if cycle {
            encoder.play().await?;
            await_playing([&*encoder], self.options.readiness).await?;
        }

        let index = self.counter.advance(GroupRole::Snapshot);
        let location = self
            .options
            .locations
            .location(GroupRole::Snapshot, &spec.writer, index);

        let writer = self
            .groups
            .snapshot
            .get_mut(&spec.writer)
            .ok_or_else(|| missing(&spec.writer))?;
        writer.set_output_location(&location).await?;
        self.report.artifacts.push(location);
        writer.play().await?;
        await_playing([&*writer], self.options.readiness).await?;

        Ok(())
    }

    async fn rewire_and_rerecord(&mut self) -> Result<()> {
        let alternate = self.topology.rewire.alternate_source.clone();

        // Flush the encoders so the recorders finalize their files
        for handle in self.groups.encoding.iter_mut() {
            handle.send_end_of_stream().await?;
        }
        for handle in self.groups.recording.iter_mut() {
            handle.stop().await?;
        }
        for handle in self.groups.encoding.iter_mut() {
            handle.stop().await?;
        }
        for handle in self.groups.encoding.iter_mut() {
            handle.rebind_source(&alternate).await?;
        }

        let index = self.counter.advance(GroupRole::Recording);
        for handle in self.groups.recording.iter_mut() {
            let location =
                self.options
                    .locations
                    .location(GroupRole::Recording, handle.name(), index);
            handle.set_output_location(&location).await?;
            self.report.artifacts.push(location);
        }

        play_all(&mut self.groups.encoding).await?;
        play_all(&mut self.groups.recording).await?;

        let readiness = self.options.readiness;
        await_playing(self.groups.encoding.iter(), readiness).await?;
        await_playing(self.groups.recording.iter(), readiness).await?;

        self.pause("RewireAndReRecord", self.options.delays.rewire).await;
        Ok(())
    }

    /// Flush encoders and stop everything still registered, consumers first
    ///
    /// Returns `true` when no command failed.
    async fn drain(&mut self) -> bool {
        let mut clean = true;

        for handle in self.groups.encoding.iter_mut() {
            if handle.state() != LifecycleState::Playing {
                continue;
            }
            if let Err(e) = handle.send_end_of_stream().await {
                warn!(pipeline = %handle.name(), error = %e, "EOS failed during drain");
                self.report.failures.push(PhaseFailure::new(Phase::Drain, &e));
                clean = false;
            }
        }

        for role in DRAIN_ORDER {
            for handle in self.groups.get_mut(role).iter_mut().rev() {
                if !matches!(
                    handle.state(),
                    LifecycleState::Playing | LifecycleState::Created
                ) {
                    continue;
                }
                if let Err(e) = handle.stop().await {
                    warn!(pipeline = %handle.name(), error = %e, "Stop failed during drain");
                    self.report.failures.push(PhaseFailure::new(Phase::Drain, &e));
                    clean = false;
                }
            }
        }

        clean
    }

    /// Delete every stopped resource, consumers first
    ///
    /// Resources never created or already deleted are skipped; resources
    /// that could not be stopped are reported as leaked.
    async fn teardown(&mut self) -> bool {
        let mut clean = true;

        for role in DRAIN_ORDER {
            for handle in self.groups.get_mut(role).iter_mut().rev() {
                match handle.state() {
                    LifecycleState::Stopped => {
                        if let Err(e) = handle.delete().await {
                            warn!(pipeline = %handle.name(), error = %e, "Delete failed during teardown");
                            self.report.failures.push(PhaseFailure::new(Phase::Teardown, &e));
                            clean = false;
                        }
                    }
                    LifecycleState::Deleted | LifecycleState::Unregistered => {}
                    state => {
                        warn!(pipeline = %handle.name(), %state, "Pipeline left registered with the engine");
                        clean = false;
                    }
                }
            }
        }

        clean
    }
}
