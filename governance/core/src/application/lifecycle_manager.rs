// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle Manager
//!
//! Drives one governance session through the nine stages, one `advance()` at
//! a time. The manager owns the session's context, its current state pointer,
//! the transition history of the current pass and the archive of finished
//! passes. Nothing here is shared between sessions.
//!
//! # Step algorithm
//!
//! 1. Cancellation pre-empts the stage: route straight to RECOVERY.
//! 2. Invoke the handler bound to the current state with a read-only context.
//! 3. Apply the stage output to a staged copy of the context.
//! 4. Evaluate the Transition Table against the staged copy.
//! 5. Commit (state pointer, context, telemetry, history) or report pending.
//!
//! A handler failure never leaves a partial write behind: the staged copy is
//! dropped and the failure route is committed from the last committed context.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::context::{ApprovalDecision, ApprovalSource, LifecycleContext};
use crate::domain::errors::{HandlerFailure, LifecycleError};
use crate::domain::events::{TelemetryEvent, TelemetryEventKind};
use crate::domain::handler::{HandlerRegistry, RecoveryOutcome, StageOutput};
use crate::domain::lifecycle::{
    ArchivedPass, FinalStatus, LifecycleState, SessionId, TransitionRecord,
};
use crate::domain::transition::{Transition, TransitionDecision, TransitionTable, USER_CANCELLED};

const MAX_QUERY_LEN: usize = 16 * 1024;

/// What a committed step leads to, either a table row or a failure route.
struct Commit {
    to: LifecycleState,
    condition: String,
    final_status: Option<FinalStatus>,
    fatal: bool,
    abort_reason: Option<String>,
}

impl From<Transition> for Commit {
    fn from(t: Transition) -> Self {
        Self {
            to: t.to,
            condition: t.condition.label().to_string(),
            final_status: t.final_status,
            fatal: t.fatal,
            abort_reason: t.abort_reason,
        }
    }
}

impl Commit {
    fn abort(condition: &str, reason: String) -> Self {
        Self {
            to: LifecycleState::Final,
            condition: condition.to_string(),
            final_status: Some(FinalStatus::Aborted),
            fatal: true,
            abort_reason: Some(reason),
        }
    }
}

/// Per-stage timing captured around the handler call.
#[derive(Clone, Copy)]
struct StageClock {
    state: LifecycleState,
    entered_at: DateTime<Utc>,
    exited_at: DateTime<Utc>,
}

pub struct LifecycleManager {
    handlers: HandlerRegistry,
    state: LifecycleState,
    context: LifecycleContext,
    history: Vec<TransitionRecord>,
    pass: u32,
    next_sequence: u64,
    archive: Vec<ArchivedPass>,
}

impl LifecycleManager {
    /// Create a session with a fresh id and enter PREFLIGHT.
    pub fn start(handlers: HandlerRegistry, user_query: impl Into<String>) -> Result<Self, LifecycleError> {
        Self::start_session(handlers, SessionId::new(), user_query)
    }

    /// Enter PREFLIGHT for a caller-chosen (possibly reused) session id.
    pub fn start_session(
        handlers: HandlerRegistry,
        session_id: SessionId,
        user_query: impl Into<String>,
    ) -> Result<Self, LifecycleError> {
        let user_query = user_query.into();
        validate_query(&user_query)?;

        info!(session_id = %session_id, "Governance session started");

        Ok(Self {
            handlers,
            state: LifecycleState::Preflight,
            context: LifecycleContext::new(session_id, user_query),
            history: Vec::new(),
            pass: 1,
            next_sequence: 0,
            archive: Vec::new(),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.context.session_id()
    }

    pub fn current_state(&self) -> LifecycleState {
        self.state
    }

    pub fn context(&self) -> &LifecycleContext {
        &self.context
    }

    /// Committed transitions of the current pass, oldest first.
    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Passes finished before the most recent `reset()`.
    pub fn previous_passes(&self) -> &[ArchivedPass] {
        &self.archive
    }

    pub fn is_complete(&self) -> bool {
        self.state == LifecycleState::Final && self.context.final_status().is_some()
    }

    /// Execute the current stage and move to the next one.
    ///
    /// Returns `Ok(false)` without changing state when the stage is waiting on
    /// external input (an approval decision, a query after `reset()`, or
    /// `reset()` itself at FINAL).
    pub async fn advance(&mut self) -> Result<bool, LifecycleError> {
        let from = self.state;
        let entered_at = Utc::now();

        if from == LifecycleState::Final {
            return Ok(false);
        }

        if let Some(transition) = TransitionTable::preempt(from, &self.context) {
            let clock = StageClock { state: from, entered_at, exited_at: Utc::now() };
            info!(
                session_id = %self.session_id(),
                state = %from,
                "Cancellation requested, skipping stage"
            );
            let staged = self.context.clone();
            self.commit(staged, clock, transition.into(), None);
            return Ok(true);
        }

        if from == LifecycleState::Preflight && self.context.user_query().is_empty() {
            let clock = StageClock { state: from, entered_at, exited_at: Utc::now() };
            self.record_pending(clock, "user query");
            return Ok(false);
        }

        let handler = self
            .handlers
            .get(from)
            .cloned()
            .ok_or(LifecycleError::MissingHandler(from))?;

        let output = handler.handle(&self.context).await;
        let clock = StageClock { state: from, entered_at, exited_at: Utc::now() };

        let output = match output {
            Ok(output) => output,
            Err(failure) => return self.route_failure(clock, failure),
        };

        let mut staged = self.context.clone();
        if let Err(detail) = apply(&mut staged, from, output) {
            return Err(self.reject_result(clock, detail));
        }

        match TransitionTable::evaluate(from, &staged) {
            TransitionDecision::Advance(transition) => {
                self.commit(staged, clock, transition.into(), None);
                Ok(true)
            }
            TransitionDecision::Await(condition) => {
                self.record_pending(clock, condition.label());
                Ok(false)
            }
            TransitionDecision::NoMatch => Err(self.reject_result(
                clock,
                format!("no transition row matches the result produced in {}", from),
            )),
        }
    }

    /// Record a human approval decision while APPROVAL is pending.
    pub fn submit_approval(&mut self, decision: ApprovalDecision) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Approval || self.context.user_approval().is_some() {
            return Err(LifecycleError::ApprovalNotPending(self.state));
        }
        if !decision.is_human() {
            return Err(LifecycleError::InvalidInput(
                "submitted approvals must come from a human reviewer".to_string(),
            ));
        }

        let reviewer = match &decision.source {
            ApprovalSource::Human { reviewer } => reviewer.clone(),
            ApprovalSource::Policy => None,
        };

        info!(
            session_id = %self.session_id(),
            approved = decision.approved,
            "Approval decision submitted"
        );

        let event = self.event(TelemetryEventKind::ApprovalSubmitted {
            approved: decision.approved,
            rationale: decision.rationale.clone(),
            reviewer,
        });
        self.context.push_event(event);
        self.context.user_approval = Some(decision);
        Ok(())
    }

    /// Flag the run for recovery. `"user-cancelled"` also cancels the run.
    pub fn trigger_recovery(&mut self, reason: impl Into<String>) -> Result<(), LifecycleError> {
        let reason = reason.into();
        if !self.state.precedes_checkpoint() {
            return Err(LifecycleError::RecoveryTrigger {
                state: self.state,
                reason,
            });
        }

        warn!(
            session_id = %self.session_id(),
            state = %self.state,
            reason = %reason,
            "Recovery triggered"
        );

        self.context.recovery_needed = true;
        if reason == USER_CANCELLED {
            self.context.cancellation_requested = true;
        }
        self.context.recovery_reason = Some(reason.clone());

        let event = self.event(TelemetryEventKind::RecoveryTriggered {
            state: self.state,
            reason,
        });
        self.context.push_event(event);
        Ok(())
    }

    /// Loop back from FINAL into PREFLIGHT, keeping only the session id.
    ///
    /// The finished pass is archived. The new pass waits in PREFLIGHT until
    /// `begin_pass` supplies a query.
    pub fn reset(&mut self) -> Result<(), LifecycleError> {
        let transition = TransitionTable::loop_back(self.state)
            .ok_or(LifecycleError::LifecycleReset(self.state))?;

        let previous_final_status = self.context.final_status();
        let previous_event_count = self.context.telemetry_events().len();

        self.archive.push(ArchivedPass {
            pass: self.pass,
            final_status: previous_final_status,
            history: std::mem::take(&mut self.history),
            telemetry: std::mem::take(&mut self.context.telemetry_events),
        });

        self.context.reset_for_loop_back();
        let previous_pass = self.pass;
        self.pass += 1;
        self.state = transition.to;

        let marker = self.event(TelemetryEventKind::LoopBack {
            previous_pass,
            previous_final_status,
            previous_event_count,
        });
        self.context.push_event(marker);

        info!(
            session_id = %self.session_id(),
            previous_pass = previous_pass,
            pass = self.pass,
            "Lifecycle reset to PREFLIGHT"
        );
        Ok(())
    }

    /// Supply the query for a pass that follows `reset()`.
    pub fn begin_pass(&mut self, user_query: impl Into<String>) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Preflight || !self.context.user_query().is_empty() {
            return Err(LifecycleError::InvalidInput(format!(
                "a query can only be supplied at the start of a pass (state {})",
                self.state
            )));
        }
        let user_query = user_query.into();
        validate_query(&user_query)?;
        self.context.user_query = user_query;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn event(&mut self, kind: TelemetryEventKind) -> TelemetryEvent {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        TelemetryEvent {
            sequence,
            session_id: self.context.session_id(),
            pass: self.pass,
            recorded_at: Utc::now(),
            kind,
        }
    }

    /// Swap in the staged context together with the state pointer, telemetry
    /// and history record.
    fn commit(
        &mut self,
        mut staged: LifecycleContext,
        clock: StageClock,
        commit: Commit,
        failure: Option<String>,
    ) {
        if clock.state == LifecycleState::Checkpoint {
            staged.recovery_needed = false;
        }

        let kind = match failure {
            Some(error) => TelemetryEventKind::StageFailed {
                state: clock.state,
                entered_at: clock.entered_at,
                exited_at: clock.exited_at,
                error,
                next_state: commit.to,
            },
            None => TelemetryEventKind::StageVisited {
                state: clock.state,
                entered_at: clock.entered_at,
                exited_at: clock.exited_at,
                next_state: commit.to,
                condition: commit.condition.clone(),
            },
        };
        let event = self.event(kind);
        staged.push_event(event);

        if commit.to == LifecycleState::Final {
            staged.final_status = commit.final_status;
            staged.fatal = commit.fatal;
            staged.abort_reason = commit.abort_reason.clone();
            if let Some(final_status) = commit.final_status {
                let event = self.event(TelemetryEventKind::FinalReached {
                    final_status,
                    reason: commit.abort_reason.clone(),
                });
                staged.push_event(event);
            }
        }

        self.history.push(TransitionRecord {
            pass: self.pass,
            from: clock.state,
            to: commit.to,
            condition: commit.condition,
            committed_at: Utc::now(),
        });
        self.context = staged;
        self.state = commit.to;

        match self.context.final_status() {
            Some(final_status) if self.state == LifecycleState::Final => info!(
                session_id = %self.session_id(),
                from = %clock.state,
                final_status = %final_status,
                fatal = self.context.is_fatal(),
                "Lifecycle reached FINAL"
            ),
            _ => info!(
                session_id = %self.session_id(),
                from = %clock.state,
                to = %self.state,
                "Stage committed"
            ),
        }
    }

    fn record_pending(&mut self, clock: StageClock, awaiting: &str) {
        warn!(
            session_id = %self.session_id(),
            state = %clock.state,
            awaiting = %awaiting,
            "Stage awaiting external input"
        );
        let event = self.event(TelemetryEventKind::StagePending {
            state: clock.state,
            entered_at: clock.entered_at,
            exited_at: clock.exited_at,
            awaiting: awaiting.to_string(),
        });
        self.context.push_event(event);
    }

    fn route_failure(&mut self, clock: StageClock, failure: HandlerFailure) -> Result<bool, LifecycleError> {
        let message = failure.to_string();
        warn!(
            session_id = %self.session_id(),
            state = %clock.state,
            error = %message,
            "Stage handler failed"
        );

        let mut staged = self.context.clone();
        match clock.state {
            LifecycleState::Checkpoint => {
                error!(
                    session_id = %self.session_id(),
                    error = %message,
                    "Checkpoint write failed, aborting pass"
                );
                let reason = format!("checkpoint write failed: {}", message);
                self.commit(staged, clock, Commit::abort("checkpoint write failure", reason), Some(message.clone()));
                Err(LifecycleError::CheckpointWrite {
                    message,
                    telemetry: self.context.telemetry_events().to_vec(),
                })
            }
            LifecycleState::Recovery => {
                staged.record_restoration_failure(message.clone());
                let commit = match TransitionTable::evaluate(clock.state, &staged) {
                    TransitionDecision::Advance(transition) => transition.into(),
                    _ => Commit::abort("recovery failure", format!("restoration failed: {}", message)),
                };
                self.commit(staged, clock, commit, Some(message.clone()));
                Err(LifecycleError::StateHandler {
                    state: clock.state,
                    message,
                    telemetry: self.context.telemetry_events().to_vec(),
                })
            }
            _ => {
                staged.recovery_reason = Some(format!("{} handler failed: {}", clock.state, message));
                let commit = Commit {
                    to: LifecycleState::Recovery,
                    condition: "handler failure".to_string(),
                    final_status: None,
                    fatal: false,
                    abort_reason: None,
                };
                self.commit(staged, clock, commit, Some(message.clone()));
                Err(LifecycleError::StateHandler {
                    state: clock.state,
                    message,
                    telemetry: self.context.telemetry_events().to_vec(),
                })
            }
        }
    }

    /// Abort the pass on a result the Transition Table cannot route.
    fn reject_result(&mut self, clock: StageClock, detail: String) -> LifecycleError {
        let snapshot = serde_json::to_string(&self.context).unwrap_or_default();
        error!(
            session_id = %self.session_id(),
            state = %clock.state,
            detail = %detail,
            context = %snapshot,
            "Invalid state transition"
        );

        let staged = self.context.clone();
        let reason = format!("invalid state transition: {}", detail);
        self.commit(staged, clock, Commit::abort("unrecognized stage result", reason), Some(detail.clone()));

        LifecycleError::InvalidStateTransition {
            state: clock.state,
            detail,
            telemetry: self.context.telemetry_events().to_vec(),
        }
    }
}

fn validate_query(user_query: &str) -> Result<(), LifecycleError> {
    if user_query.trim().is_empty() {
        return Err(LifecycleError::InvalidInput("query must not be empty".to_string()));
    }
    if user_query.len() > MAX_QUERY_LEN {
        return Err(LifecycleError::InvalidInput(format!(
            "query exceeds {} bytes",
            MAX_QUERY_LEN
        )));
    }
    if user_query.contains('\0') {
        return Err(LifecycleError::InvalidInput("query contains a NUL byte".to_string()));
    }
    Ok(())
}

/// Write a stage output into the staged context.
fn apply(staged: &mut LifecycleContext, state: LifecycleState, output: StageOutput) -> Result<(), String> {
    if output.state() != state {
        return Err(format!("{} handler returned a {} result", state, output.state()));
    }

    match output {
        StageOutput::Preflight | StageOutput::Witness => {}
        StageOutput::Health(report) => staged.health_status = Some(report),
        StageOutput::Classification(classification) => {
            staged.risk_classification = Some(classification)
        }
        StageOutput::Approval(decision) => {
            // A submitted human decision wins over whatever the gate returns.
            if staged.user_approval.is_none() {
                staged.user_approval = decision;
            }
        }
        StageOutput::Execution(result) => {
            if staged.execution_result.is_some() {
                return Err("execution result already recorded for this pass".to_string());
            }
            staged.execution_result = Some(result);
        }
        StageOutput::Checkpoint(reference) => {
            if reference.session_id != staged.session_id() {
                return Err(format!(
                    "checkpoint {} belongs to session {}",
                    reference.sequence_number, reference.session_id
                ));
            }
            staged.checkpoint_data = Some(reference);
        }
        StageOutput::Recovery(RecoveryOutcome::Restored { context, source }) => {
            if context.session_id() != staged.session_id() {
                return Err(format!("restored context belongs to session {}", context.session_id()));
            }
            staged.restore_from(*context, source);
        }
        StageOutput::Recovery(RecoveryOutcome::Failed { reason }) => {
            staged.record_restoration_failure(reason);
        }
    }
    Ok(())
}

/// Shared handle for callers that keep the manager behind a lock.
pub type SharedLifecycleManager = Arc<tokio::sync::Mutex<LifecycleManager>>;
