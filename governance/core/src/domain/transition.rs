// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Transition Table
//!
//! Static, deterministic mapping from `(state, context)` to the next state.
//! Rules are evaluated in declaration order; the first rule whose source
//! state and condition match wins.
//!
//! | From | Condition | To |
//! |------|-----------|----|
//! | PREFLIGHT..WITNESS | cancellation requested | RECOVERY |
//! | PREFLIGHT | always | HEALTH |
//! | HEALTH | status != CRITICAL | CLASSIFICATION |
//! | HEALTH | status == CRITICAL | RECOVERY |
//! | CLASSIFICATION | always | APPROVAL |
//! | APPROVAL | approved (human, if mandatory) | EXECUTION |
//! | APPROVAL | rejected | FINAL (ABORTED) |
//! | APPROVAL | no decision yet | pending |
//! | EXECUTION | always | WITNESS |
//! | WITNESS | always | CHECKPOINT |
//! | CHECKPOINT | recovery needed | RECOVERY |
//! | CHECKPOINT | recovery not needed | FINAL (COMPLETED) |
//! | RECOVERY | cancelled | FINAL (ABORTED) |
//! | RECOVERY | restored | FINAL (RECOVERED) |
//! | RECOVERY | restoration failed | FINAL (ABORTED, fatal) |
//! | FINAL | `reset()` | PREFLIGHT |

use serde::{Deserialize, Serialize};

use crate::domain::context::{HealthStatus, LifecycleContext};
use crate::domain::lifecycle::{FinalStatus, LifecycleState};

/// Reason recorded when a run is cancelled through `trigger_recovery`.
pub const USER_CANCELLED: &str = "user-cancelled";

/// Condition types for lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCondition {
    Always,
    CancellationRequested,
    HealthNotCritical,
    HealthCritical,
    Approved,
    Rejected,
    AwaitingApproval,
    RecoveryNeeded,
    RecoveryNotNeeded,
    CancelledAfterRestore,
    CancelledWithoutRestore,
    Restored,
    RestorationFailed,
    ResetRequested,
}

impl TransitionCondition {
    pub fn holds(self, context: &LifecycleContext) -> bool {
        match self {
            TransitionCondition::Always => true,
            TransitionCondition::CancellationRequested => context.cancellation_requested(),
            TransitionCondition::HealthNotCritical => context
                .health_status()
                .map(|report| report.status != HealthStatus::Critical)
                .unwrap_or(false),
            TransitionCondition::HealthCritical => context
                .health_status()
                .map(|report| report.status == HealthStatus::Critical)
                .unwrap_or(false),
            // A policy approval never satisfies a mandatory-approval classification.
            TransitionCondition::Approved => context
                .user_approval()
                .map(|decision| {
                    decision.approved && (decision.is_human() || !context.approval_mandatory())
                })
                .unwrap_or(false),
            TransitionCondition::Rejected => context
                .user_approval()
                .map(|decision| !decision.approved)
                .unwrap_or(false),
            TransitionCondition::AwaitingApproval => context.user_approval().is_none(),
            TransitionCondition::RecoveryNeeded => context.recovery_needed(),
            TransitionCondition::RecoveryNotNeeded => !context.recovery_needed(),
            TransitionCondition::CancelledAfterRestore => {
                context.cancellation_requested() && context.restored_from().is_some()
            }
            TransitionCondition::CancelledWithoutRestore => {
                context.cancellation_requested() && context.restoration_error().is_some()
            }
            TransitionCondition::Restored => context.restored_from().is_some(),
            TransitionCondition::RestorationFailed => context.restoration_error().is_some(),
            TransitionCondition::ResetRequested => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TransitionCondition::Always => "always",
            TransitionCondition::CancellationRequested => "cancellation requested",
            TransitionCondition::HealthNotCritical => "status != CRITICAL",
            TransitionCondition::HealthCritical => "status == CRITICAL",
            TransitionCondition::Approved => "approval.approved == true",
            TransitionCondition::Rejected => "approval.approved == false",
            TransitionCondition::AwaitingApproval => "no approval recorded yet",
            TransitionCondition::RecoveryNeeded => "recovery_needed == true",
            TransitionCondition::RecoveryNotNeeded => "recovery_needed == false",
            TransitionCondition::CancelledAfterRestore => "cancelled, restoration succeeded",
            TransitionCondition::CancelledWithoutRestore => "cancelled, restoration failed",
            TransitionCondition::Restored => "restoration succeeded",
            TransitionCondition::RestorationFailed => "restoration failed",
            TransitionCondition::ResetRequested => "caller calls reset()",
        }
    }
}

/// Where a matching rule leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    State {
        to: LifecycleState,
        final_status: Option<FinalStatus>,
        fatal: bool,
    },
    /// Input pending; stay in the current state
    Await,
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub from: &'static [LifecycleState],
    pub condition: TransitionCondition,
    pub target: RuleTarget,
}

/// A transition selected by the table, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub condition: TransitionCondition,
    pub final_status: Option<FinalStatus>,
    pub fatal: bool,
    /// Human-readable reason for ABORTED outcomes
    pub abort_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDecision {
    Advance(Transition),
    Await(TransitionCondition),
    NoMatch,
}

use LifecycleState::*;

const CANCELLABLE: &[LifecycleState] = &[Preflight, Health, Classification, Approval, Execution, Witness];

const fn to(state: LifecycleState) -> RuleTarget {
    RuleTarget::State { to: state, final_status: None, fatal: false }
}

const fn finish(status: FinalStatus, fatal: bool) -> RuleTarget {
    RuleTarget::State { to: Final, final_status: Some(status), fatal }
}

const fn rule(from: &'static [LifecycleState], condition: TransitionCondition, target: RuleTarget) -> TransitionRule {
    TransitionRule { from, condition, target }
}

pub const RULES: &[TransitionRule] = &[
    rule(CANCELLABLE, TransitionCondition::CancellationRequested, to(Recovery)),
    rule(&[Preflight], TransitionCondition::Always, to(Health)),
    rule(&[Health], TransitionCondition::HealthNotCritical, to(Classification)),
    rule(&[Health], TransitionCondition::HealthCritical, to(Recovery)),
    rule(&[Classification], TransitionCondition::Always, to(Approval)),
    rule(&[Approval], TransitionCondition::Approved, to(Execution)),
    rule(&[Approval], TransitionCondition::Rejected, finish(FinalStatus::Aborted, false)),
    rule(&[Approval], TransitionCondition::AwaitingApproval, RuleTarget::Await),
    rule(&[Execution], TransitionCondition::Always, to(Witness)),
    rule(&[Witness], TransitionCondition::Always, to(Checkpoint)),
    rule(&[Checkpoint], TransitionCondition::RecoveryNeeded, to(Recovery)),
    rule(&[Checkpoint], TransitionCondition::RecoveryNotNeeded, finish(FinalStatus::Completed, false)),
    rule(&[Recovery], TransitionCondition::CancelledAfterRestore, finish(FinalStatus::Aborted, false)),
    rule(&[Recovery], TransitionCondition::CancelledWithoutRestore, finish(FinalStatus::Aborted, true)),
    rule(&[Recovery], TransitionCondition::Restored, finish(FinalStatus::Recovered, false)),
    rule(&[Recovery], TransitionCondition::RestorationFailed, finish(FinalStatus::Aborted, true)),
    rule(&[Final], TransitionCondition::ResetRequested, to(Preflight)),
];

/// Pure lookup over `RULES`.
pub struct TransitionTable;

impl TransitionTable {
    pub fn evaluate(from: LifecycleState, context: &LifecycleContext) -> TransitionDecision {
        let matched = RULES
            .iter()
            .find(|rule| rule.from.contains(&from) && rule.condition.holds(context));

        match matched {
            None if from == Final => TransitionDecision::Await(TransitionCondition::ResetRequested),
            None => TransitionDecision::NoMatch,
            Some(rule) => match rule.target {
                RuleTarget::Await => TransitionDecision::Await(rule.condition),
                RuleTarget::State { to, final_status, fatal } => {
                    TransitionDecision::Advance(build(from, rule.condition, to, final_status, fatal, context))
                }
            },
        }
    }

    /// Rows that fire before the stage's collaborator is invoked (cancellation).
    pub fn preempt(from: LifecycleState, context: &LifecycleContext) -> Option<Transition> {
        RULES
            .iter()
            .filter(|rule| rule.condition == TransitionCondition::CancellationRequested)
            .find(|rule| rule.from.contains(&from) && rule.condition.holds(context))
            .and_then(|rule| match rule.target {
                RuleTarget::State { to, final_status, fatal } => {
                    Some(build(from, rule.condition, to, final_status, fatal, context))
                }
                RuleTarget::Await => None,
            })
    }

    /// The caller-gated loop-back out of FINAL.
    pub fn loop_back(from: LifecycleState) -> Option<Transition> {
        RULES
            .iter()
            .find(|rule| rule.from.contains(&from) && rule.condition == TransitionCondition::ResetRequested)
            .map(|rule| Transition {
                from,
                to: match rule.target {
                    RuleTarget::State { to, .. } => to,
                    RuleTarget::Await => from,
                },
                condition: rule.condition,
                final_status: None,
                fatal: false,
                abort_reason: None,
            })
    }

    /// Legal successors of a state, in rule order.
    pub fn successors(from: LifecycleState) -> Vec<LifecycleState> {
        let mut out = Vec::new();
        for rule in RULES.iter().filter(|rule| rule.from.contains(&from)) {
            if let RuleTarget::State { to, .. } = rule.target {
                if !out.contains(&to) {
                    out.push(to);
                }
            }
        }
        out
    }
}

fn build(
    from: LifecycleState,
    condition: TransitionCondition,
    to: LifecycleState,
    final_status: Option<FinalStatus>,
    fatal: bool,
    context: &LifecycleContext,
) -> Transition {
    Transition {
        from,
        to,
        condition,
        final_status,
        fatal,
        abort_reason: abort_reason(condition, final_status, context),
    }
}

fn abort_reason(
    condition: TransitionCondition,
    final_status: Option<FinalStatus>,
    context: &LifecycleContext,
) -> Option<String> {
    if final_status != Some(FinalStatus::Aborted) {
        return None;
    }

    let reason = match condition {
        TransitionCondition::Rejected => {
            let rationale = context
                .user_approval()
                .map(|decision| decision.rationale.as_str())
                .unwrap_or_default();
            format!("approval rejected: {}", rationale)
        }
        TransitionCondition::CancelledAfterRestore | TransitionCondition::CancelledWithoutRestore => {
            USER_CANCELLED.to_string()
        }
        TransitionCondition::RestorationFailed => format!(
            "restoration failed: {}",
            context.restoration_error().unwrap_or("unknown error")
        ),
        other => other.label().to_string(),
    };
    Some(reason)
}
