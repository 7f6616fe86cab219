// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Drive one request through the governance lifecycle
//!
//! Commands: run

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use aegis_governance::domain::{
    context::{ApprovalDecision, HealthStatus, LifecycleContext},
    events::{TelemetryEvent, TelemetryEventKind},
    lifecycle::{FinalStatus, LifecycleState, SessionId},
    transition::USER_CANCELLED,
};
use aegis_governance::infrastructure::event_bus::EventBusError;

use crate::config::GovernanceConfig;
use crate::embedded::GovernanceRuntime;

#[derive(Args)]
pub struct RunCommand {
    /// The request to govern
    #[arg(value_name = "QUERY")]
    query: String,

    /// Reuse a session id (restores from that session's checkpoints on recovery)
    #[arg(long, value_name = "UUID")]
    session: Option<SessionId>,

    /// Approve the request if it waits for human approval
    #[arg(long, conflicts_with_all = ["reject", "interactive"])]
    approve: bool,

    /// Reject the request if it waits for human approval
    #[arg(long, conflicts_with = "interactive")]
    reject: bool,

    /// Ask for the approval decision on the terminal
    #[arg(short, long)]
    interactive: bool,

    /// Rationale recorded with --approve or --reject
    #[arg(long, value_name = "TEXT")]
    rationale: Option<String>,

    /// Reviewer recorded with the approval decision
    #[arg(long, env = "USER")]
    reviewer: Option<String>,

    /// Override the configured health status (healthy, warning, critical, error)
    #[arg(long, value_name = "STATUS")]
    health: Option<HealthStatus>,

    /// Cancel the request when it reaches this stage
    #[arg(long, value_name = "STATE")]
    cancel_at: Option<LifecycleState>,

    /// Print the final context as JSON instead of the timeline
    #[arg(long)]
    json: bool,
}

pub async fn handle_command(command: RunCommand, config_path: Option<PathBuf>) -> Result<()> {
    if let Some(state) = command.cancel_at {
        if !state.precedes_checkpoint() {
            bail!("--cancel-at must name a stage before CHECKPOINT, got {}", state);
        }
    }

    let config = GovernanceConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let runtime = GovernanceRuntime::new(&config, command.health)?;
    let service = runtime.service();

    let session_id = match command.session {
        Some(id) => service.start_session(id, command.query.clone()).await,
        None => service.start(command.query.clone()).await,
    }
    .context("Failed to start session")?;
    let mut witness = runtime.event_bus().subscribe_session(session_id);

    if !command.json {
        println!("{} {}", "Session:".bold(), session_id);
        println!();
    }

    let mut cancelled = false;
    loop {
        let state = service.current_state(session_id).await?;
        if state == LifecycleState::Final {
            break;
        }

        if !cancelled && command.cancel_at == Some(state) {
            service
                .trigger_recovery(session_id, USER_CANCELLED)
                .await
                .context("Failed to cancel session")?;
            cancelled = true;
        }

        match service.advance(session_id).await {
            Ok(true) => {}
            Ok(false) if state == LifecycleState::Approval => {
                let context = service.context(session_id).await?;
                match approval_decision(&command, &context)? {
                    Some(decision) => service
                        .submit_approval(session_id, decision)
                        .await
                        .context("Failed to submit approval")?,
                    None if command.json => {
                        println!("{}", serde_json::to_string_pretty(&pending_approval(session_id))?);
                        return Ok(());
                    }
                    None => {
                        eprintln!(
                            "{}",
                            format!(
                                "⏸ Session {} requires human approval. Re-run with --approve, --reject or --interactive.",
                                session_id
                            )
                            .yellow()
                        );
                        return Ok(());
                    }
                }
            }
            Ok(false) => bail!("Session {} is waiting at {} with no input to give", session_id, state),
            Err(e) => {
                // Failures that route the session elsewhere are part of the run.
                let after = service.current_state(session_id).await?;
                if after == state {
                    return Err(e).with_context(|| format!("Stage {} failed", state));
                }
                debug!(state = %state, next = %after, error = %e, "Stage failure routed");
            }
        }
    }

    let context = service.archive(session_id).await?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    println!("{}", "Timeline:".bold());
    for event in context.telemetry_events() {
        println!("  {}", render_event(event));
    }
    println!();

    loop {
        match witness.try_recv() {
            Ok(record) => println!(
                "{} {} events witnessed at {}",
                "Witness:".bold(),
                record.events.len(),
                record.witnessed_at.format("%H:%M:%S%.3f")
            ),
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    if let Some(checkpoint) = context.checkpoint_data() {
        println!(
            "{} #{} ({})",
            "Checkpoint:".bold(),
            checkpoint.sequence_number,
            short_hash(&checkpoint.state_hash)
        );
    }

    print_outcome(&context);
    Ok(())
}

fn approval_decision(
    command: &RunCommand,
    context: &LifecycleContext,
) -> Result<Option<ApprovalDecision>> {
    let reviewer = command.reviewer.clone();

    if command.approve || command.reject {
        let approved = command.approve;
        let rationale = command.rationale.clone().unwrap_or_else(|| {
            let verb = if approved { "approved" } else { "rejected" };
            format!("{} from the command line", verb)
        });
        return Ok(Some(ApprovalDecision::human(approved, rationale, reviewer)));
    }

    if !command.interactive {
        return Ok(None);
    }

    let level = context
        .risk_classification()
        .map(|c| c.level.to_string())
        .unwrap_or_else(|| "UNCLASSIFIED".to_string());
    println!();
    println!("{} {}", "Query:".bold(), context.user_query());
    println!("{} {}", "Risk:".bold(), level.yellow());
    if let Some(classification) = context.risk_classification() {
        for reason in &classification.reasoning {
            println!("  - {}", reason);
        }
    }

    let approved = dialoguer::Confirm::new()
        .with_prompt("Approve execution?")
        .default(false)
        .interact()
        .context("Failed to read approval decision")?;
    let rationale: String = dialoguer::Input::new()
        .with_prompt("Rationale")
        .allow_empty(true)
        .interact_text()
        .context("Failed to read rationale")?;

    Ok(Some(ApprovalDecision::human(approved, rationale, reviewer)))
}

fn print_outcome(context: &LifecycleContext) {
    let Some(status) = context.final_status() else {
        return;
    };
    let label = match status {
        FinalStatus::Completed => format!("✓ {}", status).green(),
        FinalStatus::Recovered => format!("↺ {}", status).cyan(),
        FinalStatus::Aborted if context.is_fatal() => format!("✗ {} (fatal)", status).red(),
        FinalStatus::Aborted => format!("✗ {}", status).red(),
    };
    println!("{}", label.bold());
    if let Some(reason) = context.abort_reason() {
        println!("  Reason: {}", reason);
    }
}

/// Status object printed with `--json` when the run stops at APPROVAL.
fn pending_approval(session_id: SessionId) -> serde_json::Value {
    serde_json::json!({
        "session_id": session_id,
        "state": LifecycleState::Approval,
        "status": "awaiting_approval",
    })
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

pub(crate) fn render_event(event: &TelemetryEvent) -> String {
    let prefix = format!("{:>3}", event.sequence);
    match &event.kind {
        TelemetryEventKind::StageVisited {
            state,
            entered_at,
            exited_at,
            next_state,
            condition,
        } => format!(
            "{} {:<14} → {:<14} [{}] {}ms",
            prefix,
            state.as_str(),
            next_state.as_str(),
            condition,
            (*exited_at - *entered_at).num_milliseconds()
        ),
        TelemetryEventKind::StagePending { state, awaiting, .. } => {
            format!("{} {:<14} waiting for {}", prefix, state.as_str(), awaiting)
        }
        TelemetryEventKind::StageFailed {
            state,
            error,
            next_state,
            ..
        } => format!(
            "{} {:<14} → {:<14} failed: {}",
            prefix,
            state.as_str(),
            next_state.as_str(),
            error
        ),
        TelemetryEventKind::FinalReached { final_status, reason } => match reason {
            Some(reason) => format!("{} FINAL          {} ({})", prefix, final_status, reason),
            None => format!("{} FINAL          {}", prefix, final_status),
        },
        TelemetryEventKind::RecoveryTriggered { state, reason } => {
            format!("{} {:<14} recovery triggered: {}", prefix, state.as_str(), reason)
        }
        TelemetryEventKind::ApprovalSubmitted {
            approved,
            rationale,
            reviewer,
        } => format!(
            "{} APPROVAL       {} by {}: {}",
            prefix,
            if *approved { "approved" } else { "rejected" },
            reviewer.as_deref().unwrap_or("reviewer"),
            rationale
        ),
        TelemetryEventKind::LoopBack {
            previous_pass,
            previous_final_status,
            ..
        } => format!(
            "{} loop-back from pass {} ({})",
            prefix,
            previous_pass,
            previous_final_status.map_or("unfinished".to_string(), |s| s.to_string())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn event(kind: TelemetryEventKind) -> TelemetryEvent {
        TelemetryEvent {
            sequence: 4,
            session_id: SessionId::new(),
            pass: 1,
            recorded_at: Utc::now(),
            kind,
        }
    }

    #[test]
    fn test_render_stage_visited() {
        let entered_at = Utc::now();
        let line = render_event(&event(TelemetryEventKind::StageVisited {
            state: LifecycleState::Health,
            entered_at,
            exited_at: entered_at + Duration::milliseconds(7),
            next_state: LifecycleState::Classification,
            condition: "health not critical".to_string(),
        }));
        assert!(line.starts_with("  4 HEALTH"));
        assert!(line.contains("CLASSIFICATION"));
        assert!(line.ends_with("[health not critical] 7ms"));
    }

    #[test]
    fn test_render_final_with_reason() {
        let line = render_event(&event(TelemetryEventKind::FinalReached {
            final_status: FinalStatus::Aborted,
            reason: Some(USER_CANCELLED.to_string()),
        }));
        assert!(line.contains("ABORTED (user-cancelled)"));
    }

    #[test]
    fn test_pending_approval_is_machine_readable() {
        let session_id = SessionId::new();
        let encoded = serde_json::to_string(&pending_approval(session_id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(value["session_id"], session_id.to_string());
        assert_eq!(value["state"], "APPROVAL");
        assert_eq!(value["status"], "awaiting_approval");
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("abcdef0123456789"), "abcdef012345");
        assert_eq!(short_hash("abc"), "abc");
    }
}
