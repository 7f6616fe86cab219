// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Governance
//!
//! Lifecycle governance state machine: drives every user request through
//! PREFLIGHT, HEALTH, CLASSIFICATION, APPROVAL, EXECUTION, WITNESS,
//! CHECKPOINT, RECOVERY and FINAL.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Re-exports the domain model alongside the application services

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::{LifecycleManager, LifecycleService, RecoveryController, RecoveryError};
