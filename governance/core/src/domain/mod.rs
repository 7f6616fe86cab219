// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! State tags, the lifecycle context, the Transition Table and the contracts
//! the state machine requires from its collaborators.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure governance model, no I/O

pub mod lifecycle;
pub mod context;
pub mod events;
pub mod transition;
pub mod handler;
pub mod collaborators;
pub mod checkpoint;
pub mod errors;
