// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! Checkpoint storage, stage adapters, reference collaborators and the
//! witness event bus.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Concrete implementations of the domain contracts

pub mod checkpoint;
pub mod collaborators;
pub mod event_bus;
pub mod handlers;
