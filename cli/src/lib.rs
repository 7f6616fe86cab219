// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS governance CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Configuration loading, in-process runtime wiring and command handlers

pub mod commands;
pub mod config;
pub mod embedded;
