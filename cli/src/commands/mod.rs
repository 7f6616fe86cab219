// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the governance CLI

pub mod checkpoint;
pub mod config;
pub mod run;

pub use self::checkpoint::CheckpointCommand;
pub use self::config::ConfigCommand;
pub use self::run::RunCommand;
