// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Checkpoint Store implementations
//!
//! - `LocalCheckpointStore`: one JSON document per snapshot on the local filesystem
//! - `InMemoryCheckpointStore`: same contract, process lifetime only

pub mod local;
pub mod memory;

pub use local::LocalCheckpointStore;
pub use memory::InMemoryCheckpointStore;
