// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod lifecycle_manager;
pub mod lifecycle_service;
pub mod recovery;

// Re-export use cases for convenience
pub use lifecycle_manager::LifecycleManager;
pub use lifecycle_service::LifecycleService;
pub use recovery::{RecoveryController, RecoveryError, Restoration};
