// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod discovery;
pub mod discovery_factory;
pub mod health_monitor;
pub mod lifecycle;
pub mod query;
pub mod self_healing;

// Re-export services for convenience
pub use discovery::{backoff_delay, DiscoveryAdapter, MergeReport};
pub use discovery_factory::build_discovery_backend;
pub use health_monitor::{HealthMonitor, MonitorReport};
pub use lifecycle::LifecycleCoordinator;
pub use query::{AgentQueryService, Page, Pagination};
pub use self_healing::{execute_action, HealingOutcome, SelfHealingEngine};
