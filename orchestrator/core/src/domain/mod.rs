// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types and contracts for the agent lifecycle core. No I/O apart from
//! configuration file loading.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`agent`] | `AgentMetadata`, `AgentStatus`, `AgentDescriptor`, `AgentFilter` |
//! | [`capability`] | `ManagedAgent` capability contract |
//! | [`registry`] | `AgentRegistry` contract, `HealthSample`, `RegistryError` |
//! | [`discovery`] | `DiscoveryBackend` contract, `ConflictPolicy` |
//! | [`healing`] | `HealingStrategy`, `plan_remediation` |
//! | [`events`] | lifecycle / discovery / coordinator events |
//! | [`metrics`] | `MetricsSink` |
//! | [`config`] | `OrchestratorConfigManifest` |

pub mod agent;
pub mod capability;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod healing;
pub mod metrics;
pub mod registry;
pub mod verification;
