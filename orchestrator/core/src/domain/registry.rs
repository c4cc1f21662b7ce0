// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Registry Contract
//!
//! The registry is the single piece of shared mutable state in the
//! orchestrator. Discovery, the health monitor and the self-healing engine
//! all go through this trait; implementations serialise every mutation
//! behind one lock and hand out copies, never live references.
//!
//! Methods are synchronous on purpose: no implementation may hold its lock
//! across a suspension point, so callers read a snapshot, do their slow
//! I/O, and write the result back with a single call.
//!
//! Implemented by `crate::infrastructure::registry::InMemoryAgentRegistry`.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::agent::{AgentDescriptor, AgentFilter, AgentId, AgentMetadata, AgentStatus};
use crate::domain::capability::ManagedAgent;
use crate::domain::healing::{HealingDecision, HealingExhaustedError, HealingStrategy, SkipReason};

/// Snapshot of one registry entry: a metadata copy plus the capability handle.
#[derive(Clone)]
pub struct RegisteredAgent {
    pub metadata: AgentMetadata,
    pub handle: Arc<dyn ManagedAgent>,
}

/// One health observation produced by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSample {
    /// Score in `[0, 1]`; `0.0` when the check failed.
    pub score: f64,
    /// `false` when the check raised an error or timed out.
    pub responded: bool,
    pub latency_ms: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub checked_at: DateTime<Utc>,
}

impl HealthSample {
    pub fn healthy(score: f64) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            responded: true,
            latency_ms: None,
            memory_bytes: None,
            checked_at: Utc::now(),
        }
    }

    pub fn failed() -> Self {
        Self {
            score: 0.0,
            responded: false,
            latency_ms: None,
            memory_bytes: None,
            checked_at: Utc::now(),
        }
    }
}

/// Result of [`AgentRegistry::update_health`].
#[derive(Debug, Clone)]
pub struct HealthUpdate {
    pub previous_status: AgentStatus,
    pub metadata: AgentMetadata,
}

impl HealthUpdate {
    pub fn recovered(&self) -> bool {
        self.previous_status == AgentStatus::Healing && self.metadata.status == AgentStatus::Active
    }
}

/// Outcome of trying to start a remediation under the registry lock.
#[derive(Debug, Clone)]
pub enum RemediationStart {
    /// Another remediation for this agent is still running.
    AlreadyInFlight,
    Skipped(SkipReason),
    Started {
        strategy: HealingStrategy,
        attempt: u32,
        metadata: AgentMetadata,
    },
    /// Retry budget used up; the agent was moved to `Failed` by this call.
    Exhausted(HealingExhaustedError),
}

/// Tuning knobs applied by the registry itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistryPolicy {
    /// Samples below this score count as failures.
    pub health_threshold: f64,
    /// An existing entry older than this (by heartbeat) may be replaced by `register`.
    pub stale_after: Duration,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            health_threshold: 0.5,
            stale_after: Duration::from_secs(90),
        }
    }
}

pub trait AgentRegistry: Send + Sync {
    /// Insert a new agent with status `Initializing`.
    ///
    /// Fails with [`RegistryError::DuplicateRegistration`] when the id is
    /// present and neither `Failed` nor stale; the original entry is kept.
    fn register(&self, metadata: AgentMetadata, handle: Arc<dyn ManagedAgent>) -> Result<(), RegistryError>;

    /// Idempotent removal; returns the removed entry if there was one.
    fn unregister(&self, id: &AgentId) -> Option<AgentMetadata>;

    fn get(&self, id: &AgentId) -> Result<AgentMetadata, RegistryError>;

    fn handle(&self, id: &AgentId) -> Option<Arc<dyn ManagedAgent>>;

    /// Consistent copy of all entries matching `filter`, ordered by id.
    fn list(&self, filter: &AgentFilter) -> Vec<AgentMetadata>;

    /// Consistent copy of every entry together with its handle.
    fn snapshot(&self) -> Vec<RegisteredAgent>;

    fn ids(&self) -> HashSet<AgentId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refresh endpoint and tags of an existing entry.
    fn update_descriptor(&self, id: &AgentId, descriptor: &AgentDescriptor) -> Result<(), RegistryError>;

    /// Atomically record a sample: sets `health`, bumps or resets
    /// `consecutive_failures`, refreshes `last_heartbeat` when the agent
    /// answered, and returns a `Healing` agent to `Active` on recovery.
    fn update_health(&self, id: &AgentId, sample: &HealthSample) -> Result<HealthUpdate, RegistryError>;

    /// Record liveness without a score.
    fn heartbeat(&self, id: &AgentId) -> Result<(), RegistryError>;

    fn transition(&self, id: &AgentId, status: AgentStatus) -> Result<AgentMetadata, RegistryError>;

    /// Evaluate `plan` against the current entry and, if it says apply,
    /// mark a remediation in flight and move the agent to `Healing`.
    fn begin_remediation(
        &self,
        id: &AgentId,
        plan: &dyn Fn(&AgentMetadata) -> HealingDecision,
    ) -> Result<RemediationStart, RegistryError>;

    /// Release the in-flight marker set by `begin_remediation`.
    fn finish_remediation(&self, id: &AgentId);

    fn is_remediating(&self, id: &AgentId) -> bool;

    /// Remove every agent whose last heartbeat is older than `timeout`.
    fn prune_stale(&self, timeout: Duration, now: DateTime<Utc>) -> Vec<AgentMetadata>;

    /// Drop every entry; returns how many were removed.
    fn clear(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Agent already registered: {0}")]
    DuplicateRegistration(AgentId),

    #[error("Agent not found: {0}")]
    NotFound(AgentId),

    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },
}
