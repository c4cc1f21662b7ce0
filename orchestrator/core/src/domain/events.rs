// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, AgentStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentLifecycleEvent {
    AgentRegistered {
        agent_id: AgentId,
        address: String,
        port: u16,
        registered_at: DateTime<Utc>,
    },
    AgentActivated {
        agent_id: AgentId,
        activated_at: DateTime<Utc>,
    },
    AgentInitFailed {
        agent_id: AgentId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    HealthDegraded {
        agent_id: AgentId,
        health: f64,
        consecutive_failures: u32,
        observed_at: DateTime<Utc>,
    },
    HealingStarted {
        agent_id: AgentId,
        strategy: String,
        action: String,
        attempt: u32,
        started_at: DateTime<Utc>,
    },
    RemediationFailed {
        agent_id: AgentId,
        strategy: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    AgentRecovered {
        agent_id: AgentId,
        health: f64,
        recovered_at: DateTime<Utc>,
    },
    /// Retry budget exhausted; the agent is now `Failed` and needs an operator.
    HealingExhausted {
        agent_id: AgentId,
        strategy: String,
        attempts: u32,
        failed_at: DateTime<Utc>,
    },
    AgentPruned {
        agent_id: AgentId,
        last_heartbeat: DateTime<Utc>,
        pruned_at: DateTime<Utc>,
    },
    AgentUnregistered {
        agent_id: AgentId,
        unregistered_at: DateTime<Utc>,
    },
    StatusChanged {
        agent_id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
        changed_at: DateTime<Utc>,
    },
}

impl AgentLifecycleEvent {
    pub fn agent_id(&self) -> &AgentId {
        match self {
            AgentLifecycleEvent::AgentRegistered { agent_id, .. }
            | AgentLifecycleEvent::AgentActivated { agent_id, .. }
            | AgentLifecycleEvent::AgentInitFailed { agent_id, .. }
            | AgentLifecycleEvent::HealthDegraded { agent_id, .. }
            | AgentLifecycleEvent::HealingStarted { agent_id, .. }
            | AgentLifecycleEvent::RemediationFailed { agent_id, .. }
            | AgentLifecycleEvent::AgentRecovered { agent_id, .. }
            | AgentLifecycleEvent::HealingExhausted { agent_id, .. }
            | AgentLifecycleEvent::AgentPruned { agent_id, .. }
            | AgentLifecycleEvent::AgentUnregistered { agent_id, .. }
            | AgentLifecycleEvent::StatusChanged { agent_id, .. } => agent_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    CycleCompleted {
        backend: String,
        registered: usize,
        updated: usize,
        completed_at: DateTime<Utc>,
    },
    CycleFailed {
        backend: String,
        error: String,
        retry_in_ms: u64,
        failed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    Started {
        run_id: uuid::Uuid,
        agents: usize,
        started_at: DateTime<Utc>,
    },
    Stopped {
        run_id: uuid::Uuid,
        cleared: usize,
        stopped_at: DateTime<Utc>,
    },
}
