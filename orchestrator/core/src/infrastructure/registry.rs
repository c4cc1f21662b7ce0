// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Agent Registry
//!
//! `HashMap`-backed implementation of [`AgentRegistry`] behind a single
//! `parking_lot::RwLock`. Every mutation takes the write lock for the
//! duration of one method call and nothing else; reads clone out of the
//! map so callers never iterate live state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::agent::{
    AgentDescriptor, AgentFilter, AgentId, AgentMetadata, AgentStatus, LATENCY_MS_METRIC, MEMORY_BYTES_METRIC,
};
use crate::domain::capability::ManagedAgent;
use crate::domain::healing::HealingDecision;
use crate::domain::registry::{
    AgentRegistry, HealthSample, HealthUpdate, RegisteredAgent, RegistryError, RegistryPolicy, RemediationStart,
};

struct Entry {
    metadata: AgentMetadata,
    handle: Arc<dyn ManagedAgent>,
    remediating: bool,
}

pub struct InMemoryAgentRegistry {
    entries: RwLock<HashMap<AgentId, Entry>>,
    policy: RegistryPolicy,
}

impl InMemoryAgentRegistry {
    pub fn new(policy: RegistryPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    fn is_replaceable(&self, existing: &AgentMetadata, now: DateTime<Utc>) -> bool {
        if existing.status == AgentStatus::Failed {
            return true;
        }
        match chrono::Duration::from_std(self.policy.stale_after) {
            Ok(stale_after) => existing.heartbeat_age(now) > stale_after,
            Err(_) => false,
        }
    }
}

impl Default for InMemoryAgentRegistry {
    fn default() -> Self {
        Self::new(RegistryPolicy::default())
    }
}

fn transition_entry(metadata: &mut AgentMetadata, next: AgentStatus) -> Result<(), RegistryError> {
    metadata.transition(next).map_err(|(from, to)| RegistryError::InvalidTransition {
        id: metadata.id.clone(),
        from,
        to,
    })
}

impl AgentRegistry for InMemoryAgentRegistry {
    fn register(&self, mut metadata: AgentMetadata, handle: Arc<dyn ManagedAgent>) -> Result<(), RegistryError> {
        let now = Utc::now();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&metadata.id) {
            if !self.is_replaceable(&existing.metadata, now) {
                return Err(RegistryError::DuplicateRegistration(metadata.id));
            }
        }

        metadata.status = AgentStatus::Initializing;
        metadata.health = metadata.health.clamp(0.0, 1.0);
        metadata.consecutive_failures = 0;
        metadata.last_heartbeat = now;
        metadata.registered_at = now;
        metadata.reset_healing();
        entries.insert(
            metadata.id.clone(),
            Entry {
                metadata,
                handle,
                remediating: false,
            },
        );
        Ok(())
    }

    fn unregister(&self, id: &AgentId) -> Option<AgentMetadata> {
        self.entries.write().remove(id).map(|entry| entry.metadata)
    }

    fn get(&self, id: &AgentId) -> Result<AgentMetadata, RegistryError> {
        self.entries
            .read()
            .get(id)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    fn handle(&self, id: &AgentId) -> Option<Arc<dyn ManagedAgent>> {
        self.entries.read().get(id).map(|entry| entry.handle.clone())
    }

    fn list(&self, filter: &AgentFilter) -> Vec<AgentMetadata> {
        let mut agents: Vec<AgentMetadata> = self
            .entries
            .read()
            .values()
            .filter(|entry| filter.matches(&entry.metadata))
            .map(|entry| entry.metadata.clone())
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    fn snapshot(&self) -> Vec<RegisteredAgent> {
        let mut agents: Vec<RegisteredAgent> = self
            .entries
            .read()
            .values()
            .map(|entry| RegisteredAgent {
                metadata: entry.metadata.clone(),
                handle: entry.handle.clone(),
            })
            .collect();
        agents.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        agents
    }

    fn ids(&self) -> HashSet<AgentId> {
        self.entries.read().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn update_descriptor(&self, id: &AgentId, descriptor: &AgentDescriptor) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        entry.metadata.apply_descriptor(descriptor);
        Ok(())
    }

    fn update_health(&self, id: &AgentId, sample: &HealthSample) -> Result<HealthUpdate, RegistryError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        let metadata = &mut entry.metadata;
        let previous_status = metadata.status;

        let score = if sample.responded { sample.score.clamp(0.0, 1.0) } else { 0.0 };
        metadata.health = score;
        metadata.last_check_failed = !sample.responded;
        metadata.last_checked = Some(sample.checked_at);
        if sample.responded {
            metadata.last_heartbeat = sample.checked_at;
        }
        if let Some(latency) = sample.latency_ms {
            metadata.metrics.insert(LATENCY_MS_METRIC.to_string(), latency);
        }
        if let Some(memory) = sample.memory_bytes {
            metadata.metrics.insert(MEMORY_BYTES_METRIC.to_string(), memory as f64);
        }

        if score < self.policy.health_threshold {
            metadata.consecutive_failures = metadata.consecutive_failures.saturating_add(1);
        } else {
            metadata.consecutive_failures = 0;
            if metadata.status == AgentStatus::Healing {
                metadata.status = AgentStatus::Active;
            }
            if metadata.status == AgentStatus::Active {
                metadata.reset_healing();
            }
        }

        Ok(HealthUpdate {
            previous_status,
            metadata: metadata.clone(),
        })
    }

    fn heartbeat(&self, id: &AgentId) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        entry.metadata.last_heartbeat = Utc::now();
        Ok(())
    }

    fn transition(&self, id: &AgentId, status: AgentStatus) -> Result<AgentMetadata, RegistryError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        transition_entry(&mut entry.metadata, status)?;
        Ok(entry.metadata.clone())
    }

    fn begin_remediation(
        &self,
        id: &AgentId,
        plan: &dyn Fn(&AgentMetadata) -> HealingDecision,
    ) -> Result<RemediationStart, RegistryError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        if entry.remediating {
            return Ok(RemediationStart::AlreadyInFlight);
        }

        match plan(&entry.metadata) {
            HealingDecision::Skip(reason) => Ok(RemediationStart::Skipped(reason)),
            HealingDecision::Apply { strategy, attempt } => {
                transition_entry(&mut entry.metadata, AgentStatus::Healing)?;
                entry.metadata.healing_attempts = attempt;
                entry.metadata.failure_signature = Some(strategy.name.clone());
                entry.remediating = true;
                Ok(RemediationStart::Started {
                    strategy,
                    attempt,
                    metadata: entry.metadata.clone(),
                })
            }
            HealingDecision::Exhausted(err) => {
                // plan_remediation only exhausts Active/Healing agents; an
                // Active one has to pass through Healing to reach Failed.
                if entry.metadata.status == AgentStatus::Active {
                    transition_entry(&mut entry.metadata, AgentStatus::Healing)?;
                }
                transition_entry(&mut entry.metadata, AgentStatus::Failed)?;
                Ok(RemediationStart::Exhausted(err))
            }
        }
    }

    fn finish_remediation(&self, id: &AgentId) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.remediating = false;
        }
    }

    fn is_remediating(&self, id: &AgentId) -> bool {
        self.entries.read().get(id).is_some_and(|entry| entry.remediating)
    }

    fn prune_stale(&self, timeout: Duration, now: DateTime<Utc>) -> Vec<AgentMetadata> {
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return Vec::new();
        };
        let mut entries = self.entries.write();
        let stale: Vec<AgentId> = entries
            .values()
            .filter(|entry| entry.metadata.heartbeat_age(now) > timeout)
            .map(|entry| entry.metadata.id.clone())
            .collect();
        stale
            .iter()
            .filter_map(|id| entries.remove(id).map(|entry| entry.metadata))
            .collect()
    }

    fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }
}
