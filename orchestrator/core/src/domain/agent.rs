// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Aggregate
//!
//! Registry-owned metadata for every managed agent, the descriptor shape
//! produced by discovery, and the authoritative status state machine.
//!
//! ## State Machine
//! | From | To | Trigger |
//! |------|----|---------|
//! | `Initializing` | `Active` | successful `initialize()` |
//! | `Active` | `Healing` | remediation applied after a sub-threshold sample |
//! | `Healing` | `Active` | health sample recovers above threshold |
//! | `Healing` | `Failed` | retries exhausted |
//! | `Active` / `Healing` | `Paused` | explicit pause |
//! | `Paused` | `Active` | explicit resume |
//!
//! `Failed` is terminal until the agent is unregistered and registered again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Metric key written by the health monitor with the last check latency.
pub const LATENCY_MS_METRIC: &str = "latency_ms";

/// Metric key written by the health monitor with the last reported memory usage.
pub const MEMORY_BYTES_METRIC: &str = "memory_bytes";

/// Unique agent identifier as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Service entry returned by a discovery backend.
///
/// Ephemeral: a fresh set is produced every discovery cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: AgentId::new(id),
            address: address.into(),
            port,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// `http://address:port`
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Initializing,
    Active,
    Healing,
    Paused,
    Failed,
}

impl AgentStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Initializing, Active)
                | (Active, Healing)
                | (Healing, Active)
                | (Healing, Failed)
                | (Active, Paused)
                | (Healing, Paused)
                | (Paused, Active)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Failed)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Active => "active",
            AgentStatus::Healing => "healing",
            AgentStatus::Paused => "paused",
            AgentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Registry entity for a managed agent.
///
/// # Invariants
///
/// - `0.0 <= health <= 1.0`
/// - `status` only changes along the edges of [`AgentStatus::can_transition_to`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub dependencies: BTreeSet<AgentId>,
    pub status: AgentStatus,
    pub health: f64,
    /// Last time the agent answered a health check.
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default = "default_true")]
    pub auto_heal: bool,

    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Runtime signals from the last sample (latency, memory, ...).
    #[serde(default)]
    pub metrics: HashMap<String, f64>,

    /// Remediation attempts spent on the ongoing failure.
    #[serde(default)]
    pub healing_attempts: u32,

    /// Name of the strategy that matched the ongoing failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_signature: Option<String>,

    /// Set when the last sample errored or timed out instead of returning a score.
    #[serde(default)]
    pub last_check_failed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

enum TagDerived<'a> {
    Capability(&'a str),
    Dependency(&'a str),
}

impl<'a> TagDerived<'a> {
    fn parse(tag: &'a str) -> Option<Self> {
        if let Some(cap) = tag.strip_prefix("capability:") {
            Some(Self::Capability(cap))
        } else {
            tag.strip_prefix("depends-on:").map(Self::Dependency)
        }
    }
}

impl AgentMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(id),
            name: name.into(),
            capabilities: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            status: AgentStatus::Initializing,
            health: 1.0,
            last_heartbeat: now,
            consecutive_failures: 0,
            auto_heal: true,
            address: String::new(),
            port: 0,
            tags: BTreeSet::new(),
            metrics: HashMap::new(),
            healing_attempts: 0,
            failure_signature: None,
            last_check_failed: false,
            last_checked: None,
            registered_at: now,
        }
    }

    /// Build metadata for a freshly discovered service.
    ///
    /// Tags of the form `capability:<name>` become capabilities and
    /// `depends-on:<id>` become dependencies.
    pub fn from_descriptor(descriptor: &AgentDescriptor) -> Self {
        let mut metadata = Self::new(descriptor.id.as_str(), descriptor.id.as_str());
        metadata.apply_descriptor(descriptor);
        metadata
    }

    /// Refresh endpoint, tags and tag-derived sets from a newer descriptor.
    ///
    /// Entries derived from the previous tags are dropped first, so the
    /// derived sets always mirror the current tags. Capabilities declared
    /// outside of tags are kept.
    pub fn apply_descriptor(&mut self, descriptor: &AgentDescriptor) {
        for tag in &self.tags {
            match TagDerived::parse(tag) {
                Some(TagDerived::Capability(cap)) => {
                    self.capabilities.remove(cap);
                }
                Some(TagDerived::Dependency(dep)) => {
                    self.dependencies.remove(&AgentId::new(dep));
                }
                None => {}
            }
        }

        self.address = descriptor.address.clone();
        self.port = descriptor.port;
        self.tags = descriptor.tags.clone();
        for tag in &descriptor.tags {
            match TagDerived::parse(tag) {
                Some(TagDerived::Capability(cap)) => {
                    self.capabilities.insert(cap.to_string());
                }
                Some(TagDerived::Dependency(dep)) => {
                    self.dependencies.insert(AgentId::new(dep));
                }
                None => {}
            }
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_auto_heal(mut self, auto_heal: bool) -> Self {
        self.auto_heal = auto_heal;
        self
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition(&mut self, next: AgentStatus) -> Result<(), (AgentStatus, AgentStatus)> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err((self.status, next));
        }
        self.status = next;
        Ok(())
    }

    /// Clear the ongoing-failure bookkeeping after recovery.
    pub fn reset_healing(&mut self) {
        self.healing_attempts = 0;
        self.failure_signature = None;
    }

    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_heartbeat)
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}

/// Filter applied to registry listings; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentFilter {
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub capability: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    /// Only agents with `health` strictly below this value.
    #[serde(default)]
    pub health_below: Option<f64>,
}

impl AgentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, agent: &AgentMetadata) -> bool {
        if let Some(status) = self.status {
            if agent.status != status {
                return false;
            }
        }
        if let Some(cap) = &self.capability {
            if !agent.capabilities.contains(cap) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !agent.tags.contains(tag) {
                return false;
            }
        }
        if let Some(limit) = self.health_below {
            if agent.health >= limit {
                return false;
            }
        }
        true
    }
}

fn default_true() -> bool {
    true
}
