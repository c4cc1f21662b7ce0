// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Metrics Sink Domain Interface
//
// The core pushes observations into an injected sink; the composition root
// decides where they go (Prometheus, a test recorder, nowhere). Transport is
// never owned here.

use std::time::Duration;

use crate::domain::agent::AgentId;

pub trait MetricsSink: Send + Sync {
    fn record_agent_count(&self, count: usize);

    fn record_health(&self, component: &str, health: f64);

    fn record_healing_event(&self, agent_id: &AgentId, strategy: &str);

    fn record_healing_exhausted(&self, agent_id: &AgentId, strategy: &str);

    /// Wall time of one full monitor cycle.
    fn record_cycle_latency(&self, elapsed: Duration);

    fn record_discovery_failure(&self, backend: &str);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_agent_count(&self, _count: usize) {}
    fn record_health(&self, _component: &str, _health: f64) {}
    fn record_healing_event(&self, _agent_id: &AgentId, _strategy: &str) {}
    fn record_healing_exhausted(&self, _agent_id: &AgentId, _strategy: &str) {}
    fn record_cycle_latency(&self, _elapsed: Duration) {}
    fn record_discovery_failure(&self, _backend: &str) {}
}
