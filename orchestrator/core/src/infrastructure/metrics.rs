// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Prometheus Metrics Sink
//
// Records through the `metrics` facade; whichever recorder the host
// installed receives the observations. `install_prometheus_exporter` is the
// stock way to put one in place with a scrape endpoint.
//
// Exported series:
// - ouroboros_agents                      gauge
// - ouroboros_health{component}           gauge
// - ouroboros_healing_total{strategy}     counter
// - ouroboros_healing_exhausted_total     counter
// - ouroboros_orch_latency_seconds        histogram (monitor cycle wall time)
// - ouroboros_discovery_failures_total    counter

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::agent::AgentId;
use crate::domain::config::MetricsConfig;
use crate::domain::metrics::MetricsSink;

pub const AGENTS_GAUGE: &str = "ouroboros_agents";
pub const HEALTH_GAUGE: &str = "ouroboros_health";
pub const HEALING_COUNTER: &str = "ouroboros_healing_total";
pub const HEALING_EXHAUSTED_COUNTER: &str = "ouroboros_healing_exhausted_total";
pub const CYCLE_LATENCY_HISTOGRAM: &str = "ouroboros_orch_latency_seconds";
pub const DISCOVERY_FAILURE_COUNTER: &str = "ouroboros_discovery_failures_total";

#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetricsSink;

impl PrometheusMetricsSink {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn record_agent_count(&self, count: usize) {
        metrics::gauge!(AGENTS_GAUGE).set(count as f64);
    }

    fn record_health(&self, component: &str, health: f64) {
        metrics::gauge!(HEALTH_GAUGE, "component" => component.to_string()).set(health);
    }

    fn record_healing_event(&self, _agent_id: &AgentId, strategy: &str) {
        // Per-agent labels would grow without bound; label by strategy only.
        metrics::counter!(HEALING_COUNTER, "strategy" => strategy.to_string()).increment(1);
    }

    fn record_healing_exhausted(&self, _agent_id: &AgentId, strategy: &str) {
        metrics::counter!(HEALING_EXHAUSTED_COUNTER, "strategy" => strategy.to_string()).increment(1);
    }

    fn record_cycle_latency(&self, elapsed: Duration) {
        metrics::histogram!(CYCLE_LATENCY_HISTOGRAM).record(elapsed.as_secs_f64());
    }

    fn record_discovery_failure(&self, backend: &str) {
        metrics::counter!(DISCOVERY_FAILURE_COUNTER, "backend" => backend.to_string()).increment(1);
    }
}

/// Install the global Prometheus recorder with an HTTP scrape listener.
///
/// Must be called from inside a tokio runtime. Returns `Ok(false)` without
/// installing anything when metrics are disabled.
pub fn install_prometheus_exporter(config: &MetricsConfig) -> Result<bool> {
    if !config.enabled {
        return Ok(false);
    }

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid metrics listen address {}:{}", config.bind_address, config.port))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    tracing::info!("Prometheus metrics exporter listening on {}", addr);
    Ok(true)
}
