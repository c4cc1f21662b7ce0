// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Health Monitor
//!
//! Periodic loop that samples every registered agent, independent of the
//! discovery cadence. One cycle:
//!
//! 1. Initialize agents still in `Initializing` (bounded by `init_timeout`).
//! 2. Take a registry snapshot and fan `health_check()` out across agents,
//!    at most `max_concurrent_checks` at a time, each bounded by
//!    `check_timeout`. A timeout or error is a `0.0` sample.
//! 3. Write every sample back with `update_health`.
//! 4. Prune agents whose last heartbeat is older than `heartbeat_timeout`.
//!
//! Agents below the threshold for `failures_before_healing` consecutive
//! samples are handed to the self-healing engine over a channel.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::agent::{AgentFilter, AgentId, AgentStatus};
use crate::domain::capability::validate_score;
use crate::domain::config::HealthConfig;
use crate::domain::events::AgentLifecycleEvent;
use crate::domain::metrics::MetricsSink;
use crate::domain::registry::{AgentRegistry, HealthSample, RegisteredAgent, RegistryError};
use crate::infrastructure::event_bus::EventBus;

/// What one monitor cycle did.
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub initialized: usize,
    pub sampled: usize,
    pub failed_checks: usize,
    pub pruned: Vec<AgentId>,
    /// Agents to hand to the self-healing engine.
    pub healing_candidates: Vec<AgentId>,
}

pub struct HealthMonitor {
    registry: Arc<dyn AgentRegistry>,
    metrics: Arc<dyn MetricsSink>,
    event_bus: EventBus,
    config: HealthConfig,
    init_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        metrics: Arc<dyn MetricsSink>,
        event_bus: EventBus,
        config: HealthConfig,
        init_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            metrics,
            event_bus,
            config,
            init_timeout,
        }
    }

    /// Run `initialize()` on every `Initializing` agent; successes become `Active`.
    /// Failures stay `Initializing` and are retried next cycle.
    pub async fn initialize_pending(&self) -> usize {
        let pending: Vec<RegisteredAgent> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|agent| agent.metadata.status == AgentStatus::Initializing)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let init_timeout = self.init_timeout;
        let results: Vec<(AgentId, Result<(), String>)> = stream::iter(pending)
            .map(|agent| async move {
                let result = match tokio::time::timeout(init_timeout, agent.handle.initialize()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("initialize timed out after {} ms", init_timeout.as_millis())),
                };
                (agent.metadata.id, result)
            })
            .buffer_unordered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        let mut activated = 0;
        for (agent_id, result) in results {
            match result {
                Ok(()) => match self.registry.transition(&agent_id, AgentStatus::Active) {
                    Ok(_) => {
                        activated += 1;
                        info!(agent_id = %agent_id, "Agent initialized");
                        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentActivated {
                            agent_id,
                            activated_at: Utc::now(),
                        });
                    }
                    Err(RegistryError::NotFound(_)) => {
                        debug!(agent_id = %agent_id, "Agent removed during initialization");
                    }
                    Err(e) => warn!(agent_id = %agent_id, "Could not activate agent: {}", e),
                },
                Err(reason) => {
                    warn!(agent_id = %agent_id, "Agent initialization failed: {}", reason);
                    self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentInitFailed {
                        agent_id,
                        reason,
                        failed_at: Utc::now(),
                    });
                }
            }
        }
        activated
    }

    async fn sample(&self, agent: RegisteredAgent) -> (AgentId, HealthSample) {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.check_timeout, agent.handle.health_check()).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut sample = match outcome.map(|result| result.and_then(validate_score)) {
            Ok(Ok(score)) => HealthSample::healthy(score),
            Ok(Err(e)) => {
                debug!(agent_id = %agent.metadata.id, "Health check failed: {}", e);
                HealthSample::failed()
            }
            Err(_) => {
                debug!(
                    agent_id = %agent.metadata.id,
                    timeout_ms = self.config.check_timeout.as_millis() as u64,
                    "Health check timed out"
                );
                HealthSample::failed()
            }
        };

        if sample.responded {
            sample.latency_ms = Some(latency_ms);
            if let Ok(usage) = tokio::time::timeout(self.config.check_timeout, agent.handle.resource_usage()).await {
                sample.memory_bytes = usage.memory_bytes;
            }
        }
        (agent.metadata.id, sample)
    }

    /// One full monitor cycle.
    pub async fn run_cycle(&self) -> MonitorReport {
        let started = Instant::now();
        let mut report = MonitorReport {
            initialized: self.initialize_pending().await,
            ..MonitorReport::default()
        };

        let targets: Vec<RegisteredAgent> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|agent| agent.metadata.status != AgentStatus::Initializing)
            .collect();

        let samples: Vec<(AgentId, HealthSample)> = stream::iter(targets)
            .map(|agent| self.sample(agent))
            .buffer_unordered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        for (agent_id, sample) in samples {
            report.sampled += 1;
            if !sample.responded {
                report.failed_checks += 1;
            }

            let update = match self.registry.update_health(&agent_id, &sample) {
                Ok(update) => update,
                Err(RegistryError::NotFound(_)) => continue,
                Err(e) => {
                    warn!(agent_id = %agent_id, "Failed to record health sample: {}", e);
                    continue;
                }
            };
            let metadata = update.metadata.clone();
            self.metrics.record_health(agent_id.as_str(), metadata.health);

            if update.recovered() {
                info!(agent_id = %agent_id, health = metadata.health, "Agent recovered");
                self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentRecovered {
                    agent_id: agent_id.clone(),
                    health: metadata.health,
                    recovered_at: Utc::now(),
                });
            }

            if metadata.health < self.config.unhealthy_threshold {
                debug!(
                    agent_id = %agent_id,
                    health = metadata.health,
                    consecutive_failures = metadata.consecutive_failures,
                    "Agent below health threshold"
                );
                self.event_bus.publish_agent_event(AgentLifecycleEvent::HealthDegraded {
                    agent_id: agent_id.clone(),
                    health: metadata.health,
                    consecutive_failures: metadata.consecutive_failures,
                    observed_at: Utc::now(),
                });
                if metadata.consecutive_failures >= self.config.failures_before_healing {
                    report.healing_candidates.push(agent_id);
                }
            }
        }

        for pruned in self.registry.prune_stale(self.config.heartbeat_timeout, Utc::now()) {
            warn!(
                agent_id = %pruned.id,
                last_heartbeat = %pruned.last_heartbeat,
                "Pruning agent with expired heartbeat"
            );
            self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentPruned {
                agent_id: pruned.id.clone(),
                last_heartbeat: pruned.last_heartbeat,
                pruned_at: Utc::now(),
            });
            report.pruned.push(pruned.id);
        }
        report.healing_candidates.retain(|id| !report.pruned.contains(id));

        self.metrics.record_agent_count(self.registry.len());
        self.metrics.record_cycle_latency(started.elapsed());
        report
    }

    /// Number of agents currently below the threshold.
    pub fn unhealthy_count(&self) -> usize {
        let filter = AgentFilter {
            health_below: Some(self.config.unhealthy_threshold),
            ..AgentFilter::default()
        };
        self.registry.list(&filter).len()
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken, healing_tx: mpsc::Sender<Vec<AgentId>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown, healing_tx).await;
        })
    }

    async fn run(&self, shutdown: CancellationToken, healing_tx: mpsc::Sender<Vec<AgentId>>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            check_timeout_ms = self.config.check_timeout.as_millis() as u64,
            heartbeat_timeout_ms = self.config.heartbeat_timeout.as_millis() as u64,
            "Starting health monitor"
        );

        let mut tick = tokio::time::interval(self.config.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The coordinator already ran the startup pass; skip the immediate tick.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping health monitor");
                    break;
                }
            }

            let report = tokio::select! {
                report = self.run_cycle() => report,
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping health monitor");
                    break;
                }
            };

            debug!(
                sampled = report.sampled,
                failed_checks = report.failed_checks,
                pruned = report.pruned.len(),
                candidates = report.healing_candidates.len(),
                "Health monitor cycle completed"
            );

            if report.healing_candidates.is_empty() {
                continue;
            }
            match healing_tx.try_send(report.healing_candidates) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Next cycle recomputes the candidate set
                    warn!("Self-healing engine is backlogged, dropping candidate batch");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    info!("Self-healing engine stopped, stopping health monitor");
                    break;
                }
            }
        }

        info!("Health monitor stopped");
    }
}
