// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Self-Healing Engine
//!
//! Consumes healing candidates from the health monitor and applies the
//! first matching [`HealingStrategy`] to each.
//!
//! The apply / skip / exhaust decision is made by
//! [`plan_remediation`] inside [`AgentRegistry::begin_remediation`], so the
//! decision and the in-flight marker are taken under the same registry lock
//! and two triggers for one agent can never both start. The remediation
//! itself (backoff sleep plus the action) runs without the lock, bounded by
//! `remediation_timeout`, and always releases the marker when it ends.
//!
//! A successful action does not mark the agent `Active`; only the next
//! health sample above threshold does.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::agent::{AgentId, AgentMetadata};
use crate::domain::capability::ManagedAgent;
use crate::domain::config::HealingConfig;
use crate::domain::events::AgentLifecycleEvent;
use crate::domain::healing::{
    plan_remediation, HealingAction, HealingExhaustedError, HealingStrategy, RemediationError, SkipReason,
};
use crate::domain::metrics::MetricsSink;
use crate::domain::registry::{AgentRegistry, RemediationStart};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug)]
pub enum HealingOutcome {
    Remediated {
        agent_id: AgentId,
        strategy: String,
        attempt: u32,
    },
    RemediationFailed {
        agent_id: AgentId,
        strategy: String,
        attempt: u32,
        error: RemediationError,
    },
    Exhausted(HealingExhaustedError),
    Skipped {
        agent_id: AgentId,
        reason: SkipReason,
    },
    /// Another remediation for this agent was still running.
    AlreadyInFlight(AgentId),
    /// The agent left the registry before it could be evaluated.
    Gone(AgentId),
}

/// Carry out one remediation action against an agent handle.
pub async fn execute_action(agent: &dyn ManagedAgent, action: &HealingAction) -> Result<(), RemediationError> {
    match action {
        HealingAction::RestartInPlace => {}
        HealingAction::KillAndRestart => {
            agent
                .terminate()
                .await
                .map_err(|e| RemediationError::Failed(format!("terminate: {}", e)))?;
        }
        HealingAction::RestartWithConstrainedResources { limits } => {
            agent
                .apply_resource_limits(limits)
                .await
                .map_err(|e| RemediationError::Failed(format!("apply limits: {}", e)))?;
        }
    }
    agent
        .initialize()
        .await
        .map_err(|e| RemediationError::Failed(format!("initialize: {}", e)))
}

/// Releases the registry's in-flight marker however the remediation ends,
/// including when its task is aborted.
struct InFlightGuard<'a> {
    registry: &'a dyn AgentRegistry,
    agent_id: &'a AgentId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.finish_remediation(self.agent_id);
    }
}

pub struct SelfHealingEngine {
    registry: Arc<dyn AgentRegistry>,
    metrics: Arc<dyn MetricsSink>,
    event_bus: EventBus,
    strategies: Vec<HealingStrategy>,
    remediation_timeout: Duration,
    base_backoff: Duration,
    healing_events: AtomicU64,
}

impl SelfHealingEngine {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        metrics: Arc<dyn MetricsSink>,
        event_bus: EventBus,
        strategies: Vec<HealingStrategy>,
        config: &HealingConfig,
    ) -> Self {
        Self {
            registry,
            metrics,
            event_bus,
            strategies,
            remediation_timeout: config.remediation_timeout,
            base_backoff: config.base_backoff,
            healing_events: AtomicU64::new(0),
        }
    }

    pub fn strategies(&self) -> &[HealingStrategy] {
        &self.strategies
    }

    /// Remediations started since construction.
    pub fn healing_events_total(&self) -> u64 {
        self.healing_events.load(Ordering::Relaxed)
    }

    /// Evaluate a batch of candidates concurrently and wait for every
    /// remediation it starts.
    pub async fn evaluate(&self, candidates: Vec<AgentId>) -> Vec<HealingOutcome> {
        futures::future::join_all(candidates.into_iter().map(|id| self.heal(id))).await
    }

    /// Evaluate and, if warranted, remediate one agent.
    pub async fn heal(&self, agent_id: AgentId) -> HealingOutcome {
        let now = Utc::now();
        let plan = |agent: &AgentMetadata| plan_remediation(&self.strategies, agent, now);
        let start = match self.registry.begin_remediation(&agent_id, &plan) {
            Ok(start) => start,
            Err(e) => {
                debug!(agent_id = %agent_id, "Skipping healing: {}", e);
                return HealingOutcome::Gone(agent_id);
            }
        };

        match start {
            RemediationStart::AlreadyInFlight => {
                debug!(agent_id = %agent_id, "Remediation already in flight");
                HealingOutcome::AlreadyInFlight(agent_id)
            }
            RemediationStart::Skipped(reason) => {
                debug!(agent_id = %agent_id, ?reason, "No remediation applied");
                HealingOutcome::Skipped { agent_id, reason }
            }
            RemediationStart::Exhausted(err) => {
                error!(
                    agent_id = %agent_id,
                    strategy = %err.strategy,
                    attempts = err.attempts,
                    "Healing retries exhausted, agent marked failed"
                );
                self.metrics.record_healing_exhausted(&agent_id, &err.strategy);
                self.event_bus.publish_agent_event(AgentLifecycleEvent::HealingExhausted {
                    agent_id: agent_id.clone(),
                    strategy: err.strategy.clone(),
                    attempts: err.attempts,
                    failed_at: Utc::now(),
                });
                HealingOutcome::Exhausted(err)
            }
            RemediationStart::Started { strategy, attempt, metadata } => {
                let _guard = InFlightGuard {
                    registry: self.registry.as_ref(),
                    agent_id: &agent_id,
                };
                self.healing_events.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_healing_event(&agent_id, &strategy.name);
                info!(
                    agent_id = %agent_id,
                    strategy = %strategy.name,
                    action = strategy.action.kind(),
                    attempt,
                    max_retries = strategy.max_retries,
                    health = metadata.health,
                    "Applying healing strategy"
                );
                self.event_bus.publish_agent_event(AgentLifecycleEvent::HealingStarted {
                    agent_id: agent_id.clone(),
                    strategy: strategy.name.clone(),
                    action: strategy.action.kind().to_string(),
                    attempt,
                    started_at: Utc::now(),
                });

                match self.remediate(&agent_id, &strategy, attempt).await {
                    Ok(()) => {
                        debug!(agent_id = %agent_id, strategy = %strategy.name, attempt, "Remediation action completed");
                        HealingOutcome::Remediated {
                            agent_id: agent_id.clone(),
                            strategy: strategy.name,
                            attempt,
                        }
                    }
                    Err(error) => {
                        warn!(agent_id = %agent_id, strategy = %strategy.name, attempt, "Remediation failed: {}", error);
                        self.event_bus.publish_agent_event(AgentLifecycleEvent::RemediationFailed {
                            agent_id: agent_id.clone(),
                            strategy: strategy.name.clone(),
                            reason: error.to_string(),
                            failed_at: Utc::now(),
                        });
                        HealingOutcome::RemediationFailed {
                            agent_id: agent_id.clone(),
                            strategy: strategy.name,
                            attempt,
                            error,
                        }
                    }
                }
            }
        }
    }

    async fn remediate(&self, agent_id: &AgentId, strategy: &HealingStrategy, attempt: u32) -> Result<(), RemediationError> {
        let handle = self
            .registry
            .handle(agent_id)
            .ok_or_else(|| RemediationError::MissingHandle(agent_id.clone()))?;

        let delay = strategy.backoff(self.base_backoff, attempt);
        if !delay.is_zero() {
            debug!(agent_id = %agent_id, delay_ms = delay.as_millis() as u64, "Backing off before remediation");
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(self.remediation_timeout, execute_action(handle.as_ref(), &strategy.action)).await {
            Ok(result) => result,
            Err(_) => Err(RemediationError::Timeout(self.remediation_timeout.as_millis() as u64)),
        }
    }

    /// Spawn the engine loop. Every received batch is evaluated on its own
    /// task so a slow remediation never holds up the next batch.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken, mut candidates: mpsc::Receiver<Vec<AgentId>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(strategies = self.strategies.len(), "Starting self-healing engine");
            let mut remediations = JoinSet::new();

            loop {
                tokio::select! {
                    batch = candidates.recv() => {
                        let Some(batch) = batch else { break };
                        let engine = self.clone();
                        remediations.spawn(async move {
                            engine.evaluate(batch).await;
                        });
                    }
                    Some(_) = remediations.join_next(), if !remediations.is_empty() => {}
                    _ = shutdown.cancelled() => {
                        info!("Shutdown signal received, stopping self-healing engine");
                        break;
                    }
                }
            }

            // Aborted remediations release their in-flight markers on drop.
            remediations.shutdown().await;
            info!("Self-healing engine stopped");
        })
    }
}
