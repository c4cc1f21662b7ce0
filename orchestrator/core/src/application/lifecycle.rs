// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Lifecycle Coordinator
//!
//! Composes discovery, health monitoring and self-healing around one shared
//! registry and owns their start/stop semantics.
//!
//! # Start
//! 1. Validate configuration (the only fatal error).
//! 2. One discovery pass, then optional self-registration.
//! 3. Initialize discovered agents.
//! 4. Spawn the discovery loop, the monitor loop and the healing loop; the
//!    monitor feeds the engine through a bounded channel.
//!
//! # Stop
//! Cancel all loops, wait up to `shutdown_grace`, abort stragglers, then
//! deregister, close the backend and clear the registry. The release steps
//! run whether or not the coordinator was running, and dropping a running
//! coordinator aborts its loops, clears the registry and closes the backend
//! on the current runtime as well.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::discovery::DiscoveryAdapter;
use crate::application::discovery_factory::build_discovery_backend;
use crate::application::health_monitor::HealthMonitor;
use crate::application::self_healing::SelfHealingEngine;
use crate::domain::capability::AgentConnector;
use crate::domain::config::OrchestratorConfigManifest;
use crate::domain::discovery::DiscoveryBackend;
use crate::domain::error::OrchestratorError;
use crate::domain::events::CoordinatorEvent;
use crate::domain::metrics::MetricsSink;
use crate::domain::registry::AgentRegistry;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::registry::InMemoryAgentRegistry;

const HEALING_QUEUE_DEPTH: usize = 16;

struct RunningState {
    run_id: Uuid,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct LifecycleCoordinator {
    config: OrchestratorConfigManifest,
    registry: Arc<dyn AgentRegistry>,
    backend: Arc<dyn DiscoveryBackend>,
    metrics: Arc<dyn MetricsSink>,
    event_bus: EventBus,
    discovery: Arc<DiscoveryAdapter>,
    monitor: Arc<HealthMonitor>,
    healing: Arc<SelfHealingEngine>,
    running: Mutex<Option<RunningState>>,
}

impl LifecycleCoordinator {
    pub fn new(
        config: OrchestratorConfigManifest,
        registry: Arc<dyn AgentRegistry>,
        backend: Arc<dyn DiscoveryBackend>,
        connector: Arc<dyn AgentConnector>,
        metrics: Arc<dyn MetricsSink>,
        event_bus: EventBus,
    ) -> Self {
        let spec = &config.spec;
        let discovery = Arc::new(DiscoveryAdapter::new(
            backend.clone(),
            registry.clone(),
            connector,
            metrics.clone(),
            event_bus.clone(),
            spec.discovery.clone(),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            metrics.clone(),
            event_bus.clone(),
            spec.health.clone(),
            spec.lifecycle.init_timeout,
        ));
        let healing = Arc::new(SelfHealingEngine::new(
            registry.clone(),
            metrics.clone(),
            event_bus.clone(),
            config.effective_strategies(),
            &spec.healing,
        ));

        Self {
            config,
            registry,
            backend,
            metrics,
            event_bus,
            discovery,
            monitor,
            healing,
            running: Mutex::new(None),
        }
    }

    /// Wire up an in-memory registry and the configured discovery backend.
    pub fn from_config(
        config: OrchestratorConfigManifest,
        connector: Arc<dyn AgentConnector>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let backend = build_discovery_backend(&config.spec.discovery)?;
        let registry = Arc::new(InMemoryAgentRegistry::new(config.registry_policy()));
        Ok(Self::new(config, registry, backend, connector, metrics, EventBus::with_default_capacity()))
    }

    pub async fn start(&self) -> Result<Uuid, OrchestratorError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(OrchestratorError::AlreadyRunning);
        }
        if let Err(e) = self.config.validate() {
            warn!("Refusing to start with invalid configuration: {}", e);
            return Err(e.into());
        }

        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            backend = self.discovery.backend_name(),
            "Starting lifecycle coordinator"
        );

        let initial_failures = match self.discovery.run_cycle().await {
            Ok(report) => {
                info!(
                    registered = report.registered,
                    updated = report.updated,
                    "Initial discovery pass completed"
                );
                0
            }
            Err(e) => {
                warn!("Initial discovery pass failed, the discovery loop will retry: {}", e);
                self.metrics.record_discovery_failure(self.discovery.backend_name());
                1
            }
        };

        if let Some(descriptor) = &self.config.spec.discovery.self_registration {
            match self.discovery.register_self(descriptor).await {
                Ok(()) => info!(service_id = %descriptor.id, "Registered orchestrator with discovery backend"),
                Err(e) => warn!(service_id = %descriptor.id, "Self-registration failed: {}", e),
            }
        }

        let activated = self.monitor.initialize_pending().await;

        let shutdown = CancellationToken::new();
        let (healing_tx, healing_rx) = mpsc::channel(HEALING_QUEUE_DEPTH);
        let tasks = vec![
            self.discovery.clone().start(shutdown.child_token(), initial_failures),
            self.monitor.clone().start(shutdown.child_token(), healing_tx),
            self.healing.clone().start(shutdown.child_token(), healing_rx),
        ];
        *running = Some(RunningState { run_id, shutdown, tasks });

        let agents = self.registry.len();
        self.metrics.record_agent_count(agents);
        self.event_bus.publish_coordinator_event(CoordinatorEvent::Started {
            run_id,
            agents,
            started_at: Utc::now(),
        });
        info!(run_id = %run_id, agents, activated, "Lifecycle coordinator started");
        Ok(run_id)
    }

    /// Stop all loops and release every resource. Returns how many registry
    /// entries were cleared.
    pub async fn stop(&self) -> usize {
        let running = self.running.lock().await.take();
        let run_id = running.as_ref().map(|r| r.run_id);

        if let Some(RunningState { shutdown, mut tasks, .. }) = running {
            info!("Stopping lifecycle coordinator");
            shutdown.cancel();
            let grace = self.config.spec.lifecycle.shutdown_grace;
            let joined = tokio::time::timeout(grace, futures::future::join_all(tasks.iter_mut())).await;
            if joined.is_err() {
                warn!(grace_ms = grace.as_millis() as u64, "Loops did not stop within grace period, aborting");
                for task in &tasks {
                    task.abort();
                }
            }
        }

        let cleared = self.release().await;
        if let Some(run_id) = run_id {
            self.event_bus.publish_coordinator_event(CoordinatorEvent::Stopped {
                run_id,
                cleared,
                stopped_at: Utc::now(),
            });
            info!(run_id = %run_id, cleared, "Lifecycle coordinator stopped");
        }
        cleared
    }

    async fn release(&self) -> usize {
        if let Some(descriptor) = &self.config.spec.discovery.self_registration {
            if let Err(e) = self.discovery.deregister_self(&descriptor.id).await {
                warn!(service_id = %descriptor.id, "Self-deregistration failed: {}", e);
            }
        }

        let close_timeout = self.config.spec.discovery.call_timeout;
        if tokio::time::timeout(close_timeout, self.backend.close()).await.is_err() {
            warn!(backend = self.backend.name(), "Closing discovery backend timed out");
        }

        let cleared = self.registry.clear();
        self.metrics.record_agent_count(0);
        cleared
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub fn agent_count(&self) -> usize {
        self.registry.len()
    }

    pub fn healing_events_total(&self) -> u64 {
        self.healing.healing_events_total()
    }

    /// Current health score per agent id.
    pub fn health_by_component(&self) -> BTreeMap<String, f64> {
        self.registry
            .list(&Default::default())
            .into_iter()
            .map(|agent| (agent.id.0, agent.health))
            .collect()
    }

    pub fn registry(&self) -> Arc<dyn AgentRegistry> {
        self.registry.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn discovery(&self) -> &Arc<DiscoveryAdapter> {
        &self.discovery
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn healing(&self) -> &Arc<SelfHealingEngine> {
        &self.healing
    }
}

impl Drop for LifecycleCoordinator {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.shutdown.cancel();
            for task in &running.tasks {
                task.abort();
            }
            let cleared = self.registry.clear();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let backend = self.backend.clone();
                runtime.spawn(async move { backend.close().await });
            }
            warn!(cleared, "Lifecycle coordinator dropped while running, loops aborted");
        }
    }
}
