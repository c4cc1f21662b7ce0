// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Discovery Adapter
//!
//! Polls a [`DiscoveryBackend`] on a fixed interval and merges what it
//! reports into the registry.
//!
//! A merge is linear in the number of descriptors: the batch is collapsed
//! by id into a `HashMap`, and membership is tested against the registry's
//! id `HashSet`. New ids are registered as `Initializing`; known ids have
//! their endpoint refreshed (unless the conflict policy is first-seen-wins).
//! Ids that stop being reported are left alone; pruning belongs to the
//! health monitor. The orchestrator's own self-registration is never
//! merged as an agent.
//!
//! A failed or timed-out cycle never touches the registry. The loop retries
//! with exponential backoff capped at `backoff_max`.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::agent::{AgentId, AgentMetadata};
use crate::domain::capability::AgentConnector;
use crate::domain::config::DiscoveryConfig;
use crate::domain::discovery::{ConflictPolicy, DiscoveryBackend, DiscoveryError, ServiceDescriptor};
use crate::domain::events::{AgentLifecycleEvent, DiscoveryEvent};
use crate::domain::metrics::MetricsSink;
use crate::domain::registry::{AgentRegistry, RegistryError};
use crate::infrastructure::event_bus::EventBus;

/// Outcome of merging one discovery batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Ids inserted into the registry by this merge.
    pub registered: usize,
    /// Known ids whose endpoint/tags were refreshed.
    pub updated: usize,
    /// Known ids left untouched (first-seen-wins).
    pub unchanged: usize,
    /// Reports dropped because the same id appeared earlier in the batch.
    pub duplicates: usize,
    /// Descriptors with no resolvable agent handle.
    pub skipped: usize,
}

impl MergeReport {
    pub fn touched(&self) -> usize {
        self.registered + self.updated
    }
}

/// Delay before the next attempt after `failures` consecutive failed cycles.
pub fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let exponent = (failures - 1).min(20);
    base.saturating_mul(1u32 << exponent).min(max)
}

pub struct DiscoveryAdapter {
    backend: Arc<dyn DiscoveryBackend>,
    registry: Arc<dyn AgentRegistry>,
    connector: Arc<dyn AgentConnector>,
    metrics: Arc<dyn MetricsSink>,
    event_bus: EventBus,
    config: DiscoveryConfig,
}

impl DiscoveryAdapter {
    pub fn new(
        backend: Arc<dyn DiscoveryBackend>,
        registry: Arc<dyn AgentRegistry>,
        connector: Arc<dyn AgentConnector>,
        metrics: Arc<dyn MetricsSink>,
        event_bus: EventBus,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            connector,
            metrics,
            event_bus,
            config,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// One bounded call to the backend.
    pub async fn discover(&self) -> Result<Vec<ServiceDescriptor>, DiscoveryError> {
        match tokio::time::timeout(self.config.call_timeout, self.backend.discover_services()).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout(self.config.call_timeout.as_millis() as u64)),
        }
    }

    /// Merge one batch into the registry. Never holds the registry lock
    /// for more than a single registry call.
    pub fn merge(&self, descriptors: Vec<ServiceDescriptor>) -> MergeReport {
        let mut report = MergeReport::default();

        let mut order: Vec<AgentId> = Vec::with_capacity(descriptors.len());
        let mut unique: HashMap<AgentId, ServiceDescriptor> = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match unique.get_mut(&descriptor.id) {
                Some(existing) => {
                    report.duplicates += 1;
                    if self.config.conflict_policy == ConflictPolicy::MostRecentWins {
                        *existing = descriptor;
                    }
                }
                None => {
                    order.push(descriptor.id.clone());
                    unique.insert(descriptor.id.clone(), descriptor);
                }
            }
        }

        let self_id = self.config.self_registration.as_ref().map(|d| &d.id);
        let known = self.registry.ids();
        for id in order {
            let Some(descriptor) = unique.remove(&id) else {
                continue;
            };
            // The orchestrator's own announcement is not a managed agent
            if self_id == Some(&id) {
                report.unchanged += 1;
                continue;
            }

            if known.contains(&id) {
                if self.config.conflict_policy == ConflictPolicy::FirstSeenWins {
                    report.unchanged += 1;
                    continue;
                }
                match self.registry.update_descriptor(&id, &descriptor) {
                    Ok(()) => report.updated += 1,
                    // Pruned or unregistered since the id snapshot was taken
                    Err(RegistryError::NotFound(_)) => self.register_new(&descriptor, &mut report),
                    Err(e) => warn!(agent_id = %id, "Failed to refresh descriptor: {}", e),
                }
            } else {
                self.register_new(&descriptor, &mut report);
            }
        }

        report
    }

    fn register_new(&self, descriptor: &ServiceDescriptor, report: &mut MergeReport) {
        let handle = match self.connector.connect(descriptor) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(agent_id = %descriptor.id, "No agent handle for discovered service: {}", e);
                report.skipped += 1;
                return;
            }
        };

        match self.registry.register(AgentMetadata::from_descriptor(descriptor), handle) {
            Ok(()) => {
                report.registered += 1;
                debug!(agent_id = %descriptor.id, endpoint = %descriptor.endpoint(), "Registered discovered agent");
                self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentRegistered {
                    agent_id: descriptor.id.clone(),
                    address: descriptor.address.clone(),
                    port: descriptor.port,
                    registered_at: Utc::now(),
                });
            }
            Err(RegistryError::DuplicateRegistration(id)) => {
                // Registered concurrently between the id snapshot and now
                debug!(agent_id = %id, "Agent registered concurrently, skipping");
                report.unchanged += 1;
            }
            Err(e) => {
                warn!(agent_id = %descriptor.id, "Failed to register discovered agent: {}", e);
                report.skipped += 1;
            }
        }
    }

    /// Discover and merge once.
    pub async fn run_cycle(&self) -> Result<MergeReport, DiscoveryError> {
        let descriptors = self.discover().await?;
        let report = self.merge(descriptors);
        self.metrics.record_agent_count(self.registry.len());
        self.event_bus.publish_discovery_event(DiscoveryEvent::CycleCompleted {
            backend: self.backend.name().to_string(),
            registered: report.registered,
            updated: report.updated,
            completed_at: Utc::now(),
        });
        Ok(report)
    }

    pub async fn register_self(&self, descriptor: &ServiceDescriptor) -> Result<(), DiscoveryError> {
        match tokio::time::timeout(self.config.call_timeout, self.backend.register_service(descriptor)).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout(self.config.call_timeout.as_millis() as u64)),
        }
    }

    pub async fn deregister_self(&self, id: &AgentId) -> Result<(), DiscoveryError> {
        match tokio::time::timeout(self.config.call_timeout, self.backend.deregister_service(id)).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout(self.config.call_timeout.as_millis() as u64)),
        }
    }

    /// Spawn the polling loop. `initial_failures` seeds the backoff when the
    /// caller's own first pass already failed.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken, initial_failures: u32) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown, initial_failures).await;
        })
    }

    async fn run(&self, shutdown: CancellationToken, initial_failures: u32) {
        info!(
            backend = self.backend.name(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting discovery loop"
        );

        let mut failures = initial_failures;
        loop {
            let delay = if failures == 0 {
                self.config.interval
            } else {
                backoff_delay(failures, self.config.backoff_base, self.config.backoff_max)
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping discovery loop");
                    break;
                }
            }

            // Cancellation also interrupts an in-flight backend call.
            let result = tokio::select! {
                result = self.run_cycle() => result,
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping discovery loop");
                    break;
                }
            };

            match result {
                Ok(report) => {
                    if failures > 0 {
                        info!(failures, "Discovery backend reachable again");
                    }
                    failures = 0;
                    debug!(
                        registered = report.registered,
                        updated = report.updated,
                        duplicates = report.duplicates,
                        "Discovery cycle completed"
                    );
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let retry_in = backoff_delay(failures, self.config.backoff_base, self.config.backoff_max);
                    warn!(
                        backend = self.backend.name(),
                        failures,
                        retry_in_ms = retry_in.as_millis() as u64,
                        "Discovery cycle failed, registry left unchanged: {}",
                        e
                    );
                    self.metrics.record_discovery_failure(self.backend.name());
                    self.event_bus.publish_discovery_event(DiscoveryEvent::CycleFailed {
                        backend: self.backend.name().to_string(),
                        error: e.to_string(),
                        retry_in_ms: retry_in.as_millis() as u64,
                        failed_at: Utc::now(),
                    });
                }
            }
        }

        info!("Discovery loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentStatus;
    use crate::domain::capability::{
        ExecutionError, HealthCheckError, InitError, ManagedAgent, TaskInput, TaskOutput,
    };
    use crate::domain::metrics::NoopMetricsSink;
    use crate::domain::registry::RegistryPolicy;
    use crate::infrastructure::registry::InMemoryAgentRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullAgent;

    #[async_trait]
    impl ManagedAgent for NullAgent {
        async fn initialize(&self) -> Result<(), InitError> {
            Ok(())
        }
        async fn execute(&self, _task: TaskInput) -> Result<TaskOutput, ExecutionError> {
            Err(ExecutionError("unused".to_string()))
        }
        async fn health_check(&self) -> Result<f64, HealthCheckError> {
            Ok(1.0)
        }
    }

    struct AnyConnector;

    impl AgentConnector for AnyConnector {
        fn connect(&self, _descriptor: &ServiceDescriptor) -> Result<Arc<dyn ManagedAgent>, InitError> {
            Ok(Arc::new(NullAgent))
        }
    }

    /// Backend that returns a fixed batch and counts calls.
    struct CountingBackend {
        batch: Vec<ServiceDescriptor>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DiscoveryBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn discover_services(&self) -> Result<Vec<ServiceDescriptor>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.batch.clone())
        }
        async fn register_service(&self, _descriptor: &ServiceDescriptor) -> Result<(), DiscoveryError> {
            Ok(())
        }
        async fn deregister_service(&self, _id: &AgentId) -> Result<(), DiscoveryError> {
            Ok(())
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl DiscoveryBackend for HangingBackend {
        fn name(&self) -> &'static str {
            "hanging"
        }
        async fn discover_services(&self) -> Result<Vec<ServiceDescriptor>, DiscoveryError> {
            std::future::pending().await
        }
        async fn register_service(&self, _descriptor: &ServiceDescriptor) -> Result<(), DiscoveryError> {
            std::future::pending().await
        }
        async fn deregister_service(&self, _id: &AgentId) -> Result<(), DiscoveryError> {
            Ok(())
        }
    }

    fn build_adapter(
        backend: Arc<dyn DiscoveryBackend>,
        policy: ConflictPolicy,
    ) -> (DiscoveryAdapter, Arc<InMemoryAgentRegistry>) {
        let registry = Arc::new(InMemoryAgentRegistry::new(RegistryPolicy::default()));
        let config = DiscoveryConfig {
            call_timeout: Duration::from_millis(50),
            conflict_policy: policy,
            ..DiscoveryConfig::default()
        };
        let adapter = DiscoveryAdapter::new(
            backend,
            registry.clone(),
            Arc::new(AnyConnector),
            Arc::new(NoopMetricsSink),
            EventBus::new(64),
            config,
        );
        (adapter, registry)
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(1);
        assert_eq!(backoff_delay(0, base, max), Duration::ZERO);
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(100));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(200));
        assert_eq!(backoff_delay(4, base, max), Duration::from_millis(800));
        assert_eq!(backoff_delay(5, base, max), max);
        assert_eq!(backoff_delay(u32::MAX, base, max), max);
    }

    #[tokio::test]
    async fn test_merge_registers_new_and_updates_known() {
        let backend = Arc::new(CountingBackend { batch: vec![], calls: AtomicUsize::new(0) });
        let (adapter, registry) = build_adapter(backend, ConflictPolicy::MostRecentWins);

        let report = adapter.merge(vec![
            ServiceDescriptor::new("a1", "10.0.0.1", 8000),
            ServiceDescriptor::new("a2", "10.0.0.2", 8000),
        ]);
        assert_eq!(report.registered, 2);
        assert_eq!(registry.get(&AgentId::from("a1")).unwrap().status, AgentStatus::Initializing);

        let report = adapter.merge(vec![
            ServiceDescriptor::new("a1", "10.0.0.9", 8001),
            ServiceDescriptor::new("a3", "10.0.0.3", 8000),
        ]);
        assert_eq!(report.registered, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(registry.len(), 3);

        let a1 = registry.get(&AgentId::from("a1")).unwrap();
        assert_eq!(a1.address, "10.0.0.9");
        assert_eq!(a1.port, 8001);
    }

    #[tokio::test]
    async fn test_duplicates_in_batch_respect_conflict_policy() {
        let batch = vec![
            ServiceDescriptor::new("a1", "first", 1),
            ServiceDescriptor::new("a1", "second", 2),
        ];

        let backend = Arc::new(CountingBackend { batch: vec![], calls: AtomicUsize::new(0) });
        let (adapter, registry) = build_adapter(backend.clone(), ConflictPolicy::MostRecentWins);
        let report = adapter.merge(batch.clone());
        assert_eq!(report.registered, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(registry.get(&AgentId::from("a1")).unwrap().address, "second");

        let (adapter, registry) = build_adapter(backend, ConflictPolicy::FirstSeenWins);
        adapter.merge(batch);
        assert_eq!(registry.get(&AgentId::from("a1")).unwrap().address, "first");
        let report = adapter.merge(vec![ServiceDescriptor::new("a1", "third", 3)]);
        assert_eq!(report.unchanged, 1);
        assert_eq!(registry.get(&AgentId::from("a1")).unwrap().address, "first");
    }

    #[tokio::test]
    async fn test_merge_skips_own_self_registration() {
        let registry = Arc::new(InMemoryAgentRegistry::new(RegistryPolicy::default()));
        let config = DiscoveryConfig {
            self_registration: Some(ServiceDescriptor::new("orchestrator", "10.1.0.1", 8088)),
            ..DiscoveryConfig::default()
        };
        let adapter = DiscoveryAdapter::new(
            Arc::new(CountingBackend { batch: vec![], calls: AtomicUsize::new(0) }),
            registry.clone(),
            Arc::new(AnyConnector),
            Arc::new(NoopMetricsSink),
            EventBus::new(16),
            config,
        );

        let report = adapter.merge(vec![
            ServiceDescriptor::new("orchestrator", "10.1.0.1", 8088),
            ServiceDescriptor::new("a1", "10.0.0.1", 8000),
        ]);
        assert_eq!(report.registered, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get(&AgentId::from("orchestrator")),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cycle_calls_backend_once() {
        let batch = (0..10)
            .map(|i| ServiceDescriptor::new(format!("a{}", i % 4), "10.0.0.1", 8000))
            .collect();
        let backend = Arc::new(CountingBackend { batch, calls: AtomicUsize::new(0) });
        let (adapter, registry) = build_adapter(backend.clone(), ConflictPolicy::MostRecentWins);

        let report = adapter.run_cycle().await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.registered, 4);
        assert_eq!(report.duplicates, 6);
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn test_timeout_leaves_registry_untouched() {
        let (adapter, registry) = build_adapter(Arc::new(HangingBackend), ConflictPolicy::MostRecentWins);
        adapter.merge(vec![ServiceDescriptor::new("a1", "10.0.0.1", 8000)]);

        let err = adapter.run_cycle().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout(50)));
        assert_eq!(registry.len(), 1);

        let err = adapter
            .register_self(&ServiceDescriptor::new("self", "10.0.0.1", 7000))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout(_)));
    }
}
