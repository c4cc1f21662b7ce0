// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use ouroboros_core::application::{HealingOutcome, LifecycleCoordinator};
use ouroboros_core::domain::agent::{AgentId, AgentMetadata, AgentStatus};
use ouroboros_core::domain::capability::{
    ExecutionError, HealthCheckError, InitError, ManagedAgent, TaskInput, TaskOutput,
};
use ouroboros_core::domain::config::OrchestratorConfigManifest;
use ouroboros_core::domain::discovery::{DiscoveryBackend, ServiceDescriptor};
use ouroboros_core::domain::events::AgentLifecycleEvent;
use ouroboros_core::domain::healing::{HealingAction, HealingCondition, HealingStrategy, SkipReason};
use ouroboros_core::domain::metrics::NoopMetricsSink;
use ouroboros_core::domain::registry::{AgentRegistry, RegistryError};
use ouroboros_core::infrastructure::discovery::StaticDiscoveryBackend;
use ouroboros_core::infrastructure::{AgentCatalog, EventBus, HttpAgentConnector, InMemoryAgentRegistry};

/// Agent whose health checks follow a script; the last score repeats.
struct ScriptedAgent {
    scores: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
    hang: bool,
    init_delay: Duration,
    initializations: AtomicU32,
}

impl ScriptedAgent {
    fn scores(scores: &[f64]) -> Arc<Self> {
        Arc::new(Self {
            scores: Mutex::new(scores.iter().copied().collect()),
            last: Mutex::new(1.0),
            hang: false,
            init_delay: Duration::ZERO,
            initializations: AtomicU32::new(0),
        })
    }

    /// Health checks never return.
    fn hanging() -> Arc<Self> {
        Arc::new(Self {
            scores: Mutex::new(VecDeque::new()),
            last: Mutex::new(1.0),
            hang: true,
            init_delay: Duration::ZERO,
            initializations: AtomicU32::new(0),
        })
    }

    fn slow_init(score: f64, init_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scores: Mutex::new(VecDeque::from(vec![score])),
            last: Mutex::new(score),
            hang: false,
            init_delay,
            initializations: AtomicU32::new(0),
        })
    }

    fn initializations(&self) -> u32 {
        self.initializations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedAgent for ScriptedAgent {
    async fn initialize(&self) -> Result<(), InitError> {
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        self.initializations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, task: TaskInput) -> Result<TaskOutput, ExecutionError> {
        Ok(TaskOutput {
            result: serde_json::json!({ "echo": task.prompt }),
            logs: vec![],
        })
    }

    async fn health_check(&self) -> Result<f64, HealthCheckError> {
        if self.hang {
            return std::future::pending().await;
        }
        let next = self.scores.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(score) = next {
            *last = score;
        }
        Ok(*last)
    }
}

fn manifest(strategies: Vec<HealingStrategy>) -> OrchestratorConfigManifest {
    let mut config = OrchestratorConfigManifest::default();
    config.spec.health.check_timeout = Duration::from_millis(50);
    config.spec.healing.strategies = strategies;
    config.spec.healing.base_backoff = Duration::ZERO;
    config
}

struct Harness {
    coordinator: LifecycleCoordinator,
    registry: Arc<InMemoryAgentRegistry>,
    backend: Arc<StaticDiscoveryBackend>,
    event_bus: EventBus,
}

fn harness(config: OrchestratorConfigManifest, agents: Vec<(&str, Arc<ScriptedAgent>)>) -> Harness {
    let registry = Arc::new(InMemoryAgentRegistry::new(config.registry_policy()));
    let descriptors = agents
        .iter()
        .map(|(id, _)| ServiceDescriptor::new(*id, "127.0.0.1", 9000))
        .collect();
    let backend = Arc::new(StaticDiscoveryBackend::new(descriptors));
    let catalog = agents
        .into_iter()
        .fold(AgentCatalog::builder(), |builder, (id, agent)| builder.agent(id, agent))
        .build();
    let event_bus = EventBus::new(256);
    let coordinator = LifecycleCoordinator::new(
        config,
        registry.clone(),
        backend.clone(),
        Arc::new(catalog),
        Arc::new(NoopMetricsSink),
        event_bus.clone(),
    );
    Harness {
        coordinator,
        registry,
        backend,
        event_bus,
    }
}

#[tokio::test]
async fn test_degraded_agent_is_healed_and_recovers() {
    let a2 = ScriptedAgent::scores(&[0.3, 0.9]);
    let strategy = HealingStrategy::new(
        "restart-degraded",
        HealingCondition::HealthBelow { threshold: 0.5 },
        HealingAction::RestartInPlace,
    );
    let h = harness(
        manifest(vec![strategy]),
        vec![
            ("a1", ScriptedAgent::scores(&[1.0])),
            ("a2", a2.clone()),
            ("a3", ScriptedAgent::scores(&[1.0])),
        ],
    );
    let a2_id = AgentId::from("a2");

    let merged = h.coordinator.discovery().run_cycle().await.unwrap();
    assert_eq!(merged.registered, 3);

    let report = h.coordinator.monitor().run_cycle().await;
    assert_eq!(report.initialized, 3);
    assert_eq!(report.sampled, 3);
    assert_eq!(report.healing_candidates, vec![a2_id.clone()]);

    let outcomes = h.coordinator.healing().evaluate(report.healing_candidates).await;
    assert!(matches!(outcomes[0], HealingOutcome::Remediated { attempt: 1, .. }));
    assert_eq!(h.registry.get(&a2_id).unwrap().status, AgentStatus::Healing);
    assert_eq!(a2.initializations(), 2);
    assert_eq!(h.coordinator.healing_events_total(), 1);

    let report = h.coordinator.monitor().run_cycle().await;
    assert!(report.healing_candidates.is_empty());

    let a2_meta = h.registry.get(&a2_id).unwrap();
    assert_eq!(a2_meta.status, AgentStatus::Active);
    assert_eq!(a2_meta.consecutive_failures, 0);
    assert_eq!(a2_meta.healing_attempts, 0);
    assert_eq!(a2.initializations(), 2);

    for id in ["a1", "a3"] {
        assert_eq!(h.registry.get(&AgentId::from(id)).unwrap().status, AgentStatus::Active);
    }
    assert_eq!(h.coordinator.health_by_component().get("a2"), Some(&0.9));
}

#[tokio::test]
async fn test_duplicate_ids_across_discovery_calls_are_deduplicated() {
    let registry = Arc::new(InMemoryAgentRegistry::default());
    let backend = Arc::new(StaticDiscoveryBackend::empty());
    let coordinator = LifecycleCoordinator::new(
        OrchestratorConfigManifest::default(),
        registry.clone(),
        backend.clone(),
        Arc::new(HttpAgentConnector::new()),
        Arc::new(NoopMetricsSink),
        EventBus::new(512),
    );

    let first: Vec<ServiceDescriptor> = (0..50)
        .map(|i| ServiceDescriptor::new(format!("svc-{:03}", i), "10.0.0.1", 8000 + i))
        .collect();
    // 40 ids repeat from the first call, 10 are new
    let second: Vec<ServiceDescriptor> = (10..60)
        .map(|i| ServiceDescriptor::new(format!("svc-{:03}", i), "10.0.0.2", 8000 + i))
        .collect();
    assert_eq!(first.len() + second.len(), 100);

    backend.set_services(first);
    let report = coordinator.discovery().run_cycle().await.unwrap();
    assert_eq!(report.registered, 50);

    backend.set_services(second.clone());
    let report = coordinator.discovery().run_cycle().await.unwrap();
    assert_eq!(report.registered, 10);
    assert_eq!(report.updated, 40);
    assert_eq!(registry.len(), 60);

    // Later reports win: the repeated ids now point at the second address
    assert_eq!(registry.get(&AgentId::from("svc-020")).unwrap().address, "10.0.0.2");
    assert_eq!(registry.get(&AgentId::from("svc-005")).unwrap().address, "10.0.0.1");

    // Merging the same batch again changes nothing
    let report = coordinator.discovery().merge(second);
    assert_eq!(report.registered, 0);
    assert_eq!(registry.len(), 60);
}

#[tokio::test]
async fn test_unresponsive_agent_fails_after_retry_budget() {
    let a4 = ScriptedAgent::hanging();
    let strategy = HealingStrategy::new("restart-on-crash", HealingCondition::Crashed, HealingAction::RestartInPlace)
        .with_max_retries(3);
    let h = harness(manifest(vec![strategy]), vec![("a4", a4.clone())]);
    let a4_id = AgentId::from("a4");
    let mut events = h.event_bus.subscribe_agent(a4_id.clone());

    h.coordinator.discovery().run_cycle().await.unwrap();

    for cycle in 1u32..=5 {
        let report = h.coordinator.monitor().run_cycle().await;
        assert_eq!(report.failed_checks, 1, "cycle {}", cycle);
        let outcome = h
            .coordinator
            .healing()
            .evaluate(report.healing_candidates)
            .await
            .remove(0);
        let status = h.registry.get(&a4_id).unwrap().status;

        match cycle {
            1..=3 => {
                assert!(
                    matches!(outcome, HealingOutcome::Remediated { attempt, .. } if attempt == cycle),
                    "cycle {}: {:?}",
                    cycle,
                    outcome
                );
                assert_eq!(status, AgentStatus::Healing);
            }
            4 => {
                match outcome {
                    HealingOutcome::Exhausted(err) => assert_eq!(err.attempts, 3),
                    other => panic!("expected exhaustion, got {:?}", other),
                }
                assert_eq!(status, AgentStatus::Failed);
            }
            _ => {
                assert!(matches!(
                    outcome,
                    HealingOutcome::Skipped { reason: SkipReason::Terminal, .. }
                ));
                assert_eq!(status, AgentStatus::Failed);
            }
        }
    }

    // One initialization at startup plus three remediations
    assert_eq!(a4.initializations(), 4);
    assert_eq!(h.coordinator.healing_events_total(), 3);

    let mut exhausted = 0;
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), events.recv()).await {
        if matches!(event, AgentLifecycleEvent::HealingExhausted { .. }) {
            exhausted += 1;
        }
    }
    assert_eq!(exhausted, 1);
}

#[tokio::test]
async fn test_single_remediation_in_flight_per_agent() {
    let agent = ScriptedAgent::slow_init(0.1, Duration::from_millis(100));
    let strategy = HealingStrategy::new(
        "restart-degraded",
        HealingCondition::HealthBelow { threshold: 0.5 },
        HealingAction::RestartInPlace,
    );
    let h = harness(manifest(vec![strategy]), vec![("slow", agent.clone())]);
    let id = AgentId::from("slow");

    h.coordinator.discovery().run_cycle().await.unwrap();
    let report = h.coordinator.monitor().run_cycle().await;
    assert_eq!(report.healing_candidates, vec![id.clone()]);

    let outcomes = h.coordinator.healing().evaluate(vec![id.clone(), id.clone()]).await;
    let remediated = outcomes
        .iter()
        .filter(|o| matches!(o, HealingOutcome::Remediated { .. }))
        .count();
    let in_flight = outcomes
        .iter()
        .filter(|o| matches!(o, HealingOutcome::AlreadyInFlight(_)))
        .count();
    assert_eq!(remediated, 1);
    assert_eq!(in_flight, 1);
    assert!(!h.registry.is_remediating(&id));
    assert_eq!(agent.initializations(), 2);
}

#[tokio::test]
async fn test_agent_with_expired_heartbeat_is_pruned() {
    let mut config = manifest(vec![]);
    config.spec.health.heartbeat_timeout = Duration::from_millis(100);
    config.spec.health.check_timeout = Duration::from_millis(20);
    let h = harness(
        config,
        vec![("silent", ScriptedAgent::hanging()), ("chatty", ScriptedAgent::scores(&[1.0]))],
    );
    let silent = AgentId::from("silent");
    let mut events = h.event_bus.subscribe_agent(silent.clone());

    h.coordinator.discovery().run_cycle().await.unwrap();
    let report = h.coordinator.monitor().run_cycle().await;
    assert!(report.pruned.is_empty());
    assert_eq!(report.healing_candidates, vec![silent.clone()]);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let report = h.coordinator.monitor().run_cycle().await;
    assert_eq!(report.pruned, vec![silent.clone()]);
    assert!(report.healing_candidates.is_empty());
    assert!(matches!(h.registry.get(&silent), Err(RegistryError::NotFound(_))));
    assert_eq!(h.coordinator.agent_count(), 1);

    let mut pruned = false;
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), events.recv()).await {
        pruned |= matches!(event, AgentLifecycleEvent::AgentPruned { .. });
    }
    assert!(pruned);

    // Still listed by the backend, so the next discovery pass brings it back
    assert_eq!(h.backend.discover_services().await.unwrap().len(), 2);
    let merged = h.coordinator.discovery().run_cycle().await.unwrap();
    assert_eq!(merged.registered, 1);
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let h = harness(manifest(vec![]), vec![]);
    let agent = ScriptedAgent::scores(&[1.0]);

    h.registry
        .register(AgentMetadata::new("dup", "dup"), agent.clone())
        .unwrap();
    let err = h
        .registry
        .register(AgentMetadata::new("dup", "dup"), agent.clone())
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateRegistration(_)));

    // A failed entry may be replaced
    let id = AgentId::from("dup");
    for status in [AgentStatus::Active, AgentStatus::Healing, AgentStatus::Failed] {
        h.registry.transition(&id, status).unwrap();
    }
    h.registry.register(AgentMetadata::new("dup", "dup"), agent).unwrap();
    assert_eq!(h.registry.get(&id).unwrap().status, AgentStatus::Initializing);
}
