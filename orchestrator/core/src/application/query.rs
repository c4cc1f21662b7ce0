// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Agent Query Service
//
// Read surface and manual operations for an external API layer. Transport,
// authentication and rate limiting are the caller's business; this service
// only talks to the registry and forwards verification triggers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::domain::agent::{AgentFilter, AgentId, AgentMetadata, AgentStatus};
use crate::domain::capability::ManagedAgent;
use crate::domain::events::AgentLifecycleEvent;
use crate::domain::registry::{AgentRegistry, RegistryError};
use crate::domain::verification::{VerificationError, VerificationHook, VerificationRequest, VerificationTicket};
use crate::infrastructure::event_bus::EventBus;

const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches before pagination.
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

pub struct AgentQueryService {
    registry: Arc<dyn AgentRegistry>,
    event_bus: EventBus,
    verification: Option<Arc<dyn VerificationHook>>,
}

impl AgentQueryService {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        event_bus: EventBus,
        verification: Option<Arc<dyn VerificationHook>>,
    ) -> Self {
        Self {
            registry,
            event_bus,
            verification,
        }
    }

    /// Filtered listing ordered by id. The limit is capped at 500.
    pub fn list_agents(&self, filter: &AgentFilter, pagination: Pagination) -> Page<AgentMetadata> {
        let limit = pagination.limit.clamp(1, MAX_PAGE_SIZE);
        let all = self.registry.list(filter);
        let total = all.len();
        let items = all.into_iter().skip(pagination.offset).take(limit).collect();
        Page {
            items,
            total,
            offset: pagination.offset,
            limit,
        }
    }

    pub fn get_agent(&self, id: &AgentId) -> Result<AgentMetadata, RegistryError> {
        self.registry.get(id)
    }

    pub async fn trigger_verification(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationTicket, VerificationError> {
        let hook = self.verification.as_ref().ok_or(VerificationError::NotConfigured)?;
        hook.trigger(request).await
    }

    /// Manual registration; the agent starts `Initializing` and is picked up
    /// by the next monitor cycle.
    pub fn register(&self, metadata: AgentMetadata, handle: Arc<dyn ManagedAgent>) -> Result<(), RegistryError> {
        let agent_id = metadata.id.clone();
        let address = metadata.address.clone();
        let port = metadata.port;
        self.registry.register(metadata, handle)?;
        info!(agent_id = %agent_id, "Agent registered manually");
        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentRegistered {
            agent_id,
            address,
            port,
            registered_at: Utc::now(),
        });
        Ok(())
    }

    /// Idempotent; returns whether an entry was removed.
    pub fn unregister(&self, id: &AgentId) -> bool {
        let removed = self.registry.unregister(id).is_some();
        if removed {
            info!(agent_id = %id, "Agent unregistered");
            self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentUnregistered {
                agent_id: id.clone(),
                unregistered_at: Utc::now(),
            });
        }
        removed
    }

    pub fn pause(&self, id: &AgentId) -> Result<AgentMetadata, RegistryError> {
        self.change_status(id, AgentStatus::Paused)
    }

    pub fn resume(&self, id: &AgentId) -> Result<AgentMetadata, RegistryError> {
        self.change_status(id, AgentStatus::Active)
    }

    fn change_status(&self, id: &AgentId, to: AgentStatus) -> Result<AgentMetadata, RegistryError> {
        let from = self.registry.get(id)?.status;
        let metadata = self.registry.transition(id, to)?;
        if from != to {
            info!(agent_id = %id, %from, %to, "Agent status changed manually");
            self.event_bus.publish_agent_event(AgentLifecycleEvent::StatusChanged {
                agent_id: id.clone(),
                from,
                to,
                changed_at: Utc::now(),
            });
        }
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::{ExecutionError, HealthCheckError, InitError, TaskInput, TaskOutput};
    use crate::domain::registry::RegistryPolicy;
    use crate::infrastructure::registry::InMemoryAgentRegistry;
    use async_trait::async_trait;

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

    struct AcceptAll;

    #[async_trait]
    impl VerificationHook for AcceptAll {
        async fn trigger(&self, request: VerificationRequest) -> Result<VerificationTicket, VerificationError> {
            Ok(VerificationTicket {
                id: "ticket-1".to_string(),
                accepted_agents: request.agents.len(),
            })
        }
    }

    fn service(verification: Option<Arc<dyn VerificationHook>>) -> AgentQueryService {
        let registry = Arc::new(InMemoryAgentRegistry::new(RegistryPolicy::default()));
        AgentQueryService::new(registry, EventBus::new(16), verification)
    }

    #[test]
    fn test_pagination() {
        let service = service(None);
        for i in 0..7 {
            service
                .register(AgentMetadata::new(format!("agent-{}", i), "worker"), Arc::new(NullAgent))
                .unwrap();
        }

        let page = service.list_agents(&AgentFilter::all(), Pagination { offset: 5, limit: 5 });
        assert_eq!(page.total, 7);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id.as_str(), "agent-5");

        let page = service.list_agents(&AgentFilter::all(), Pagination { offset: 0, limit: 0 });
        assert_eq!(page.limit, 1);
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn test_pause_resume_and_unregister() {
        let service = service(None);
        let id = AgentId::from("a1");
        service.register(AgentMetadata::new("a1", "a1"), Arc::new(NullAgent)).unwrap();

        // Not initialized yet
        assert!(matches!(service.pause(&id), Err(RegistryError::InvalidTransition { .. })));

        service.registry.transition(&id, AgentStatus::Active).unwrap();
        assert_eq!(service.pause(&id).unwrap().status, AgentStatus::Paused);
        assert_eq!(service.resume(&id).unwrap().status, AgentStatus::Active);

        assert!(service.unregister(&id));
        assert!(!service.unregister(&id));
        assert!(matches!(service.get_agent(&id), Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_trigger_verification() {
        let request = VerificationRequest {
            agents: vec![AgentId::from("a1"), AgentId::from("a2")],
            level: Some("syntax".to_string()),
        };

        let err = service(None).trigger_verification(request.clone()).await.unwrap_err();
        assert!(matches!(err, VerificationError::NotConfigured));

        let ticket = service(Some(Arc::new(AcceptAll)))
            .trigger_verification(request)
            .await
            .unwrap();
        assert_eq!(ticket.accepted_agents, 2);
    }
}
