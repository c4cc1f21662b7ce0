// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Agent Catalog
//
// Explicit registration list binding discovered ids to in-process agent
// handles. Ids that are not listed go to the fallback connector (typically
// `HttpAgentConnector`); without a fallback they are rejected and discovery
// skips them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::agent::{AgentDescriptor, AgentId};
use crate::domain::capability::{AgentConnector, InitError, ManagedAgent};

pub struct AgentCatalog {
    agents: HashMap<AgentId, Arc<dyn ManagedAgent>>,
    fallback: Option<Arc<dyn AgentConnector>>,
}

impl AgentCatalog {
    pub fn builder() -> AgentCatalogBuilder {
        AgentCatalogBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }
}

impl AgentConnector for AgentCatalog {
    fn connect(&self, descriptor: &AgentDescriptor) -> Result<Arc<dyn ManagedAgent>, InitError> {
        if let Some(agent) = self.agents.get(&descriptor.id) {
            return Ok(agent.clone());
        }
        match &self.fallback {
            Some(connector) => connector.connect(descriptor),
            None => Err(InitError(format!("no agent implementation registered for {}", descriptor.id))),
        }
    }
}

#[derive(Default)]
pub struct AgentCatalogBuilder {
    agents: HashMap<AgentId, Arc<dyn ManagedAgent>>,
    fallback: Option<Arc<dyn AgentConnector>>,
}

impl AgentCatalogBuilder {
    /// Bind `id` to `agent`. A later binding for the same id replaces the earlier one.
    pub fn agent(mut self, id: impl Into<String>, agent: Arc<dyn ManagedAgent>) -> Self {
        self.agents.insert(AgentId::new(id), agent);
        self
    }

    pub fn fallback(mut self, connector: Arc<dyn AgentConnector>) -> Self {
        self.fallback = Some(connector);
        self
    }

    pub fn build(self) -> AgentCatalog {
        AgentCatalog {
            agents: self.agents,
            fallback: self.fallback,
        }
    }
}
