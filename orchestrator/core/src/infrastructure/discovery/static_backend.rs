// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Static Discovery Backend
//
// Serves a fixed service list from configuration. Registrations made at
// runtime (including the orchestrator's own) are kept in memory, so the
// backend behaves like a single-node registry with no external coordination.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::agent::AgentId;
use crate::domain::discovery::{DiscoveryBackend, DiscoveryError, ServiceDescriptor};

pub struct StaticDiscoveryBackend {
    services: RwLock<Vec<ServiceDescriptor>>,
}

impl StaticDiscoveryBackend {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            services: RwLock::new(services),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Replace the whole list; takes effect on the next discovery cycle.
    pub fn set_services(&self, services: Vec<ServiceDescriptor>) {
        *self.services.write() = services;
    }
}

#[async_trait]
impl DiscoveryBackend for StaticDiscoveryBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn discover_services(&self) -> Result<Vec<ServiceDescriptor>, DiscoveryError> {
        Ok(self.services.read().clone())
    }

    async fn register_service(&self, descriptor: &ServiceDescriptor) -> Result<(), DiscoveryError> {
        let mut services = self.services.write();
        services.retain(|s| s.id != descriptor.id);
        services.push(descriptor.clone());
        Ok(())
    }

    async fn deregister_service(&self, id: &AgentId) -> Result<(), DiscoveryError> {
        self.services.write().retain(|s| &s.id != id);
        Ok(())
    }
}
