// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Discovery backend factory
//
// Selects the backend implementation from configuration.

use std::sync::Arc;

use crate::domain::config::{ConfigurationError, DiscoveryBackendConfig, DiscoveryConfig};
use crate::domain::discovery::DiscoveryBackend;
use crate::infrastructure::discovery::{ConsulDiscoveryBackend, StaticDiscoveryBackend};

pub fn build_discovery_backend(config: &DiscoveryConfig) -> Result<Arc<dyn DiscoveryBackend>, ConfigurationError> {
    match &config.backend {
        DiscoveryBackendConfig::Static { services } => {
            tracing::info!(services = services.len(), "Using static discovery backend");
            Ok(Arc::new(StaticDiscoveryBackend::new(services.clone())))
        }
        DiscoveryBackendConfig::Consul { address, token, datacenter } => {
            tracing::info!(address = %address, "Using Consul discovery backend");
            let backend = ConsulDiscoveryBackend::new(address.clone(), token.clone(), datacenter.clone(), config.call_timeout)
                .map_err(|e| ConfigurationError::Invalid(format!("consul backend: {}", e)))?;
            Ok(Arc::new(backend))
        }
    }
}
