// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Discovery Backend Domain Interface (Anti-Corruption Layer)
//
// Abstracts the service-discovery system that tells the orchestrator which
// agents exist. Implementations live in infrastructure/discovery/:
// - StaticDiscoveryBackend: fixed in-memory list, no external coordination
// - ConsulDiscoveryBackend: Consul agent HTTP API
//
// Connectivity failures must be recoverable: a backend is expected to work
// again on the next call once the remote side is back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::{AgentDescriptor, AgentId};

/// Wire-level name for the entries a backend returns.
pub type ServiceDescriptor = AgentDescriptor;

#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Short backend name for logs ("static", "consul").
    fn name(&self) -> &'static str;

    async fn discover_services(&self) -> Result<Vec<ServiceDescriptor>, DiscoveryError>;

    async fn register_service(&self, descriptor: &ServiceDescriptor) -> Result<(), DiscoveryError>;

    async fn deregister_service(&self, id: &AgentId) -> Result<(), DiscoveryError>;

    /// Release pooled connections. Called on every coordinator stop and
    /// when a running coordinator is dropped; later calls may reopen them.
    async fn close(&self) {}
}

/// How to resolve two reports for the same id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Later reports overwrite earlier ones, including existing registry entries.
    #[default]
    MostRecentWins,
    /// The first report is kept; existing registry entries are never rewritten.
    FirstSeenWins,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery backend unreachable: {0}")]
    Unreachable(String),

    #[error("Discovery call timed out after {0} ms")]
    Timeout(u64),

    #[error("Discovery backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid discovery response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DiscoveryError::Timeout(0)
        } else if err.is_decode() {
            DiscoveryError::InvalidResponse(err.to_string())
        } else {
            DiscoveryError::Unreachable(err.to_string())
        }
    }
}
