// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Verification hook passthrough. The verification engine itself is an
// external collaborator; the query surface only forwards the trigger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::AgentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Agents whose output should be verified; empty means all.
    #[serde(default)]
    pub agents: Vec<AgentId>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationTicket {
    pub id: String,
    pub accepted_agents: usize,
}

#[async_trait]
pub trait VerificationHook: Send + Sync {
    async fn trigger(&self, request: VerificationRequest) -> Result<VerificationTicket, VerificationError>;
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("No verification hook configured")]
    NotConfigured,
    #[error("Verification engine rejected request: {0}")]
    Rejected(String),
}
