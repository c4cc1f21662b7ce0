// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Error Taxonomy
//
// Only ConfigurationError is fatal, and only from start(). Everything else
// is isolated to the agent or cycle that produced it.

use thiserror::Error;

use crate::domain::capability::{ExecutionError, HealthCheckError, InitError};
use crate::domain::config::ConfigurationError;
use crate::domain::discovery::DiscoveryError;
use crate::domain::healing::{HealingExhaustedError, RemediationError};
use crate::domain::registry::RegistryError;
use crate::domain::verification::VerificationError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    HealthCheck(#[from] HealthCheckError),

    #[error(transparent)]
    HealingExhausted(#[from] HealingExhaustedError),

    #[error(transparent)]
    Remediation(#[from] RemediationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Orchestrator is already running")]
    AlreadyRunning,

    #[error("Orchestrator is not running")]
    NotRunning,
}

impl OrchestratorError {
    /// Whether this error must abort the orchestrator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrchestratorError::Configuration(_))
    }
}
