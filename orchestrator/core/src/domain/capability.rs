// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Agent Capability Contract
//
// Every managed unit exposes `initialize`, `execute` and `health_check`.
// The orchestrator never introspects agents; it only talks to this trait.
// The remediation hooks have no-op defaults so simple agents only implement
// the three required calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::agent::AgentDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub prompt: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub result: serde_json::Value,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Limits applied by the constrained-restart remediation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_millis: Option<u32>,
    pub memory_bytes: Option<u64>,
}

/// Point-in-time resource usage reported alongside a health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_bytes: Option<u64>,
}

#[derive(Debug, Error)]
#[error("Agent initialization failed: {0}")]
pub struct InitError(pub String);

#[derive(Debug, Error)]
#[error("Task execution failed: {0}")]
pub struct ExecutionError(pub String);

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("Health check timed out after {0} ms")]
    Timeout(u64),
    #[error("Health check failed: {0}")]
    Failed(String),
    #[error("Health check returned out-of-range score {0}")]
    InvalidScore(f64),
}

#[async_trait]
pub trait ManagedAgent: Send + Sync {
    async fn initialize(&self) -> Result<(), InitError>;

    async fn execute(&self, task: TaskInput) -> Result<TaskOutput, ExecutionError>;

    /// Score in `[0, 1]`.
    async fn health_check(&self) -> Result<f64, HealthCheckError>;

    async fn resource_usage(&self) -> ResourceUsage {
        ResourceUsage::default()
    }

    /// Hard stop used by kill-and-restart.
    async fn terminate(&self) -> Result<(), ExecutionError> {
        Ok(())
    }

    async fn apply_resource_limits(&self, _limits: &ResourceLimits) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// Resolves a discovered descriptor to the handle the orchestrator drives.
///
/// This is the explicit registration list: agents are bound by id (or by a
/// fallback such as an HTTP client), never by introspecting code.
pub trait AgentConnector: Send + Sync {
    fn connect(&self, descriptor: &AgentDescriptor) -> Result<Arc<dyn ManagedAgent>, InitError>;
}

/// Normalise a raw score, rejecting NaN and values outside `[0, 1]`.
pub fn validate_score(score: f64) -> Result<f64, HealthCheckError> {
    if score.is_nan() || !(0.0..=1.0).contains(&score) {
        return Err(HealthCheckError::InvalidScore(score));
    }
    Ok(score)
}
