// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// HTTP Agent Client
//
// Anti-Corruption Layer for agents that run out of process and expose the
// capability contract over HTTP:
// - POST /initialize
// - POST /execute     (TaskInput -> TaskOutput)
// - GET  /health      ({"score": f64, "memory_bytes": u64?})
// - POST /terminate   (optional; 404 means "not supported")
// - PUT  /limits      (optional; ResourceLimits body)
//
// Timeouts are applied by the callers (monitor / healing engine), not here.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;

use crate::domain::agent::AgentDescriptor;
use crate::domain::capability::{
    validate_score, AgentConnector, ExecutionError, HealthCheckError, InitError, ManagedAgent, ResourceLimits,
    ResourceUsage, TaskInput, TaskOutput,
};

#[derive(Deserialize)]
struct HealthResponse {
    score: f64,
    #[serde(default)]
    memory_bytes: Option<u64>,
}

pub struct HttpAgent {
    client: reqwest::Client,
    endpoint: String,
    last_usage: Mutex<ResourceUsage>,
}

impl HttpAgent {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            last_usage: Mutex::new(ResourceUsage::default()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

async fn error_text(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("HTTP {}: {}", status, body)
}

#[async_trait]
impl ManagedAgent for HttpAgent {
    async fn initialize(&self) -> Result<(), InitError> {
        let response = self
            .client
            .post(self.url("/initialize"))
            .send()
            .await
            .map_err(|e| InitError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InitError(error_text(response).await));
        }
        Ok(())
    }

    async fn execute(&self, task: TaskInput) -> Result<TaskOutput, ExecutionError> {
        let response = self
            .client
            .post(self.url("/execute"))
            .json(&task)
            .send()
            .await
            .map_err(|e| ExecutionError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutionError(error_text(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| ExecutionError(format!("Failed to parse response: {}", e)))
    }

    async fn health_check(&self) -> Result<f64, HealthCheckError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| HealthCheckError::Failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(HealthCheckError::Failed(error_text(response).await));
        }
        let health: HealthResponse = response
            .json()
            .await
            .map_err(|e| HealthCheckError::Failed(format!("Failed to parse response: {}", e)))?;

        *self.last_usage.lock() = ResourceUsage {
            memory_bytes: health.memory_bytes,
        };
        validate_score(health.score)
    }

    async fn resource_usage(&self) -> ResourceUsage {
        *self.last_usage.lock()
    }

    async fn terminate(&self) -> Result<(), ExecutionError> {
        let response = self
            .client
            .post(self.url("/terminate"))
            .send()
            .await
            .map_err(|e| ExecutionError(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(ExecutionError(error_text(response).await))
    }

    async fn apply_resource_limits(&self, limits: &ResourceLimits) -> Result<(), ExecutionError> {
        let response = self
            .client
            .put(self.url("/limits"))
            .json(limits)
            .send()
            .await
            .map_err(|e| ExecutionError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutionError(error_text(response).await));
        }
        Ok(())
    }
}

/// Builds an [`HttpAgent`] for any descriptor, pointed at its endpoint.
#[derive(Clone, Default)]
pub struct HttpAgentConnector {
    client: reqwest::Client,
}

impl HttpAgentConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl AgentConnector for HttpAgentConnector {
    fn connect(&self, descriptor: &AgentDescriptor) -> Result<Arc<dyn ManagedAgent>, InitError> {
        if descriptor.address.is_empty() {
            return Err(InitError(format!("descriptor {} has no address", descriptor.id)));
        }
        Ok(Arc::new(HttpAgent::new(self.client.clone(), descriptor.endpoint())))
    }
}
