// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Consul Discovery Backend
//
// Anti-Corruption Layer over the Consul agent HTTP API:
// - GET  /v1/agent/services                     -> discover_services
// - PUT  /v1/agent/service/register             -> register_service
// - PUT  /v1/agent/service/deregister/{id}      -> deregister_service
//
// Services registered without an explicit address inherit the agent's
// host, matching how Consul itself resolves them.
//
// close() drops the pooled HTTP client; the next call builds a fresh one,
// so a backend survives a coordinator stop/start.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::agent::AgentId;
use crate::domain::discovery::{DiscoveryBackend, DiscoveryError, ServiceDescriptor};

const TOKEN_HEADER: &str = "X-Consul-Token";

pub struct ConsulDiscoveryBackend {
    client: RwLock<Option<reqwest::Client>>,
    call_timeout: Duration,
    address: String,
    token: Option<String>,
    datacenter: Option<String>,
    default_host: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    address: String,
    port: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    tags: Vec<&'a str>,
    address: &'a str,
    port: u16,
}

impl ConsulDiscoveryBackend {
    pub fn new(
        address: impl Into<String>,
        token: Option<String>,
        datacenter: Option<String>,
        call_timeout: Duration,
    ) -> Result<Self, DiscoveryError> {
        let address = address.into().trim_end_matches('/').to_string();
        let default_host = reqwest::Url::parse(&address)
            .map_err(|e| DiscoveryError::Unreachable(format!("invalid Consul address '{}': {}", address, e)))?
            .host_str()
            .unwrap_or("localhost")
            .to_string();
        let client = Self::build_client(call_timeout)?;

        Ok(Self {
            client: RwLock::new(Some(client)),
            call_timeout,
            address,
            token,
            datacenter,
            default_host,
        })
    }

    fn build_client(call_timeout: Duration) -> Result<reqwest::Client, DiscoveryError> {
        reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))
    }

    /// The pooled client, rebuilt if a previous `close` dropped it.
    fn client(&self) -> Result<reqwest::Client, DiscoveryError> {
        if let Some(client) = self.client.read().as_ref() {
            return Ok(client.clone());
        }
        let mut slot = self.client.write();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        debug!("Reopening Consul HTTP client");
        let client = Self::build_client(self.call_timeout)?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn is_open(&self) -> bool {
        self.client.read().is_some()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, DiscoveryError> {
        let url = match &self.datacenter {
            Some(dc) => format!("{}{}?dc={}", self.address, path, dc),
            None => format!("{}{}", self.address, path),
        };
        let mut builder = self.client()?.request(method, &url);
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        Ok(builder)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DiscoveryError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(DiscoveryError::Http { status, body })
    }
}

#[async_trait]
impl DiscoveryBackend for ConsulDiscoveryBackend {
    fn name(&self) -> &'static str {
        "consul"
    }

    async fn discover_services(&self) -> Result<Vec<ServiceDescriptor>, DiscoveryError> {
        let response = self
            .request(reqwest::Method::GET, "/v1/agent/services")?
            .send()
            .await?;
        let services: HashMap<String, ConsulService> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))?;

        let mut descriptors: Vec<ServiceDescriptor> = services
            .into_values()
            .map(|service| {
                let address = if service.address.is_empty() {
                    self.default_host.clone()
                } else {
                    service.address
                };
                ServiceDescriptor {
                    id: AgentId::new(service.id),
                    address,
                    port: service.port,
                    tags: service.tags.unwrap_or_default().into_iter().collect::<BTreeSet<_>>(),
                }
            })
            .collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        debug!("Consul reported {} services", descriptors.len());
        Ok(descriptors)
    }

    async fn register_service(&self, descriptor: &ServiceDescriptor) -> Result<(), DiscoveryError> {
        let body = ConsulRegistration {
            id: descriptor.id.as_str(),
            name: descriptor.id.as_str(),
            tags: descriptor.tags.iter().map(String::as_str).collect(),
            address: &descriptor.address,
            port: descriptor.port,
        };
        let response = self
            .request(reqwest::Method::PUT, "/v1/agent/service/register")?
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn deregister_service(&self, id: &AgentId) -> Result<(), DiscoveryError> {
        let path = format!("/v1/agent/service/deregister/{}", id);
        let response = self.request(reqwest::Method::PUT, &path)?.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!("Consul has no service '{}' to deregister", id);
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.client.write().take().is_some() {
            debug!("Closed Consul HTTP client");
        }
    }
}
