// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_catalog;
pub mod agent_client;
pub mod discovery;
pub mod event_bus;
pub mod metrics;
pub mod registry;
pub mod telemetry;

pub use agent_catalog::{AgentCatalog, AgentCatalogBuilder};
pub use agent_client::{HttpAgent, HttpAgentConnector};
pub use event_bus::{DomainEvent, EventBus};
pub use self::metrics::{install_prometheus_exporter, PrometheusMetricsSink};
pub use registry::InMemoryAgentRegistry;
pub use telemetry::init_tracing;
