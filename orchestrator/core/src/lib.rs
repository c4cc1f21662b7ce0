// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Ouroboros Orchestrator Core
//!
//! Agent lifecycle management for the dynamic orchestrator: a shared
//! registry, a discovery adapter that keeps it in sync with an external
//! service catalog, a health monitor, and a self-healing engine, all composed
//! by the [`LifecycleCoordinator`](application::LifecycleCoordinator).
//!
//! # Architecture
//!
//! - **domain:** agent model, capability contract, strategies, events, config
//! - **application:** discovery, monitoring, healing and coordination services
//! - **infrastructure:** in-memory registry, discovery backends, HTTP agent
//!   client, event bus, telemetry and Prometheus metrics

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
