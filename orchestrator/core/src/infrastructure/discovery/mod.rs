// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod consul;
pub mod static_backend;

pub use consul::ConsulDiscoveryBackend;
pub use static_backend::StaticDiscoveryBackend;
