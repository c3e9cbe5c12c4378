/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/lib.rs
*
* Library root of the dockyards-rbac controller. The binary in `main.rs` only
* wires these modules together; everything that reconciles lives here so it can
* be exercised by the unit tests against in-memory collaborators.
*
* Modules:
* - `crds`: strongly-typed `Cluster`, `Organization` and `Workload` kinds.
* - `rbac`: the JSON input payload installed by the rbac WorkloadTemplate.
* - `store`: the typed store seam and the generic `create_or_patch` combinator.
* - `registry`: the explicit table of kinds the process is allowed to touch.
* - `ancestry`: owner Organization resolution for a Cluster.
* - `config`: dynamic key/value configuration and process settings.
* - `controllers`: the Cluster reconciler and the RBAC Workload synthesizer.
* - `metrics`: reconcile counters and the `/metrics` endpoint.
*
* SPDX-License-Identifier: Apache-2.0
*/

pub mod ancestry;
pub mod config;
pub mod controllers;
pub mod crds;
pub mod error;
pub mod metrics;
pub mod rbac;
pub mod registry;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
