/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/error.rs
*
* Crate-wide error type. Every failure a reconciliation can hit is surfaced
* through this enum unchanged so the controller runtime can decide about
* requeueing. Not-found and "no owner" are not errors; they are modelled as
* `Ok(None)` by the store and the resolver.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("no value for config key `{0}`")]
    MissingConfig(&'static str),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Object is missing metadata.{0}")]
    MissingObjectKey(&'static str),

    #[error("Mutation of {0} changed its name or namespace")]
    KeyChanged(String),

    #[error("Kind {0} is not registered with this controller")]
    UnregisteredKind(String),

    #[error("Object {0} was modified concurrently, giving up after retries")]
    Conflict(String),

    #[error("Failed to resolve owner organization: {0}")]
    AncestryError(String),

    #[error("Reconciliation exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("Metrics registry error: {0}")]
    MetricsError(#[from] prometheus::Error),
}

impl Error {
    /// Short, stable label for the error kind. Used as the `error` label of
    /// the failure counter and as a log field.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube_error",
            Error::MissingConfig(_) => "missing_config",
            Error::SerializationError(_) => "serialization_error",
            Error::MissingObjectKey(_) => "missing_object_key",
            Error::KeyChanged(_) => "key_changed",
            Error::UnregisteredKind(_) => "unregistered_kind",
            Error::Conflict(_) => "conflict",
            Error::AncestryError(_) => "ancestry_error",
            Error::Timeout(_) => "timeout",
            Error::MetricsError(_) => "metrics_error",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
