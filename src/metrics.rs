/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/metrics.rs
*
* Prometheus metrics for the reconcile loop and the HTTP endpoint exposing
* them.
*
* The metrics live in a registry owned by `Metrics`, created once at startup
* and shared with the reconciler through its context:
* - `dockyards_rbac_reconcile_runs_total`: every reconciliation started.
* - `dockyards_rbac_reconcile_failures_total{error}`: failed reconciliations,
*   labelled with `Error::metric_label`.
* - `dockyards_rbac_reconcile_duration_seconds`: wall time per reconciliation.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::Error;
use prometheus::{
    histogram_opts, opts, Encoder, Histogram, HistogramTimer, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use warp::{http::StatusCode, Filter};

#[derive(Clone, Debug)]
pub struct Metrics {
    registry: Registry,
    pub runs: IntCounter,
    pub failures: IntCounterVec,
    pub duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("dockyards_rbac".to_string()), None)?;

        let runs = IntCounter::with_opts(opts!("reconcile_runs_total", "Number of reconciliations."))?;
        let failures = IntCounterVec::new(
            opts!("reconcile_failures_total", "Number of reconciliation errors."),
            &["error"],
        )?;
        let duration = Histogram::with_opts(histogram_opts!(
            "reconcile_duration_seconds",
            "Duration of a reconciliation.",
            vec![0.01, 0.1, 0.25, 0.5, 1.0, 5.0, 15.0, 60.0]
        ))?;

        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            runs,
            failures,
            duration,
        })
    }

    /// Counts a run; the duration is observed when the timer is dropped.
    pub fn count_and_measure(&self) -> HistogramTimer {
        self.runs.inc();
        self.duration.start_timer()
    }

    pub fn count_failure(&self, error: &Error) {
        self.failures.with_label_values(&[error.metric_label()]).inc();
    }

    /// Renders the registry in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

async fn metrics_handler(metrics: Arc<Metrics>) -> Result<impl warp::Reply, warp::Rejection> {
    let (body, status) = match metrics.render() {
        Ok(body) => (body, StatusCode::OK),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (String::new(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    Ok(warp::reply::with_status(
        warp::reply::with_header(body, "Content-Type", prometheus::TEXT_FORMAT),
        status,
    ))
}

/// `GET /metrics`.
pub fn routes(
    metrics: Arc<Metrics>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::any().map(move || Arc::clone(&metrics)))
        .and_then(metrics_handler)
}

/// Serves `/metrics` on `addr` until the task is dropped.
pub async fn serve(metrics: Arc<Metrics>, addr: SocketAddr) {
    info!("Starting metrics server on {}", addr);
    warp::serve(routes(metrics)).run(addr).await;
}
