/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/main.rs
*
* Entry point for the dockyards RBAC controller.
*
* Architecture:
* 1.  **Settings and logging**: flags (with environment fallbacks) are parsed
*     first so the log format is known before anything is logged.
* 2.  **Client**: a Kubernetes client is created from the in-cluster or local
*     kubeconfig.
* 3.  **Controller**: `cluster_controller::run` wires the store, the dynamic
*     configuration and the `Cluster` controller, and returns once a
*     termination signal has been handled.
*
* SPDX-License-Identifier: Apache-2.0
*/

use anyhow::Context as _;
use clap::Parser;
use dockyards_rbac::config::Settings;
use dockyards_rbac::controllers::cluster_controller;
use dockyards_rbac::telemetry::init_telemetry;
use kube::Client;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Settings and logging
    let settings = Settings::parse();
    init_telemetry(settings.log_format)?;

    // 2. Client
    let client = Client::try_default().await.context("failed to create Kubernetes client")?;

    // 3. Controller
    info!(
        config_map = %settings.config_map,
        namespace = %settings.dockyards_namespace,
        "dockyards-rbac controller starting..."
    );
    cluster_controller::run(client, &settings)
        .await
        .context("cluster controller failed")?;

    info!("dockyards-rbac controller shutting down.");

    Ok(())
}
