/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/rbac_workload.rs
*
* Synthesis of the bootstrap RBAC `Workload` for a Cluster.
*
* Architecture:
* - Every Cluster gets exactly one `<cluster>-rbac` Workload in its own
*   namespace. The Workload references the shared `rbac` WorkloadTemplate in
*   the configured public namespace and carries the role bindings to install
*   as its input.
* - The desired state is computed by `apply_desired_state`, a pure function of
*   the current object, the Cluster and the public namespace. It is handed to
*   `store::create_or_patch`, which takes care of create vs. patch and of
*   writing nothing when the object already matches.
* - An object carrying the `dockyards.io/skip-remediation` annotation is left
*   exactly as it is, so operators can take manual control of it.
* - The Workload is owned by the Cluster. Deleting the Cluster lets the API
*   server garbage collect the Workload; no finalizer is involved.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::config::{ConfigProvider, KEY_PUBLIC_NAMESPACE};
use crate::crds::{
    Cluster, TypedObjectReference, Workload, WorkloadSpec, ANNOTATION_SKIP_REMEDIATION,
    LABEL_CLUSTER_NAME, PROVENIENCE_DOCKYARDS, WORKLOAD_TEMPLATE_KIND,
};
use crate::rbac::RbacWorkloadInput;
use crate::store::{create_or_patch, OperationResult, Store};
use crate::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::info;

/// Name of the shared WorkloadTemplate installing the role bindings.
pub const RBAC_TEMPLATE_NAME: &str = "rbac";

/// Namespace inside the workload cluster the bindings are installed from.
pub const TARGET_NAMESPACE: &str = "kube-system";

pub fn workload_name(cluster_name: &str) -> String {
    format!("{}-rbac", cluster_name)
}

/// Creates or updates the RBAC Workload of `cluster`.
pub async fn synthesize_rbac_workload<S, C>(
    store: &S,
    config: &C,
    cluster: &Cluster,
) -> Result<OperationResult>
where
    S: Store + ?Sized,
    C: ConfigProvider + ?Sized,
{
    let public_namespace = config.value_or_default(KEY_PUBLIC_NAMESPACE, "");
    if public_namespace.is_empty() {
        return Err(Error::MissingConfig(KEY_PUBLIC_NAMESPACE));
    }

    let cluster_name = cluster.meta().name.clone().ok_or(Error::MissingObjectKey("name"))?;
    let namespace = cluster.namespace().ok_or(Error::MissingObjectKey("namespace"))?;

    let mut workload = Workload::new(&workload_name(&cluster_name), WorkloadSpec::default());
    workload.metadata.namespace = Some(namespace);

    let operation_result = create_or_patch(store, &mut workload, |w: &mut Workload| {
        apply_desired_state(w, cluster, &public_namespace)
    })
    .await?;

    info!(
        cluster = %cluster_name,
        workload = %workload.name_any(),
        operation_result = %operation_result,
        "Reconciled Workload"
    );

    Ok(operation_result)
}

/// Brings `workload` to the state derived from `cluster`.
pub fn apply_desired_state(workload: &mut Workload, cluster: &Cluster, public_namespace: &str) -> Result<()> {
    if workload.annotations().contains_key(ANNOTATION_SKIP_REMEDIATION) {
        return Ok(());
    }

    let cluster_name = cluster.meta().name.clone().ok_or(Error::MissingObjectKey("name"))?;
    let cluster_uid = cluster.meta().uid.clone().ok_or(Error::MissingObjectKey("uid"))?;
    let input = serde_json::to_value(RbacWorkloadInput::bootstrap())?;

    workload.metadata.labels = Some(BTreeMap::from([(
        LABEL_CLUSTER_NAME.to_string(),
        cluster_name.clone(),
    )]));

    workload.metadata.owner_references = Some(vec![OwnerReference {
        api_version: Cluster::api_version(&()).into_owned(),
        kind: Cluster::kind(&()).into_owned(),
        name: cluster_name,
        uid: cluster_uid,
        ..Default::default()
    }]);

    workload.spec.provenience = Some(PROVENIENCE_DOCKYARDS.to_string());
    workload.spec.cluster_component = true;
    workload.spec.target_namespace = Some(TARGET_NAMESPACE.to_string());
    workload.spec.workload_template_ref = Some(TypedObjectReference {
        kind: WORKLOAD_TEMPLATE_KIND.to_string(),
        name: RBAC_TEMPLATE_NAME.to_string(),
        namespace: Some(public_namespace.to_string()),
        ..Default::default()
    });
    workload.spec.input = Some(input);

    Ok(())
}
