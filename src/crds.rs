/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/crds.rs
*
* This file defines the Rust data structures for the dockyards.io kinds this
* controller reads and writes. The CRDs themselves are installed and owned by
* the dockyards backend; the structs here only mirror the fields the
* controller needs, so unknown fields written by other components are ignored
* on read.
*
* Architecture:
* - `Cluster` is the parent resource. It is read-only to this controller.
* - `Organization` is the owner of a Cluster and is only used as an existence
*   check during ancestry resolution.
* - `Workload` is the derived resource. One `<cluster>-rbac` Workload is kept
*   per Cluster, pointing at the shared `rbac` WorkloadTemplate.
* - `serde` attributes map idiomatic Rust `snake_case` to Kubernetes
*   `camelCase`.
*
* SPDX-License-Identifier: Apache-2.0
*/

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "dockyards.io";
pub const VERSION: &str = "v1alpha3";
pub const API_VERSION: &str = "dockyards.io/v1alpha3";

pub const CLUSTER_KIND: &str = "Cluster";
pub const ORGANIZATION_KIND: &str = "Organization";
pub const WORKLOAD_TEMPLATE_KIND: &str = "WorkloadTemplate";

/// Label carrying the name of the Cluster a resource belongs to.
pub const LABEL_CLUSTER_NAME: &str = "dockyards.io/cluster-name";

/// When present on a derived resource, the controller leaves it untouched.
pub const ANNOTATION_SKIP_REMEDIATION: &str = "dockyards.io/skip-remediation";

/// Provenance tag for resources created by dockyards itself.
pub const PROVENIENCE_DOCKYARDS: &str = "Dockyards";

// Organization member roles.
pub const ROLE_SUPER_USER: &str = "SuperUser";
pub const ROLE_USER: &str = "User";
pub const ROLE_READER: &str = "Reader";

// --- Cluster ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "dockyards.io",
    version = "v1alpha3",
    kind = "Cluster",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

// --- Organization ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "dockyards.io",
    version = "v1alpha3",
    kind = "Organization",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

// --- Workload ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "dockyards.io",
    version = "v1alpha3",
    kind = "Workload",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenience: Option<String>,
    #[serde(default)]
    pub cluster_component: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_template_ref: Option<TypedObjectReference>,
    /// Opaque input handed to the referenced WorkloadTemplate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

/// Reference to an object of an explicit kind, possibly in another namespace.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypedObjectReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
