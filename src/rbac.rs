/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/rbac.rs
*
* Input payload consumed by the shared `rbac` WorkloadTemplate. The payload is
* stored as opaque JSON in `Workload.spec.input`, so the field names and their
* order here are a wire contract with the template.
*
* The three cluster role bindings map the organization member roles onto the
* built-in Kubernetes ClusterRoles:
* - Reader    -> view
* - User      -> edit
* - SuperUser -> cluster-admin
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::{ROLE_READER, ROLE_SUPER_USER, ROLE_USER};
use serde::{Deserialize, Serialize};

/// Prefix shared by every group and binding name installed in a cluster.
pub const ROLE_PREFIX: &str = "dockyards:";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RoleRef {
    pub kind: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    pub kind: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub binding_name: String,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RbacWorkloadInput {
    pub cluster_role_bindings: Vec<RoleBinding>,
    // Always empty; kept so the template sees the key.
    pub role_bindings: Vec<RoleBinding>,
}

/// Name of the group (and binding) for an organization member role.
pub fn group_name(role: &str) -> String {
    format!("{}{}", ROLE_PREFIX, role.to_lowercase())
}

fn cluster_role_binding(role: &str, cluster_role: &str) -> RoleBinding {
    let name = group_name(role);
    RoleBinding {
        binding_name: name.clone(),
        role_ref: RoleRef {
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
        },
        subjects: vec![Subject {
            kind: "Group".to_string(),
            name,
        }],
    }
}

impl RbacWorkloadInput {
    /// Builds the fixed reader, editor, admin binding set.
    pub fn bootstrap() -> Self {
        Self {
            cluster_role_bindings: vec![
                cluster_role_binding(ROLE_READER, "view"),
                cluster_role_binding(ROLE_USER, "edit"),
                cluster_role_binding(ROLE_SUPER_USER, "cluster-admin"),
            ],
            role_bindings: Vec::new(),
        }
    }
}
