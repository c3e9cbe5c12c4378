/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/ancestry.rs
*
* Resolution of the Organization that owns a Cluster. Ownership is expressed
* through `metadata.ownerReferences`; the first reference to a dockyards.io
* Organization names the owner. A reference to an Organization that cannot be
* found is an error, so the Cluster is retried until the Organization shows up
* or the reference is removed.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::{Cluster, Organization, GROUP, ORGANIZATION_KIND};
use crate::store::Store;
use crate::{Error, Result};
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;

#[async_trait]
pub trait OwnerResolver: Send + Sync {
    /// `Ok(None)` means the cluster has no owning organization.
    async fn owner_organization(&self, cluster: &Cluster) -> Result<Option<Organization>>;
}

/// Walks owner references through a `Store`.
pub struct StoreOwnerResolver<S> {
    store: Arc<S>,
}

impl<S> StoreOwnerResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

fn is_dockyards_group(api_version: &str) -> bool {
    api_version.split('/').next() == Some(GROUP)
}

#[async_trait]
impl<S: Store + 'static> OwnerResolver for StoreOwnerResolver<S> {
    async fn owner_organization(&self, cluster: &Cluster) -> Result<Option<Organization>> {
        let namespace = cluster.namespace().ok_or(Error::MissingObjectKey("namespace"))?;

        for owner in cluster.owner_references() {
            if owner.kind != ORGANIZATION_KIND || !is_dockyards_group(&owner.api_version) {
                continue;
            }

            return match self.store.get::<Organization>(&namespace, &owner.name).await? {
                Some(organization) => Ok(Some(organization)),
                None => Err(Error::AncestryError(format!(
                    "owner organization {}/{} not found",
                    namespace, owner.name
                ))),
            };
        }

        Ok(None)
    }
}
