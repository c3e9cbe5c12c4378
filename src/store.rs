/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/store.rs
*
* Typed access to the resource store and the generic `create_or_patch`
* combinator built on top of it.
*
* Architecture:
* - `Store` is the seam between the reconcilers and the Kubernetes API. The
*   production implementation, `KubeStore`, goes through `kube::Api`; the
*   unit tests use an in-memory implementation of the same trait.
* - `create_or_patch` fetches an object (or starts from the caller's skeleton
*   when it does not exist), lets a mutation closure compute the desired state,
*   and writes back either a create or a JSON Patch (RFC 6902) of the
*   difference. Nothing is written when the mutation leaves the object
*   unchanged.
* - Writes are optimistic. The patch replaces `metadata.resourceVersion` with
*   the observed one, which the API server checks as a precondition: a
*   concurrent writer makes it answer 409. The combinator then re-fetches and
*   re-applies the mutation, a bounded number of times and without sleeping.
*   Any other error is returned as is.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::registry::TypeRegistry;
use crate::{Error, Result};
use async_trait::async_trait;
use json_patch::PatchOperation;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Field manager recorded by the API server for every write of this controller.
pub const FIELD_MANAGER: &str = "dockyards-rbac";

/// Attempts `create_or_patch` makes before giving up on a contended object.
pub const CONFLICT_RETRIES: usize = 5;

/// Namespaced kinds the store can read and write.
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Returns `Ok(None)` when the object does not exist.
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Fails with `Error::Conflict` when the object already exists.
    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K>;

    /// Applies a JSON Patch. Fails with `Error::Conflict` when the patched
    /// object carries a stale `metadata.resourceVersion`.
    async fn patch<K: StoreObject>(&self, namespace: &str, name: &str, patch: &json_patch::Patch) -> Result<K>;
}

// --- Kubernetes-backed store ---

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    registry: Arc<TypeRegistry>,
}

impl KubeStore {
    pub fn new(client: Client, registry: Arc<TypeRegistry>) -> Self {
        Self { client, registry }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Result<Api<K>> {
        self.registry.ensure::<K>()?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }
}

fn conflict_or<K: StoreObject>(err: kube::Error, namespace: &str, name: &str) -> Error {
    match err {
        kube::Error::Api(e) if e.code == 409 => {
            Error::Conflict(format!("{} {}/{}", K::kind(&()), namespace, name))
        }
        e => Error::KubeError(e),
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace)?.get_opt(name).await?)
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let namespace = obj.meta().namespace.as_deref().ok_or(Error::MissingObjectKey("namespace"))?;
        let name = obj.meta().name.as_deref().ok_or(Error::MissingObjectKey("name"))?;
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api::<K>(namespace)?
            .create(&pp, obj)
            .await
            .map_err(|e| conflict_or::<K>(e, namespace, name))
    }

    async fn patch<K: StoreObject>(&self, namespace: &str, name: &str, patch: &json_patch::Patch) -> Result<K> {
        let pp = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api::<K>(namespace)?
            .patch(name, &pp, &Patch::<()>::Json(patch.clone()))
            .await
            .map_err(|e| conflict_or::<K>(e, namespace, name))
    }
}

// --- create-or-patch ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
            OperationResult::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Fetches `obj` by its name and namespace, applies `mutate`, and persists the
/// result. On return `obj` holds the object as stored.
///
/// `mutate` may run more than once when the object is contended, so it must be
/// a pure function of the object it is given. It must not change the object's
/// name or namespace.
pub async fn create_or_patch<K, S, F>(store: &S, obj: &mut K, mut mutate: F) -> Result<OperationResult>
where
    K: StoreObject,
    S: Store + ?Sized,
    F: FnMut(&mut K) -> Result<()> + Send,
{
    let name = obj.meta().name.clone().ok_or(Error::MissingObjectKey("name"))?;
    let namespace = obj.meta().namespace.clone().ok_or(Error::MissingObjectKey("namespace"))?;

    for _ in 0..CONFLICT_RETRIES {
        match store.get::<K>(&namespace, &name).await? {
            None => {
                mutate(obj)?;
                ensure_same_key(obj, &namespace, &name)?;
                match store.create(obj).await {
                    Ok(created) => {
                        *obj = created;
                        return Ok(OperationResult::Created);
                    }
                    Err(Error::Conflict(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
            Some(current) => {
                *obj = current;
                let resource_version = obj.meta().resource_version.clone();
                let before = object_body(obj)?;
                mutate(obj)?;
                ensure_same_key(obj, &namespace, &name)?;
                let after = object_body(obj)?;

                let Some(mut patch) = diff_patch(&before, &after) else {
                    return Ok(OperationResult::Unchanged);
                };
                if let Some(rv) = resource_version {
                    lock_resource_version(&mut patch, &rv)?;
                }
                match store.patch::<K>(&namespace, &name, &patch).await {
                    Ok(patched) => {
                        *obj = patched;
                        return Ok(OperationResult::Updated);
                    }
                    Err(Error::Conflict(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Err(Error::Conflict(format!("{} {}/{}", K::kind(&()), namespace, name)))
}

fn ensure_same_key<K: StoreObject>(obj: &K, namespace: &str, name: &str) -> Result<()> {
    let meta = obj.meta();
    if meta.name.as_deref() != Some(name) || meta.namespace.as_deref() != Some(namespace) {
        return Err(Error::KeyChanged(format!("{} {}/{}", K::kind(&()), namespace, name)));
    }
    Ok(())
}

// Status is owned by whoever runs the workload, never patched from here.
fn object_body<K: Serialize>(obj: &K) -> Result<Value> {
    let mut value = serde_json::to_value(obj)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("status");
    }
    Ok(value)
}

/// Computes the JSON Patch that turns `before` into `after`, or `None` when
/// they are equal.
pub fn diff_patch(before: &Value, after: &Value) -> Option<json_patch::Patch> {
    let patch = json_patch::diff(before, after);
    (!patch.0.is_empty()).then_some(patch)
}

/// Pins the patch to `resource_version`. The API server rejects the write with
/// 409 when the stored object has moved on.
pub fn lock_resource_version(patch: &mut json_patch::Patch, resource_version: &str) -> Result<()> {
    let op: PatchOperation = serde_json::from_value(json!({
        "op": "replace",
        "path": "/metadata/resourceVersion",
        "value": resource_version,
    }))?;
    patch.0.insert(0, op);
    Ok(())
}
