/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/testing.rs
*
* In-memory collaborators for the unit tests: a `Store` that keeps objects as
* JSON and counts every write, a pre-filled Cluster cache, and small builders
* for the dockyards kinds.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::{Cluster, ClusterSpec, Organization, OrganizationSpec, API_VERSION, ORGANIZATION_KIND};
use crate::registry::TypeRegistry;
use crate::store::{Store, StoreObject};
use crate::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use kube::runtime::{reflector, watcher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) struct MemoryStore {
    registry: TypeRegistry,
    objects: Mutex<BTreeMap<String, Value>>,
    mutations: Mutex<Vec<String>>,
    conflicts: AtomicUsize,
    revision: AtomicU64,
}

fn object_key<K: StoreObject>(namespace: &str, name: &str) -> String {
    format!("{}/{}/{}/{}", K::api_version(&()), K::kind(&()), namespace, name)
}

fn metadata_mut(value: &mut Value) -> &mut Map<String, Value> {
    let root = value.as_object_mut().expect("objects serialize to JSON objects");
    root.entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("metadata is an object")
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::with_registry(TypeRegistry::dockyards())
    }

    pub(crate) fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            registry,
            objects: Mutex::new(BTreeMap::new()),
            mutations: Mutex::new(Vec::new()),
            conflicts: AtomicUsize::new(0),
            revision: AtomicU64::new(0),
        }
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn take_conflict(&self) -> bool {
        self.conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Makes the next `n` writes fail with a conflict.
    pub(crate) fn inject_conflicts(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// Seeds an object without counting it as a mutation.
    pub(crate) fn insert<K: StoreObject>(&self, obj: &K) -> K {
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        let name = obj.meta().name.clone().unwrap_or_default();
        let mut value = serde_json::to_value(obj).unwrap();
        let revision = self.next_revision();
        let meta = metadata_mut(&mut value);
        meta.entry("uid")
            .or_insert_with(|| Value::String(format!("uid-{}-{}", name, revision)));
        meta.insert("resourceVersion".to_string(), Value::String(revision));
        self.objects
            .lock()
            .unwrap()
            .insert(object_key::<K>(&namespace, &name), value.clone());
        serde_json::from_value(value).unwrap()
    }

    pub(crate) fn object<K: StoreObject>(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&object_key::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub(crate) fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.registry.ensure::<K>()?;
        let objects = self.objects.lock().unwrap();
        match objects.get(&object_key::<K>(namespace, name)) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        self.registry.ensure::<K>()?;
        let namespace = obj.meta().namespace.clone().ok_or(Error::MissingObjectKey("namespace"))?;
        let name = obj.meta().name.clone().ok_or(Error::MissingObjectKey("name"))?;
        let key = object_key::<K>(&namespace, &name);
        if self.take_conflict() {
            return Err(Error::Conflict(key));
        }

        let mut value = serde_json::to_value(obj)?;
        let revision = self.next_revision();
        let meta = metadata_mut(&mut value);
        meta.entry("uid")
            .or_insert_with(|| Value::String(format!("uid-{}-{}", name, revision)));
        meta.insert("resourceVersion".to_string(), Value::String(revision));

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(Error::Conflict(key));
        }
        objects.insert(key.clone(), value.clone());
        self.mutations.lock().unwrap().push(format!("create {}", key));
        Ok(serde_json::from_value(value)?)
    }

    async fn patch<K: StoreObject>(&self, namespace: &str, name: &str, patch: &json_patch::Patch) -> Result<K> {
        self.registry.ensure::<K>()?;
        let key = object_key::<K>(namespace, name);
        if self.take_conflict() {
            return Err(Error::Conflict(key));
        }

        let mut objects = self.objects.lock().unwrap();
        let Some(current) = objects.get_mut(&key) else {
            return Err(Error::Conflict(key));
        };

        // Same precondition as the API server: the patched object must still
        // carry the stored resourceVersion.
        let mut patched = current.clone();
        if json_patch::patch(&mut patched, &patch.0).is_err()
            || patched.pointer("/metadata/resourceVersion") != current.pointer("/metadata/resourceVersion")
        {
            return Err(Error::Conflict(key));
        }

        let revision = self.next_revision();
        metadata_mut(&mut patched).insert("resourceVersion".to_string(), Value::String(revision));
        *current = patched.clone();
        drop(objects);

        self.mutations.lock().unwrap().push(format!("patch {}", key));
        Ok(serde_json::from_value(patched)?)
    }
}

// --- builders ---

pub(crate) fn organization(namespace: &str, name: &str) -> Organization {
    let mut org = Organization::new(name, OrganizationSpec::default());
    org.metadata.namespace = Some(namespace.to_string());
    org
}

pub(crate) fn cluster(namespace: &str, name: &str, uid: &str) -> Cluster {
    let mut cluster = Cluster::new(name, ClusterSpec::default());
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster.metadata.uid = Some(uid.to_string());
    cluster
}

pub(crate) fn owned_by(mut cluster: Cluster, org: &Organization) -> Cluster {
    cluster.metadata.owner_references = Some(vec![OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: ORGANIZATION_KIND.to_string(),
        name: org.metadata.name.clone().unwrap_or_default(),
        uid: org.metadata.uid.clone().unwrap_or_default(),
        ..Default::default()
    }]);
    cluster
}

pub(crate) fn deleting(mut cluster: Cluster) -> Cluster {
    let ts: Time = serde_json::from_value(Value::String("2025-01-01T00:00:00Z".to_string())).unwrap();
    cluster.metadata.deletion_timestamp = Some(ts);
    cluster
}

/// A Cluster cache as the controller's reflector would hold it.
pub(crate) fn cluster_cache<'a>(clusters: impl IntoIterator<Item = &'a Cluster>) -> reflector::Store<Cluster> {
    let mut writer = reflector::store::Writer::<Cluster>::default();
    for cluster in clusters {
        writer.apply_watcher_event(&watcher::Event::Apply(cluster.clone()));
    }
    writer.as_reader()
}
