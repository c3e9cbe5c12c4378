/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/registry.rs
*
* Explicit table of the resource kinds this process works with. It is built
* once when the controller starts and handed to the store by `Arc`, so there is no ambient,
* process-wide type registration. The store refuses to read or write kinds
* that were never registered.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::{Organization, Workload};
use crate::{Error, Result};
use kube::Resource;
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    kinds: BTreeSet<(String, String)>,
}

fn type_key<K: Resource<DynamicType = ()>>() -> (String, String) {
    (K::api_version(&()).into_owned(), K::kind(&()).into_owned())
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The kinds the cluster controller reads and writes through its store.
    /// Clusters come from the controller's own cache and are not listed.
    pub fn dockyards() -> Self {
        Self::new().register::<Organization>().register::<Workload>()
    }

    pub fn register<K: Resource<DynamicType = ()>>(mut self) -> Self {
        self.kinds.insert(type_key::<K>());
        self
    }

    pub fn is_registered<K: Resource<DynamicType = ()>>(&self) -> bool {
        self.kinds.contains(&type_key::<K>())
    }

    pub fn ensure<K: Resource<DynamicType = ()>>(&self) -> Result<()> {
        if self.is_registered::<K>() {
            return Ok(());
        }
        let (api_version, kind) = type_key::<K>();
        Err(Error::UnregisteredKind(format!("{}/{}", api_version, kind)))
    }
}
