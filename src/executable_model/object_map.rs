// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube::api::DynamicObject;
use std::collections::BTreeMap;

// ObjectKey identifies a stored object. It derives Ord so objects of one
// kind are adjacent in the map and listing a kind is a range scan.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct ObjectKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: &str, namespace: &str, name: &str) -> ObjectKey {
        ObjectKey {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectMap {
    inner: BTreeMap<ObjectKey, DynamicObject>,
}

impl ObjectMap {
    pub fn new() -> ObjectMap {
        ObjectMap::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn contains_key(&self, key: &ObjectKey) -> bool {
        self.inner.contains_key(key)
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&DynamicObject> {
        self.inner.get(key)
    }

    pub fn insert(&mut self, key: ObjectKey, value: DynamicObject) -> Option<DynamicObject> {
        self.inner.insert(key, value)
    }

    pub fn remove(&mut self, key: &ObjectKey) -> Option<DynamicObject> {
        self.inner.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectKey, &DynamicObject)> {
        self.inner.iter()
    }

    // Objects of one kind, optionally restricted to a namespace, in key order.
    pub fn list(&self, kind: &str, namespace: Option<&str>) -> Vec<&DynamicObject> {
        self.inner
            .iter()
            .filter(|(key, _)| key.kind == kind && namespace.map_or(true, |ns| key.namespace == ns))
            .map(|(_, obj)| obj)
            .collect()
    }
}
