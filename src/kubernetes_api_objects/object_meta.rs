// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Convenience accessors over ObjectMeta used by the reconcilers.
pub trait ObjectMetaExt {
    fn has_deletion_timestamp(&self) -> bool;

    fn label(&self, key: &str) -> Option<&str>;

    fn annotation(&self, key: &str) -> Option<&str>;

    fn has_finalizer(&self, finalizer: &str) -> bool;

    fn add_finalizer(&mut self, finalizer: &str);

    fn remove_finalizer(&mut self, finalizer: &str);

    fn set_label(&mut self, key: &str, value: &str);

    fn remove_label(&mut self, key: &str);

    fn set_annotation(&mut self, key: &str, value: &str);
}

impl ObjectMetaExt for ObjectMeta {
    fn has_deletion_timestamp(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.labels.as_ref()?.get(key).map(String::as_str)
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.as_ref()?.get(key).map(String::as_str)
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers
            .as_ref()
            .map_or(false, |finalizers| finalizers.iter().any(|f| f == finalizer))
    }

    fn add_finalizer(&mut self, finalizer: &str) {
        if !self.has_finalizer(finalizer) {
            self.finalizers
                .get_or_insert_with(Vec::new)
                .push(finalizer.to_string());
        }
    }

    fn remove_finalizer(&mut self, finalizer: &str) {
        if let Some(finalizers) = self.finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
    }

    fn set_label(&mut self, key: &str, value: &str) {
        self.labels
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
    }

    fn remove_label(&mut self, key: &str) {
        if let Some(labels) = self.labels.as_mut() {
            labels.remove(key);
        }
    }

    fn set_annotation(&mut self, key: &str, value: &str) {
        self.annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
    }
}
