// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api_objects::error::UnmarshalError;
use kube::api::{ApiResource, DynamicObject};
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};

// ResourceWrapper converts between a typed resource and the DynamicObject
// that travels inside KubeAPIRequest and KubeAPIResponse.
// Reconcilers marshal before sending a request and unmarshal what comes back,
// so the shim layer never needs to know the concrete object kind.
pub trait ResourceWrapper: Sized {
    fn api_resource() -> ApiResource;

    fn marshal(&self) -> DynamicObject;

    fn unmarshal(obj: DynamicObject) -> Result<Self, UnmarshalError>;
}

impl<K> ResourceWrapper for K
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    fn api_resource() -> ApiResource {
        ApiResource::erase::<K>(&())
    }

    fn marshal(&self) -> DynamicObject {
        let ar = Self::api_resource();
        let mut obj = DynamicObject::new("", &ar);
        obj.metadata = self.meta().clone();
        // Serializing a k8s resource into a JSON value cannot fail: keys are strings
        // and every field implements Serialize.
        if let Ok(serde_json::Value::Object(mut fields)) = serde_json::to_value(self) {
            fields.remove("apiVersion");
            fields.remove("kind");
            fields.remove("metadata");
            obj.data = serde_json::Value::Object(fields);
        }
        obj
    }

    fn unmarshal(obj: DynamicObject) -> Result<Self, UnmarshalError> {
        obj.try_parse::<K>().map_err(|err| UnmarshalError {
            kind: K::kind(&()).to_string(),
            message: err.to_string(),
        })
    }
}

/// Formats the `kind/namespace/name` key used in logs and request keys.
pub fn object_key(obj: &DynamicObject) -> String {
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("");
    format!(
        "{}/{}/{}",
        kind,
        obj.metadata.namespace.as_deref().unwrap_or(""),
        obj.metadata.name.as_deref().unwrap_or("")
    )
}
