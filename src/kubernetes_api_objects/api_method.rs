// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api_objects::error::APIError;
use kube::api::{ApiResource, DynamicObject};

// KubeAPIRequest represents the API requests issued by reconcile_core.
//
// kube-rs uses a generic type kube::api::Api as an api handle to send
// requests to the Kubernetes API.
// So KubeAPIRequest wraps around the variables used to instantiate kube::api::Api
// and to call its methods.
//
// Each request carries an ApiResource instead of a concrete object type,
// so the shim layer can build an Api<DynamicObject> for any kind.
#[derive(Debug, Clone)]
pub enum KubeAPIRequest {
    GetRequest(KubeGetRequest),
    ListRequest(KubeListRequest),
    CreateRequest(KubeCreateRequest),
    UpdateRequest(KubeUpdateRequest),
    UpdateStatusRequest(KubeUpdateStatusRequest),
    PatchRequest(KubePatchRequest),
}

impl KubeAPIRequest {
    pub fn key(&self) -> String {
        match self {
            KubeAPIRequest::GetRequest(req) => req.key(),
            KubeAPIRequest::ListRequest(req) => req.key(),
            KubeAPIRequest::CreateRequest(req) => req.key(),
            KubeAPIRequest::UpdateRequest(req) => req.key(),
            KubeAPIRequest::UpdateStatusRequest(req) => req.key(),
            KubeAPIRequest::PatchRequest(req) => req.key(),
        }
    }
}

// KubeGetRequest has the name as the parameter of Api.get(), and namespace to instantiate an Api.
#[derive(Debug, Clone)]
pub struct KubeGetRequest {
    pub api_resource: ApiResource,
    pub name: String,
    pub namespace: String,
}

impl KubeGetRequest {
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.api_resource.kind, self.namespace, self.name)
    }
}

// KubeListRequest lists objects of one kind.
// A namespace of None lists across all namespaces; label_selector narrows
// the result server side, which is how the reverse reference index is queried.
#[derive(Debug, Clone)]
pub struct KubeListRequest {
    pub api_resource: ApiResource,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

impl KubeListRequest {
    pub fn key(&self) -> String {
        format!(
            "{}/{}?{}",
            self.api_resource.kind,
            self.namespace.as_deref().unwrap_or("*"),
            self.label_selector.as_deref().unwrap_or("")
        )
    }
}

// KubeCreateRequest has the obj as the parameter of Api.create().
#[derive(Debug, Clone)]
pub struct KubeCreateRequest {
    pub api_resource: ApiResource,
    pub namespace: String,
    pub obj: DynamicObject,
}

impl KubeCreateRequest {
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.api_resource.kind,
            self.namespace,
            self.obj.metadata.name.as_deref().unwrap_or("")
        )
    }
}

// KubeUpdateRequest has the obj as the parameter of Api.replace().
// The resource version carried by obj makes the write conditional.
#[derive(Debug, Clone)]
pub struct KubeUpdateRequest {
    pub api_resource: ApiResource,
    pub name: String,
    pub namespace: String,
    pub obj: DynamicObject,
}

impl KubeUpdateRequest {
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.api_resource.kind, self.namespace, self.name)
    }
}

// KubeUpdateStatusRequest has the obj as the parameter of Api.replace_status().
#[derive(Debug, Clone)]
pub struct KubeUpdateStatusRequest {
    pub api_resource: ApiResource,
    pub name: String,
    pub namespace: String,
    pub obj: DynamicObject,
}

impl KubeUpdateStatusRequest {
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.api_resource.kind, self.namespace, self.name)
    }
}

// KubePatchRequest sends a JSON merge patch (RFC 7386) through Api.patch().
// It is unconditional, so it fits idempotent point writes such as setting or clearing a label.
#[derive(Debug, Clone)]
pub struct KubePatchRequest {
    pub api_resource: ApiResource,
    pub name: String,
    pub namespace: String,
    pub patch: serde_json::Value,
}

impl KubePatchRequest {
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.api_resource.kind, self.namespace, self.name)
    }
}

// KubeAPIResponse represents API results fed back into reconcile_core.
//
// KubeAPIResponse wraps around the results returned by the methods of kube::api::Api.
#[derive(Debug, Clone)]
pub enum KubeAPIResponse {
    GetResponse(KubeGetResponse),
    ListResponse(KubeListResponse),
    CreateResponse(KubeCreateResponse),
    UpdateResponse(KubeUpdateResponse),
    UpdateStatusResponse(KubeUpdateStatusResponse),
    PatchResponse(KubePatchResponse),
}

#[derive(Debug, Clone)]
pub struct KubeGetResponse {
    pub res: Result<DynamicObject, APIError>,
}

// KubeListResponse has every object matched by KubeListRequest, across all pages.
#[derive(Debug, Clone)]
pub struct KubeListResponse {
    pub res: Result<Vec<DynamicObject>, APIError>,
}

#[derive(Debug, Clone)]
pub struct KubeCreateResponse {
    pub res: Result<DynamicObject, APIError>,
}

#[derive(Debug, Clone)]
pub struct KubeUpdateResponse {
    pub res: Result<DynamicObject, APIError>,
}

#[derive(Debug, Clone)]
pub struct KubeUpdateStatusResponse {
    pub res: Result<DynamicObject, APIError>,
}

#[derive(Debug, Clone)]
pub struct KubePatchResponse {
    pub res: Result<DynamicObject, APIError>,
}

impl KubeAPIResponse {
    pub fn into_get(self) -> Option<Result<DynamicObject, APIError>> {
        match self {
            KubeAPIResponse::GetResponse(resp) => Some(resp.res),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Result<Vec<DynamicObject>, APIError>> {
        match self {
            KubeAPIResponse::ListResponse(resp) => Some(resp.res),
            _ => None,
        }
    }

    pub fn into_create(self) -> Option<Result<DynamicObject, APIError>> {
        match self {
            KubeAPIResponse::CreateResponse(resp) => Some(resp.res),
            _ => None,
        }
    }

    pub fn into_update(self) -> Option<Result<DynamicObject, APIError>> {
        match self {
            KubeAPIResponse::UpdateResponse(resp) => Some(resp.res),
            _ => None,
        }
    }

    pub fn into_update_status(self) -> Option<Result<DynamicObject, APIError>> {
        match self {
            KubeAPIResponse::UpdateStatusResponse(resp) => Some(resp.res),
            _ => None,
        }
    }

    pub fn into_patch(self) -> Option<Result<DynamicObject, APIError>> {
        match self {
            KubeAPIResponse::PatchResponse(resp) => Some(resp.res),
            _ => None,
        }
    }
}
