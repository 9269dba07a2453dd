// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::governance::constants::CONTROLLER_NAME;
use crate::kubernetes_api_objects::api_method::{KubeAPIRequest, KubeCreateRequest};
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, Time};
use kube::Resource;

// Events are written as ordinary core/v1 Event objects through a create request,
// so emitting one is just another step of a reconcile.
// The name is left to the API server through generateName.

pub fn make_event<K>(obj: &K, event_type: &str, reason: &str, message: String) -> Event
where
    K: Resource<DynamicType = ()>,
{
    let meta = obj.meta();
    let name = meta.name.clone().unwrap_or_default();
    let now = chrono::Utc::now();
    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}.", name)),
            namespace: meta.namespace.clone(),
            ..ObjectMeta::default()
        },
        involved_object: ObjectReference {
            api_version: Some(K::api_version(&()).to_string()),
            kind: Some(K::kind(&()).to_string()),
            name: Some(name),
            namespace: meta.namespace.clone(),
            uid: meta.uid.clone(),
            resource_version: meta.resource_version.clone(),
            field_path: None,
        },
        reason: Some(reason.to_string()),
        message: Some(message),
        type_: Some(event_type.to_string()),
        count: Some(1),
        first_timestamp: Some(Time(now)),
        last_timestamp: Some(Time(now)),
        event_time: Some(MicroTime(now)),
        action: Some(reason.to_string()),
        source: Some(EventSource {
            component: Some(CONTROLLER_NAME.to_string()),
            host: None,
        }),
        reporting_component: Some(CONTROLLER_NAME.to_string()),
        reporting_instance: Some(CONTROLLER_NAME.to_string()),
        ..Event::default()
    }
}

pub fn create_event_request<K>(obj: &K, event_type: &str, reason: &str, message: String) -> KubeAPIRequest
where
    K: Resource<DynamicType = ()>,
{
    let event = make_event(obj, event_type, reason, message);
    KubeAPIRequest::CreateRequest(KubeCreateRequest {
        api_resource: Event::api_resource(),
        namespace: event.metadata.namespace.clone().unwrap_or_default(),
        obj: event.marshal(),
    })
}
