// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::executable_model::api_server_state::*;
use crate::executable_model::object_map::ObjectKey;
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::error::APIError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{ApiResource, DynamicObject};
use kube::core::TypeMeta;
use std::collections::BTreeMap;

// The executable API server model stores objects in memory and serves the same
// KubeAPIRequests the shim layer sends to a real cluster. It implements the
// semantics the reconcilers depend on: label selected lists, generations that
// move only on spec changes, resource version conflicts on update and
// update_status, finalizer-deferred deletion, generateName and merge patches.
// Admission webhooks are not part of it; tests call the hook themselves.

fn key_of(api_resource: &ApiResource, namespace: &str, name: &str) -> ObjectKey {
    ObjectKey::new(&api_resource.kind, namespace, name)
}

fn type_meta(api_resource: &ApiResource) -> TypeMeta {
    TypeMeta {
        api_version: api_resource.api_version.clone(),
        kind: api_resource.kind.clone(),
    }
}

fn spec_of(obj: &DynamicObject) -> serde_json::Value {
    obj.data.get("spec").cloned().unwrap_or(serde_json::Value::Null)
}

fn status_of(obj: &DynamicObject) -> Option<serde_json::Value> {
    obj.data.get("status").cloned()
}

fn set_status(obj: &mut DynamicObject, status: Option<serde_json::Value>) {
    if let serde_json::Value::Object(fields) = &mut obj.data {
        match status {
            Some(status) => {
                fields.insert("status".to_string(), status);
            }
            None => {
                fields.remove("status");
            }
        }
    }
}

// Equality ignoring the resource version, which a no-op write must not bump.
fn same_object(a: &DynamicObject, b: &DynamicObject) -> bool {
    let mut a_meta = a.metadata.clone();
    let mut b_meta = b.metadata.clone();
    a_meta.resource_version = None;
    b_meta.resource_version = None;
    a_meta == b_meta && a.data == b.data
}

fn finalizers_empty(obj: &DynamicObject) -> bool {
    obj.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty())
}

/// Matches equality based selectors such as `a=b,c=d`; a bare key requires the label to exist.
pub fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.and_then(|l| l.get(key.trim())).map(String::as_str) == Some(value.trim()),
            None => labels.map_or(false, |l| l.contains_key(term)),
        })
}

pub struct ExecutableApiServerModel;

impl ExecutableApiServerModel {
    pub fn handle_request(req: KubeAPIRequest, s: &mut ApiServerState) -> KubeAPIResponse {
        let verb = match &req {
            KubeAPIRequest::GetRequest(_) => VERB_GET,
            KubeAPIRequest::ListRequest(_) => VERB_LIST,
            KubeAPIRequest::CreateRequest(_) => VERB_CREATE,
            KubeAPIRequest::UpdateRequest(_) => VERB_UPDATE,
            KubeAPIRequest::UpdateStatusRequest(_) => VERB_UPDATE_STATUS,
            KubeAPIRequest::PatchRequest(_) => VERB_PATCH,
        };
        *s.request_counts.entry(verb).or_insert(0) += 1;
        match req {
            KubeAPIRequest::GetRequest(req) => KubeAPIResponse::GetResponse(Self::handle_get_request(&req, s)),
            KubeAPIRequest::ListRequest(req) => KubeAPIResponse::ListResponse(Self::handle_list_request(&req, s)),
            KubeAPIRequest::CreateRequest(req) => {
                KubeAPIResponse::CreateResponse(Self::handle_create_request(&req, s))
            }
            KubeAPIRequest::UpdateRequest(req) => {
                KubeAPIResponse::UpdateResponse(Self::handle_update_request(&req, s))
            }
            KubeAPIRequest::UpdateStatusRequest(req) => {
                KubeAPIResponse::UpdateStatusResponse(Self::handle_update_status_request(&req, s))
            }
            KubeAPIRequest::PatchRequest(req) => KubeAPIResponse::PatchResponse(Self::handle_patch_request(&req, s)),
        }
    }

    pub fn handle_get_request(req: &KubeGetRequest, s: &ApiServerState) -> KubeGetResponse {
        let key = key_of(&req.api_resource, &req.namespace, &req.name);
        match s.resources.get(&key) {
            Some(obj) => KubeGetResponse { res: Ok(obj.clone()) },
            None => KubeGetResponse { res: Err(APIError::ObjectNotFound) },
        }
    }

    pub fn handle_list_request(req: &KubeListRequest, s: &ApiServerState) -> KubeListResponse {
        if let Some(err) = s.faults.list {
            return KubeListResponse { res: Err(err) };
        }
        let objs = s
            .resources
            .list(&req.api_resource.kind, req.namespace.as_deref())
            .into_iter()
            .filter(|obj| {
                req.label_selector
                    .as_deref()
                    .map_or(true, |selector| selector_matches(selector, obj.metadata.labels.as_ref()))
            })
            .cloned()
            .collect();
        KubeListResponse { res: Ok(objs) }
    }

    fn next_resource_version(s: &mut ApiServerState) -> String {
        let rv = s.resource_version_counter;
        s.resource_version_counter += 1;
        rv.to_string()
    }

    pub fn handle_create_request(req: &KubeCreateRequest, s: &mut ApiServerState) -> KubeCreateResponse {
        if let Some((kind, err)) = s.faults.create_kind.as_ref() {
            if *kind == req.api_resource.kind {
                return KubeCreateResponse { res: Err(*err) };
            }
        }
        let mut created = req.obj.clone();
        let name = match (created.metadata.name.clone(), created.metadata.generate_name.clone()) {
            (Some(name), _) => name,
            (None, Some(prefix)) => {
                s.generate_name_counter += 1;
                format!("{}{:05}", prefix, s.generate_name_counter)
            }
            (None, None) => return KubeCreateResponse { res: Err(APIError::Invalid) },
        };
        if created
            .metadata
            .namespace
            .as_ref()
            .map_or(false, |ns| *ns != req.namespace)
        {
            return KubeCreateResponse { res: Err(APIError::BadRequest) };
        }
        let key = key_of(&req.api_resource, &req.namespace, &name);
        if s.resources.contains_key(&key) {
            return KubeCreateResponse { res: Err(APIError::ObjectAlreadyExists) };
        }
        created.types = Some(type_meta(&req.api_resource));
        created.metadata.name = Some(name);
        created.metadata.namespace = Some(req.namespace.clone());
        created.metadata.uid = Some(format!("uid-{}", s.uid_counter));
        created.metadata.generation = Some(1);
        created.metadata.creation_timestamp = Some(Time(chrono::Utc::now()));
        created.metadata.deletion_timestamp = None;
        created.metadata.resource_version = Some(Self::next_resource_version(s));
        // Status is owned by the status subresource.
        set_status(&mut created, None);
        s.uid_counter += 1;
        s.resources.insert(key, created.clone());
        KubeCreateResponse { res: Ok(created) }
    }

    fn update_request_admission_check(
        api_resource: &ApiResource,
        name: &str,
        namespace: &str,
        obj: &DynamicObject,
        s: &ApiServerState,
    ) -> Result<DynamicObject, APIError> {
        if obj.metadata.name.as_deref() != Some(name) {
            return Err(APIError::BadRequest);
        }
        if obj.metadata.namespace.as_deref().map_or(false, |ns| ns != namespace) {
            return Err(APIError::BadRequest);
        }
        let stored = s
            .resources
            .get(&key_of(api_resource, namespace, name))
            .ok_or(APIError::ObjectNotFound)?;
        if obj.metadata.resource_version.is_some() && obj.metadata.resource_version != stored.metadata.resource_version {
            return Err(APIError::Conflict);
        }
        if obj.metadata.uid.is_some() && obj.metadata.uid != stored.metadata.uid {
            return Err(APIError::Conflict);
        }
        Ok(stored.clone())
    }

    // Stores a changed object, or drops it when it is being deleted and has no finalizers left.
    fn commit(key: ObjectKey, mut obj: DynamicObject, old: &DynamicObject, s: &mut ApiServerState) -> DynamicObject {
        if same_object(&obj, old) {
            return old.clone();
        }
        if spec_of(&obj) != spec_of(old) {
            obj.metadata.generation = Some(old.metadata.generation.unwrap_or(0) + 1);
        }
        obj.metadata.resource_version = Some(Self::next_resource_version(s));
        if obj.metadata.deletion_timestamp.is_some() && finalizers_empty(&obj) {
            s.resources.remove(&key);
        } else {
            s.resources.insert(key, obj.clone());
        }
        obj
    }

    // Fields a client write cannot change.
    fn carry_server_fields(obj: &mut DynamicObject, old: &DynamicObject) {
        obj.types = old.types.clone();
        obj.metadata.name = old.metadata.name.clone();
        obj.metadata.namespace = old.metadata.namespace.clone();
        obj.metadata.uid = old.metadata.uid.clone();
        obj.metadata.generation = old.metadata.generation;
        obj.metadata.creation_timestamp = old.metadata.creation_timestamp.clone();
        obj.metadata.deletion_timestamp = old.metadata.deletion_timestamp.clone();
        obj.metadata.resource_version = old.metadata.resource_version.clone();
        set_status(obj, status_of(old));
    }

    // Finalizers cannot be added to an object that is already being deleted.
    fn finalizer_transition_check(obj: &DynamicObject, old: &DynamicObject) -> Result<(), APIError> {
        if old.metadata.deletion_timestamp.is_none() {
            return Ok(());
        }
        let old_finalizers = old.metadata.finalizers.clone().unwrap_or_default();
        let added = obj
            .metadata
            .finalizers
            .iter()
            .flatten()
            .any(|f| !old_finalizers.contains(f));
        if added {
            Err(APIError::Forbidden)
        } else {
            Ok(())
        }
    }

    pub fn handle_update_request(req: &KubeUpdateRequest, s: &mut ApiServerState) -> KubeUpdateResponse {
        let old = match Self::update_request_admission_check(&req.api_resource, &req.name, &req.namespace, &req.obj, s) {
            Ok(old) => old,
            Err(err) => return KubeUpdateResponse { res: Err(err) },
        };
        if s.faults.update_conflicts > 0 {
            s.faults.update_conflicts -= 1;
            return KubeUpdateResponse { res: Err(APIError::Conflict) };
        }
        let mut updated = req.obj.clone();
        Self::carry_server_fields(&mut updated, &old);
        if let Err(err) = Self::finalizer_transition_check(&updated, &old) {
            return KubeUpdateResponse { res: Err(err) };
        }
        let key = key_of(&req.api_resource, &req.namespace, &req.name);
        KubeUpdateResponse { res: Ok(Self::commit(key, updated, &old, s)) }
    }

    pub fn handle_update_status_request(
        req: &KubeUpdateStatusRequest,
        s: &mut ApiServerState,
    ) -> KubeUpdateStatusResponse {
        let old = match Self::update_request_admission_check(&req.api_resource, &req.name, &req.namespace, &req.obj, s) {
            Ok(old) => old,
            Err(err) => return KubeUpdateStatusResponse { res: Err(err) },
        };
        let mut updated = old.clone();
        set_status(&mut updated, status_of(&req.obj));
        let key = key_of(&req.api_resource, &req.namespace, &req.name);
        KubeUpdateStatusResponse { res: Ok(Self::commit(key, updated, &old, s)) }
    }

    pub fn handle_patch_request(req: &KubePatchRequest, s: &mut ApiServerState) -> KubePatchResponse {
        let key = key_of(&req.api_resource, &req.namespace, &req.name);
        if s.faults.patch_keys.contains(&key) {
            return KubePatchResponse { res: Err(APIError::InternalError) };
        }
        let old = match s.resources.get(&key) {
            Some(old) => old.clone(),
            None => return KubePatchResponse { res: Err(APIError::ObjectNotFound) },
        };
        let mut value = match serde_json::to_value(&old) {
            Ok(value) => value,
            Err(_) => return KubePatchResponse { res: Err(APIError::InternalError) },
        };
        json_patch::merge(&mut value, &req.patch);
        let mut patched: DynamicObject = match serde_json::from_value(value) {
            Ok(patched) => patched,
            Err(_) => return KubePatchResponse { res: Err(APIError::BadRequest) },
        };
        Self::carry_server_fields(&mut patched, &old);
        if let Err(err) = Self::finalizer_transition_check(&patched, &old) {
            return KubePatchResponse { res: Err(err) };
        }
        KubePatchResponse { res: Ok(Self::commit(key, patched, &old, s)) }
    }

    /// Deletes an object the way a user does: stamped while finalizers remain, removed otherwise.
    pub fn handle_delete_request(
        api_resource: &ApiResource,
        namespace: &str,
        name: &str,
        s: &mut ApiServerState,
    ) -> Result<(), APIError> {
        let key = key_of(api_resource, namespace, name);
        let mut obj = s.resources.get(&key).cloned().ok_or(APIError::ObjectNotFound)?;
        if finalizers_empty(&obj) {
            s.resources.remove(&key);
            return Ok(());
        }
        if obj.metadata.deletion_timestamp.is_none() {
            obj.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            obj.metadata.resource_version = Some(Self::next_resource_version(s));
            s.resources.insert(key, obj);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::crds::*;
    use crate::kubernetes_api_objects::resource::ResourceWrapper;

    fn template(name: &str) -> WorkspaceTemplate {
        let mut template = WorkspaceTemplate::new(name, WorkspaceTemplateSpec::default());
        template.metadata.namespace = Some("team-a".to_string());
        template
    }

    fn create(s: &mut ApiServerState, template: &WorkspaceTemplate) -> DynamicObject {
        let req = KubeCreateRequest {
            api_resource: WorkspaceTemplate::api_resource(),
            namespace: "team-a".to_string(),
            obj: template.marshal(),
        };
        ExecutableApiServerModel::handle_create_request(&req, s).res.unwrap()
    }

    #[test]
    pub fn test_selector_matches() {
        let labels = BTreeMap::from([("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]);
        assert!(selector_matches("a=1,b=2", Some(&labels)));
        assert!(selector_matches("a", Some(&labels)));
        assert!(!selector_matches("a=1,b=3", Some(&labels)));
        assert!(!selector_matches("a=1", None));
    }

    #[test]
    pub fn test_generation_moves_only_on_spec_change() {
        let mut s = ApiServerState::new();
        let created = create(&mut s, &template("tpl"));
        assert_eq!(created.metadata.generation, Some(1));

        let mut relabeled = WorkspaceTemplate::unmarshal(created).unwrap();
        relabeled.metadata.labels = Some(BTreeMap::from([("x".to_string(), "y".to_string())]));
        let req = KubeUpdateRequest {
            api_resource: WorkspaceTemplate::api_resource(),
            name: "tpl".to_string(),
            namespace: "team-a".to_string(),
            obj: relabeled.marshal(),
        };
        let updated = ExecutableApiServerModel::handle_update_request(&req, &mut s).res.unwrap();
        assert_eq!(updated.metadata.generation, Some(1));

        let mut changed = WorkspaceTemplate::unmarshal(updated).unwrap();
        changed.spec.default_image = Some("jupyter/base:2".to_string());
        let req = KubeUpdateRequest { obj: changed.marshal(), ..req };
        let updated = ExecutableApiServerModel::handle_update_request(&req, &mut s).res.unwrap();
        assert_eq!(updated.metadata.generation, Some(2));

        // The object used for the first update is now stale.
        let stale = KubeUpdateRequest { obj: relabeled.marshal(), ..req };
        assert_eq!(
            ExecutableApiServerModel::handle_update_request(&stale, &mut s).res.unwrap_err(),
            APIError::Conflict
        );
    }

    #[test]
    pub fn test_deletion_waits_for_finalizers() {
        let mut s = ApiServerState::new();
        let mut protected = template("tpl");
        protected.metadata.finalizers = Some(vec!["example.com/protect".to_string()]);
        create(&mut s, &protected);
        let ar = WorkspaceTemplate::api_resource();
        ExecutableApiServerModel::handle_delete_request(&ar, "team-a", "tpl", &mut s).unwrap();

        let get = KubeGetRequest { api_resource: ar.clone(), name: "tpl".to_string(), namespace: "team-a".to_string() };
        let stored = ExecutableApiServerModel::handle_get_request(&get, &s).res.unwrap();
        assert!(stored.metadata.deletion_timestamp.is_some());

        let patch = KubePatchRequest {
            api_resource: ar,
            name: "tpl".to_string(),
            namespace: "team-a".to_string(),
            patch: serde_json::json!({"metadata": {"finalizers": []}}),
        };
        ExecutableApiServerModel::handle_patch_request(&patch, &mut s).res.unwrap();
        assert_eq!(
            ExecutableApiServerModel::handle_get_request(&get, &s).res.unwrap_err(),
            APIError::ObjectNotFound
        );
    }

    #[test]
    pub fn test_generate_name() {
        let mut s = ApiServerState::new();
        let mut unnamed = template("");
        unnamed.metadata.name = None;
        unnamed.metadata.generate_name = Some("tpl.".to_string());
        let first = create(&mut s, &unnamed);
        let second = create(&mut s, &unnamed);
        assert!(first.metadata.name.unwrap().starts_with("tpl."));
        assert_ne!(second.metadata.name, None);
        assert_eq!(s.resources.len(), 2);
    }
}
