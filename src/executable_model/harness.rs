// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::admission::error::AdmissionError;
use crate::admission::template_store::{TemplateLookupError, TemplateStore};
use crate::admission::workspace_hook::WorkspaceHook;
use crate::controllers::compliance_controller::reconciler::ComplianceReconciler;
use crate::controllers::crds::{Workspace, WorkspaceTemplate};
use crate::controllers::policy_controller::reconciler::PolicyReconciler;
use crate::executable_model::api_server::ExecutableApiServerModel;
use crate::executable_model::api_server_state::ApiServerState;
use crate::executable_model::object_map::ObjectKey;
use crate::governance::constants::*;
use crate::governance::policy_kind::{AccessStrategyPolicy, TemplatePolicy};
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::error::APIError;
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use crate::reconciler::reconciler::Reconciler;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Event;
use kube::core::admission::Operation;
use kube::Resource;
use std::sync::{Arc, Mutex, MutexGuard};

// Upper bound on reconcile_core steps of a single reconcile, so a state
// machine that never reaches Done or Error fails the test instead of hanging.
const MAX_STEPS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Done,
    Error,
    NotFound,
}

/// ModelCluster drives reconcilers and the admission hook against one shared
/// in-memory API server, the way the controller binaries drive them against
/// a real cluster.
#[derive(Clone)]
pub struct ModelCluster {
    state: Arc<Mutex<ApiServerState>>,
}

impl Default for ModelCluster {
    fn default() -> Self {
        ModelCluster::new()
    }
}

impl ModelCluster {
    pub fn new() -> ModelCluster {
        ModelCluster {
            state: Arc::new(Mutex::new(ApiServerState::new())),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, ApiServerState> {
        self.state.lock().unwrap()
    }

    pub fn handle(&self, req: KubeAPIRequest) -> KubeAPIResponse {
        ExecutableApiServerModel::handle_request(req, &mut self.state())
    }

    pub fn count(&self, verb: &str) -> usize {
        self.state().count(verb)
    }

    pub fn reset_counts(&self) {
        self.state().reset_counts();
    }

    pub fn create<K: Resource<DynamicType = ()> + ResourceWrapper>(&self, obj: &K) -> Result<K, APIError> {
        let req = KubeCreateRequest {
            api_resource: K::api_resource(),
            namespace: obj.meta().namespace.clone().unwrap_or_default(),
            obj: obj.marshal(),
        };
        let created = ExecutableApiServerModel::handle_create_request(&req, &mut self.state()).res?;
        Ok(K::unmarshal(created).unwrap())
    }

    pub fn get<K: ResourceWrapper>(&self, namespace: &str, name: &str) -> Option<K> {
        let req = KubeGetRequest {
            api_resource: K::api_resource(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        };
        ExecutableApiServerModel::handle_get_request(&req, &self.state())
            .res
            .ok()
            .map(|obj| K::unmarshal(obj).unwrap())
    }

    /// Replaces the object unconditionally, as `kubectl apply` of an edited manifest would.
    pub fn replace<K: Resource<DynamicType = ()> + ResourceWrapper>(&self, obj: &K) -> Result<K, APIError> {
        let mut obj = obj.marshal();
        obj.metadata.resource_version = None;
        let req = KubeUpdateRequest {
            api_resource: K::api_resource(),
            name: obj.metadata.name.clone().unwrap_or_default(),
            namespace: obj.metadata.namespace.clone().unwrap_or_default(),
            obj,
        };
        let updated = ExecutableApiServerModel::handle_update_request(&req, &mut self.state()).res?;
        Ok(K::unmarshal(updated).unwrap())
    }

    pub fn delete<K: ResourceWrapper>(&self, namespace: &str, name: &str) -> Result<(), APIError> {
        ExecutableApiServerModel::handle_delete_request(&K::api_resource(), namespace, name, &mut self.state())
    }

    pub fn list<K: ResourceWrapper>(&self) -> Vec<K> {
        self.state()
            .resources
            .list(&K::api_resource().kind, None)
            .into_iter()
            .map(|obj| K::unmarshal(obj.clone()).unwrap())
            .collect()
    }

    /// Events whose involved object has the given name, oldest first.
    pub fn events_for(&self, name: &str) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .list::<Event>()
            .into_iter()
            .filter(|e| e.involved_object.name.as_deref() == Some(name))
            .collect();
        events.sort_by_key(|e| e.metadata.resource_version.as_ref().and_then(|rv| rv.parse::<i64>().ok()));
        events
    }

    pub fn event_reasons_for(&self, name: &str) -> Vec<String> {
        self.events_for(name)
            .into_iter()
            .filter_map(|e| e.reason)
            .collect()
    }

    /// Sends a workspace write through the admission hook and stores the admitted object.
    pub async fn apply_workspace(&self, username: &str, workspace: Workspace) -> Result<Workspace, AdmissionError> {
        let namespace = workspace.metadata.namespace.clone().unwrap_or_default();
        let name = workspace.metadata.name.clone().unwrap_or_default();
        let old = self.get::<Workspace>(&namespace, &name);
        let operation = if old.is_some() { Operation::Update } else { Operation::Create };
        let hook = WorkspaceHook::new(ModelTemplateStore { cluster: self.clone() }, DEFAULT_TEMPLATE_NAMESPACE.to_string());
        let admitted = hook.admit(&operation, username, old.as_ref(), workspace).await?;
        let stored = match old {
            Some(_) => self.replace(&admitted),
            None => self.create(&admitted),
        };
        Ok(stored.unwrap())
    }

    /// Runs one reconcile of the named object to completion, like reconcile_with does.
    pub fn reconcile<R>(&self, reconciler: &R, namespace: &str, name: &str) -> ReconcileOutcome
    where
        R: Reconciler,
        R::K: ResourceWrapper,
    {
        let cr = match self.get::<R::K>(namespace, name) {
            Some(cr) => cr,
            None => return ReconcileOutcome::NotFound,
        };
        let mut state = reconciler.reconcile_init_state();
        let mut resp_option: Option<KubeAPIResponse> = None;
        for _ in 0..MAX_STEPS {
            if reconciler.reconcile_done(&state) {
                return ReconcileOutcome::Done;
            }
            if reconciler.reconcile_error(&state) {
                return ReconcileOutcome::Error;
            }
            let (state_prime, request_option) = reconciler.reconcile_core(&cr, resp_option, state);
            resp_option = request_option.map(|req| self.handle(req));
            state = state_prime;
        }
        panic!("reconcile of {}/{} did not terminate", namespace, name);
    }

    /// Reconciles every object of the reconciler's kind once.
    pub fn reconcile_all<R>(&self, reconciler: &R) -> Vec<ReconcileOutcome>
    where
        R: Reconciler,
        R::K: ResourceWrapper + Resource<DynamicType = ()>,
    {
        self.list::<R::K>()
            .into_iter()
            .map(|obj| {
                let meta = obj.meta();
                self.reconcile(
                    reconciler,
                    meta.namespace.as_deref().unwrap_or(""),
                    meta.name.as_deref().unwrap_or(""),
                )
            })
            .collect()
    }

    /// Runs all three controllers over every object until a full round changes nothing.
    ///
    /// Each round stands in for one requeue interval of the real controllers.
    pub fn settle(&self) -> usize {
        let templates = PolicyReconciler::<TemplatePolicy>::default();
        let strategies = PolicyReconciler::<AccessStrategyPolicy>::default();
        let compliance = ComplianceReconciler::default();
        for round in 1..=20 {
            let before = self.fingerprint();
            self.reconcile_all(&templates);
            self.reconcile_all(&strategies);
            self.reconcile_all(&compliance);
            if self.fingerprint() == before {
                return round;
            }
        }
        panic!("cluster did not settle");
    }

    // Resource versions of everything but events. A blocked deletion records
    // an event on every pass, which is not progress.
    fn fingerprint(&self) -> Vec<(ObjectKey, Option<String>)> {
        self.state()
            .resources
            .iter()
            .filter(|(key, _)| key.kind != "Event")
            .map(|(key, obj)| (key.clone(), obj.metadata.resource_version.clone()))
            .collect()
    }

    pub fn is_marked(&self, namespace: &str, name: &str) -> bool {
        self.get::<Workspace>(namespace, name)
            .map_or(false, |ws| ws.metadata.label(LABEL_COMPLIANCE_CHECK_NEEDED) == Some(LABEL_TRUE))
    }
}

/// TemplateStore reading from the model, used by apply_workspace.
pub struct ModelTemplateStore {
    cluster: ModelCluster,
}

#[async_trait]
impl TemplateStore for ModelTemplateStore {
    async fn get_template(&self, namespace: &str, name: &str) -> Result<Option<WorkspaceTemplate>, TemplateLookupError> {
        Ok(self.cluster.get::<WorkspaceTemplate>(namespace, name))
    }

    async fn list_default_templates(&self) -> Result<Vec<WorkspaceTemplate>, TemplateLookupError> {
        Ok(self
            .cluster
            .list::<WorkspaceTemplate>()
            .into_iter()
            .filter(|t| t.metadata.label(LABEL_DEFAULT_CLUSTER_TEMPLATE) == Some(LABEL_TRUE))
            .collect())
    }
}
