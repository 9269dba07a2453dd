// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::crds::Workspace;
use crate::controllers::policy_controller::reconciler::{error_state, update_finalizer};
use crate::controllers::policy_controller::step::*;
use crate::governance::constants::*;
use crate::governance::policy_kind::PolicyKind;
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use kube::Resource;

// Drift scheduler: when a policy object's generation moves past the one it
// last processed, every referencing workspace gets the compliance-check-needed
// label. No validation happens here. Each workspace's own compliance reconcile
// picks the label up independently.

pub fn after_list_references<P: PolicyKind>(
    policy: &P::Policy,
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    if !P::tracks_drift() {
        return update_finalizer(state);
    }
    let generation = policy.meta().generation.unwrap_or(0);
    let observed = P::observed_generation(policy);
    if observed >= generation {
        return update_finalizer(state);
    }
    // Nothing can reference a policy object before its first generation is recorded.
    if generation == 1 && observed == 0 {
        return update_observed_generation(policy, state);
    }

    let pending_marks: Vec<(String, String)> = state
        .references
        .as_ref()
        .map(|references| {
            references
                .referencing
                .iter()
                .filter(|ws| ws.metadata.label(LABEL_COMPLIANCE_CHECK_NEEDED) != Some(LABEL_TRUE))
                .map(|ws| {
                    (
                        ws.metadata.namespace.clone().unwrap_or_default(),
                        ws.metadata.name.clone().unwrap_or_default(),
                    )
                })
                .rev()
                .collect()
        })
        .unwrap_or_default();
    tracing::info!(
        generation,
        observed,
        workspaces = pending_marks.len(),
        "{} changed, marking workspaces for a compliance check",
        P::kind_name()
    );
    mark_next_workspace(
        policy,
        PolicyReconcileState {
            pending_marks,
            failed_marks: 0,
            ..state
        },
    )
}

pub fn after_mark_workspace<P: PolicyKind>(
    policy: &P::Policy,
    resp_o: Option<KubeAPIResponse>,
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    let failed_marks = state.failed_marks + usize::from(mark_failed(resp_o));
    mark_next_workspace(policy, PolicyReconcileState { failed_marks, ..state })
}

fn mark_next_workspace<P: PolicyKind>(
    policy: &P::Policy,
    mut state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    match state.pending_marks.pop() {
        Some((namespace, name)) => {
            let req = mark_workspace_request(namespace, name);
            let state_prime = PolicyReconcileState {
                reconcile_step: PolicyReconcileStep::AfterMarkWorkspace,
                ..state
            };
            (state_prime, Some(req))
        }
        None if state.failed_marks > 0 => {
            // observedGeneration stays behind so the retried pass marks the rest.
            tracing::warn!(failed = state.failed_marks, "failed to mark some workspaces");
            (error_state(state), None)
        }
        None => update_observed_generation(policy, state),
    }
}

fn update_observed_generation<P: PolicyKind>(
    policy: &P::Policy,
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    let mut latest = match state.latest_policy.clone() {
        Some(latest) => latest,
        None => return (error_state(state), None),
    };
    let generation = policy.meta().generation.unwrap_or(0);
    P::set_observed_generation(&mut latest, generation);
    let (name, namespace) = match (latest.meta().name.clone(), latest.meta().namespace.clone()) {
        (Some(name), Some(namespace)) => (name, namespace),
        _ => return (error_state(state), None),
    };
    let req = KubeAPIRequest::UpdateStatusRequest(KubeUpdateStatusRequest {
        api_resource: <P::Policy as ResourceWrapper>::api_resource(),
        name,
        namespace,
        obj: latest.marshal(),
    });
    let state_prime = PolicyReconcileState {
        reconcile_step: PolicyReconcileStep::AfterUpdateObservedGeneration,
        ..state
    };
    (state_prime, Some(req))
}

pub fn after_update_observed_generation<P: PolicyKind>(
    resp_o: Option<KubeAPIResponse>,
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    match resp_o
        .and_then(KubeAPIResponse::into_update_status)
        .map(|res| res.ok().map(<P::Policy as ResourceWrapper>::unmarshal))
    {
        Some(Some(Ok(latest))) => update_finalizer(PolicyReconcileState {
            latest_policy: Some(latest),
            ..state
        }),
        _ => (error_state(state), None),
    }
}

pub fn mark_workspace_request(namespace: String, name: String) -> KubeAPIRequest {
    KubeAPIRequest::PatchRequest(KubePatchRequest {
        api_resource: Workspace::api_resource(),
        name,
        namespace,
        patch: compliance_check_needed_patch(),
    })
}

// A failed mark is counted; a workspace that is gone needs no check.
pub fn mark_failed(resp_o: Option<KubeAPIResponse>) -> bool {
    match resp_o.and_then(KubeAPIResponse::into_patch) {
        Some(Ok(_)) => false,
        Some(Err(err)) => !err.is_object_not_found(),
        None => true,
    }
}

pub fn compliance_check_needed_patch() -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "labels": {
                LABEL_COMPLIANCE_CHECK_NEEDED: LABEL_TRUE
            }
        }
    })
}
