// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::policy_controller::reconciler::{error_state, update_finalizer};
use crate::controllers::policy_controller::drift_scheduler::{mark_failed, mark_workspace_request};
use crate::controllers::policy_controller::step::*;
use crate::governance::constants::*;
use crate::governance::events::create_event_request;
use crate::governance::policy_kind::PolicyKind;
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use kube::Resource;

// Deletion guard: Active -> PendingDeletion -> Gone.
//
// The API server keeps a deleted policy object around while the protection
// finalizer is present (PendingDeletion). The guard removes the finalizer only
// when the reverse index is empty, or when an operator explicitly forces it.

pub fn after_list_references<P: PolicyKind>(
    policy: &P::Policy,
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    let references = match state.references.as_ref() {
        Some(references) => references,
        None => return (error_state(state), None),
    };
    if references.is_empty() {
        return update_finalizer(PolicyReconcileState {
            desired_finalizer: false,
            ..state
        });
    }

    if let Some(reason) = policy.meta().annotation(ANNOTATION_FORCE_FINALIZER_REMOVAL) {
        tracing::warn!(
            finalizer = P::finalizer(),
            references = references.len(),
            reason,
            "force removing finalizer of {} in use",
            P::kind_name()
        );
        // Workspaces still pointing at the template are rechecked, so they
        // report it missing instead of keeping a stale Valid condition.
        let pending_marks: Vec<(String, String)> = if P::tracks_drift() {
            references
                .referencing
                .iter()
                .map(|ws| {
                    (
                        ws.metadata.namespace.clone().unwrap_or_default(),
                        ws.metadata.name.clone().unwrap_or_default(),
                    )
                })
                .rev()
                .collect()
        } else {
            Vec::new()
        };
        return mark_next_dependent(
            policy,
            PolicyReconcileState {
                pending_marks,
                failed_marks: 0,
                desired_finalizer: false,
                ..state
            },
        );
    }

    let mut message = format!(
        "Cannot delete {}: in use by {} workspace(s)",
        P::kind_name(),
        references.len()
    );
    if !references.orphaned.is_empty() {
        message.push_str(&format!(
            "; references whose spec no longer matches the label: {}",
            references.orphaned.join(", ")
        ));
    }
    let req = create_event_request(policy, EVENT_TYPE_WARNING, P::in_use_reason(), message);
    let state_prime = PolicyReconcileState {
        reconcile_step: PolicyReconcileStep::AfterCreateInUseEvent,
        ..state
    };
    (state_prime, Some(req))
}

pub fn after_mark_dependent<P: PolicyKind>(
    policy: &P::Policy,
    resp_o: Option<KubeAPIResponse>,
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    let failed_marks = state.failed_marks + usize::from(mark_failed(resp_o));
    mark_next_dependent(policy, PolicyReconcileState { failed_marks, ..state })
}

fn mark_next_dependent<P: PolicyKind>(
    policy: &P::Policy,
    mut state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    match state.pending_marks.pop() {
        Some((namespace, name)) => {
            let state_prime = PolicyReconcileState {
                reconcile_step: PolicyReconcileStep::AfterMarkDependent,
                ..state
            };
            (state_prime, Some(mark_workspace_request(namespace, name)))
        }
        None if state.failed_marks > 0 => {
            tracing::warn!(failed = state.failed_marks, "failed to mark workspaces of a force removed finalizer");
            (error_state(state), None)
        }
        None => {
            let (count, orphaned) = match state.references.as_ref() {
                Some(references) => (references.len(), references.orphaned.clone()),
                None => return (error_state(state), None),
            };
            let message = format!(
                "Finalizer {} force-removed: reason={}, references={}, orphaned={:?}",
                P::finalizer(),
                policy.meta().annotation(ANNOTATION_FORCE_FINALIZER_REMOVAL).unwrap_or(""),
                count,
                orphaned
            );
            let req = create_event_request(policy, EVENT_TYPE_WARNING, EVENT_FINALIZER_FORCE_REMOVED, message);
            let state_prime = PolicyReconcileState {
                reconcile_step: PolicyReconcileStep::AfterCreateAuditEvent,
                ..state
            };
            (state_prime, Some(req))
        }
    }
}

// The finalizer is only force-removed once the audit event is recorded.
pub fn after_create_audit_event<P: PolicyKind>(
    resp_o: Option<KubeAPIResponse>,
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    match resp_o.and_then(KubeAPIResponse::into_create) {
        Some(Ok(_)) => update_finalizer(state),
        _ => (error_state(state), None),
    }
}
