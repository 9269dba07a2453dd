// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::policy_controller::step::*;
use crate::controllers::policy_controller::{deletion_guard, drift_scheduler};
use crate::governance::policy_kind::PolicyKind;
use crate::governance::reverse_index::{collect_references, find_referencing_request};
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use crate::reconciler::reconciler::Reconciler;
use kube::Resource;
use std::marker::PhantomData;

/// PolicyReconciler guards one policy object of kind P.
///
/// Every reconcile issues exactly one reverse index lookup and then either
/// runs the deletion guard (the object is being deleted) or the drift
/// scheduler (it is active). Both end by converging the protection finalizer
/// to "present iff referenced".
pub struct PolicyReconciler<P: PolicyKind> {
    kind: PhantomData<P>,
}

impl<P: PolicyKind> Default for PolicyReconciler<P> {
    fn default() -> Self {
        PolicyReconciler { kind: PhantomData }
    }
}

impl<P: PolicyKind> Reconciler for PolicyReconciler<P> {
    type K = P::Policy;
    type S = PolicyReconcileState<P>;

    fn reconcile_init_state(&self) -> PolicyReconcileState<P> {
        reconcile_init_state()
    }

    fn reconcile_core(
        &self,
        policy: &P::Policy,
        resp_o: Option<KubeAPIResponse>,
        state: PolicyReconcileState<P>,
    ) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
        reconcile_core(policy, resp_o, state)
    }

    fn reconcile_done(&self, state: &PolicyReconcileState<P>) -> bool {
        state.reconcile_step == PolicyReconcileStep::Done
    }

    fn reconcile_error(&self, state: &PolicyReconcileState<P>) -> bool {
        state.reconcile_step == PolicyReconcileStep::Error
    }
}

pub fn reconcile_init_state<P: PolicyKind>() -> PolicyReconcileState<P> {
    PolicyReconcileState {
        reconcile_step: PolicyReconcileStep::Init,
        references: None,
        latest_policy: None,
        pending_marks: Vec::new(),
        failed_marks: 0,
        desired_finalizer: false,
    }
}

pub fn reconcile_core<P: PolicyKind>(
    policy: &P::Policy,
    resp_o: Option<KubeAPIResponse>,
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    match state.reconcile_step {
        PolicyReconcileStep::Init => {
            let meta = policy.meta();
            if meta.has_deletion_timestamp() && !meta.has_finalizer(P::finalizer()) {
                return (done_state(state), None);
            }
            let (name, namespace) = match policy_identity::<P>(policy) {
                Some(identity) => identity,
                None => return (error_state(state), None),
            };
            let req = KubeAPIRequest::ListRequest(find_referencing_request::<P>(&name, &namespace));
            let state_prime = PolicyReconcileState {
                reconcile_step: PolicyReconcileStep::AfterListReferences,
                latest_policy: Some(policy.clone()),
                ..state
            };
            (state_prime, Some(req))
        }
        PolicyReconcileStep::AfterListReferences => {
            // An index query that failed is never read as "no references".
            let objs = match resp_o.and_then(KubeAPIResponse::into_list) {
                Some(Ok(objs)) => objs,
                _ => return (error_state(state), None),
            };
            let (name, namespace) = match policy_identity::<P>(policy) {
                Some(identity) => identity,
                None => return (error_state(state), None),
            };
            let references = match collect_references::<P>(objs, &name, &namespace) {
                Ok(references) => references,
                Err(_) => return (error_state(state), None),
            };
            let state_prime = PolicyReconcileState {
                desired_finalizer: !references.is_empty(),
                references: Some(references),
                ..state
            };
            if policy.meta().has_deletion_timestamp() {
                deletion_guard::after_list_references(policy, state_prime)
            } else {
                drift_scheduler::after_list_references(policy, state_prime)
            }
        }
        PolicyReconcileStep::AfterCreateInUseEvent => {
            // Deletion stays blocked; the next reconcile checks the index again.
            (done_state(state), None)
        }
        PolicyReconcileStep::AfterMarkDependent => {
            deletion_guard::after_mark_dependent(policy, resp_o, state)
        }
        PolicyReconcileStep::AfterCreateAuditEvent => {
            deletion_guard::after_create_audit_event(resp_o, state)
        }
        PolicyReconcileStep::AfterMarkWorkspace => {
            drift_scheduler::after_mark_workspace(policy, resp_o, state)
        }
        PolicyReconcileStep::AfterUpdateObservedGeneration => {
            drift_scheduler::after_update_observed_generation(resp_o, state)
        }
        PolicyReconcileStep::AfterUpdateFinalizer => match resp_o.and_then(KubeAPIResponse::into_update) {
            Some(Ok(_)) => (done_state(state), None),
            Some(Err(err)) if err.is_conflict() => {
                // Someone else wrote the object first. Read it again and accept
                // the result if the finalizer already ended up where we want it.
                let latest = state.latest_policy.as_ref().unwrap_or(policy);
                match policy_identity::<P>(latest) {
                    Some((name, namespace)) => {
                        let req = KubeAPIRequest::GetRequest(KubeGetRequest {
                            api_resource: <P::Policy as ResourceWrapper>::api_resource(),
                            name,
                            namespace,
                        });
                        let state_prime = PolicyReconcileState {
                            reconcile_step: PolicyReconcileStep::AfterRegetPolicy,
                            ..state
                        };
                        (state_prime, Some(req))
                    }
                    None => (error_state(state), None),
                }
            }
            Some(Err(err)) if err.is_object_not_found() && !state.desired_finalizer => {
                (done_state(state), None)
            }
            _ => (error_state(state), None),
        },
        PolicyReconcileStep::AfterRegetPolicy => match resp_o.and_then(KubeAPIResponse::into_get) {
            Some(Ok(obj)) => match <P::Policy as ResourceWrapper>::unmarshal(obj) {
                Ok(latest) if latest.meta().has_finalizer(P::finalizer()) == state.desired_finalizer => {
                    (done_state(state), None)
                }
                _ => (error_state(state), None),
            },
            Some(Err(err)) if err.is_object_not_found() && !state.desired_finalizer => {
                (done_state(state), None)
            }
            _ => (error_state(state), None),
        },
        PolicyReconcileStep::Done | PolicyReconcileStep::Error => (state, None),
    }
}

/// Brings the protection finalizer to state.desired_finalizer.
///
/// The update is built from the latest copy of the policy, so a concurrent
/// writer makes it fail with a conflict instead of being overwritten.
pub fn update_finalizer<P: PolicyKind>(
    state: PolicyReconcileState<P>,
) -> (PolicyReconcileState<P>, Option<KubeAPIRequest>) {
    let mut policy = match state.latest_policy.clone() {
        Some(policy) => policy,
        None => return (error_state(state), None),
    };
    if policy.meta().has_finalizer(P::finalizer()) == state.desired_finalizer {
        return (done_state(state), None);
    }
    if state.desired_finalizer {
        policy.meta_mut().add_finalizer(P::finalizer());
    } else {
        policy.meta_mut().remove_finalizer(P::finalizer());
    }
    let (name, namespace) = match policy_identity::<P>(&policy) {
        Some(identity) => identity,
        None => return (error_state(state), None),
    };
    let req = KubeAPIRequest::UpdateRequest(KubeUpdateRequest {
        api_resource: <P::Policy as ResourceWrapper>::api_resource(),
        name,
        namespace,
        obj: policy.marshal(),
    });
    let state_prime = PolicyReconcileState {
        reconcile_step: PolicyReconcileStep::AfterUpdateFinalizer,
        ..state
    };
    (state_prime, Some(req))
}

pub fn policy_identity<P: PolicyKind>(policy: &P::Policy) -> Option<(String, String)> {
    let meta = policy.meta();
    Some((meta.name.clone()?, meta.namespace.clone()?))
}

pub fn done_state<P: PolicyKind>(state: PolicyReconcileState<P>) -> PolicyReconcileState<P> {
    PolicyReconcileState {
        reconcile_step: PolicyReconcileStep::Done,
        ..state
    }
}

pub fn error_state<P: PolicyKind>(state: PolicyReconcileState<P>) -> PolicyReconcileState<P> {
    PolicyReconcileState {
        reconcile_step: PolicyReconcileStep::Error,
        ..state
    }
}
