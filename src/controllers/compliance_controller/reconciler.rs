// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::compliance_controller::step::*;
use crate::controllers::crds::{Workspace, WorkspaceStatus, WorkspaceTemplate};
use crate::governance::conditions::{set_valid_condition, valid_condition};
use crate::governance::constants::*;
use crate::governance::events::create_event_request;
use crate::governance::resolver::{resolve, template_namespace_candidates};
use crate::governance::validator::{format_violations, validate, TemplateViolation};
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use crate::reconciler::reconciler::Reconciler;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// ComplianceReconciler re-validates one workspace against the current state of its template.
///
/// It only ever writes the Valid condition, an event and its own bookkeeping
/// metadata; the workspace spec and every other condition are left alone.
///
/// The template is read on every pass, so a template change the drift
/// scheduler did not mark for (the workspace was already marked, or the
/// marker was cleared by a check of an older generation) is still caught by
/// comparing against the validated-template-generation annotation.
pub struct ComplianceReconciler {
    pub default_template_namespace: String,
}

impl Default for ComplianceReconciler {
    fn default() -> ComplianceReconciler {
        ComplianceReconciler {
            default_template_namespace: DEFAULT_TEMPLATE_NAMESPACE.to_string(),
        }
    }
}

impl Reconciler for ComplianceReconciler {
    type K = Workspace;
    type S = ComplianceReconcileState;

    fn reconcile_init_state(&self) -> ComplianceReconcileState {
        ComplianceReconcileState {
            reconcile_step: ComplianceReconcileStep::Init,
            remaining_namespaces: Vec::new(),
            tried_namespaces: Vec::new(),
            template: None,
            outcome: None,
            latest_workspace: None,
        }
    }

    fn reconcile_core(
        &self,
        workspace: &Workspace,
        resp_o: Option<KubeAPIResponse>,
        state: ComplianceReconcileState,
    ) -> (ComplianceReconcileState, Option<KubeAPIRequest>) {
        match state.reconcile_step {
            ComplianceReconcileStep::Init => {
                if workspace.metadata.has_deletion_timestamp() {
                    return (done_state(state), None);
                }
                let template_ref = match workspace.spec.template_ref.as_ref().filter(|r| !r.name.is_empty()) {
                    Some(template_ref) => template_ref,
                    None => {
                        if !needs_check(workspace) {
                            return (done_state(state), None);
                        }
                        let outcome = ComplianceOutcome {
                            valid: true,
                            reason: REASON_NO_TEMPLATE,
                            message: "Workspace does not reference a template".to_string(),
                        };
                        return update_status(workspace, ComplianceReconcileState { outcome: Some(outcome), ..state });
                    }
                };
                let workspace_namespace = workspace.metadata.namespace.clone().unwrap_or_default();
                let mut remaining_namespaces = template_namespace_candidates(
                    template_ref,
                    workspace.metadata.label(LABEL_TEMPLATE_NAMESPACE),
                    &workspace_namespace,
                    &self.default_template_namespace,
                );
                remaining_namespaces.reverse();
                get_next_template(workspace, ComplianceReconcileState { remaining_namespaces, ..state })
            }
            ComplianceReconcileStep::AfterGetTemplate => match resp_o.and_then(KubeAPIResponse::into_get) {
                Some(Ok(obj)) => match WorkspaceTemplate::unmarshal(obj) {
                    Ok(template) if is_up_to_date(workspace, Some(&template)) => (done_state(state), None),
                    Ok(template) => {
                        let outcome = check_against(workspace, &template);
                        update_status(
                            workspace,
                            ComplianceReconcileState {
                                template: Some(template),
                                outcome: Some(outcome),
                                ..state
                            },
                        )
                    }
                    Err(_) => (error_state(state), None),
                },
                Some(Err(err)) if err.is_object_not_found() => get_next_template(workspace, state),
                _ => (error_state(state), None),
            },
            ComplianceReconcileStep::AfterUpdateStatus => {
                let latest = match resp_o
                    .and_then(KubeAPIResponse::into_update_status)
                    .map(|res| res.ok().map(Workspace::unmarshal))
                {
                    Some(Some(Ok(latest))) => latest,
                    _ => return (error_state(state), None),
                };
                let state = ComplianceReconcileState {
                    latest_workspace: Some(latest),
                    ..state
                };
                let outcome = match state.outcome.as_ref() {
                    Some(outcome) => outcome,
                    None => return (error_state(state), None),
                };
                // A detached workspace has nothing to report.
                if outcome.reason == REASON_NO_TEMPLATE {
                    return clear_mark(workspace, state);
                }
                let (reason, event_type) = if outcome.valid {
                    (EVENT_COMPLIANCE_CHECK_PASSED, EVENT_TYPE_NORMAL)
                } else {
                    (EVENT_COMPLIANCE_CHECK_FAILED, EVENT_TYPE_WARNING)
                };
                let req = create_event_request(workspace, event_type, reason, outcome.message.clone());
                let state_prime = ComplianceReconcileState {
                    reconcile_step: ComplianceReconcileStep::AfterCreateComplianceEvent,
                    ..state
                };
                (state_prime, Some(req))
            }
            ComplianceReconcileStep::AfterCreateComplianceEvent => {
                // Events are best effort; the condition is already written.
                if let Some(Err(err)) = resp_o.and_then(KubeAPIResponse::into_create) {
                    tracing::warn!(error = %err, "failed to record compliance event");
                }
                clear_mark(workspace, state)
            }
            ComplianceReconcileStep::AfterClearMark => match resp_o.and_then(KubeAPIResponse::into_patch) {
                Some(Ok(_)) => (done_state(state), None),
                Some(Err(err)) if err.is_object_not_found() => (done_state(state), None),
                _ => (error_state(state), None),
            },
            ComplianceReconcileStep::Done | ComplianceReconcileStep::Error => (state, None),
        }
    }

    fn reconcile_done(&self, state: &ComplianceReconcileState) -> bool {
        state.reconcile_step == ComplianceReconcileStep::Done
    }

    fn reconcile_error(&self, state: &ComplianceReconcileState) -> bool {
        state.reconcile_step == ComplianceReconcileStep::Error
    }
}

/// A workspace is checked when it was marked by the drift scheduler, has never
/// been checked, or was written since the last check.
pub fn needs_check(workspace: &Workspace) -> bool {
    if workspace.metadata.label(LABEL_COMPLIANCE_CHECK_NEEDED) == Some(LABEL_TRUE) {
        return true;
    }
    match valid_condition(workspace.status.as_ref()) {
        Some(condition) => condition.observed_generation != workspace.metadata.generation,
        None => true,
    }
}

/// True when the last check already covers this workspace and the template
/// as it is stored now. A missing template is recorded as no annotation.
pub fn is_up_to_date(workspace: &Workspace, template: Option<&WorkspaceTemplate>) -> bool {
    let validated = workspace
        .metadata
        .annotation(ANNOTATION_VALIDATED_TEMPLATE_GENERATION);
    let current = template.and_then(|t| t.metadata.generation).map(|g| g.to_string());
    !needs_check(workspace) && validated == current.as_deref()
}

/// Resolves the stored spec against the template and validates the result.
pub fn check_against(workspace: &Workspace, template: &WorkspaceTemplate) -> ComplianceOutcome {
    let template_name = template.metadata.name.as_deref().unwrap_or("");
    let effective = resolve(&workspace.spec, Some(template));
    let violations = validate(&effective, template);
    if violations.is_empty() {
        ComplianceOutcome {
            valid: true,
            reason: REASON_TEMPLATE_COMPLIANT,
            message: format!("Workspace complies with template '{}'", template_name),
        }
    } else {
        ComplianceOutcome {
            valid: false,
            reason: REASON_TEMPLATE_VIOLATION,
            message: format!(
                "Workspace violates template '{}': {}",
                template_name,
                format_violations(&violations)
            ),
        }
    }
}

fn get_next_template(
    workspace: &Workspace,
    mut state: ComplianceReconcileState,
) -> (ComplianceReconcileState, Option<KubeAPIRequest>) {
    let name = workspace
        .spec
        .template_ref
        .as_ref()
        .map(|r| r.name.clone())
        .unwrap_or_default();
    match state.remaining_namespaces.pop() {
        Some(namespace) => {
            state.tried_namespaces.push(namespace.clone());
            let req = KubeAPIRequest::GetRequest(KubeGetRequest {
                api_resource: WorkspaceTemplate::api_resource(),
                name,
                namespace,
            });
            let state_prime = ComplianceReconcileState {
                reconcile_step: ComplianceReconcileStep::AfterGetTemplate,
                ..state
            };
            (state_prime, Some(req))
        }
        None if is_up_to_date(workspace, None) => (done_state(state), None),
        None => {
            let violation = TemplateViolation::template_not_found(&name, &state.tried_namespaces.join(", "));
            let outcome = ComplianceOutcome {
                valid: false,
                reason: REASON_TEMPLATE_NOT_FOUND,
                message: violation.message,
            };
            update_status(workspace, ComplianceReconcileState { outcome: Some(outcome), ..state })
        }
    }
}

fn update_status(
    workspace: &Workspace,
    state: ComplianceReconcileState,
) -> (ComplianceReconcileState, Option<KubeAPIRequest>) {
    let outcome = match state.outcome.as_ref() {
        Some(outcome) => outcome,
        None => return (error_state(state), None),
    };
    let (name, namespace) = match (workspace.metadata.name.clone(), workspace.metadata.namespace.clone()) {
        (Some(name), Some(namespace)) => (name, namespace),
        _ => return (error_state(state), None),
    };
    let mut updated = workspace.clone();
    set_valid_condition(
        updated.status.get_or_insert_with(WorkspaceStatus::default),
        outcome.valid,
        outcome.reason,
        outcome.message.clone(),
        workspace.metadata.generation,
        Time(chrono::Utc::now()),
    );
    let req = KubeAPIRequest::UpdateStatusRequest(KubeUpdateStatusRequest {
        api_resource: Workspace::api_resource(),
        name,
        namespace,
        obj: updated.marshal(),
    });
    let state_prime = ComplianceReconcileState {
        reconcile_step: ComplianceReconcileStep::AfterUpdateStatus,
        ..state
    };
    (state_prime, Some(req))
}

// Removes the compliance-check-needed label and records which template
// generation the workspace was validated against.
fn clear_mark(
    workspace: &Workspace,
    state: ComplianceReconcileState,
) -> (ComplianceReconcileState, Option<KubeAPIRequest>) {
    let (name, namespace) = match (workspace.metadata.name.clone(), workspace.metadata.namespace.clone()) {
        (Some(name), Some(namespace)) => (name, namespace),
        _ => return (error_state(state), None),
    };
    let validated_generation = state
        .template
        .as_ref()
        .and_then(|t| t.metadata.generation)
        .map(|g| serde_json::Value::String(g.to_string()))
        .unwrap_or(serde_json::Value::Null);
    let patch = serde_json::json!({
        "metadata": {
            "labels": {
                LABEL_COMPLIANCE_CHECK_NEEDED: null
            },
            "annotations": {
                ANNOTATION_VALIDATED_TEMPLATE_GENERATION: validated_generation
            }
        }
    });
    let req = KubeAPIRequest::PatchRequest(KubePatchRequest {
        api_resource: Workspace::api_resource(),
        name,
        namespace,
        patch,
    });
    let state_prime = ComplianceReconcileState {
        reconcile_step: ComplianceReconcileStep::AfterClearMark,
        ..state
    };
    (state_prime, Some(req))
}

fn done_state(state: ComplianceReconcileState) -> ComplianceReconcileState {
    ComplianceReconcileState {
        reconcile_step: ComplianceReconcileStep::Done,
        ..state
    }
}

fn error_state(state: ComplianceReconcileState) -> ComplianceReconcileState {
    ComplianceReconcileState {
        reconcile_step: ComplianceReconcileStep::Error,
        ..state
    }
}
