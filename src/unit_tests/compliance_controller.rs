// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::compliance_controller::reconciler::{is_up_to_date, needs_check, ComplianceReconciler};
use crate::controllers::crds::*;
use crate::controllers::policy_controller::reconciler::PolicyReconciler;
use crate::executable_model::api_server_state::{VERB_GET, VERB_PATCH, VERB_UPDATE_STATUS};
use crate::executable_model::harness::{ModelCluster, ReconcileOutcome};
use crate::executable_model::object_map::ObjectKey;
use crate::governance::conditions::valid_condition;
use crate::governance::constants::*;
use crate::governance::policy_kind::TemplatePolicy;
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use crate::reconciler::reconciler::Reconciler;
use crate::unit_tests::fixtures::*;
use chrono::TimeZone;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

fn check(cluster: &ModelCluster, name: &str) -> ReconcileOutcome {
    cluster.reconcile(&ComplianceReconciler::default(), NAMESPACE, name)
}

fn valid(cluster: &ModelCluster, name: &str) -> Condition {
    let ws = workspace_in(cluster, name);
    valid_condition(ws.status.as_ref()).cloned().unwrap()
}

#[tokio::test]
pub async fn test_compliant_workspace() {
    let cluster = cluster_with_template("tpl", "2");
    cluster.apply_workspace("alice", workspace("ws-a", Some("tpl"), "1")).await.unwrap();
    assert_eq!(check(&cluster, "ws-a"), ReconcileOutcome::Done);

    let condition = valid(&cluster, "ws-a");
    assert_eq!(condition.status, "True");
    assert_eq!(condition.reason, REASON_TEMPLATE_COMPLIANT);
    assert_eq!(condition.message, "Workspace complies with template 'tpl'");
    assert_eq!(condition.observed_generation, Some(1));
    assert_eq!(cluster.event_reasons_for("ws-a"), vec![EVENT_COMPLIANCE_CHECK_PASSED.to_string()]);
    assert_eq!(
        workspace_in(&cluster, "ws-a")
            .metadata
            .annotation(ANNOTATION_VALIDATED_TEMPLATE_GENERATION),
        Some("1")
    );

    // Nothing changed since, so the next pass only reads the template.
    cluster.reset_counts();
    assert_eq!(check(&cluster, "ws-a"), ReconcileOutcome::Done);
    assert_eq!(cluster.count(VERB_GET), 1);
    assert_eq!(cluster.count(VERB_UPDATE_STATUS), 0);
}

#[tokio::test]
pub async fn test_template_change_during_check_is_not_lost() {
    let cluster = cluster_with_template("tpl", "2");
    cluster.apply_workspace("alice", workspace("ws-a", Some("tpl"), "1")).await.unwrap();
    cluster.settle();
    let templates = PolicyReconciler::<TemplatePolicy>::default();
    set_max_cpu(&cluster, "tpl", "1500m");
    assert_eq!(cluster.reconcile(&templates, NAMESPACE, "tpl"), ReconcileOutcome::Done);
    assert!(cluster.is_marked(NAMESPACE, "ws-a"));

    // A check starts and reads generation 2 of the template.
    let compliance = ComplianceReconciler::default();
    let ws = workspace_in(&cluster, "ws-a");
    let (mut state, req) = compliance.reconcile_core(&ws, None, compliance.reconcile_init_state());
    let mut resp_o = req.map(|req| cluster.handle(req));

    // The template is tightened again before the check finishes. ws-a still
    // carries its marker, so the scheduler marks nothing.
    set_max_cpu(&cluster, "tpl", "500m");
    cluster.reset_counts();
    assert_eq!(cluster.reconcile(&templates, NAMESPACE, "tpl"), ReconcileOutcome::Done);
    assert_eq!(cluster.count(VERB_PATCH), 0);

    while !compliance.reconcile_done(&state) && !compliance.reconcile_error(&state) {
        let (state_prime, req) = compliance.reconcile_core(&ws, resp_o, state);
        resp_o = req.map(|req| cluster.handle(req));
        state = state_prime;
    }
    assert!(compliance.reconcile_done(&state));
    assert!(!cluster.is_marked(NAMESPACE, "ws-a"));
    assert_eq!(valid(&cluster, "ws-a").status, "True");

    cluster.settle();
    let condition = valid(&cluster, "ws-a");
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason, REASON_TEMPLATE_VIOLATION);
    assert_eq!(
        workspace_in(&cluster, "ws-a")
            .metadata
            .annotation(ANNOTATION_VALIDATED_TEMPLATE_GENERATION),
        Some("3")
    );
}

#[test]
pub fn test_violation_is_reported_not_enforced() {
    let cluster = cluster_with_template("tpl", "2");
    // Written around admission, e.g. while the webhook was down.
    cluster.create(&workspace("big", Some("tpl"), "3")).unwrap();
    assert_eq!(check(&cluster, "big"), ReconcileOutcome::Done);

    let condition = valid(&cluster, "big");
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason, REASON_TEMPLATE_VIOLATION);
    assert_eq!(
        condition.message,
        "Workspace violates template 'tpl': cpu request 3 exceeds maximum 2 allowed by template 'tpl'"
    );
    let event = cluster.events_for("big").pop().unwrap();
    assert_eq!(event.reason.as_deref(), Some(EVENT_COMPLIANCE_CHECK_FAILED));
    assert_eq!(event.type_.as_deref(), Some(EVENT_TYPE_WARNING));
    assert_eq!(workspace_in(&cluster, "big").spec.resources, cpu_request("3"));
}

#[test]
pub fn test_missing_template() {
    let cluster = ModelCluster::new();
    cluster.create(&workspace("ws-a", Some("missing"), "1")).unwrap();
    assert_eq!(check(&cluster, "ws-a"), ReconcileOutcome::Done);

    let condition = valid(&cluster, "ws-a");
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason, REASON_TEMPLATE_NOT_FOUND);
    assert_eq!(
        condition.message,
        format!(
            "Template 'missing' not found in namespace '{}, {}'",
            NAMESPACE, DEFAULT_TEMPLATE_NAMESPACE
        )
    );
    assert_eq!(cluster.event_reasons_for("ws-a"), vec![EVENT_COMPLIANCE_CHECK_FAILED.to_string()]);
}

#[test]
pub fn test_template_found_in_default_namespace() {
    let cluster = ModelCluster::new();
    let mut shared = template("shared", "2");
    shared.metadata.namespace = Some(DEFAULT_TEMPLATE_NAMESPACE.to_string());
    cluster.create(&shared).unwrap();
    cluster.create(&workspace("ws-a", Some("shared"), "1")).unwrap();
    assert_eq!(check(&cluster, "ws-a"), ReconcileOutcome::Done);
    assert_eq!(valid(&cluster, "ws-a").reason, REASON_TEMPLATE_COMPLIANT);
}

#[test]
pub fn test_workspace_without_template() {
    let cluster = ModelCluster::new();
    cluster.create(&workspace("ws-a", None, "1")).unwrap();
    assert_eq!(check(&cluster, "ws-a"), ReconcileOutcome::Done);

    let condition = valid(&cluster, "ws-a");
    assert_eq!(condition.status, "True");
    assert_eq!(condition.reason, REASON_NO_TEMPLATE);
    assert!(cluster.events_for("ws-a").is_empty());
}

#[test]
pub fn test_other_conditions_are_preserved() {
    let cluster = cluster_with_template("tpl", "2");
    let mut ws = cluster.create(&workspace("ws-a", Some("tpl"), "1")).unwrap();
    let available = Condition {
        type_: "Available".to_string(),
        status: "True".to_string(),
        reason: "Running".to_string(),
        message: "pod is ready".to_string(),
        observed_generation: Some(1),
        // Whole seconds, the precision Time keeps on the wire.
        last_transition_time: Time(chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
    };
    ws.status = Some(WorkspaceStatus {
        deployment_name: Some("ws-a".to_string()),
        service_name: Some("ws-a-svc".to_string()),
        conditions: vec![available.clone()],
    });
    let resp = cluster.handle(KubeAPIRequest::UpdateStatusRequest(KubeUpdateStatusRequest {
        api_resource: Workspace::api_resource(),
        name: "ws-a".to_string(),
        namespace: NAMESPACE.to_string(),
        obj: ws.marshal(),
    }));
    assert!(matches!(resp.into_update_status(), Some(Ok(_))));

    assert_eq!(check(&cluster, "ws-a"), ReconcileOutcome::Done);
    let status = workspace_in(&cluster, "ws-a").status.unwrap();
    assert_eq!(status.deployment_name.as_deref(), Some("ws-a"));
    assert_eq!(status.service_name.as_deref(), Some("ws-a-svc"));
    let conditions = status.conditions;
    assert_eq!(conditions.len(), 2);
    assert_eq!(conditions[0], available);
    assert_eq!(conditions[1].type_, CONDITION_TYPE_VALID);
}

#[test]
pub fn test_failed_mark_clear_is_retried() {
    let cluster = cluster_with_template("tpl", "2");
    let mut ws = workspace("ws-a", Some("tpl"), "1");
    ws.metadata.set_label(LABEL_COMPLIANCE_CHECK_NEEDED, LABEL_TRUE);
    cluster.create(&ws).unwrap();

    cluster
        .state()
        .faults
        .patch_keys
        .insert(ObjectKey::new("Workspace", NAMESPACE, "ws-a"));
    assert_eq!(check(&cluster, "ws-a"), ReconcileOutcome::Error);
    assert!(cluster.is_marked(NAMESPACE, "ws-a"));
    // The condition is already current.
    assert_eq!(valid(&cluster, "ws-a").status, "True");

    cluster.state().faults.patch_keys.clear();
    assert_eq!(check(&cluster, "ws-a"), ReconcileOutcome::Done);
    assert!(!cluster.is_marked(NAMESPACE, "ws-a"));
}

#[test]
pub fn test_needs_check() {
    let mut ws = workspace("ws-a", Some("tpl"), "1");
    ws.metadata.generation = Some(2);
    assert!(needs_check(&ws));

    let mut status = WorkspaceStatus::default();
    crate::governance::conditions::set_valid_condition(
        &mut status,
        true,
        REASON_TEMPLATE_COMPLIANT,
        String::new(),
        Some(2),
        Time(chrono::Utc::now()),
    );
    ws.status = Some(status);
    assert!(!needs_check(&ws));

    ws.metadata.set_label(LABEL_COMPLIANCE_CHECK_NEEDED, LABEL_TRUE);
    assert!(needs_check(&ws));

    ws.metadata.remove_label(LABEL_COMPLIANCE_CHECK_NEEDED);
    ws.metadata.generation = Some(3);
    assert!(needs_check(&ws));
}

#[test]
pub fn test_is_up_to_date() {
    let mut ws = workspace("ws-a", Some("tpl"), "1");
    ws.metadata.generation = Some(1);
    let mut status = WorkspaceStatus::default();
    crate::governance::conditions::set_valid_condition(
        &mut status,
        true,
        REASON_TEMPLATE_COMPLIANT,
        String::new(),
        Some(1),
        Time(chrono::Utc::now()),
    );
    ws.status = Some(status);
    let mut tpl = template("tpl", "2");
    tpl.metadata.generation = Some(4);

    // Never validated against any generation.
    assert!(!is_up_to_date(&ws, Some(&tpl)));
    // Last seen missing, and still missing.
    assert!(is_up_to_date(&ws, None));

    ws.metadata.set_annotation(ANNOTATION_VALIDATED_TEMPLATE_GENERATION, "3");
    assert!(!is_up_to_date(&ws, Some(&tpl)));
    assert!(!is_up_to_date(&ws, None));

    ws.metadata.set_annotation(ANNOTATION_VALIDATED_TEMPLATE_GENERATION, "4");
    assert!(is_up_to_date(&ws, Some(&tpl)));

    ws.metadata.set_label(LABEL_COMPLIANCE_CHECK_NEEDED, LABEL_TRUE);
    assert!(!is_up_to_date(&ws, Some(&tpl)));
}
