// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::crds::{StorageSpec, TemplateRef, WorkspaceSpec, WorkspaceTemplate};
use crate::governance::constants::*;
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use crate::kubernetes_api_objects::quantity::quantity_is_zero;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

// A string field counts as set only when it is present and non-empty.
fn is_unset(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, str::is_empty)
}

fn default_string(field: &mut Option<String>, default: &Option<String>) {
    if is_unset(field) && !is_unset(default) {
        *field = default.clone();
    }
}

/// Computes the effective spec of a workspace.
///
/// Precedence per field: the value set on the workspace, then the template
/// default, then the system default. The admission hook persists the result,
/// and the compliance reconciler recomputes it for validation, so both paths
/// go through this one function.
pub fn resolve(spec: &WorkspaceSpec, template: Option<&WorkspaceTemplate>) -> WorkspaceSpec {
    let mut effective = spec.clone();
    if let Some(template) = template {
        apply_template_defaults(&mut effective, template);
    }
    apply_system_defaults(&mut effective);
    effective
}

pub fn apply_template_defaults(spec: &mut WorkspaceSpec, template: &WorkspaceTemplate) {
    apply_core_defaults(spec, template);
    apply_resource_defaults(spec, template);
    apply_storage_defaults(spec, template);
    apply_scheduling_defaults(spec, template);
    apply_access_strategy_defaults(spec, template);
    apply_idle_shutdown_defaults(spec, template);
}

fn apply_core_defaults(spec: &mut WorkspaceSpec, template: &WorkspaceTemplate) {
    default_string(&mut spec.image, &template.spec.default_image);
    default_string(&mut spec.ownership_type, &template.spec.default_ownership_type);
    default_string(&mut spec.access_type, &template.spec.default_access_type);
    default_string(&mut spec.app_type, &template.spec.app_type);
    if spec.container_config.is_none() {
        spec.container_config = template.spec.default_container_config.clone();
    }
}

fn apply_resource_defaults(spec: &mut WorkspaceSpec, template: &WorkspaceTemplate) {
    if spec.resources.is_none() {
        spec.resources = template.spec.default_resources.clone();
    }
}

fn apply_storage_defaults(spec: &mut WorkspaceSpec, template: &WorkspaceTemplate) {
    let config = match template.spec.primary_storage.as_ref() {
        Some(config) => config,
        None => return,
    };
    let default_size = config.default_size.as_ref().filter(|size| !quantity_is_zero(size));
    if spec.storage.is_none() && default_size.is_some() {
        spec.storage = Some(StorageSpec::default());
    }
    if let Some(storage) = spec.storage.as_mut() {
        if storage.size.as_ref().map_or(true, quantity_is_zero) {
            if let Some(size) = default_size {
                storage.size = Some(size.clone());
            }
        }
        if storage.storage_class_name.is_none() {
            storage.storage_class_name = config.default_storage_class_name.clone();
        }
        default_string(&mut storage.mount_path, &config.default_mount_path);
    }
}

fn apply_scheduling_defaults(spec: &mut WorkspaceSpec, template: &WorkspaceTemplate) {
    if spec.node_selector.is_none() {
        spec.node_selector = template.spec.default_node_selector.clone();
    }
    if spec.tolerations.is_none() {
        spec.tolerations = template.spec.default_tolerations.clone();
    }
}

fn apply_access_strategy_defaults(spec: &mut WorkspaceSpec, template: &WorkspaceTemplate) {
    if spec.access_strategy.is_none() {
        spec.access_strategy = template.spec.default_access_strategy.clone();
    }
}

fn apply_idle_shutdown_defaults(spec: &mut WorkspaceSpec, template: &WorkspaceTemplate) {
    if spec.idle_shutdown.is_none() {
        spec.idle_shutdown = template.spec.default_idle_shutdown.clone();
    }
}

pub fn apply_system_defaults(spec: &mut WorkspaceSpec) {
    if is_unset(&spec.desired_status) {
        spec.desired_status = Some(DESIRED_STATUS_RUNNING.to_string());
    }
    let resources_empty = spec.resources.as_ref().map_or(true, |r| {
        r.requests.as_ref().map_or(true, BTreeMap::is_empty)
            && r.limits.as_ref().map_or(true, BTreeMap::is_empty)
    });
    if resources_empty {
        spec.resources = Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(DEFAULT_CPU_REQUEST.to_string())),
                ("memory".to_string(), Quantity(DEFAULT_MEMORY_REQUEST.to_string())),
            ])),
            ..ResourceRequirements::default()
        });
    }
    if let Some(storage) = spec.storage.as_mut() {
        if is_unset(&storage.mount_path) {
            storage.mount_path = Some(DEFAULT_MOUNT_PATH.to_string());
        }
    }
}

/// Sets or clears the reverse reference index labels so they mirror the spec.
///
/// `template_namespace` is where the referenced template was actually found;
/// when unknown the explicit reference namespace or the workspace namespace is used.
pub fn apply_reference_labels(
    meta: &mut ObjectMeta,
    spec: &WorkspaceSpec,
    template_namespace: Option<&str>,
) {
    let workspace_namespace = meta.namespace.clone().unwrap_or_default();
    match spec.template_ref.as_ref().filter(|r| !r.name.is_empty()) {
        Some(template_ref) => {
            let namespace = template_namespace
                .map(str::to_string)
                .or_else(|| template_ref.namespace.clone().filter(|ns| !ns.is_empty()))
                .unwrap_or_else(|| workspace_namespace.clone());
            meta.set_label(LABEL_TEMPLATE_NAME, &template_ref.name);
            meta.set_label(LABEL_TEMPLATE_NAMESPACE, &namespace);
        }
        None => {
            meta.remove_label(LABEL_TEMPLATE_NAME);
            meta.remove_label(LABEL_TEMPLATE_NAMESPACE);
        }
    }
    match spec.access_strategy.as_ref().filter(|r| !r.name.is_empty()) {
        Some(strategy) => {
            let namespace = strategy
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .unwrap_or(workspace_namespace);
            meta.set_label(LABEL_ACCESS_STRATEGY_NAME, &strategy.name);
            meta.set_label(LABEL_ACCESS_STRATEGY_NAMESPACE, &namespace);
        }
        None => {
            meta.remove_label(LABEL_ACCESS_STRATEGY_NAME);
            meta.remove_label(LABEL_ACCESS_STRATEGY_NAMESPACE);
        }
    }
}

/// Namespaces to look a template up in, in order, without duplicates.
///
/// An explicit reference namespace is authoritative. Otherwise the namespace
/// recorded in the reverse index label (if any) is tried first, then the
/// workspace namespace, then the configured default template namespace.
pub fn template_namespace_candidates(
    template_ref: &TemplateRef,
    label_namespace: Option<&str>,
    workspace_namespace: &str,
    default_namespace: &str,
) -> Vec<String> {
    if let Some(ns) = template_ref.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        return vec![ns.to_string()];
    }
    let mut candidates: Vec<String> = Vec::new();
    for ns in [label_namespace, Some(workspace_namespace), Some(default_namespace)]
        .into_iter()
        .flatten()
    {
        if !ns.is_empty() && !candidates.iter().any(|c| c == ns) {
            candidates.push(ns.to_string());
        }
    }
    candidates
}
