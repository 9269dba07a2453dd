// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::crds::{
    Workspace, WorkspaceAccessStrategy, WorkspaceTemplate, WorkspaceTemplateStatus,
};
use crate::governance::constants::*;
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// PolicyKind describes a kind of shared policy object that workspaces reference.
///
/// The deletion guard, the reverse reference index and the drift scheduler are
/// written once against this trait. A kind only supplies its resource type,
/// the reverse index label keys, its finalizer and how a workspace names it.
pub trait PolicyKind: Send + Sync + 'static {
    type Policy: Resource<DynamicType = ()>
        + ResourceWrapper
        + Serialize
        + DeserializeOwned
        + Clone
        + Debug
        + Send
        + Sync
        + 'static;

    // Human readable kind used in event messages, e.g. "template".
    fn kind_name() -> &'static str;

    fn finalizer() -> &'static str;

    fn name_label() -> &'static str;

    fn namespace_label() -> &'static str;

    // Reason of the Warning event emitted while deletion is blocked.
    fn in_use_reason() -> &'static str;

    // Whether generation changes of this kind are fanned out to workspaces.
    fn tracks_drift() -> bool;

    // The (name, namespace) the workspace spec points at, if any.
    // A namespace of None means the reference is relative to the workspace.
    fn referenced_by(workspace: &Workspace) -> Option<(String, Option<String>)>;

    fn observed_generation(_policy: &Self::Policy) -> i64 {
        0
    }

    fn set_observed_generation(_policy: &mut Self::Policy, _generation: i64) {}
}

pub struct TemplatePolicy;

impl PolicyKind for TemplatePolicy {
    type Policy = WorkspaceTemplate;

    fn kind_name() -> &'static str {
        "template"
    }

    fn finalizer() -> &'static str {
        FINALIZER_TEMPLATE_PROTECTION
    }

    fn name_label() -> &'static str {
        LABEL_TEMPLATE_NAME
    }

    fn namespace_label() -> &'static str {
        LABEL_TEMPLATE_NAMESPACE
    }

    fn in_use_reason() -> &'static str {
        "TemplateInUse"
    }

    fn tracks_drift() -> bool {
        true
    }

    fn referenced_by(workspace: &Workspace) -> Option<(String, Option<String>)> {
        workspace
            .spec
            .template_ref
            .as_ref()
            .map(|r| (r.name.clone(), r.namespace.clone()))
    }

    fn observed_generation(policy: &WorkspaceTemplate) -> i64 {
        policy.status.as_ref().map_or(0, |s| s.observed_generation)
    }

    fn set_observed_generation(policy: &mut WorkspaceTemplate, generation: i64) {
        policy
            .status
            .get_or_insert_with(WorkspaceTemplateStatus::default)
            .observed_generation = generation;
    }
}

pub struct AccessStrategyPolicy;

impl PolicyKind for AccessStrategyPolicy {
    type Policy = WorkspaceAccessStrategy;

    fn kind_name() -> &'static str {
        "access strategy"
    }

    fn finalizer() -> &'static str {
        FINALIZER_ACCESS_STRATEGY_PROTECTION
    }

    fn name_label() -> &'static str {
        LABEL_ACCESS_STRATEGY_NAME
    }

    fn namespace_label() -> &'static str {
        LABEL_ACCESS_STRATEGY_NAMESPACE
    }

    fn in_use_reason() -> &'static str {
        "AccessStrategyInUse"
    }

    fn tracks_drift() -> bool {
        false
    }

    fn referenced_by(workspace: &Workspace) -> Option<(String, Option<String>)> {
        workspace
            .spec
            .access_strategy
            .as_ref()
            .map(|r| (r.name.clone(), r.namespace.clone()))
    }
}
