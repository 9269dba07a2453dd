// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::crds::{Workspace, WorkspaceTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceReconcileStep {
    Init,
    AfterGetTemplate,
    AfterUpdateStatus,
    AfterCreateComplianceEvent,
    AfterClearMark,
    Done,
    Error,
}

/// The result of checking a workspace against its template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceOutcome {
    pub valid: bool,
    pub reason: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ComplianceReconcileState {
    pub reconcile_step: ComplianceReconcileStep,
    // Namespaces the template is still to be looked up in, next one last.
    pub remaining_namespaces: Vec<String>,
    pub tried_namespaces: Vec<String>,
    pub template: Option<WorkspaceTemplate>,
    pub outcome: Option<ComplianceOutcome>,
    pub latest_workspace: Option<Workspace>,
}
