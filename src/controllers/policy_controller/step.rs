// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::governance::policy_kind::PolicyKind;
use crate::governance::reverse_index::ReferenceSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyReconcileStep {
    Init,
    AfterListReferences,
    AfterCreateInUseEvent,
    AfterMarkDependent,
    AfterCreateAuditEvent,
    AfterMarkWorkspace,
    AfterUpdateObservedGeneration,
    AfterUpdateFinalizer,
    AfterRegetPolicy,
    Done,
    Error,
}

pub struct PolicyReconcileState<P: PolicyKind> {
    pub reconcile_step: PolicyReconcileStep,
    // Result of the single reverse index lookup of this reconcile.
    pub references: Option<ReferenceSet>,
    // The freshest copy of the policy object returned by the API server.
    // Writes are built from it so they carry its resourceVersion.
    pub latest_policy: Option<P::Policy>,
    // (namespace, name) of workspaces still to be marked for a compliance check.
    pub pending_marks: Vec<(String, String)>,
    pub failed_marks: usize,
    pub desired_finalizer: bool,
}

impl<P: PolicyKind> PolicyReconcileState<P> {
    pub fn reference_count(&self) -> usize {
        self.references.as_ref().map_or(0, ReferenceSet::len)
    }
}

impl<P: PolicyKind> Clone for PolicyReconcileState<P> {
    fn clone(&self) -> Self {
        PolicyReconcileState {
            reconcile_step: self.reconcile_step,
            references: self.references.clone(),
            latest_policy: self.latest_policy.clone(),
            pending_marks: self.pending_marks.clone(),
            failed_marks: self.failed_marks,
            desired_finalizer: self.desired_finalizer,
        }
    }
}

impl<P: PolicyKind> std::fmt::Debug for PolicyReconcileState<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyReconcileState")
            .field("reconcile_step", &self.reconcile_step)
            .field("references", &self.reference_count())
            .field("pending_marks", &self.pending_marks.len())
            .field("failed_marks", &self.failed_marks)
            .field("desired_finalizer", &self.desired_finalizer)
            .finish()
    }
}
