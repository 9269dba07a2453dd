// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::admission::error::AdmissionError;
use crate::admission::template_store::TemplateStore;
use crate::controllers::crds::{TemplateRef, Workspace, WorkspaceSpec, WorkspaceTemplate};
use crate::governance::constants::*;
use crate::governance::resolver::{apply_reference_labels, resolve, template_namespace_candidates};
use crate::governance::validator::{format_violations, validate};
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use kube::core::admission::Operation;

/// How an update is treated, decided from the caller's write before any defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    // The template reference was removed.
    Detach,
    // Only desiredStatus changed, to Stopped.
    StopOnly,
    // The spec is identical, e.g. a label written by a controller.
    Unchanged,
    // Anything else: the whole spec is checked against the target template.
    Revalidate,
}

pub fn classify_update(old: &WorkspaceSpec, new: &WorkspaceSpec) -> UpdateKind {
    if old.template_ref.is_some() && new.template_ref.is_none() {
        return UpdateKind::Detach;
    }
    if old == new {
        return UpdateKind::Unchanged;
    }
    let stopping = new.desired_status.as_deref() == Some(DESIRED_STATUS_STOPPED)
        && old.desired_status.as_deref() != Some(DESIRED_STATUS_STOPPED);
    let only_status_changed = WorkspaceSpec {
        desired_status: new.desired_status.clone(),
        ..old.clone()
    } == *new;
    if stopping && only_status_changed {
        return UpdateKind::StopOnly;
    }
    UpdateKind::Revalidate
}

/// WorkspaceHook defaults and enforces workspace writes against their template.
pub struct WorkspaceHook<S: TemplateStore> {
    store: S,
    default_template_namespace: String,
}

impl<S: TemplateStore> WorkspaceHook<S> {
    pub fn new(store: S, default_template_namespace: String) -> WorkspaceHook<S> {
        WorkspaceHook {
            store,
            default_template_namespace,
        }
    }

    /// Returns the workspace to persist, or the reason the write is rejected.
    pub async fn admit(
        &self,
        operation: &Operation,
        username: &str,
        old: Option<&Workspace>,
        mut workspace: Workspace,
    ) -> Result<Workspace, AdmissionError> {
        if workspace.metadata.has_deletion_timestamp() {
            return Ok(workspace);
        }
        if !username.is_empty() {
            if *operation == Operation::Create {
                workspace.metadata.set_annotation(ANNOTATION_CREATED_BY, username);
            }
            workspace.metadata.set_annotation(ANNOTATION_LAST_UPDATED_BY, username);
        }

        match (operation, old) {
            (Operation::Create, _) => {
                if workspace.spec.template_ref.is_none() {
                    workspace.spec.template_ref = self.default_template_ref().await?;
                }
            }
            (Operation::Update, Some(old)) => match classify_update(&old.spec, &workspace.spec) {
                UpdateKind::Detach => {
                    tracing::info!(workspace = %workspace_name(&workspace), "template reference removed, detaching");
                    apply_reference_labels(&mut workspace.metadata, &workspace.spec.clone(), None);
                    return Ok(workspace);
                }
                kind @ (UpdateKind::StopOnly | UpdateKind::Unchanged) => {
                    tracing::debug!(workspace = %workspace_name(&workspace), ?kind, "admitted without template validation");
                    let known_namespace = workspace.metadata.label(LABEL_TEMPLATE_NAMESPACE).map(str::to_string);
                    apply_reference_labels(&mut workspace.metadata, &workspace.spec.clone(), known_namespace.as_deref());
                    return Ok(workspace);
                }
                UpdateKind::Revalidate => {}
            },
            _ => {}
        }

        let template_ref = match workspace.spec.template_ref.clone().filter(|r| !r.name.is_empty()) {
            Some(template_ref) => template_ref,
            None => {
                workspace.spec = resolve(&workspace.spec, None);
                apply_reference_labels(&mut workspace.metadata, &workspace.spec.clone(), None);
                return Ok(workspace);
            }
        };
        let template = self.fetch_template(&template_ref, &workspace).await?;
        let template_name = template.metadata.name.clone().unwrap_or_default();

        workspace.spec = resolve(&workspace.spec, Some(&template));
        apply_reference_labels(
            &mut workspace.metadata,
            &workspace.spec.clone(),
            template.metadata.namespace.as_deref(),
        );

        let violations = validate(&workspace.spec, &template);
        if !violations.is_empty() {
            tracing::info!(
                workspace = %workspace_name(&workspace),
                template = %template_name,
                violations = violations.len(),
                "rejecting workspace"
            );
            return Err(AdmissionError::TemplateViolations {
                template: template_name,
                message: format_violations(&violations),
            });
        }
        Ok(workspace)
    }

    async fn default_template_ref(&self) -> Result<Option<TemplateRef>, AdmissionError> {
        let defaults: Vec<WorkspaceTemplate> = self
            .store
            .list_default_templates()
            .await?
            .into_iter()
            .filter(|t| !t.metadata.has_deletion_timestamp())
            .collect();
        match defaults.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(TemplateRef {
                name: only.metadata.name.clone().unwrap_or_default(),
                namespace: only.metadata.namespace.clone(),
            })),
            _ => Err(AdmissionError::MultipleDefaultTemplates(
                defaults
                    .iter()
                    .map(|t| {
                        format!(
                            "{}/{}",
                            t.metadata.namespace.as_deref().unwrap_or(""),
                            t.metadata.name.as_deref().unwrap_or("")
                        )
                    })
                    .collect(),
            )),
        }
    }

    async fn fetch_template(
        &self,
        template_ref: &TemplateRef,
        workspace: &Workspace,
    ) -> Result<WorkspaceTemplate, AdmissionError> {
        let candidates = template_namespace_candidates(
            template_ref,
            None,
            workspace.metadata.namespace.as_deref().unwrap_or(""),
            &self.default_template_namespace,
        );
        for namespace in candidates.iter() {
            if let Some(template) = self.store.get_template(namespace, &template_ref.name).await? {
                return Ok(template);
            }
        }
        Err(AdmissionError::TemplateNotFound {
            name: template_ref.name.clone(),
            namespaces: candidates.join(", "),
        })
    }
}

fn workspace_name(workspace: &Workspace) -> String {
    format!(
        "{}/{}",
        workspace.metadata.namespace.as_deref().unwrap_or(""),
        workspace.metadata.name.as_deref().unwrap_or("")
    )
}
