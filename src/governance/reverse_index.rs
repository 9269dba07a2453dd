// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::crds::Workspace;
use crate::governance::policy_kind::PolicyKind;
use crate::kubernetes_api_objects::api_method::KubeListRequest;
use crate::kubernetes_api_objects::error::UnmarshalError;
use crate::kubernetes_api_objects::object_meta::ObjectMetaExt;
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use kube::api::DynamicObject;
use kube::runtime::reflector::ObjectRef;

// The reverse reference index is the label pair every workspace carries for
// each policy object it uses. Looking up "who uses policy X" is a single
// cluster-wide list with a label selector, never a scan of workspace specs.

/// Builds the one list request that finds every workspace referencing a policy object.
pub fn find_referencing_request<P: PolicyKind>(name: &str, namespace: &str) -> KubeListRequest {
    KubeListRequest {
        api_resource: Workspace::api_resource(),
        namespace: None,
        label_selector: Some(label_selector::<P>(name, namespace)),
    }
}

pub fn label_selector<P: PolicyKind>(name: &str, namespace: &str) -> String {
    format!(
        "{}={},{}={}",
        P::name_label(),
        name,
        P::namespace_label(),
        namespace
    )
}

/// ReferenceSet is the result of one reverse index lookup.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    // Workspaces that carry the labels and are not being deleted.
    pub referencing: Vec<Workspace>,
    // namespace/name of entries whose spec no longer points at the policy.
    // They still count as references.
    pub orphaned: Vec<String>,
}

impl ReferenceSet {
    pub fn is_empty(&self) -> bool {
        self.referencing.is_empty()
    }

    pub fn len(&self) -> usize {
        self.referencing.len()
    }
}

/// Interprets the list response of find_referencing_request.
///
/// Any object that cannot be parsed fails the whole lookup, so a deletion
/// check can never mistake a bad read for an empty index.
pub fn collect_references<P: PolicyKind>(
    objs: Vec<DynamicObject>,
    name: &str,
    namespace: &str,
) -> Result<ReferenceSet, UnmarshalError> {
    let mut references = ReferenceSet::default();
    for obj in objs {
        let workspace = Workspace::unmarshal(obj)?;
        if workspace.metadata.has_deletion_timestamp() {
            continue;
        }
        if !spec_agrees_with_label::<P>(&workspace, name, namespace) {
            references.orphaned.push(workspace_key(&workspace));
        }
        references.referencing.push(workspace);
    }
    Ok(references)
}

fn spec_agrees_with_label<P: PolicyKind>(workspace: &Workspace, name: &str, namespace: &str) -> bool {
    match P::referenced_by(workspace) {
        Some((ref_name, ref_namespace)) => {
            ref_name == name
                && ref_namespace
                    .filter(|ns| !ns.is_empty())
                    .map_or(true, |ns| ns == namespace)
        }
        None => false,
    }
}

pub fn workspace_key(workspace: &Workspace) -> String {
    format!(
        "{}/{}",
        workspace.metadata.namespace.as_deref().unwrap_or(""),
        workspace.metadata.name.as_deref().unwrap_or("")
    )
}

/// Maps a workspace event to the policy object its index labels point at.
///
/// Used as the mapper of the policy controller's workspace watch, so adding,
/// changing or dropping a reference wakes the referenced policy object.
pub fn referenced_policy_ref<P: PolicyKind>(workspace: Workspace) -> Option<ObjectRef<P::Policy>> {
    let name = workspace.metadata.label(P::name_label())?;
    let namespace = workspace.metadata.label(P::namespace_label())?;
    Some(ObjectRef::new(name).within(namespace))
}
