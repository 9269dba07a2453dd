// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, ObjectMeta};
use std::collections::BTreeMap;

#[derive(
    kube::CustomResource,
    Default,
    Debug,
    Clone,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
    PartialEq,
)]
#[kube(group = "workspace.jupyter.org", version = "v1alpha1", kind = "Workspace")]
#[kube(shortname = "ws", namespaced, derive = "PartialEq")]
#[kube(status = "WorkspaceStatus")]
pub struct WorkspaceSpec {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "desiredStatus", skip_serializing_if = "Option::is_none")]
    pub desired_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,
    #[serde(rename = "templateRef", skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<TemplateRef>,
    #[serde(rename = "accessStrategy", skip_serializing_if = "Option::is_none")]
    pub access_strategy: Option<AccessStrategyRef>,
    #[serde(rename = "ownershipType", skip_serializing_if = "Option::is_none")]
    pub ownership_type: Option<String>,
    #[serde(rename = "accessType", skip_serializing_if = "Option::is_none")]
    pub access_type: Option<String>,
    #[serde(rename = "appType", skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
    #[serde(rename = "nodeSelector", skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(rename = "idleShutdown", skip_serializing_if = "Option::is_none")]
    pub idle_shutdown: Option<IdleShutdownSpec>,
    #[serde(rename = "containerConfig", skip_serializing_if = "Option::is_none")]
    pub container_config: Option<ContainerConfig>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            metadata: ObjectMeta::default(),
            spec: WorkspaceSpec::default(),
            status: None,
        }
    }
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct WorkspaceStatus {
    // Written by the workspace lifecycle controller.
    #[serde(rename = "deploymentName", skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    #[serde(rename = "serviceName", skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    // Valid is written by the compliance controller; the remaining condition types
    // belong to the workspace lifecycle controller and are preserved as is.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct TemplateRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct AccessStrategyRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct StorageSpec {
    #[serde(rename = "storageClassName", skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Quantity>,
    #[serde(rename = "mountPath", skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct VolumeSpec {
    pub name: String,
    #[serde(rename = "persistentVolumeClaimName")]
    pub persistent_volume_claim_name: String,
    #[serde(rename = "mountPath")]
    pub mount_path: String,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct IdleShutdownSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "idleTimeoutInMinutes", skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<i32>,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(
    kube::CustomResource,
    Default,
    Debug,
    Clone,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
    PartialEq,
)]
#[kube(group = "workspace.jupyter.org", version = "v1alpha1", kind = "WorkspaceTemplate")]
#[kube(shortname = "wstpl", namespaced, derive = "PartialEq")]
#[kube(status = "WorkspaceTemplateStatus")]
pub struct WorkspaceTemplateSpec {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "defaultImage", skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,
    #[serde(rename = "allowedImages", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_images: Vec<String>,
    #[serde(rename = "allowCustomImages", skip_serializing_if = "Option::is_none")]
    pub allow_custom_images: Option<bool>,
    #[serde(rename = "defaultResources", skip_serializing_if = "Option::is_none")]
    pub default_resources: Option<ResourceRequirements>,
    #[serde(rename = "resourceBounds", skip_serializing_if = "Option::is_none")]
    pub resource_bounds: Option<ResourceBounds>,
    #[serde(rename = "primaryStorage", skip_serializing_if = "Option::is_none")]
    pub primary_storage: Option<StorageConfig>,
    #[serde(rename = "allowSecondaryStorages", skip_serializing_if = "Option::is_none")]
    pub allow_secondary_storages: Option<bool>,
    #[serde(rename = "defaultNodeSelector", skip_serializing_if = "Option::is_none")]
    pub default_node_selector: Option<BTreeMap<String, String>>,
    #[serde(rename = "defaultTolerations", skip_serializing_if = "Option::is_none")]
    pub default_tolerations: Option<Vec<Toleration>>,
    #[serde(rename = "defaultOwnershipType", skip_serializing_if = "Option::is_none")]
    pub default_ownership_type: Option<String>,
    #[serde(rename = "defaultAccessType", skip_serializing_if = "Option::is_none")]
    pub default_access_type: Option<String>,
    #[serde(rename = "defaultAccessStrategy", skip_serializing_if = "Option::is_none")]
    pub default_access_strategy: Option<AccessStrategyRef>,
    #[serde(rename = "defaultIdleShutdown", skip_serializing_if = "Option::is_none")]
    pub default_idle_shutdown: Option<IdleShutdownSpec>,
    #[serde(rename = "idleShutdownOverrides", skip_serializing_if = "Option::is_none")]
    pub idle_shutdown_overrides: Option<IdleShutdownOverridePolicy>,
    #[serde(rename = "defaultContainerConfig", skip_serializing_if = "Option::is_none")]
    pub default_container_config: Option<ContainerConfig>,
    #[serde(rename = "appType", skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
}

impl Default for WorkspaceTemplate {
    fn default() -> Self {
        Self {
            metadata: ObjectMeta::default(),
            spec: WorkspaceTemplateSpec::default(),
            status: None,
        }
    }
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct WorkspaceTemplateStatus {
    #[serde(rename = "observedGeneration", default)]
    pub observed_generation: i64,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct ResourceBounds {
    // Keyed by resource name, e.g. cpu, memory or nvidia.com/gpu.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRange>,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct ResourceRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Quantity>,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct StorageConfig {
    #[serde(rename = "defaultSize", skip_serializing_if = "Option::is_none")]
    pub default_size: Option<Quantity>,
    #[serde(rename = "minSize", skip_serializing_if = "Option::is_none")]
    pub min_size: Option<Quantity>,
    #[serde(rename = "maxSize", skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Quantity>,
    #[serde(rename = "defaultStorageClassName", skip_serializing_if = "Option::is_none")]
    pub default_storage_class_name: Option<String>,
    #[serde(rename = "defaultMountPath", skip_serializing_if = "Option::is_none")]
    pub default_mount_path: Option<String>,
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct IdleShutdownOverridePolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<bool>,
    #[serde(rename = "minIdleTimeoutInMinutes", skip_serializing_if = "Option::is_none")]
    pub min_idle_timeout_in_minutes: Option<i32>,
    #[serde(rename = "maxIdleTimeoutInMinutes", skip_serializing_if = "Option::is_none")]
    pub max_idle_timeout_in_minutes: Option<i32>,
}

#[derive(
    kube::CustomResource,
    Default,
    Debug,
    Clone,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
    PartialEq,
)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "WorkspaceAccessStrategy"
)]
#[kube(shortname = "wsas", namespaced, derive = "PartialEq")]
#[kube(status = "WorkspaceAccessStrategyStatus")]
pub struct WorkspaceAccessStrategySpec {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "accessUrlTemplate", skip_serializing_if = "Option::is_none")]
    pub access_url_template: Option<String>,
    #[serde(rename = "accessResourceTemplates", default, skip_serializing_if = "Vec::is_empty")]
    pub access_resource_templates: Vec<String>,
}

impl Default for WorkspaceAccessStrategy {
    fn default() -> Self {
        Self {
            metadata: ObjectMeta::default(),
            spec: WorkspaceAccessStrategySpec::default(),
            status: None,
        }
    }
}

#[derive(
    Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct WorkspaceAccessStrategyStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
