// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

// Reverse reference index labels carried by every workspace.
pub const LABEL_TEMPLATE_NAME: &str = "workspace.jupyter.org/template";
pub const LABEL_TEMPLATE_NAMESPACE: &str = "workspace.jupyter.org/template-namespace";
pub const LABEL_ACCESS_STRATEGY_NAME: &str = "workspace.jupyter.org/access-strategy-name";
pub const LABEL_ACCESS_STRATEGY_NAMESPACE: &str = "workspace.jupyter.org/access-strategy-namespace";

pub const LABEL_COMPLIANCE_CHECK_NEEDED: &str = "workspace.jupyter.org/compliance-check-needed";
pub const LABEL_DEFAULT_CLUSTER_TEMPLATE: &str = "workspace.jupyter.org/default-cluster-template";
pub const LABEL_TRUE: &str = "true";

pub const FINALIZER_TEMPLATE_PROTECTION: &str = "workspace.jupyter.org/template-protection";
pub const FINALIZER_ACCESS_STRATEGY_PROTECTION: &str =
    "workspace.jupyter.org/accessstrategy-protection";

pub const ANNOTATION_CREATED_BY: &str = "workspace.jupyter.org/created-by";
pub const ANNOTATION_LAST_UPDATED_BY: &str = "workspace.jupyter.org/last-updated-by";
pub const ANNOTATION_VALIDATED_TEMPLATE_GENERATION: &str =
    "workspace.jupyter.org/validated-template-generation";
pub const ANNOTATION_FORCE_FINALIZER_REMOVAL: &str = "workspace.jupyter.org/force-finalizer-removal";

pub const CONDITION_TYPE_VALID: &str = "Valid";
pub const REASON_TEMPLATE_COMPLIANT: &str = "TemplateCompliant";
pub const REASON_TEMPLATE_VIOLATION: &str = "TemplateViolation";
pub const REASON_TEMPLATE_NOT_FOUND: &str = "TemplateNotFound";
pub const REASON_NO_TEMPLATE: &str = "NoTemplate";

pub const EVENT_COMPLIANCE_CHECK_PASSED: &str = "ComplianceCheckPassed";
pub const EVENT_COMPLIANCE_CHECK_FAILED: &str = "ComplianceCheckFailed";
pub const EVENT_FINALIZER_FORCE_REMOVED: &str = "FinalizerForceRemoved";
pub const EVENT_TYPE_NORMAL: &str = "Normal";
pub const EVENT_TYPE_WARNING: &str = "Warning";

pub const DESIRED_STATUS_RUNNING: &str = "Running";
pub const DESIRED_STATUS_STOPPED: &str = "Stopped";

pub const DEFAULT_CPU_REQUEST: &str = "100m";
pub const DEFAULT_MEMORY_REQUEST: &str = "128Mi";
pub const DEFAULT_MOUNT_PATH: &str = "/home/jovyan";
pub const DEFAULT_TEMPLATE_NAMESPACE: &str = "jupyter-k8s-system";

pub const CONTROLLER_NAME: &str = "workspace-governance-controller";
