// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::crds::{WorkspaceSpec, WorkspaceTemplate};
use crate::kubernetes_api_objects::quantity::{cmp_quantities, quantity_is_zero};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationType {
    ImageNotAllowed,
    ResourceExceeded,
    StorageExceeded,
    SecondaryStorageNotAllowed,
    InvalidTemplate,
    TemplateNotFound,
    IdleShutdownOverrideNotAllowed,
    IdleShutdownTimeoutOutOfBounds,
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViolationType::ImageNotAllowed => "ImageNotAllowed",
            ViolationType::ResourceExceeded => "ResourceExceeded",
            ViolationType::StorageExceeded => "StorageExceeded",
            ViolationType::SecondaryStorageNotAllowed => "SecondaryStorageNotAllowed",
            ViolationType::InvalidTemplate => "InvalidTemplate",
            ViolationType::TemplateNotFound => "TemplateNotFound",
            ViolationType::IdleShutdownOverrideNotAllowed => "IdleShutdownOverrideNotAllowed",
            ViolationType::IdleShutdownTimeoutOutOfBounds => "IdleShutdownTimeoutOutOfBounds",
        };
        write!(f, "{}", name)
    }
}

/// TemplateViolation describes one constraint a workspace spec fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateViolation {
    pub violation_type: ViolationType,
    // JSON path of the offending field, e.g. spec.resources.requests.cpu
    pub field: String,
    pub message: String,
    pub allowed: String,
    pub actual: String,
}

impl TemplateViolation {
    pub fn template_not_found(name: &str, namespace: &str) -> TemplateViolation {
        TemplateViolation {
            violation_type: ViolationType::TemplateNotFound,
            field: "spec.templateRef.name".to_string(),
            message: format!("Template '{}' not found in namespace '{}'", name, namespace),
            allowed: "an existing template".to_string(),
            actual: name.to_string(),
        }
    }
}

/// Checks an effective workspace spec against every constraint of the template.
///
/// All checks run independently and every failure is returned, in a fixed
/// order: image, resources, primary storage, secondary storages, idle shutdown.
/// An empty result means the spec is compliant.
pub fn validate(spec: &WorkspaceSpec, template: &WorkspaceTemplate) -> Vec<TemplateViolation> {
    let mut violations = Vec::new();

    if let Some(image) = spec.image.as_deref().filter(|image| !image.is_empty()) {
        violations.extend(validate_image_allowed(image, template));
    }
    if let Some(resources) = spec.resources.as_ref() {
        violations.extend(validate_resource_bounds(resources, template));
    }
    if let Some(size) = spec
        .storage
        .as_ref()
        .and_then(|storage| storage.size.as_ref())
        .filter(|size| !quantity_is_zero(size))
    {
        violations.extend(validate_storage_size(size, template));
    }
    violations.extend(validate_secondary_storages(spec, template));
    violations.extend(validate_idle_shutdown(spec, template));
    violations
}

/// Renders violations as a single message: the message itself when there is
/// one, otherwise `<n> violations: m1; m2; ...`.
pub fn format_violations(violations: &[TemplateViolation]) -> String {
    match violations {
        [] => String::new(),
        [only] => only.message.clone(),
        _ => format!(
            "{} violations: {}",
            violations.len(),
            violations
                .iter()
                .map(|v| v.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

fn template_name(template: &WorkspaceTemplate) -> &str {
    template.metadata.name.as_deref().unwrap_or("")
}

/// The images a workspace may use: the allow-list, or only the default image when the list is empty.
pub fn effective_allowed_images(template: &WorkspaceTemplate) -> Vec<String> {
    if template.spec.allowed_images.is_empty() {
        vec![template.spec.default_image.clone().unwrap_or_default()]
    } else {
        template.spec.allowed_images.clone()
    }
}

fn validate_image_allowed(image: &str, template: &WorkspaceTemplate) -> Option<TemplateViolation> {
    if template.spec.allow_custom_images == Some(true) {
        return None;
    }
    let allowed = effective_allowed_images(template);
    if allowed.iter().any(|a| a == image) {
        return None;
    }
    let allowed_text = format!("[{}]", allowed.join(" "));
    Some(TemplateViolation {
        violation_type: ViolationType::ImageNotAllowed,
        field: "spec.image".to_string(),
        message: format!(
            "Image '{}' is not allowed by template '{}'. Allowed images: {}",
            image,
            template_name(template),
            allowed_text
        ),
        allowed: allowed_text,
        actual: image.to_string(),
    })
}

// A quantity that cannot be parsed is reported rather than treated as in bounds.
fn unparseable(field: String, q: &Quantity) -> TemplateViolation {
    TemplateViolation {
        violation_type: ViolationType::ResourceExceeded,
        field,
        message: format!("Quantity '{}' is not a valid resource quantity", q.0),
        allowed: "a valid quantity".to_string(),
        actual: q.0.clone(),
    }
}

fn validate_resource_bounds(
    resources: &k8s_openapi::api::core::v1::ResourceRequirements,
    template: &WorkspaceTemplate,
) -> Vec<TemplateViolation> {
    let mut violations = Vec::new();

    if let (Some(requests), Some(limits)) = (resources.requests.as_ref(), resources.limits.as_ref()) {
        for (resource, label) in [("cpu", "CPU"), ("memory", "Memory")] {
            if let (Some(request), Some(limit)) = (requests.get(resource), limits.get(resource)) {
                let field = format!("spec.resources.limits.{}", resource);
                match cmp_quantities(limit, request) {
                    Ok(Ordering::Less) => violations.push(TemplateViolation {
                        violation_type: ViolationType::ResourceExceeded,
                        field,
                        message: format!(
                            "{} limit must be greater than or equal to {} request",
                            label,
                            if resource == "cpu" { "CPU" } else { "memory" }
                        ),
                        allowed: request.0.clone(),
                        actual: limit.0.clone(),
                    }),
                    Ok(_) => {}
                    Err(_) => violations.push(unparseable(field, limit)),
                }
            }
        }
    }

    let bounds = match template.spec.resource_bounds.as_ref() {
        Some(bounds) => bounds,
        None => return violations,
    };
    let requests = match resources.requests.as_ref() {
        Some(requests) => requests,
        None => return violations,
    };
    let name = template_name(template);
    for (resource, range) in bounds.resources.iter() {
        let request = match requests.get(resource) {
            Some(request) => request,
            None => continue,
        };
        let field = format!("spec.resources.requests.{}", resource);
        if let Some(min) = range.min.as_ref() {
            match cmp_quantities(request, min) {
                Ok(Ordering::Less) => violations.push(TemplateViolation {
                    violation_type: ViolationType::ResourceExceeded,
                    field: field.clone(),
                    message: format!(
                        "{} request {} is below minimum {} required by template '{}'",
                        resource, request.0, min.0, name
                    ),
                    allowed: format!("min: {}", min.0),
                    actual: request.0.clone(),
                }),
                Ok(_) => {}
                Err(_) => {
                    violations.push(unparseable(field.clone(), request));
                    continue;
                }
            }
        }
        if let Some(max) = range.max.as_ref() {
            match cmp_quantities(request, max) {
                Ok(Ordering::Greater) => violations.push(TemplateViolation {
                    violation_type: ViolationType::ResourceExceeded,
                    field,
                    message: format!(
                        "{} request {} exceeds maximum {} allowed by template '{}'",
                        resource, request.0, max.0, name
                    ),
                    allowed: format!("max: {}", max.0),
                    actual: request.0.clone(),
                }),
                Ok(_) => {}
                Err(_) => violations.push(unparseable(field, request)),
            }
        }
    }
    violations
}

fn validate_storage_size(size: &Quantity, template: &WorkspaceTemplate) -> Option<TemplateViolation> {
    let config = template.spec.primary_storage.as_ref()?;
    let name = template_name(template);
    let field = "spec.storage.size".to_string();
    if let Some(min) = config.min_size.as_ref() {
        match cmp_quantities(size, min) {
            Ok(Ordering::Less) => {
                return Some(TemplateViolation {
                    violation_type: ViolationType::StorageExceeded,
                    field,
                    message: format!(
                        "Storage size {} is below minimum {} required by template '{}'",
                        size.0, min.0, name
                    ),
                    allowed: format!("min: {}", min.0),
                    actual: size.0.clone(),
                })
            }
            Ok(_) => {}
            Err(_) => return Some(unparseable(field, size)),
        }
    }
    if let Some(max) = config.max_size.as_ref() {
        match cmp_quantities(size, max) {
            Ok(Ordering::Greater) => {
                return Some(TemplateViolation {
                    violation_type: ViolationType::StorageExceeded,
                    field,
                    message: format!(
                        "Storage size {} exceeds maximum {} allowed by template '{}'",
                        size.0, max.0, name
                    ),
                    allowed: format!("max: {}", max.0),
                    actual: size.0.clone(),
                })
            }
            Ok(_) => {}
            Err(_) => return Some(unparseable(field, size)),
        }
    }
    None
}

fn validate_secondary_storages(
    spec: &WorkspaceSpec,
    template: &WorkspaceTemplate,
) -> Option<TemplateViolation> {
    if spec.volumes.is_empty() || template.spec.allow_secondary_storages != Some(false) {
        return None;
    }
    Some(TemplateViolation {
        violation_type: ViolationType::SecondaryStorageNotAllowed,
        field: "spec.volumes".to_string(),
        message: format!(
            "Template '{}' does not allow secondary storage volumes, but workspace specifies {} volume(s)",
            template_name(template),
            spec.volumes.len()
        ),
        allowed: "no secondary volumes".to_string(),
        actual: format!("{} volume(s)", spec.volumes.len()),
    })
}

fn validate_idle_shutdown(spec: &WorkspaceSpec, template: &WorkspaceTemplate) -> Vec<TemplateViolation> {
    let mut violations = Vec::new();
    let (idle, overrides) = match (
        spec.idle_shutdown.as_ref(),
        template.spec.idle_shutdown_overrides.as_ref(),
    ) {
        (Some(idle), Some(overrides)) => (idle, overrides),
        _ => return violations,
    };
    let name = template_name(template);

    if overrides.allow == Some(false) && template.spec.default_idle_shutdown.as_ref() != Some(idle) {
        violations.push(TemplateViolation {
            violation_type: ViolationType::IdleShutdownOverrideNotAllowed,
            field: "spec.idleShutdown".to_string(),
            message: format!("Template '{}' does not allow idle shutdown overrides", name),
            allowed: "template default".to_string(),
            actual: format!(
                "enabled={}, idleTimeoutInMinutes={}",
                idle.enabled,
                idle.idle_timeout_in_minutes
                    .map_or_else(|| "unset".to_string(), |t| t.to_string())
            ),
        });
    }

    if let (true, Some(timeout)) = (idle.enabled, idle.idle_timeout_in_minutes) {
        let below = overrides.min_idle_timeout_in_minutes.map_or(false, |min| timeout < min);
        let above = overrides.max_idle_timeout_in_minutes.map_or(false, |max| timeout > max);
        if below || above {
            let range = format!(
                "[{}, {}]",
                overrides
                    .min_idle_timeout_in_minutes
                    .map_or_else(|| "-".to_string(), |m| m.to_string()),
                overrides
                    .max_idle_timeout_in_minutes
                    .map_or_else(|| "-".to_string(), |m| m.to_string())
            );
            violations.push(TemplateViolation {
                violation_type: ViolationType::IdleShutdownTimeoutOutOfBounds,
                field: "spec.idleShutdown.idleTimeoutInMinutes".to_string(),
                message: format!(
                    "Idle timeout {} minutes is outside the range {} allowed by template '{}'",
                    timeout, range, name
                ),
                allowed: range,
                actual: timeout.to_string(),
            });
        }
    }
    violations
}
