// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::admission::error::AdmissionError;
use crate::controllers::crds::{WorkspaceTemplate, WorkspaceTemplateSpec};
use crate::governance::validator::{format_violations, TemplateViolation, ViolationType};
use crate::kubernetes_api_objects::quantity::{parse_quantity, ParsedQuantity};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

fn invalid(field: String, message: String, allowed: String, actual: String) -> TemplateViolation {
    TemplateViolation {
        violation_type: ViolationType::InvalidTemplate,
        field,
        message,
        allowed,
        actual,
    }
}

// Every quantity in a template is parsed on its own, so a malformed value is
// rejected here even when there is nothing to compare it with.
fn parsed<'a>(
    field: &str,
    quantity: Option<&'a Quantity>,
    violations: &mut Vec<TemplateViolation>,
) -> Option<(&'a Quantity, ParsedQuantity)> {
    let quantity = quantity?;
    match parse_quantity(&quantity.0) {
        Ok(value) => Some((quantity, value)),
        Err(e) => {
            violations.push(invalid(
                field.to_string(),
                format!("Invalid quantity in {}: {}", field, e),
                "a valid quantity".to_string(),
                quantity.0.clone(),
            ));
            None
        }
    }
}

/// Checks that a template's own constraints are consistent with each other.
pub fn template_violations(spec: &WorkspaceTemplateSpec) -> Vec<TemplateViolation> {
    let mut violations = Vec::new();

    if let Some(bounds) = spec.resource_bounds.as_ref() {
        for (resource, range) in bounds.resources.iter() {
            let field = format!("spec.resourceBounds.resources.{}", resource);
            let min = parsed(&format!("{}.min", field), range.min.as_ref(), &mut violations);
            let max = parsed(&format!("{}.max", field), range.max.as_ref(), &mut violations);
            if let (Some((min, min_value)), Some((max, max_value))) = (min, max) {
                if min_value > max_value {
                    violations.push(invalid(
                        field,
                        format!("{} minimum {} is greater than maximum {}", resource, min.0, max.0),
                        format!("min <= {}", max.0),
                        min.0.clone(),
                    ));
                }
            }
        }
    }

    if let Some(resources) = spec.default_resources.as_ref() {
        for (section, values) in [("requests", resources.requests.as_ref()), ("limits", resources.limits.as_ref())] {
            for (name, value) in values.into_iter().flatten() {
                parsed(&format!("spec.defaultResources.{}.{}", section, name), Some(value), &mut violations);
            }
        }
    }

    if let Some(storage) = spec.primary_storage.as_ref() {
        let min = parsed("spec.primaryStorage.minSize", storage.min_size.as_ref(), &mut violations);
        let max = parsed("spec.primaryStorage.maxSize", storage.max_size.as_ref(), &mut violations);
        let default = parsed("spec.primaryStorage.defaultSize", storage.default_size.as_ref(), &mut violations);
        if let (Some((min, min_value)), Some((max, max_value))) = (min, max) {
            if min_value > max_value {
                violations.push(invalid(
                    "spec.primaryStorage.minSize".to_string(),
                    format!("Storage minimum {} is greater than maximum {}", min.0, max.0),
                    format!("min <= {}", max.0),
                    min.0.clone(),
                ));
            }
        }
        if let Some((default, default_value)) = default {
            if let Some((min, min_value)) = min {
                if default_value < min_value {
                    violations.push(invalid(
                        "spec.primaryStorage.defaultSize".to_string(),
                        format!("Default storage size {} is below minimum {}", default.0, min.0),
                        format!("min: {}", min.0),
                        default.0.clone(),
                    ));
                }
            }
            if let Some((max, max_value)) = max {
                if default_value > max_value {
                    violations.push(invalid(
                        "spec.primaryStorage.defaultSize".to_string(),
                        format!("Default storage size {} exceeds maximum {}", default.0, max.0),
                        format!("max: {}", max.0),
                        default.0.clone(),
                    ));
                }
            }
        }
    }

    if let Some(default_image) = spec.default_image.as_deref().filter(|i| !i.is_empty()) {
        if !spec.allowed_images.is_empty() && !spec.allowed_images.iter().any(|i| i == default_image) {
            violations.push(invalid(
                "spec.defaultImage".to_string(),
                format!("Default image '{}' is not in the allowed images list", default_image),
                format!("[{}]", spec.allowed_images.join(" ")),
                default_image.to_string(),
            ));
        }
    }

    if let Some(overrides) = spec.idle_shutdown_overrides.as_ref() {
        if let (Some(min), Some(max)) = (
            overrides.min_idle_timeout_in_minutes,
            overrides.max_idle_timeout_in_minutes,
        ) {
            if min > max {
                violations.push(invalid(
                    "spec.idleShutdownOverrides".to_string(),
                    format!("Idle timeout minimum {} is greater than maximum {}", min, max),
                    format!("min <= {}", max),
                    min.to_string(),
                ));
            }
        }
    }
    violations
}

/// Names of the constraint groups that differ between two versions of a template.
pub fn changed_constraints(old: &WorkspaceTemplateSpec, new: &WorkspaceTemplateSpec) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.allowed_images != new.allowed_images || old.default_image != new.default_image {
        changed.push("allowedImages");
    }
    if old.allow_custom_images != new.allow_custom_images {
        changed.push("allowCustomImages");
    }
    if old.resource_bounds != new.resource_bounds {
        changed.push("resourceBounds");
    }
    let storage_bounds = |s: &WorkspaceTemplateSpec| {
        s.primary_storage
            .as_ref()
            .map(|p| (p.min_size.clone(), p.max_size.clone()))
    };
    if storage_bounds(old) != storage_bounds(new) {
        changed.push("primaryStorage");
    }
    if old.allow_secondary_storages != new.allow_secondary_storages {
        changed.push("allowSecondaryStorages");
    }
    if old.idle_shutdown_overrides != new.idle_shutdown_overrides {
        changed.push("idleShutdownOverrides");
    }
    changed
}

/// Admits a template write, returning admission warnings for the caller.
pub fn admit_template(
    old: Option<&WorkspaceTemplate>,
    template: &WorkspaceTemplate,
) -> Result<Vec<String>, AdmissionError> {
    let violations = template_violations(&template.spec);
    if !violations.is_empty() {
        return Err(AdmissionError::InvalidTemplate(format_violations(&violations)));
    }
    let changed = match old {
        Some(old) => changed_constraints(&old.spec, &template.spec),
        None => Vec::new(),
    };
    if changed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![format!(
        "Constraints of template '{}' changed ({}); workspaces using it will be re-checked for compliance",
        template.metadata.name.as_deref().unwrap_or(""),
        changed.join(", ")
    )])
}
