// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::admission::template_store::TemplateLookupError;
use crate::kubernetes_api_objects::error::UnmarshalError;

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("workspace violates template '{template}' constraints: {message}")]
    TemplateViolations { template: String, message: String },
    #[error("template '{name}' not found in namespace(s) {namespaces}")]
    TemplateNotFound { name: String, namespaces: String },
    #[error("multiple default templates found: {}", .0.join(", "))]
    MultipleDefaultTemplates(Vec<String>),
    #[error("template is invalid: {0}")]
    InvalidTemplate(String),
    #[error(transparent)]
    Lookup(#[from] TemplateLookupError),
    #[error(transparent)]
    Unmarshal(#[from] UnmarshalError),
    #[error("failed to build admission patch: {0}")]
    Patch(#[from] serde_json::Error),
}
