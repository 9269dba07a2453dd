// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

/// APIError is the error taxonomy the reconcilers observe in responses.
///
/// The shim layer maps the `reason` of a kube-rs API error onto it, so
/// reconcile_core never sees transport-level details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum APIError {
    BadRequest,
    Conflict,
    Forbidden,
    Invalid,
    ObjectAlreadyExists,
    ObjectNotFound,
    InternalError,
    Timeout,
    ServerTimeout,
    Other,
}

impl APIError {
    pub fn is_object_not_found(&self) -> bool {
        matches!(self, APIError::ObjectNotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, APIError::Conflict)
    }
}

impl std::fmt::Display for APIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            APIError::BadRequest => "BadRequest",
            APIError::Conflict => "Conflict",
            APIError::Forbidden => "Forbidden",
            APIError::Invalid => "Invalid",
            APIError::ObjectAlreadyExists => "AlreadyExists",
            APIError::ObjectNotFound => "NotFound",
            APIError::InternalError => "InternalError",
            APIError::Timeout => "Timeout",
            APIError::ServerTimeout => "ServerTimeout",
            APIError::Other => "Other",
        };
        write!(f, "{}", reason)
    }
}

/// Returned when a DynamicObject cannot be parsed into the typed resource.
#[derive(Debug, thiserror::Error)]
#[error("failed to unmarshal {kind}: {message}")]
pub struct UnmarshalError {
    pub kind: String,
    pub message: String,
}
