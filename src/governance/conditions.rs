// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::crds::WorkspaceStatus;
use crate::governance::constants::CONDITION_TYPE_VALID;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub fn valid_condition(status: Option<&WorkspaceStatus>) -> Option<&Condition> {
    status?.conditions.iter().find(|c| c.type_ == CONDITION_TYPE_VALID)
}

/// Writes the Valid condition into status, leaving every other condition untouched.
///
/// lastTransitionTime only moves when the status value flips; a recheck with
/// the same outcome refreshes reason, message and observedGeneration.
pub fn set_valid_condition(
    status: &mut WorkspaceStatus,
    valid: bool,
    reason: &str,
    message: String,
    generation: Option<i64>,
    now: Time,
) {
    let status_value = if valid { "True" } else { "False" };
    match status
        .conditions
        .iter_mut()
        .find(|c| c.type_ == CONDITION_TYPE_VALID)
    {
        Some(condition) => {
            if condition.status != status_value {
                condition.last_transition_time = now;
            }
            condition.status = status_value.to_string();
            condition.reason = reason.to_string();
            condition.message = message;
            condition.observed_generation = generation;
        }
        None => status.conditions.push(Condition {
            type_: CONDITION_TYPE_VALID.to_string(),
            status: status_value.to_string(),
            reason: reason.to_string(),
            message,
            observed_generation: generation,
            last_transition_time: now,
        }),
    }
}
