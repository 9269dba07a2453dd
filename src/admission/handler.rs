// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::admission::error::AdmissionError;
use crate::admission::template_hook::admit_template;
use crate::admission::template_store::TemplateStore;
use crate::admission::workspace_hook::WorkspaceHook;
use crate::controllers::crds::{Workspace, WorkspaceTemplate};
use crate::kubernetes_api_objects::resource::ResourceWrapper;
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    DynamicObject, ResourceExt,
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::*;
use warp::{reply, Filter, Reply};

fn parse_review(
    body: AdmissionReview<DynamicObject>,
) -> Result<AdmissionRequest<DynamicObject>, reply::Json> {
    body.try_into().map_err(|err: kube::core::admission::ConvertAdmissionReviewError| {
        error!("invalid request: {}", err.to_string());
        reply::json(&AdmissionResponse::invalid(err.to_string()).into_review())
    })
}

/// The RFC 6902 patch that turns the submitted object into the admitted one.
///
/// Only spec, labels and annotations are written by the hook, so only those are
/// carried over; everything else in the submitted object is left as sent.
pub fn admission_patch(
    submitted: &DynamicObject,
    admitted: &Workspace,
) -> Result<json_patch::Patch, AdmissionError> {
    let original = serde_json::to_value(submitted)?;
    let mut desired = original.clone();
    desired["spec"] = serde_json::to_value(&admitted.spec)?;
    desired["metadata"]["labels"] = serde_json::to_value(admitted.labels())?;
    desired["metadata"]["annotations"] = serde_json::to_value(admitted.annotations())?;
    Ok(json_patch::diff(&original, &desired))
}

async fn mutate<S: TemplateStore>(
    hook: &WorkspaceHook<S>,
    req: &AdmissionRequest<DynamicObject>,
    submitted: &DynamicObject,
) -> Result<json_patch::Patch, AdmissionError> {
    let workspace = Workspace::unmarshal(submitted.clone())?;
    let old = match req.old_object.clone() {
        Some(old) => Some(Workspace::unmarshal(old)?),
        None => None,
    };
    let username = req.user_info.username.clone().unwrap_or_default();
    let admitted = hook
        .admit(&req.operation, &username, old.as_ref(), workspace)
        .await?;
    admission_patch(submitted, &admitted)
}

pub async fn mutate_handler<S: TemplateStore>(
    body: AdmissionReview<DynamicObject>,
    hook: Arc<WorkspaceHook<S>>,
) -> Result<impl Reply, Infallible> {
    let req = match parse_review(body) {
        Ok(req) => req,
        Err(reply) => return Ok(reply),
    };

    let mut res = AdmissionResponse::from(&req);
    if let Some(obj) = req.object.as_ref() {
        let name = obj.name_any();
        res = match mutate(&hook, &req, obj).await {
            Ok(patch) => match res.clone().with_patch(patch) {
                Ok(res) => {
                    info!("accepted: {:?} on workspace {}", req.operation, name);
                    res
                }
                Err(err) => {
                    error!("failed to encode patch for workspace {}: {}", name, err);
                    res.deny(err.to_string())
                }
            },
            Err(err) => {
                warn!("denied: {:?} on workspace {} ({})", req.operation, name, err);
                res.deny(err.to_string())
            }
        };
    };
    Ok(reply::json(&res.into_review()))
}

pub async fn validate_template_handler(
    body: AdmissionReview<DynamicObject>,
) -> Result<impl Reply, Infallible> {
    let req = match parse_review(body) {
        Ok(req) => req,
        Err(reply) => return Ok(reply),
    };

    let mut res = AdmissionResponse::from(&req);
    if let Some(obj) = req.object.as_ref() {
        let name = obj.name_any();
        let result = WorkspaceTemplate::unmarshal(obj.clone())
            .map_err(AdmissionError::from)
            .and_then(|template| {
                let old = match req.old_object.clone() {
                    Some(old) => Some(WorkspaceTemplate::unmarshal(old)?),
                    None => None,
                };
                admit_template(old.as_ref(), &template)
            });
        res = match result {
            Ok(warnings) => {
                info!("accepted: {:?} on template {}", req.operation, name);
                if !warnings.is_empty() {
                    res.warnings = Some(warnings);
                }
                res
            }
            Err(err) => {
                warn!("denied: {:?} on template {} ({})", req.operation, name, err);
                res.deny(err.to_string())
            }
        };
    };
    Ok(reply::json(&res.into_review()))
}

/// `/mutate` for workspaces and `/validate-template` for templates.
pub fn routes<S: TemplateStore + 'static>(
    hook: Arc<WorkspaceHook<S>>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let mutate = warp::path("mutate")
        .and(warp::body::json())
        .and(warp::any().map(move || hook.clone()))
        .and_then(mutate_handler::<S>);
    let validate_template = warp::path("validate-template")
        .and(warp::body::json())
        .and_then(validate_template_handler);
    warp::post()
        .and(mutate.or(validate_template))
        .with(warp::trace::request())
}
