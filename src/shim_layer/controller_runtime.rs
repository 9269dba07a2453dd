// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::error::APIError;
use crate::reconciler::reconciler::Reconciler;
use crate::shim_layer::throttle::WriteThrottle;
use crate::Error;
use futures::StreamExt;
use kube::{
    api::{Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams, Resource},
    core::{ErrorResponse, NamespaceResourceScope, TypeMeta},
    runtime::{
        controller::{Action, Controller},
        watcher,
    },
    Client,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

// The shim layer connects the reconcilers to the kube-rs APIs.
// The key is to implement the reconcile function (impl FnMut(Arc<K>, Arc<Ctx>) -> ReconcilerFut),
// which is required by the kube-rs framework to build a controller,
// on top of reconcile_core, which is provided by the developer.

// Page size of list requests. Paging stays inside the shim layer,
// so a list request is still one query from the reconciler's point of view.
pub const LIST_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct ShimSettings {
    pub success_requeue: Duration,
    pub error_requeue: Duration,
    pub write_rate: u32,
    pub write_burst: u32,
}

impl Default for ShimSettings {
    fn default() -> ShimSettings {
        ShimSettings {
            success_requeue: Duration::from_secs(60),
            error_requeue: Duration::from_secs(10),
            write_rate: 10,
            write_burst: 10,
        }
    }
}

// Data is passed to reconcile_with.
// It carries the client that communicates with Kubernetes API and the reconciler itself.
pub struct Data<R> {
    pub client: Client,
    pub reconciler: R,
    pub throttle: WriteThrottle,
    pub settings: ShimSettings,
}

// run_controller prepares and runs the controller. It requires:
// R: the reconciler type, whose R::K is the resource it reconciles
// configure: a hook to add secondary watches to the kube-rs Controller
pub async fn run_controller<R, F>(
    client: Client,
    reconciler: R,
    settings: ShimSettings,
    configure: F,
) -> anyhow::Result<()>
where
    R: Reconciler + Send + Sync + 'static,
    R::K: Clone
        + Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
    R::S: Send,
    F: FnOnce(Controller<R::K>) -> Controller<R::K>,
{
    let crs = Api::<R::K>::all(client.clone());
    let kind = R::K::kind(&()).to_string();
    let ctx = Arc::new(Data {
        client,
        reconciler,
        throttle: WriteThrottle::new(settings.write_rate, settings.write_burst),
        settings,
    });

    tracing::info!(kind = %kind, "starting controller");
    configure(Controller::new(crs, watcher::Config::default()))
        .shutdown_on_signal()
        .run(reconcile_with::<R>, error_policy::<R>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => tracing::debug!(object = %obj, "reconciled"),
                Err(err) => tracing::warn!(error = %err, "reconcile failed"),
            }
        })
        .await;
    tracing::info!(kind = %kind, "controller terminated");
    Ok(())
}

// reconcile_with implements the reconcile function by repeatedly invoking reconcile_core.
// reconcile_with will be invoked by kube-rs whenever kube-rs's watcher receives any relevant event to the controller.
// In each invocation, reconcile_with invokes reconcile_core in a loop:
// it starts with reconcile_init_state, and in each iteration it invokes reconcile_core
// with the new state returned by the previous invocation.
// For each request from reconcile_core, it invokes kube-rs APIs to send the request to the Kubernetes API.
// It ends the loop when the reconciler reports the reconcile is done (reconcile_done)
// or encounters error (reconcile_error).
pub async fn reconcile_with<R>(cr: Arc<R::K>, ctx: Arc<Data<R>>) -> Result<Action, Error>
where
    R: Reconciler,
    R::K: Clone + Resource<Scope = NamespaceResourceScope, DynamicType = ()> + DeserializeOwned + Debug,
{
    let client = &ctx.client;
    let reconciler = &ctx.reconciler;

    let cr_name = cr
        .meta()
        .name
        .as_ref()
        .ok_or_else(|| Error::MissingObjectKey(".metadata.name"))?;
    let cr_namespace = cr
        .meta()
        .namespace
        .as_ref()
        .ok_or_else(|| Error::MissingObjectKey(".metadata.namespace"))?;
    let cr_key = format!("{}/{}/{}", R::K::kind(&()), cr_namespace, cr_name);

    let cr_api = Api::<R::K>::namespaced(client.clone(), cr_namespace);
    // Get the custom resource by a quorum read to Kubernetes' storage (etcd) to get the most updated custom resource
    let cr = match cr_api.get(cr_name).await {
        Err(kube::Error::Api(ErrorResponse { reason, .. })) if reason == "NotFound" => {
            tracing::info!(object = %cr_key, "not found, end reconcile");
            return Ok(Action::await_change());
        }
        Err(err) => {
            tracing::warn!(object = %cr_key, error = %err, "get failed, will retry reconcile");
            return Ok(Action::requeue(ctx.settings.error_requeue));
        }
        Ok(cr) => cr,
    };

    let mut state = reconciler.reconcile_init_state();
    let mut resp_option: Option<KubeAPIResponse> = None;

    // Call reconcile_core in a loop
    loop {
        if reconciler.reconcile_done(&state) {
            tracing::debug!(object = %cr_key, "reconcile done");
            break;
        }
        if reconciler.reconcile_error(&state) {
            tracing::warn!(object = %cr_key, "reconcile error");
            return Err(Error::ReconcileCoreError);
        }
        // Feed the current reconcile state and get the new state and the pending request
        let (state_prime, request_option) = reconciler.reconcile_core(&cr, resp_option, state);
        resp_option = match request_option {
            Some(request) => Some(execute_request(client, &ctx.throttle, request, &cr_key).await),
            None => None,
        };
        state = state_prime;
    }

    Ok(Action::requeue(ctx.settings.success_requeue))
}

fn dynamic_api(client: &Client, namespace: &str, ar: &ApiResource) -> Api<DynamicObject> {
    Api::<DynamicObject>::namespaced_with(client.clone(), namespace, ar)
}

/// Sends one request to the API server and wraps the outcome into the matching response.
pub async fn execute_request(
    client: &Client,
    throttle: &WriteThrottle,
    request: KubeAPIRequest,
    log_header: &str,
) -> KubeAPIResponse {
    let key = request.key();
    match request {
        KubeAPIRequest::GetRequest(get_req) => {
            let api = dynamic_api(client, &get_req.namespace, &get_req.api_resource);
            let res = api.get(&get_req.name).await;
            log_result(log_header, "Get", &key, &res);
            KubeAPIResponse::GetResponse(KubeGetResponse {
                res: res.map_err(|err| kube_error_to_api_error(&err)),
            })
        }
        KubeAPIRequest::ListRequest(list_req) => {
            let api = match list_req.namespace.as_deref() {
                Some(namespace) => dynamic_api(client, namespace, &list_req.api_resource),
                None => Api::<DynamicObject>::all_with(client.clone(), &list_req.api_resource),
            };
            let res = list_all_pages(&api, &list_req).await;
            match &res {
                Ok(objs) => tracing::debug!(object = %log_header, request = %key, items = objs.len(), "List done"),
                Err(err) => tracing::warn!(object = %log_header, request = %key, error = %err, "List failed"),
            }
            KubeAPIResponse::ListResponse(KubeListResponse {
                res: res.map_err(|err| kube_error_to_api_error(&err)),
            })
        }
        KubeAPIRequest::CreateRequest(create_req) => {
            let api = dynamic_api(client, &create_req.namespace, &create_req.api_resource);
            let res = api.create(&PostParams::default(), &create_req.obj).await;
            log_result(log_header, "Create", &key, &res);
            KubeAPIResponse::CreateResponse(KubeCreateResponse {
                res: res.map_err(|err| kube_error_to_api_error(&err)),
            })
        }
        KubeAPIRequest::UpdateRequest(update_req) => {
            let api = dynamic_api(client, &update_req.namespace, &update_req.api_resource);
            let res = api
                .replace(&update_req.name, &PostParams::default(), &update_req.obj)
                .await;
            log_result(log_header, "Update", &key, &res);
            KubeAPIResponse::UpdateResponse(KubeUpdateResponse {
                res: res.map_err(|err| kube_error_to_api_error(&err)),
            })
        }
        KubeAPIRequest::UpdateStatusRequest(update_status_req) => {
            let api = dynamic_api(client, &update_status_req.namespace, &update_status_req.api_resource);
            let data = match serde_json::to_vec(&update_status_req.obj) {
                Ok(data) => data,
                Err(err) => {
                    tracing::error!(object = %log_header, request = %key, error = %err, "UpdateStatus failed to serialize object");
                    return KubeAPIResponse::UpdateStatusResponse(KubeUpdateStatusResponse {
                        res: Err(APIError::BadRequest),
                    });
                }
            };
            let res = api
                .replace_status(&update_status_req.name, &PostParams::default(), data)
                .await;
            log_result(log_header, "UpdateStatus", &key, &res);
            KubeAPIResponse::UpdateStatusResponse(KubeUpdateStatusResponse {
                res: res.map_err(|err| kube_error_to_api_error(&err)),
            })
        }
        KubeAPIRequest::PatchRequest(patch_req) => {
            throttle.acquire().await;
            let api = dynamic_api(client, &patch_req.namespace, &patch_req.api_resource);
            let res = api
                .patch(&patch_req.name, &PatchParams::default(), &Patch::Merge(&patch_req.patch))
                .await;
            log_result(log_header, "Patch", &key, &res);
            KubeAPIResponse::PatchResponse(KubePatchResponse {
                res: res.map_err(|err| kube_error_to_api_error(&err)),
            })
        }
    }
}

async fn list_all_pages(
    api: &Api<DynamicObject>,
    list_req: &KubeListRequest,
) -> Result<Vec<DynamicObject>, kube::Error> {
    let mut lp = ListParams::default().limit(LIST_PAGE_SIZE);
    if let Some(selector) = list_req.label_selector.as_deref() {
        lp = lp.labels(selector);
    }
    let types = TypeMeta {
        api_version: list_req.api_resource.api_version.clone(),
        kind: list_req.api_resource.kind.clone(),
    };
    let mut items = Vec::new();
    loop {
        let page = api.list(&lp).await?;
        // List items come back without apiVersion and kind.
        items.extend(page.items.into_iter().map(|mut obj| {
            obj.types.get_or_insert_with(|| types.clone());
            obj
        }));
        match page.metadata.continue_.filter(|token| !token.is_empty()) {
            Some(token) => lp = lp.continue_token(&token),
            None => break,
        }
    }
    Ok(items)
}

fn log_result<T>(log_header: &str, verb: &str, key: &str, res: &Result<T, kube::Error>) {
    match res {
        Ok(_) => tracing::debug!(object = %log_header, request = %key, "{} done", verb),
        Err(err) => tracing::warn!(object = %log_header, request = %key, error = %err, "{} failed", verb),
    }
}

// error_policy defines the controller's behavior when the reconcile ends with an error.
pub fn error_policy<R>(_object: Arc<R::K>, _error: &Error, ctx: Arc<Data<R>>) -> Action
where
    R: Reconciler,
{
    Action::requeue(ctx.settings.error_requeue)
}

// kube_error_to_api_error translates the API error from kube-rs APIs
// to the form that can be processed by reconcile_core.
pub fn kube_error_to_api_error(error: &kube::Error) -> APIError {
    match error {
        kube::Error::Api(error_resp) => match error_resp.reason.as_str() {
            "NotFound" => APIError::ObjectNotFound,
            "AlreadyExists" => APIError::ObjectAlreadyExists,
            "BadRequest" => APIError::BadRequest,
            "Conflict" => APIError::Conflict,
            "Forbidden" => APIError::Forbidden,
            "Invalid" => APIError::Invalid,
            "InternalError" => APIError::InternalError,
            "Timeout" => APIError::Timeout,
            "ServerTimeout" => APIError::ServerTimeout,
            _ => APIError::Other,
        },
        _ => APIError::Other,
    }
}
