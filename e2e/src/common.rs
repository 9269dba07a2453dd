// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, DynamicObject, Patch, PatchParams, ResourceExt},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
    Client,
};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("Failed to apply yaml: {0}")]
    ApplyFailed(String),

    #[error("Failed to parse the yaml: {0}")]
    ParseYamlFailed(#[from] serde_yaml::Error),

    #[error("Failed to parse the json: {0}")]
    ParseJsonFailed(#[from] serde_json::Error),

    #[error("CRD {0} is not installed")]
    CRDMissing(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Unexpected cluster state: {0}")]
    Unexpected(String),
}

pub const FIELD_MANAGER: &str = "governance-e2e";

/// Fails unless every CRD of the subsystem is registered.
pub async fn check_crds(client: Client) -> Result<(), Error> {
    let crd_api: Api<CustomResourceDefinition> = Api::all(client);
    for name in [
        "workspaces.workspace.jupyter.org",
        "workspacetemplates.workspace.jupyter.org",
        "workspaceaccessstrategies.workspace.jupyter.org",
    ] {
        if crd_api.get_opt(name).await?.is_none() {
            println!("No CRD {} found, install it before running the e2e test.", name);
            return Err(Error::CRDMissing(name.to_string()));
        }
    }
    Ok(())
}

/// Server-side applies one YAML document and returns the object name.
pub async fn apply(yaml: &str, client: Client, discovery: &Discovery) -> Result<String, Error> {
    let ssapply = PatchParams::apply(FIELD_MANAGER).force();
    let obj: DynamicObject = serde_yaml::from_str(yaml)?;
    let namespace = obj.metadata.namespace.clone();
    let gvk = match &obj.types {
        Some(tm) => GroupVersionKind::try_from(tm).map_err(|e| Error::ApplyFailed(e.to_string()))?,
        None => return Err(Error::ApplyFailed("object without TypeMeta".to_string())),
    };
    let name = obj.name_any();
    let (ar, caps) = discovery
        .resolve_gvk(&gvk)
        .ok_or_else(|| Error::ApplyFailed(format!("unknown kind {}", gvk.kind)))?;
    let api = dynamic_api(ar, caps, client, namespace.as_deref());
    let data = serde_json::to_value(&obj)?;
    api.patch(&name, &ssapply, &Patch::Apply(data)).await?;
    println!("applied {} {}", gvk.kind, name);
    Ok(name)
}

fn dynamic_api(ar: ApiResource, caps: ApiCapabilities, client: Client, ns: Option<&str>) -> Api<DynamicObject> {
    if caps.scope == Scope::Cluster {
        Api::all_with(client, &ar)
    } else if let Some(namespace) = ns {
        Api::namespaced_with(client, namespace, &ar)
    } else {
        Api::default_namespaced_with(client, &ar)
    }
}

/// Polls `check` every two seconds until it returns true or `timeout` passes.
pub async fn wait_for<F, Fut>(what: &str, timeout: Duration, mut check: F) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = Instant::now();
    loop {
        match check().await {
            Ok(true) => {
                println!("{}: done", what);
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => println!("{}: check failed with {}, retrying", what, e),
        }
        if start.elapsed() > timeout {
            return Err(Error::Timeout(what.to_string()));
        }
        sleep(Duration::from_secs(2)).await;
    }
}
