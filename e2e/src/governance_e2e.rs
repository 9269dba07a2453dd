// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::common::*;
use k8s_openapi::api::core::v1::Event;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams},
    discovery::Discovery,
    Client,
};
use serde_json::json;
use std::time::Duration;
use template_governance::controllers::crds::{Workspace, WorkspaceTemplate};
use template_governance::governance::conditions::valid_condition;
use template_governance::governance::constants::*;

const TIMEOUT: Duration = Duration::from_secs(120);

pub fn workspace_template(max_cpu: &str) -> String {
    format!(
        "
    apiVersion: workspace.jupyter.org/v1alpha1
    kind: WorkspaceTemplate
    metadata:
      name: e2e-template
      namespace: default
    spec:
      displayName: e2e template
      defaultImage: jupyter/base-notebook:latest
      allowedImages:
        - jupyter/base-notebook:latest
      defaultResources:
        requests:
          cpu: 500m
          memory: 256Mi
      resourceBounds:
        resources:
          cpu:
            min: 100m
            max: {}
    ",
        max_cpu
    )
}

pub fn workspace(name: &str, cpu: &str) -> String {
    format!(
        "
    apiVersion: workspace.jupyter.org/v1alpha1
    kind: Workspace
    metadata:
      name: {}
      namespace: default
    spec:
      displayName: {}
      templateRef:
        name: e2e-template
      resources:
        requests:
          cpu: {}
    ",
        name, name, cpu
    )
}

async fn valid_status(api: &Api<Workspace>, name: &str) -> Result<Option<String>, Error> {
    let ws = api.get(name).await?;
    Ok(valid_condition(ws.status.as_ref()).map(|c| c.status.clone()))
}

async fn event_reasons(client: Client, name: &str) -> Result<Vec<String>, Error> {
    let event_api: Api<Event> = Api::default_namespaced(client);
    let lp = ListParams::default().fields(&format!("involvedObject.name={}", name));
    Ok(event_api
        .list(&lp)
        .await?
        .items
        .into_iter()
        .filter_map(|e| e.reason)
        .collect())
}

pub async fn compliance_test(client: Client, discovery: &Discovery) -> Result<(), Error> {
    let ws_api: Api<Workspace> = Api::default_namespaced(client.clone());
    let tpl_api: Api<WorkspaceTemplate> = Api::default_namespaced(client.clone());
    let ws_name = apply(&workspace("e2e-workspace", "1"), client.clone(), discovery).await?;

    wait_for("workspace becomes valid", TIMEOUT, || {
        let ws_api = ws_api.clone();
        let ws_name = ws_name.clone();
        async move { Ok(valid_status(&ws_api, &ws_name).await?.as_deref() == Some("True")) }
    })
    .await?;
    wait_for("template is protected", TIMEOUT, || {
        let tpl_api = tpl_api.clone();
        async move {
            let tpl = tpl_api.get("e2e-template").await?;
            Ok(tpl
                .metadata
                .finalizers
                .unwrap_or_default()
                .iter()
                .any(|f| f == FINALIZER_TEMPLATE_PROTECTION))
        }
    })
    .await?;

    // Tighten the template below what the workspace already requests.
    apply(&workspace_template("500m"), client.clone(), discovery).await?;
    wait_for("workspace is flagged", TIMEOUT, || {
        let ws_api = ws_api.clone();
        let ws_name = ws_name.clone();
        async move { Ok(valid_status(&ws_api, &ws_name).await?.as_deref() == Some("False")) }
    })
    .await?;

    let ws = ws_api.get(&ws_name).await?;
    if ws.spec.desired_status.as_deref() != Some(DESIRED_STATUS_RUNNING) {
        return Err(Error::Unexpected(format!(
            "desiredStatus changed to {:?}",
            ws.spec.desired_status
        )));
    }
    let reasons = event_reasons(client.clone(), &ws_name).await?;
    if !reasons.iter().any(|r| r == EVENT_COMPLIANCE_CHECK_FAILED) {
        return Err(Error::Unexpected(format!("no {} event, got {:?}", EVENT_COMPLIANCE_CHECK_FAILED, reasons)));
    }
    println!("Compliance test passed.");
    Ok(())
}

pub async fn deletion_protection_test(client: Client) -> Result<(), Error> {
    let ws_api: Api<Workspace> = Api::default_namespaced(client.clone());
    let tpl_api: Api<WorkspaceTemplate> = Api::default_namespaced(client.clone());

    tpl_api.delete("e2e-template", &DeleteParams::default()).await?;
    wait_for("deletion is blocked", TIMEOUT, || {
        let client = client.clone();
        async move {
            let reasons = event_reasons(client, "e2e-template").await?;
            Ok(reasons.iter().any(|r| r == "TemplateInUse"))
        }
    })
    .await?;
    if tpl_api.get_opt("e2e-template").await?.is_none() {
        return Err(Error::Unexpected("template in use was deleted".to_string()));
    }

    let detach = json!({ "spec": { "templateRef": null } });
    ws_api
        .patch("e2e-workspace", &PatchParams::default(), &Patch::Merge(&detach))
        .await?;
    wait_for("template is deleted", TIMEOUT, || {
        let tpl_api = tpl_api.clone();
        async move { Ok(tpl_api.get_opt("e2e-template").await?.is_none()) }
    })
    .await?;
    println!("Deletion protection test passed.");
    Ok(())
}

pub async fn governance_e2e_test() -> Result<(), Error> {
    let client = Client::try_default().await?;
    check_crds(client.clone()).await?;
    let discovery = Discovery::new(client.clone()).run().await?;
    apply(&workspace_template("2"), client.clone(), &discovery).await?;

    compliance_test(client.clone(), &discovery).await?;
    deletion_protection_test(client.clone()).await?;

    let ws_api: Api<Workspace> = Api::default_namespaced(client.clone());
    ws_api.delete("e2e-workspace", &DeleteParams::default()).await?;
    println!("E2e test passed.");
    Ok(())
}

pub async fn admission_e2e_test() -> Result<(), Error> {
    let client = Client::try_default().await?;
    check_crds(client.clone()).await?;
    let discovery = Discovery::new(client.clone()).run().await?;
    apply(&workspace_template("2"), client.clone(), &discovery).await?;

    match apply(&workspace("e2e-too-big", "4"), client.clone(), &discovery).await {
        Err(Error::Kube(kube::Error::Api(resp))) if resp.message.contains("exceeds maximum") => {
            println!("Workspace over the template bounds was rejected: {}", resp.message);
        }
        Err(e) => return Err(e),
        Ok(_) => return Err(Error::Unexpected("workspace over the template bounds was admitted".to_string())),
    }

    let name = apply(&workspace("e2e-defaulted", "1"), client.clone(), &discovery).await?;
    let ws_api: Api<Workspace> = Api::default_namespaced(client.clone());
    let ws = ws_api.get(&name).await?;
    let labels = ws.metadata.labels.unwrap_or_default();
    if labels.get(LABEL_TEMPLATE_NAME).map(String::as_str) != Some("e2e-template") {
        return Err(Error::Unexpected(format!("missing template label, got {:?}", labels)));
    }
    if ws.spec.image.as_deref() != Some("jupyter/base-notebook:latest") {
        return Err(Error::Unexpected(format!("image not defaulted, got {:?}", ws.spec.image)));
    }
    ws_api.delete(&name, &DeleteParams::default()).await?;
    println!("Admission e2e test passed.");
    Ok(())
}
