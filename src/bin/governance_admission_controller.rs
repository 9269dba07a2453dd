// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use template_governance::admission::handler::routes;
use template_governance::admission::template_store::KubeTemplateStore;
use template_governance::admission::workspace_hook::WorkspaceHook;
use template_governance::config::{init_logging, AdmissionArgs};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = AdmissionArgs::parse();
    init_logging(&args.log);

    let client = Client::try_default().await?;
    let hook = Arc::new(WorkspaceHook::new(
        KubeTemplateStore::new(client),
        args.default_template_namespace.clone(),
    ));

    info!(address = %args.socket_addr(), "serving admission webhook");
    warp::serve(routes(hook))
        .tls()
        .cert_path(&args.tls_cert)
        .key_path(&args.tls_key)
        .run(args.socket_addr())
        .await;
    Ok(())
}
