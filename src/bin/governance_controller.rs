// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use clap::Parser;
use kube::runtime::watcher;
use kube::{Api, Client, CustomResourceExt};
use template_governance::config::{init_logging, ControllerCli, ControllerCommand};
use template_governance::controllers::compliance_controller::reconciler::ComplianceReconciler;
use template_governance::controllers::crds::*;
use template_governance::controllers::policy_controller::reconciler::PolicyReconciler;
use template_governance::governance::policy_kind::{AccessStrategyPolicy, TemplatePolicy};
use template_governance::governance::reverse_index::referenced_policy_ref;
use template_governance::shim_layer::controller_runtime::run_controller;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ControllerCli::parse();
    match cli.command {
        ControllerCommand::Export => {
            println!("{}", serde_yaml::to_string(&Workspace::crd())?);
            println!("---");
            println!("{}", serde_yaml::to_string(&WorkspaceTemplate::crd())?);
            println!("---");
            println!("{}", serde_yaml::to_string(&WorkspaceAccessStrategy::crd())?);
        }
        ControllerCommand::Run(args) => {
            init_logging(&args.log);
            info!(
                default_template_namespace = %args.default_template_namespace,
                "running governance controllers"
            );
            let client = Client::try_default().await?;
            let settings = args.shim_settings();

            let template_watch_client = client.clone();
            let template_controller = run_controller(
                client.clone(),
                PolicyReconciler::<TemplatePolicy>::default(),
                settings.clone(),
                move |controller| {
                    controller.watches(
                        Api::<Workspace>::all(template_watch_client),
                        watcher::Config::default(),
                        referenced_policy_ref::<TemplatePolicy>,
                    )
                },
            );
            let strategy_watch_client = client.clone();
            let access_strategy_controller = run_controller(
                client.clone(),
                PolicyReconciler::<AccessStrategyPolicy>::default(),
                settings.clone(),
                move |controller| {
                    controller.watches(
                        Api::<Workspace>::all(strategy_watch_client),
                        watcher::Config::default(),
                        referenced_policy_ref::<AccessStrategyPolicy>,
                    )
                },
            );
            let compliance_controller = run_controller(
                client,
                ComplianceReconciler {
                    default_template_namespace: args.default_template_namespace.clone(),
                },
                settings,
                |controller| controller,
            );
            tokio::try_join!(template_controller, access_strategy_controller, compliance_controller)?;
        }
    }
    Ok(())
}
