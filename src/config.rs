// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::governance::constants::DEFAULT_TEMPLATE_NAMESPACE;
use crate::shim_layer::controller_runtime::ShimSettings;
use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

/// Installs the global tracing subscriber. The filter comes from RUST_LOG and defaults to info.
pub fn init_logging(args: &LogArgs) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[derive(Debug, Clone, Args)]
pub struct ControllerArgs {
    /// Namespace searched last when a workspace's template reference has no namespace.
    #[arg(long, env = "DEFAULT_TEMPLATE_NAMESPACE", default_value = DEFAULT_TEMPLATE_NAMESPACE)]
    pub default_template_namespace: String,

    /// Workspace marker writes per second while a template change fans out.
    #[arg(long, env = "MARK_RATE_PER_SECOND", default_value_t = 10)]
    pub mark_rate: u32,

    #[arg(long, env = "MARK_BURST", default_value_t = 10)]
    pub mark_burst: u32,

    /// Seconds until a successfully reconciled object is checked again.
    #[arg(long, env = "SUCCESS_REQUEUE_SECONDS", default_value_t = 60)]
    pub success_requeue_seconds: u64,

    /// Seconds until a failed reconcile is retried.
    #[arg(long, env = "ERROR_REQUEUE_SECONDS", default_value_t = 10)]
    pub error_requeue_seconds: u64,

    #[command(flatten)]
    pub log: LogArgs,
}

impl ControllerArgs {
    pub fn shim_settings(&self) -> ShimSettings {
        ShimSettings {
            success_requeue: Duration::from_secs(self.success_requeue_seconds),
            error_requeue: Duration::from_secs(self.error_requeue_seconds),
            write_rate: self.mark_rate,
            write_burst: self.mark_burst,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ControllerCommand {
    /// Print the CustomResourceDefinitions as YAML.
    Export,
    /// Run the template, access strategy and compliance controllers.
    Run(ControllerArgs),
}

#[derive(Debug, Parser)]
#[command(name = "governance-controller", about = "Workspace template governance controllers")]
pub struct ControllerCli {
    #[command(subcommand)]
    pub command: ControllerCommand,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "governance-admission-controller",
    about = "Admission webhook for workspaces and workspace templates"
)]
pub struct AdmissionArgs {
    #[arg(long, env = "WEBHOOK_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 8443)]
    pub port: u16,

    #[arg(long, env = "WEBHOOK_TLS_CERT", default_value = "/certs/tls.crt")]
    pub tls_cert: PathBuf,

    #[arg(long, env = "WEBHOOK_TLS_KEY", default_value = "/certs/tls.key")]
    pub tls_key: PathBuf,

    #[arg(long, env = "DEFAULT_TEMPLATE_NAMESPACE", default_value = DEFAULT_TEMPLATE_NAMESPACE)]
    pub default_template_namespace: String,

    #[command(flatten)]
    pub log: LogArgs,
}

impl AdmissionArgs {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
