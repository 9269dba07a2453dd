// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::crds::WorkspaceTemplate;
use crate::governance::constants::{LABEL_DEFAULT_CLUSTER_TEMPLATE, LABEL_TRUE};
use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::Client;

#[derive(Debug, thiserror::Error)]
pub enum TemplateLookupError {
    #[error("template lookup failed: {0}")]
    Api(#[from] kube::Error),
}

/// TemplateStore is how the admission hook reads templates.
///
/// The hook re-reads templates on every request and never caches them, so a
/// write is always checked against the template as it is stored right now.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkspaceTemplate>, TemplateLookupError>;

    // Templates labelled as the cluster default, in every namespace.
    async fn list_default_templates(&self) -> Result<Vec<WorkspaceTemplate>, TemplateLookupError>;
}

pub struct KubeTemplateStore {
    client: Client,
}

impl KubeTemplateStore {
    pub fn new(client: Client) -> KubeTemplateStore {
        KubeTemplateStore { client }
    }
}

#[async_trait]
impl TemplateStore for KubeTemplateStore {
    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkspaceTemplate>, TemplateLookupError> {
        let api = Api::<WorkspaceTemplate>::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_default_templates(&self) -> Result<Vec<WorkspaceTemplate>, TemplateLookupError> {
        let api = Api::<WorkspaceTemplate>::all(self.client.clone());
        let lp = ListParams::default().labels(&format!("{}={}", LABEL_DEFAULT_CLUSTER_TEMPLATE, LABEL_TRUE));
        Ok(api.list(&lp).await?.items)
    }
}
