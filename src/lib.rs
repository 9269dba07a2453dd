// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod admission;
pub mod config;
pub mod controllers;
pub mod governance;
pub mod kubernetes_api_objects;
pub mod reconciler;
pub mod shim_layer;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Object misses {0}")]
    MissingObjectKey(&'static str),
    #[error("ReconcileCoreError")]
    ReconcileCoreError,
}
