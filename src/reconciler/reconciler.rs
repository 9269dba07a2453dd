// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api_objects::api_method::{KubeAPIRequest, KubeAPIResponse};

// Reconciler is the interface a controller implements to be run by the shim layer.
//
// A reconcile is a sequence of reconcile_core steps. Each step receives the response
// to the request issued by the previous step, and returns the next local state together
// with at most one new request. reconcile_core performs no I/O itself, so the same
// state machine runs against the real API server (shim_layer) and against the
// in-memory executable model in tests.
pub trait Reconciler {
    // K: the custom resource type the controller reconciles
    type K;
    // S: the local state of one reconcile
    type S;

    fn reconcile_init_state(&self) -> Self::S;

    fn reconcile_core(
        &self,
        cr: &Self::K,
        resp_o: Option<KubeAPIResponse>,
        state: Self::S,
    ) -> (Self::S, Option<KubeAPIRequest>);

    fn reconcile_done(&self, state: &Self::S) -> bool;

    fn reconcile_error(&self, state: &Self::S) -> bool;
}
