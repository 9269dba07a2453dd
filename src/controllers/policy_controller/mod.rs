// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod deletion_guard;
pub mod drift_scheduler;
pub mod reconciler;
pub mod step;
