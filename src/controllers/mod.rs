// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod compliance_controller;
pub mod crds;
pub mod policy_controller;
