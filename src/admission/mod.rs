// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod error;
pub mod handler;
pub mod template_hook;
pub mod template_store;
pub mod workspace_hook;
