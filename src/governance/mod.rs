// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod conditions;
pub mod constants;
pub mod events;
pub mod policy_kind;
pub mod resolver;
pub mod reverse_index;
pub mod validator;
