// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod common;
pub mod governance_e2e;

use common::Error;
use governance_e2e::{admission_e2e_test, governance_e2e_test};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).cloned().unwrap_or_default();
    match cmd.as_str() {
        "governance" => {
            println!("Running template governance end-to-end test");
            governance_e2e_test().await
        }
        "admission" => {
            println!("Running admission end-to-end test");
            admission_e2e_test().await
        }
        _ => {
            println!("Please specify one test: governance or admission");
            Ok(())
        }
    }
}
