// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

use super::load_or_default;

/// Executes the `run` command to start the engine.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let config = load_or_default(&cli.config)?;

    RuntimeBuilder::new()
        .config(config)
        .ephemeral(args.ephemeral)
        .build()?
        .run()
        .await
}
