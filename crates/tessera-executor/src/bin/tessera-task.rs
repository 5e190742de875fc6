// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job runner for compiled tasks
//!
//! ```text
//! tessera-task --home "$HOME" prolog
//! tessera-task --home "$HOME" instantiate-command
//! tessera-task --home "$HOME" epilog
//! ```
//!
//! Prints `success <Action>` on stdout when the phase completes.

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use tessera_executor::{Action, LocalJobMeta, TaskExecutor};

#[derive(Parser, Debug)]
#[command(name = "tessera-task", version)]
#[command(about = "Run one phase of a compiled tessera task")]
struct Args {
    /// Job home directory
    #[arg(long, env = "HOME")]
    home: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short)]
    verbose: bool,

    #[arg(value_enum)]
    action: Action,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(io::stderr)
        .init();

    let meta = LocalJobMeta::new(&args.home);
    match TaskExecutor::new(&meta).run(args.action) {
        Ok(outcome) => {
            println!("{}", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.error_code();
            eprintln!("Error [{}]: {:#}", code, anyhow::Error::new(e));
            ExitCode::FAILURE
        }
    }
}
