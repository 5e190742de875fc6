// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tessera Executor - the job-side lifecycle of a compiled task
//!
//! A task applet's script calls the `tessera-task` runner once per phase:
//!
//! ```text
//!   Prolog ──▶ InstantiateCommand ──▶ (command.sh) ──▶ Epilog
//!     │
//!     └── instance too small: launch a child job, link outputs, stop
//! ```
//!
//! Phases run in separate processes and hand state to each other through
//! files under the job's home directory, so any phase can be re-run after a
//! crash.

pub mod error;
pub mod eval;
pub mod executor;
pub mod job_meta;
pub mod local;

pub use error::{ExecutorError, Result};
pub use executor::{Action, Outcome, TaskExecutor};
pub use job_meta::{JobInfo, JobMeta};
pub use local::LocalJobMeta;
