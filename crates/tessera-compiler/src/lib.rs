// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tessera Compiler - WDL and CWL workflows to native platform executables
//!
//! # Compilation Pipeline
//!
//! ```text
//!     ┌─────────────┐      ┌─────────────┐      ┌─────────────┐
//!     │   Source    │      │     IR      │      │  Platform   │
//!     │  Document   │─────▶│   Bundle    │─────▶│ Executables │
//!     │ (WDL / CWL) │      │ (translate) │      │  (native)   │
//!     └─────────────┘      └─────────────┘      └─────────────┘
//!                                 ▲
//!                          ┌─────────────┐
//!                          │ Input files │
//!                          │  (inputs)   │
//!                          └─────────────┘
//! ```
//!
//! 1. **Analyze**: split each workflow body into blocks ([`block`])
//! 2. **Translate**: build tasks, fragments and workflows into a bundle ([`translate`])
//! 3. **Bind inputs**: embed defaults and freeze inputs files ([`inputs`])
//! 4. **Compile**: create or reuse one executable per callable ([`native`])
//!
//! The platform is reached only through [`platform::PlatformApi`]; a
//! directory-backed implementation serves the command-line tool and an
//! in-memory one serves tests.

pub mod block;
pub mod config;
pub mod error;
pub mod extras;
pub mod imports;
pub mod inputs;
pub mod native;
pub mod platform;
pub mod translate;

pub use config::Config;
pub use error::{CompileError, Result};
pub use extras::Extras;
pub use inputs::{Destination, FileResolver, translate_inputs};
pub use native::{CompileMode, CompileResult, CompiledExecutable, CompilerOptions, NativeCompiler};
pub use translate::{TranslateOptions, translate};
