// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tessera intermediate representation.
//!
//! A language-neutral model of workflow programs: types, values, callables
//! (tasks, fragments, workflows) and the bundle that holds them. Front-ends
//! translate source documents into a [`Bundle`]; the native compiler turns a
//! bundle into platform executables.

pub mod bundle;
pub mod callable;
pub mod coercion;
pub mod error;
pub mod instance;
pub mod types;
pub mod value;

pub use bundle::Bundle;
pub use callable::{
    Attributes, Callable, CallableKind, FragmentBlock, FragmentCall, FragmentKind, Parameter,
    ParameterAttr, Requirement, Requirements, Signature, Stage, StageId, StageInput, Task,
    Workflow, WorkflowBuilder, WorkflowFragment, WorkflowLevel,
};
pub use error::{IrError, Result};
pub use instance::{InstanceType, InstanceTypeCatalog, ResourceRequest};
pub use types::Type;
pub use value::{PathKind, Value};
