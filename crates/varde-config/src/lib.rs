//! Configuration compiler for ensemble simulation runs.
//!
//! Turns a keyword-per-line configuration file into a fully resolved
//! [`Config`]: macros expanded, jobs installed, forward model steps
//! resolved and workflows hooked. Validation is aggregated; the user sees
//! every independent mistake in one pass, and a valid aggregate carries
//! its advisory warnings on a side channel.
//!
//! The per-realization hand-off to the runtime is the
//! [`ExecutionDescriptor`], emitted on demand from a resolved `Config`.

pub mod analysis;
pub mod config;
pub mod descriptor;
pub mod ensemble;
pub mod error;
pub mod forward_model;
pub mod jobs;
pub mod model;
pub mod parse;
pub mod queue;
pub mod workflows;

pub use config::Config;
pub use descriptor::{ExecutionDescriptor, JobDescriptor};
pub use error::{ConfigValidationError, ErrorInfo, WarningInfo};
pub use forward_model::ForwardModelInvocation;
pub use jobs::{ArgType, JobDefinition, JobRegistry};
pub use workflows::{HookStage, Workflow, WorkflowJob};
