//! Execution descriptor emission.
//!
//! The descriptor is the serialized hand-off to the runtime that executes
//! forward model jobs inside one realization's run directory. Emission is
//! where all remaining macros are pinned: the realization and iteration
//! indices exist only here, never in the stored configuration.

use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use varde_subst::{first_macro_token, SubstitutionError, SubstitutionTable};

use crate::error::{ConfigValidationError, ErrorInfo};
use crate::forward_model::ForwardModelInvocation;
use crate::jobs::ArgType;

/// One job entry in the descriptor, fully substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    pub name: String,
    pub executable: String,
    pub target_file: Option<String>,
    pub error_file: Option<String>,
    pub start_file: Option<String>,
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub arg_list: Vec<String>,
    /// `None` when the job declares no environment, so it serializes as
    /// null rather than an empty object.
    pub environment: Option<IndexMap<String, String>>,
    pub exec_env: Option<IndexMap<String, String>>,
    pub max_running: Option<usize>,
    pub max_running_minutes: Option<usize>,
    pub min_arg: Option<usize>,
    pub max_arg: Option<usize>,
    pub arg_types: Vec<ArgType>,
}

/// Serialized run description for one realization and iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionDescriptor {
    pub global_environment: IndexMap<String, String>,
    pub config_path: String,
    pub config_file: String,
    pub jobs: Vec<JobDescriptor>,
    pub run_id: String,
    pub pid: u32,
}

/// Two-scope substituter for one invocation: private arguments shadow
/// the global table, and both see the synthetic realization and
/// iteration keys.
struct Substituter<'a> {
    global: &'a SubstitutionTable,
    private: SubstitutionTable,
    realization: usize,
    iteration: usize,
}

impl<'a> Substituter<'a> {
    fn new(
        global: &'a SubstitutionTable,
        private_args: &SubstitutionTable,
        realization: usize,
        iteration: usize,
        errors: &mut Vec<ErrorInfo>,
    ) -> Self {
        // Private values may themselves reference global macros; pin them
        // once so a private sweep never needs more than one pass.
        let mut private = SubstitutionTable::new();
        for (key, value) in private_args.iter() {
            match global.substitute_real_iter(value, realization, iteration) {
                Ok(expanded) => {
                    if let Some(global_value) = global.get(key.as_str()) {
                        if global_value != expanded {
                            info!(
                                key = %key,
                                "private argument shadows a global definition"
                            );
                        }
                    }
                    private.define(key.clone(), expanded);
                }
                Err(err) => errors.push(ErrorInfo::new(err.to_string())),
            }
        }
        Self {
            global,
            private,
            realization,
            iteration,
        }
    }

    fn substitute(&self, text: &str) -> Result<String, SubstitutionError> {
        let first = self
            .private
            .substitute(text, "applying private arguments", 1)?;
        self.global
            .substitute_real_iter(&first, self.realization, self.iteration)
    }

    fn substitute_optional(
        &self,
        value: &Option<String>,
        errors: &mut Vec<ErrorInfo>,
    ) -> Option<String> {
        match value {
            None => None,
            Some(text) => match self.substitute(text) {
                Ok(out) => Some(out),
                Err(err) => {
                    errors.push(ErrorInfo::new(err.to_string()));
                    None
                }
            },
        }
    }
}

impl ExecutionDescriptor {
    /// Build the descriptor for one realization and iteration.
    ///
    /// All substitution failures across every job are aggregated; a
    /// partially substituted descriptor is never returned.
    pub fn build(
        invocations: &[ForwardModelInvocation],
        table: &SubstitutionTable,
        env_vars: &IndexMap<String, String>,
        config_path: &Path,
        run_id: &str,
        realization: usize,
        iteration: usize,
    ) -> Result<Self, ConfigValidationError> {
        let mut errors = Vec::new();

        let mut global_environment = IndexMap::new();
        for (key, value) in env_vars {
            match table.substitute_real_iter(value, realization, iteration) {
                Ok(expanded) => {
                    // An environment value that still holds a macro after
                    // expansion would leak the literal token into the run.
                    if first_macro_token(&expanded).is_some() {
                        warn!(
                            key = %key,
                            value = %expanded,
                            "dropping environment variable with unresolved macro"
                        );
                        continue;
                    }
                    global_environment.insert(key.clone(), expanded);
                }
                Err(err) => errors.push(ErrorInfo::new(err.to_string())),
            }
        }

        let mut jobs = Vec::with_capacity(invocations.len());
        for (index, invocation) in invocations.iter().enumerate() {
            let substituter = Substituter::new(
                table,
                &invocation.private_args,
                realization,
                iteration,
                &mut errors,
            );
            jobs.push(job_descriptor(
                invocation,
                &substituter,
                index,
                &mut errors,
            ));
        }

        let config_dir = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_string_lossy()
            .into_owned();
        let config_file = config_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let descriptor = Self {
            global_environment,
            config_path: config_dir,
            config_file,
            jobs,
            run_id: run_id.to_string(),
            pid: std::process::id(),
        };
        ConfigValidationError::check(descriptor, errors)
    }
}

fn job_descriptor(
    invocation: &ForwardModelInvocation,
    substituter: &Substituter<'_>,
    index: usize,
    errors: &mut Vec<ErrorInfo>,
) -> JobDescriptor {
    let job = &invocation.job;

    let executable = match substituter.substitute(&job.executable) {
        Ok(exe) => exe,
        Err(err) => {
            errors.push(ErrorInfo::new(err.to_string()).with_file(&job.source_file));
            String::new()
        }
    };

    let mut arg_list = Vec::with_capacity(job.arg_list.len());
    for arg in &job.arg_list {
        match substituter.substitute(arg) {
            Ok(out) => arg_list.push(apply_default(out, &job.default_mapping)),
            Err(err) => errors.push(ErrorInfo::new(err.to_string()).with_file(&job.source_file)),
        }
    }

    let environment = substituted_map(&job.environment, substituter, errors);
    let exec_env = substituted_map(&job.exec_env, substituter, errors);

    // Streams are substituted like any other field, then get a per-step
    // suffix so two uses of the same job in one run directory cannot
    // clobber each other.
    let stdout = substituter
        .substitute_optional(&job.stdout_file, errors)
        .map(|name| format!("{name}.{index}"));
    let stderr = substituter
        .substitute_optional(&job.stderr_file, errors)
        .map(|name| format!("{name}.{index}"));

    JobDescriptor {
        name: job.name.clone(),
        executable,
        target_file: substituter.substitute_optional(&job.target_file, errors),
        error_file: substituter.substitute_optional(&job.error_file, errors),
        start_file: substituter.substitute_optional(&job.start_file, errors),
        stdin: substituter.substitute_optional(&job.stdin_file, errors),
        stdout,
        stderr,
        arg_list,
        environment,
        exec_env,
        max_running: job.max_running,
        max_running_minutes: job.max_running_minutes,
        min_arg: job.min_arg,
        max_arg: job.max_arg,
        arg_types: job.arg_types.clone(),
    }
}

/// Fallback applied after substitution: an argument left as a single
/// unresolved macro token takes the job's declared default, if any.
fn apply_default(value: String, default_mapping: &IndexMap<String, String>) -> String {
    if first_macro_token(&value) == Some(value.as_str()) {
        if let Some(default) = default_mapping.get(&value) {
            return default.clone();
        }
    }
    value
}

fn substituted_map(
    map: &IndexMap<String, String>,
    substituter: &Substituter<'_>,
    errors: &mut Vec<ErrorInfo>,
) -> Option<IndexMap<String, String>> {
    if map.is_empty() {
        return None;
    }
    let mut out = IndexMap::new();
    for (key, value) in map {
        match substituter.substitute(value) {
            Ok(expanded) => {
                if first_macro_token(&expanded).is_some() {
                    warn!(
                        key = %key,
                        value = %expanded,
                        "dropping job environment variable with unresolved macro"
                    );
                    continue;
                }
                out.insert(key.clone(), expanded);
            }
            Err(err) => errors.push(ErrorInfo::new(err.to_string())),
        }
    }
    // Dropping every value leaves nothing worth serializing; null, like a
    // job that declared no environment at all.
    if out.is_empty() {
        return None;
    }
    Some(out)
}
