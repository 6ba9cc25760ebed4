//! Forward model resolution.
//!
//! Turns FORWARD_MODEL and SIMULATION_JOB declarations into resolved
//! invocations against the job registry. Each invocation owns a clone of
//! its job definition plus a private argument table; the registry entry
//! stays untouched so repeated use of the same job never bleeds state.

use varde_subst::{SubstitutionTable, DEFAULT_BUDGET};

use crate::error::{ConfigValidationError, ErrorInfo};
use crate::jobs::{JobDefinition, JobRegistry};
use crate::parse::{ConfigDict, DeclValue, ForwardModelArgs, Keyword};

/// One resolved forward model step, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardModelInvocation {
    /// Invocation-local copy of the installed definition.
    pub job: JobDefinition,
    /// `<KEY>=value` arguments private to this invocation. Shadows the
    /// global table during descriptor emission.
    pub private_args: SubstitutionTable,
}

/// Resolve every requested invocation against the registry.
///
/// The FORWARD_MODEL job name goes through the global table before
/// lookup, so a DEFINEd alias selects a job. An unknown name is an error
/// naming the installed jobs; resolution continues past it so one typo
/// does not hide the next.
pub fn resolve(
    dict: &ConfigDict,
    registry: &JobRegistry,
    table: &SubstitutionTable,
) -> Result<Vec<ForwardModelInvocation>, ConfigValidationError> {
    let mut invocations = Vec::new();
    let mut errors = Vec::new();

    for decl in dict.invocations() {
        match (&decl.keyword, &decl.value) {
            (Keyword::ForwardModel, DeclValue::ForwardModel { job, args }) => {
                let name = match table.substitute(job, "resolving forward model name", DEFAULT_BUDGET)
                {
                    Ok(name) => name,
                    Err(err) => {
                        errors.push(
                            ErrorInfo::new(err.to_string())
                                .with_file(&decl.source.file)
                                .with_context(&decl.source.context),
                        );
                        continue;
                    }
                };
                let job_def = match lookup(registry, &name, &mut errors, decl) {
                    Some(job_def) => job_def,
                    None => continue,
                };
                let private_args = match args {
                    None => SubstitutionTable::new(),
                    Some(ForwardModelArgs::Flat(flat)) => {
                        match SubstitutionTable::from_flat_string(flat) {
                            Ok(t) => t,
                            Err(err) => {
                                errors.push(
                                    ErrorInfo::new(format!(
                                        "invalid argument list in FORWARD_MODEL {name}({flat}): {err}"
                                    ))
                                    .with_file(&decl.source.file)
                                    .with_context(&decl.source.context),
                                );
                                continue;
                            }
                        }
                    }
                    Some(ForwardModelArgs::Pairs(pairs)) => {
                        let mut t = SubstitutionTable::new();
                        let mut bad = false;
                        for (key, value) in pairs {
                            if let Err(err) = t.insert(key, value) {
                                errors.push(
                                    ErrorInfo::new(format!(
                                        "invalid argument key in FORWARD_MODEL {name}: {err}"
                                    ))
                                    .with_file(&decl.source.file)
                                    .with_context(&decl.source.context),
                                );
                                bad = true;
                            }
                        }
                        if bad {
                            continue;
                        }
                        t
                    }
                };
                invocations.push(ForwardModelInvocation {
                    job: job_def.clone(),
                    private_args,
                });
            }
            (Keyword::SimulationJob, DeclValue::Args(args)) => {
                // SIMULATION_JOB names are taken verbatim and positional
                // arguments replace the declared ARGLIST.
                let name = &args[0];
                let job_def = match lookup(registry, name, &mut errors, decl) {
                    Some(job_def) => job_def,
                    None => continue,
                };
                let mut job = job_def.clone();
                if args.len() > 1 {
                    job.arg_list = args[1..].to_vec();
                }
                invocations.push(ForwardModelInvocation {
                    job,
                    private_args: SubstitutionTable::new(),
                });
            }
            _ => {}
        }
    }

    ConfigValidationError::check(invocations, errors)
}

fn lookup<'a>(
    registry: &'a JobRegistry,
    name: &str,
    errors: &mut Vec<ErrorInfo>,
    decl: &crate::parse::Decl,
) -> Option<&'a JobDefinition> {
    match registry.get(name) {
        Some(job) => Some(job),
        None => {
            errors.push(
                ErrorInfo::new(format!(
                    "could not find job {name:?} in list of installed jobs: {:?}",
                    registry.names()
                ))
                .with_file(&decl.source.file)
                .with_context(&decl.source.context),
            );
            None
        }
    }
}
