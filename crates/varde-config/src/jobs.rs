//! Forward model job definitions and the job registry.
//!
//! Jobs are declared in standalone definition files using the same line
//! grammar as the main configuration. The registry built from INSTALL_JOB
//! and INSTALL_JOB_DIRECTORY declarations is an arena of immutable
//! definitions: it is read-only once built, and every resolution takes a
//! structural copy, never a reference into the arena.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::error::{ConfigValidationError, ErrorInfo, WarningInfo};
use crate::parse::{lex_lines, read_to_string_checked, LineToken};

/// Declared type constraint for one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    String,
    Int,
    Float,
    Bool,
    RuntimeFile,
    RuntimeInt,
}

impl ArgType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "STRING" => Self::String,
            "INT" => Self::Int,
            "FLOAT" => Self::Float,
            "BOOL" => Self::Bool,
            "RUNTIME_FILE" => Self::RuntimeFile,
            "RUNTIME_INT" => Self::RuntimeInt,
            _ => return None,
        })
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "STRING",
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Bool => "BOOL",
            Self::RuntimeFile => "RUNTIME_FILE",
            Self::RuntimeInt => "RUNTIME_INT",
        };
        write!(f, "{name}")
    }
}

/// One installed forward model job.
///
/// Immutable once loaded. Resolution clones the definition before
/// attaching invocation-local state, so the registry entry is never
/// mutated (copy-on-use).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub name: String,
    pub executable: String,
    /// Declaration file this job was loaded from.
    pub source_file: PathBuf,
    pub target_file: Option<String>,
    pub error_file: Option<String>,
    pub start_file: Option<String>,
    pub stdin_file: Option<String>,
    pub stdout_file: Option<String>,
    pub stderr_file: Option<String>,
    pub min_arg: Option<usize>,
    pub max_arg: Option<usize>,
    pub arg_types: Vec<ArgType>,
    /// Fallback values for arguments left unresolved after substitution.
    pub default_mapping: IndexMap<String, String>,
    pub environment: IndexMap<String, String>,
    pub exec_env: IndexMap<String, String>,
    pub max_running: Option<usize>,
    pub max_running_minutes: Option<usize>,
    pub arg_list: Vec<String>,
}

impl JobDefinition {
    /// Parse a job declaration file. `name` overrides the file stem.
    pub fn from_file(path: &Path, name: Option<&str>) -> Result<Self, ConfigValidationError> {
        let source = read_to_string_checked(path)?;
        let mut errors = Vec::new();

        let name = name
            .map(str::to_string)
            .or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        let mut job = Self {
            name,
            executable: String::new(),
            source_file: path.to_path_buf(),
            target_file: None,
            error_file: None,
            start_file: None,
            stdin_file: None,
            stdout_file: None,
            stderr_file: None,
            min_arg: None,
            max_arg: None,
            arg_types: Vec::new(),
            default_mapping: IndexMap::new(),
            environment: IndexMap::new(),
            exec_env: IndexMap::new(),
            max_running: None,
            max_running_minutes: None,
            arg_list: Vec::new(),
        };

        for line in lex_lines(&source) {
            let words: Vec<&str> = line
                .tokens
                .iter()
                .filter_map(|t| match t {
                    LineToken::Word(w) => Some(w.as_str()),
                    LineToken::Invocation { .. } => None,
                })
                .collect();
            if words.len() != line.tokens.len() {
                errors.push(
                    ErrorInfo::new("unexpected parenthesized token in job definition")
                        .with_file(path)
                        .with_context(&line.text),
                );
                continue;
            }
            let (&keyword, args) = match words.split_first() {
                Some(split) => split,
                None => continue,
            };

            match (keyword, args) {
                ("EXECUTABLE", &[exe]) => job.executable = exe.to_string(),
                ("TARGET_FILE", &[file]) => job.target_file = Some(file.to_string()),
                ("ERROR_FILE", &[file]) => job.error_file = Some(file.to_string()),
                ("START_FILE", &[file]) => job.start_file = Some(file.to_string()),
                ("STDIN", &[file]) => job.stdin_file = Some(file.to_string()),
                ("STDOUT", &[file]) => job.stdout_file = Some(file.to_string()),
                ("STDERR", &[file]) => job.stderr_file = Some(file.to_string()),
                ("MIN_ARG", &[raw]) => match raw.parse() {
                    Ok(n) => job.min_arg = Some(n),
                    Err(_) => errors.push(bad_int(keyword, raw, path, &line.text)),
                },
                ("MAX_ARG", &[raw]) => match raw.parse() {
                    Ok(n) => job.max_arg = Some(n),
                    Err(_) => errors.push(bad_int(keyword, raw, path, &line.text)),
                },
                ("MAX_RUNNING", &[raw]) => match raw.parse() {
                    Ok(n) => job.max_running = Some(n),
                    Err(_) => errors.push(bad_int(keyword, raw, path, &line.text)),
                },
                ("MAX_RUNNING_MINUTES", &[raw]) => match raw.parse() {
                    Ok(n) => job.max_running_minutes = Some(n),
                    Err(_) => errors.push(bad_int(keyword, raw, path, &line.text)),
                },
                ("ARG_TYPE", &[index, type_name]) => {
                    match (index.parse::<usize>().ok(), ArgType::from_name(type_name)) {
                        (Some(index), Some(arg_type)) => {
                            if job.arg_types.len() <= index {
                                job.arg_types.resize(index + 1, ArgType::String);
                            }
                            job.arg_types[index] = arg_type;
                        }
                        _ => errors.push(
                            ErrorInfo::new(format!(
                                "ARG_TYPE takes an index and a type, got {:?}",
                                args.join(" ")
                            ))
                            .with_file(path)
                            .with_context(&line.text),
                        ),
                    }
                }
                ("DEFAULT", &[key, value]) => {
                    job.default_mapping.insert(key.to_string(), value.to_string());
                }
                ("ENV", &[key, value]) => {
                    job.environment.insert(key.to_string(), value.to_string());
                }
                ("EXEC_ENV", &[key, value]) => {
                    job.exec_env.insert(key.to_string(), value.to_string());
                }
                ("ARGLIST", rest) => {
                    job.arg_list = rest.iter().map(|a| a.to_string()).collect();
                }
                (
                    "EXECUTABLE" | "TARGET_FILE" | "ERROR_FILE" | "START_FILE" | "STDIN"
                    | "STDOUT" | "STDERR" | "MIN_ARG" | "MAX_ARG" | "MAX_RUNNING"
                    | "MAX_RUNNING_MINUTES",
                    rest,
                ) => errors.push(
                    ErrorInfo::new(format!(
                        "{keyword} takes 1 argument(s), got {}",
                        rest.len()
                    ))
                    .with_file(path)
                    .with_context(&line.text),
                ),
                ("ARG_TYPE" | "DEFAULT" | "ENV" | "EXEC_ENV", rest) => errors.push(
                    ErrorInfo::new(format!(
                        "{keyword} takes 2 argument(s), got {}",
                        rest.len()
                    ))
                    .with_file(path)
                    .with_context(&line.text),
                ),
                (other, _) => errors.push(
                    ErrorInfo::new(format!("unknown job definition keyword {other:?}"))
                        .with_file(path)
                        .with_context(&line.text),
                ),
            }
        }

        if job.executable.is_empty() {
            errors.push(
                ErrorInfo::new(format!("job {:?} does not declare an EXECUTABLE", job.name))
                    .with_file(path),
            );
        }

        ConfigValidationError::check(job, errors)
    }
}

fn bad_int(keyword: &str, value: &str, path: &Path, context: &str) -> ErrorInfo {
    ErrorInfo::new(format!("{keyword} is not an integer: {value:?}"))
        .with_file(path)
        .with_context(context)
}

/// Name -> definition arena for installed jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRegistry {
    jobs: IndexMap<String, JobDefinition>,
}

impl JobRegistry {
    /// Build the registry from INSTALL_JOB declarations and
    /// INSTALL_JOB_DIRECTORY expansions.
    ///
    /// Duplicate names overwrite the previous definition with a warning
    /// naming both sources (deliberate last-wins, not an error). All
    /// per-file and per-directory errors are aggregated; any error at all
    /// fails construction with the full set.
    pub fn install(
        declarations: &[(String, PathBuf)],
        directories: &[PathBuf],
        warnings: &mut Vec<WarningInfo>,
    ) -> Result<Self, ConfigValidationError> {
        let mut registry = Self::default();
        let mut errors = Vec::new();

        for (name, path) in declarations {
            match JobDefinition::from_file(path, Some(name)) {
                Ok(job) => registry.add(job, warnings),
                Err(err) => errors.extend(err.errors().iter().cloned()),
            }
        }

        for dir in directories {
            if !dir.is_dir() {
                errors.push(
                    ErrorInfo::new(format!("unable to locate job directory {}", dir.display()))
                        .with_file(dir),
                );
                continue;
            }
            let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
                Ok(read) => read
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file())
                    .collect(),
                Err(err) => {
                    errors.push(
                        ErrorInfo::new(format!(
                            "unable to read job directory {}: {err}",
                            dir.display()
                        ))
                        .with_file(dir),
                    );
                    continue;
                }
            };
            if entries.is_empty() {
                warnings.push(
                    WarningInfo::new(format!("no files found in job directory {}", dir.display()))
                        .with_file(dir),
                );
                continue;
            }
            entries.sort();
            for path in entries {
                match JobDefinition::from_file(&path, None) {
                    Ok(job) => registry.add(job, warnings),
                    Err(err) => errors.extend(err.errors().iter().cloned()),
                }
            }
        }

        ConfigValidationError::check(registry, errors)
    }

    fn add(&mut self, job: JobDefinition, warnings: &mut Vec<WarningInfo>) {
        if let Some(previous) = self.jobs.get(&job.name) {
            let message = format!(
                "duplicate forward model job {:?}, choosing {} over {}",
                job.name,
                job.source_file.display(),
                previous.source_file.display()
            );
            warn!("{message}");
            warnings.push(WarningInfo::new(message).with_file(&job.source_file));
        }
        self.jobs.insert(job.name.clone(), job);
    }

    pub fn get(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.get(name)
    }

    /// Installed names in installation order, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JobDefinition)> {
        self.jobs.iter().map(|(name, job)| (name.as_str(), job))
    }
}
