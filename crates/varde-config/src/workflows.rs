//! Workflow jobs, workflows and hook bindings.
//!
//! Workflow jobs are small tool declarations, loaded like forward model
//! jobs but allowed to point at an external script instead of an
//! executable. Workflows sequence workflow job invocations, and
//! HOOK_WORKFLOW pins a workflow to a fixed point of the ensemble run.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::warn;

use varde_subst::{SubstitutionTable, DEFAULT_BUDGET};

use crate::error::{ErrorInfo, WarningInfo};
use crate::jobs::ArgType;
use crate::parse::{lex_lines, read_to_string_checked, ConfigDict, Keyword, LineToken};

/// Fixed points in the ensemble run where hooked workflows execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    PreSimulation,
    PostSimulation,
    PreFirstUpdate,
    PostFirstUpdate,
    PreUpdate,
    PostUpdate,
}

impl HookStage {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "PRE_SIMULATION" => Self::PreSimulation,
            "POST_SIMULATION" => Self::PostSimulation,
            "PRE_FIRST_UPDATE" => Self::PreFirstUpdate,
            "POST_FIRST_UPDATE" => Self::PostFirstUpdate,
            "PRE_UPDATE" => Self::PreUpdate,
            "POST_UPDATE" => Self::PostUpdate,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreSimulation => "PRE_SIMULATION",
            Self::PostSimulation => "POST_SIMULATION",
            Self::PreFirstUpdate => "PRE_FIRST_UPDATE",
            Self::PostFirstUpdate => "POST_FIRST_UPDATE",
            Self::PreUpdate => "PRE_UPDATE",
            Self::PostUpdate => "POST_UPDATE",
        }
    }

    pub const ALL: [HookStage; 6] = [
        Self::PreSimulation,
        Self::PostSimulation,
        Self::PreFirstUpdate,
        Self::PostFirstUpdate,
        Self::PreUpdate,
        Self::PostUpdate,
    ];
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One loadable workflow tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowJob {
    pub name: String,
    pub source_file: PathBuf,
    /// External executable, mutually exclusive with `script`.
    pub executable: Option<String>,
    /// Script run by the workflow runner.
    pub script: Option<PathBuf>,
    pub min_arg: Option<usize>,
    pub max_arg: Option<usize>,
    pub arg_types: Vec<ArgType>,
}

impl WorkflowJob {
    /// Parse a workflow job declaration file.
    ///
    /// A declared SCRIPT that does not exist on disk is a soft failure:
    /// the job is omitted with a warning and `Ok(None)` is returned.
    /// A malformed file, or one declaring neither EXECUTABLE nor SCRIPT,
    /// is a hard failure.
    pub fn from_file(
        path: &Path,
        name: Option<&str>,
        warnings: &mut Vec<WarningInfo>,
    ) -> Result<Option<Self>, Vec<ErrorInfo>> {
        let source = read_to_string_checked(path)
            .map_err(|err| err.errors().to_vec())?;
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
            source_file: path.to_path_buf(),
            executable: None,
            script: None,
            min_arg: None,
            max_arg: None,
            arg_types: Vec::new(),
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
                    ErrorInfo::new("unexpected parenthesized token in workflow job definition")
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
                ("EXECUTABLE", &[exe]) => job.executable = Some(exe.to_string()),
                ("SCRIPT", &[script]) => job.script = Some(PathBuf::from(script)),
                ("MIN_ARG", &[raw]) => match raw.parse() {
                    Ok(n) => job.min_arg = Some(n),
                    Err(_) => errors.push(
                        ErrorInfo::new(format!("MIN_ARG is not an integer: {raw:?}"))
                            .with_file(path)
                            .with_context(&line.text),
                    ),
                },
                ("MAX_ARG", &[raw]) => match raw.parse() {
                    Ok(n) => job.max_arg = Some(n),
                    Err(_) => errors.push(
                        ErrorInfo::new(format!("MAX_ARG is not an integer: {raw:?}"))
                            .with_file(path)
                            .with_context(&line.text),
                    ),
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
                // INTERNAL is accepted for compatibility and ignored; the
                // script/executable split carries the same information.
                ("INTERNAL", &[_]) => {}
                (
                    "EXECUTABLE" | "SCRIPT" | "MIN_ARG" | "MAX_ARG" | "ARG_TYPE" | "INTERNAL",
                    rest,
                ) => errors.push(
                    ErrorInfo::new(format!(
                        "wrong number of arguments for {keyword}: got {}",
                        rest.len()
                    ))
                    .with_file(path)
                    .with_context(&line.text),
                ),
                (other, _) => errors.push(
                    ErrorInfo::new(format!("unknown workflow job keyword {other:?}"))
                        .with_file(path)
                        .with_context(&line.text),
                ),
            }
        }

        if job.executable.is_none() && job.script.is_none() {
            errors.push(
                ErrorInfo::new(format!(
                    "workflow job {:?} declares neither EXECUTABLE nor SCRIPT",
                    job.name
                ))
                .with_file(path),
            );
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        if let Some(script) = &job.script {
            let resolved = if script.is_absolute() {
                script.clone()
            } else {
                path.parent().unwrap_or(Path::new(".")).join(script)
            };
            if !resolved.is_file() {
                let message = format!(
                    "workflow job {:?} omitted: script {} not found",
                    job.name,
                    resolved.display()
                );
                warn!("{message}");
                warnings.push(WarningInfo::new(message).with_file(path));
                return Ok(None);
            }
            job.script = Some(resolved);
        }

        Ok(Some(job))
    }
}

/// One step of a workflow: a workflow job plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStep {
    pub job_name: String,
    pub args: Vec<String>,
}

/// A named sequence of workflow job invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,
    pub source_file: PathBuf,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Parse a workflow file, resolving each step against the loaded
    /// workflow jobs. A step naming an unknown job is a hard error.
    pub fn from_file(
        path: &Path,
        name: &str,
        jobs: &IndexMap<String, WorkflowJob>,
        table: &SubstitutionTable,
    ) -> Result<Self, Vec<ErrorInfo>> {
        let source = read_to_string_checked(path)
            .map_err(|err| err.errors().to_vec())?;
        let mut errors = Vec::new();
        let mut steps = Vec::new();

        for line in lex_lines(&source) {
            let mut words = Vec::with_capacity(line.tokens.len());
            for token in &line.tokens {
                match token {
                    LineToken::Word(w) => {
                        match table.substitute(w, "expanding workflow arguments", DEFAULT_BUDGET) {
                            Ok(expanded) => words.push(expanded),
                            Err(err) => {
                                errors.push(
                                    ErrorInfo::new(err.to_string())
                                        .with_file(path)
                                        .with_context(&line.text),
                                );
                            }
                        }
                    }
                    LineToken::Invocation { .. } => {
                        errors.push(
                            ErrorInfo::new("unexpected parenthesized token in workflow")
                                .with_file(path)
                                .with_context(&line.text),
                        );
                    }
                }
            }
            let (job_name, args) = match words.split_first() {
                Some(split) => split,
                None => continue,
            };
            if !jobs.contains_key(job_name) {
                errors.push(
                    ErrorInfo::new(format!(
                        "workflow {name:?} uses unknown job {job_name:?}, available jobs: {:?}",
                        jobs.keys().collect::<Vec<_>>()
                    ))
                    .with_file(path)
                    .with_context(&line.text),
                );
                continue;
            }
            steps.push(WorkflowStep {
                job_name: job_name.clone(),
                args: args.to_vec(),
            });
        }

        if errors.is_empty() {
            Ok(Self {
                name: name.to_string(),
                source_file: path.to_path_buf(),
                steps,
            })
        } else {
            Err(errors)
        }
    }
}

/// Loaded workflow state: jobs, workflows and hook bindings.
pub type WorkflowSet = (
    IndexMap<String, WorkflowJob>,
    IndexMap<String, Workflow>,
    IndexMap<HookStage, Vec<String>>,
);

/// Load workflow jobs, workflows and hooks from the dictionary.
///
/// Relative declaration paths resolve against `config_dir`. An
/// unreadable workflow file is a soft failure (warning, workflow
/// omitted); every structural problem is aggregated into the error list.
/// Duplicate names take the last declaration with a warning.
pub fn load_workflows(
    dict: &ConfigDict,
    table: &SubstitutionTable,
    config_dir: &Path,
    warnings: &mut Vec<WarningInfo>,
) -> Result<WorkflowSet, Vec<ErrorInfo>> {
    let mut errors = Vec::new();
    let mut jobs: IndexMap<String, WorkflowJob> = IndexMap::new();

    let add_job = |job: WorkflowJob,
                       jobs: &mut IndexMap<String, WorkflowJob>,
                       warnings: &mut Vec<WarningInfo>| {
        if let Some(previous) = jobs.get(&job.name) {
            let message = format!(
                "duplicate workflow job {:?}, choosing {} over {}",
                job.name,
                job.source_file.display(),
                previous.source_file.display()
            );
            warn!("{message}");
            warnings.push(WarningInfo::new(message).with_file(&job.source_file));
        }
        jobs.insert(job.name.clone(), job);
    };

    for decl in dict.entries(Keyword::LoadWorkflowJob) {
        let args = decl.args();
        let path = expand_path(table, config_dir, &args[0], decl, &mut errors);
        let path = match path {
            Some(path) => path,
            None => continue,
        };
        let name = args.get(1).map(String::as_str);
        match WorkflowJob::from_file(&path, name, warnings) {
            Ok(Some(job)) => add_job(job, &mut jobs, warnings),
            Ok(None) => {}
            Err(mut e) => errors.append(&mut e),
        }
    }

    for decl in dict.entries(Keyword::WorkflowJobDirectory) {
        let dir = expand_path(table, config_dir, &decl.args()[0], decl, &mut errors);
        let dir = match dir {
            Some(dir) => dir,
            None => continue,
        };
        if !dir.is_dir() {
            errors.push(
                ErrorInfo::new(format!(
                    "unable to locate workflow job directory {}",
                    dir.display()
                ))
                .with_file(&decl.source.file)
                .with_context(&decl.source.context),
            );
            continue;
        }
        let mut entries: Vec<PathBuf> = match fs::read_dir(&dir) {
            Ok(read) => read
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect(),
            Err(err) => {
                errors.push(
                    ErrorInfo::new(format!(
                        "unable to read workflow job directory {}: {err}",
                        dir.display()
                    ))
                    .with_file(&dir),
                );
                continue;
            }
        };
        entries.sort();
        for path in entries {
            match WorkflowJob::from_file(&path, None, warnings) {
                Ok(Some(job)) => add_job(job, &mut jobs, warnings),
                Ok(None) => {}
                Err(mut e) => errors.append(&mut e),
            }
        }
    }

    let mut workflows: IndexMap<String, Workflow> = IndexMap::new();
    for decl in dict.entries(Keyword::LoadWorkflow) {
        let args = decl.args();
        let path = match expand_path(table, config_dir, &args[0], decl, &mut errors) {
            Some(path) => path,
            None => continue,
        };
        let name = args
            .get(1)
            .map(String::clone)
            .or_else(|| {
                path.file_name()
                    .map(|f| f.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        if !path.is_file() {
            let message = format!(
                "workflow {:?} omitted: file {} not found",
                name,
                path.display()
            );
            warn!("{message}");
            warnings.push(
                WarningInfo::new(message)
                    .with_file(&decl.source.file)
                    .with_context(&decl.source.context),
            );
            continue;
        }
        match Workflow::from_file(&path, &name, &jobs, table) {
            Ok(workflow) => {
                if let Some(previous) = workflows.get(&name) {
                    let message = format!(
                        "duplicate workflow {:?}, choosing {} over {}",
                        name,
                        path.display(),
                        previous.source_file.display()
                    );
                    warn!("{message}");
                    warnings.push(WarningInfo::new(message).with_file(&path));
                }
                workflows.insert(name, workflow);
            }
            Err(mut e) => errors.append(&mut e),
        }
    }

    let mut hooks: IndexMap<HookStage, Vec<String>> = IndexMap::new();
    for decl in dict.entries(Keyword::HookWorkflow) {
        let args = decl.args();
        let workflow_name = &args[0];
        let stage = match HookStage::from_name(&args[1]) {
            Some(stage) => stage,
            None => {
                errors.push(
                    ErrorInfo::new(format!(
                        "unknown hook stage {:?}, expected one of {:?}",
                        args[1],
                        HookStage::ALL.map(HookStage::as_str)
                    ))
                    .with_file(&decl.source.file)
                    .with_context(&decl.source.context),
                );
                continue;
            }
        };
        if !workflows.contains_key(workflow_name) {
            errors.push(
                ErrorInfo::new(format!(
                    "HOOK_WORKFLOW references unknown workflow {workflow_name:?}"
                ))
                .with_file(&decl.source.file)
                .with_context(&decl.source.context),
            );
            continue;
        }
        hooks
            .entry(stage)
            .or_default()
            .push(workflow_name.clone());
    }

    if errors.is_empty() {
        Ok((jobs, workflows, hooks))
    } else {
        Err(errors)
    }
}

fn expand_path(
    table: &SubstitutionTable,
    config_dir: &Path,
    raw: &str,
    decl: &crate::parse::Decl,
    errors: &mut Vec<ErrorInfo>,
) -> Option<PathBuf> {
    match table.substitute(raw, "expanding workflow path", DEFAULT_BUDGET) {
        Ok(path) => {
            let path = PathBuf::from(path);
            if path.is_absolute() {
                Some(path)
            } else {
                Some(config_dir.join(path))
            }
        }
        Err(err) => {
            errors.push(
                ErrorInfo::new(err.to_string())
                    .with_file(&decl.source.file)
                    .with_context(&decl.source.context),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;
    use tempfile::tempdir;

    fn dict(source: &str) -> ConfigDict {
        let mut dict = ConfigDict::new();
        for d in parse_source(source, Path::new("test.vrd")).unwrap() {
            dict.push(d);
        }
        dict
    }

    fn write(dir: &Path, file: &str, body: &str) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_job_workflow_and_hook() {
        let dir = tempdir().unwrap();
        let job = write(dir.path(), "export.wfjob", "EXECUTABLE /bin/export\nMIN_ARG 1\n");
        let flow = write(dir.path(), "nightly.wf", "export results.txt\n");

        let source = format!(
            "LOAD_WORKFLOW_JOB {} export\nLOAD_WORKFLOW {} nightly\nHOOK_WORKFLOW nightly POST_SIMULATION\n",
            job.display(),
            flow.display()
        );
        let mut warnings = Vec::new();
        let (jobs, workflows, hooks) =
            load_workflows(&dict(&source), &SubstitutionTable::new(), Path::new("."), &mut warnings).unwrap();

        assert!(jobs.contains_key("export"));
        let workflow = &workflows["nightly"];
        assert_eq!(workflow.steps.len(), 1);
        assert_eq!(workflow.steps[0].job_name, "export");
        assert_eq!(workflow.steps[0].args, vec!["results.txt"]);
        assert_eq!(hooks[&HookStage::PostSimulation], vec!["nightly"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_workflow_arguments_are_expanded() {
        let dir = tempdir().unwrap();
        let job = write(dir.path(), "export.wfjob", "EXECUTABLE /bin/export\n");
        let flow = write(dir.path(), "nightly.wf", "export <CASE>.txt\n");

        let mut table = SubstitutionTable::new();
        table.insert("<CASE>", "base_case").unwrap();
        let source = format!(
            "LOAD_WORKFLOW_JOB {} export\nLOAD_WORKFLOW {} nightly\n",
            job.display(),
            flow.display()
        );
        let mut warnings = Vec::new();
        let (_, workflows, _) =
            load_workflows(&dict(&source), &table, Path::new("."), &mut warnings).unwrap();
        assert_eq!(workflows["nightly"].steps[0].args, vec!["base_case.txt"]);
    }

    #[test]
    fn test_missing_script_is_soft_warning() {
        let dir = tempdir().unwrap();
        let job = write(dir.path(), "plot.wfjob", "SCRIPT does_not_exist.py\n");

        let source = format!("LOAD_WORKFLOW_JOB {} plot\n", job.display());
        let mut warnings = Vec::new();
        let (jobs, _, _) =
            load_workflows(&dict(&source), &SubstitutionTable::new(), Path::new("."), &mut warnings).unwrap();
        assert!(jobs.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("not found"));
    }

    #[test]
    fn test_no_executable_or_script_is_hard_error() {
        let dir = tempdir().unwrap();
        let job = write(dir.path(), "broken.wfjob", "MIN_ARG 1\n");

        let source = format!("LOAD_WORKFLOW_JOB {} broken\n", job.display());
        let mut warnings = Vec::new();
        let errors = load_workflows(&dict(&source), &SubstitutionTable::new(), Path::new("."), &mut warnings)
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("neither EXECUTABLE nor SCRIPT"));
    }

    #[test]
    fn test_unknown_step_job_is_hard_error() {
        let dir = tempdir().unwrap();
        let flow = write(dir.path(), "nightly.wf", "no_such_job x\n");

        let source = format!("LOAD_WORKFLOW {} nightly\n", flow.display());
        let mut warnings = Vec::new();
        let errors = load_workflows(&dict(&source), &SubstitutionTable::new(), Path::new("."), &mut warnings)
            .unwrap_err();
        assert!(errors[0].message.contains("no_such_job"));
    }

    #[test]
    fn test_missing_workflow_file_is_soft_warning() {
        let mut warnings = Vec::new();
        let (_, workflows, _) = load_workflows(
            &dict("LOAD_WORKFLOW /no/such/file.wf nightly\n"),
            &SubstitutionTable::new(),
            Path::new("."),
            &mut warnings,
        )
        .unwrap();
        assert!(workflows.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_hook_to_unknown_workflow_is_error() {
        let mut warnings = Vec::new();
        let errors = load_workflows(
            &dict("HOOK_WORKFLOW missing PRE_SIMULATION\n"),
            &SubstitutionTable::new(),
            Path::new("."),
            &mut warnings,
        )
        .unwrap_err();
        assert!(errors[0].message.contains("unknown workflow"));
    }

    #[test]
    fn test_unknown_hook_stage_is_error() {
        let dir = tempdir().unwrap();
        let job = write(dir.path(), "export.wfjob", "EXECUTABLE /bin/export\n");
        let flow = write(dir.path(), "nightly.wf", "export out\n");

        let source = format!(
            "LOAD_WORKFLOW_JOB {} export\nLOAD_WORKFLOW {} nightly\nHOOK_WORKFLOW nightly DURING_LUNCH\n",
            job.display(),
            flow.display()
        );
        let mut warnings = Vec::new();
        let errors = load_workflows(&dict(&source), &SubstitutionTable::new(), Path::new("."), &mut warnings)
            .unwrap_err();
        assert!(errors[0].message.contains("DURING_LUNCH"));
    }

    #[test]
    fn test_duplicate_workflow_last_wins_with_warning() {
        let dir = tempdir().unwrap();
        let job = write(dir.path(), "export.wfjob", "EXECUTABLE /bin/export\n");
        let first = write(dir.path(), "first.wf", "export a\n");
        let second = write(dir.path(), "second.wf", "export b\n");

        let source = format!(
            "LOAD_WORKFLOW_JOB {} export\nLOAD_WORKFLOW {} nightly\nLOAD_WORKFLOW {} nightly\n",
            job.display(),
            first.display(),
            second.display()
        );
        let mut warnings = Vec::new();
        let (_, workflows, _) =
            load_workflows(&dict(&source), &SubstitutionTable::new(), Path::new("."), &mut warnings).unwrap();
        assert_eq!(workflows.len(), 1);
        assert_eq!(workflows["nightly"].steps[0].args, vec!["b"]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("duplicate workflow"));
    }

    #[test]
    fn test_script_resolved_relative_to_declaration() {
        let dir = tempdir().unwrap();
        write(dir.path(), "plot.py", "print('ok')\n");
        let job = write(dir.path(), "plot.wfjob", "SCRIPT plot.py\n");

        let source = format!("LOAD_WORKFLOW_JOB {} plot\n", job.display());
        let mut warnings = Vec::new();
        let (jobs, _, _) =
            load_workflows(&dict(&source), &SubstitutionTable::new(), Path::new("."), &mut warnings).unwrap();
        assert_eq!(
            jobs["plot"].script.as_deref(),
            Some(dir.path().join("plot.py").as_path())
        );
    }
}
