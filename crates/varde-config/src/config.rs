//! The resolved configuration aggregate.
//!
//! `Config` is the single hand-off object downstream consumers see. Its
//! construction is the whole pipeline: raw loading, substitution seeding,
//! independent sub-configuration builds, registry installation, forward
//! model resolution and workflow loading. Any hard error anywhere keeps
//! the aggregate from ever existing; warnings ride along on the side
//! channel instead.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

use varde_subst::{MacroKey, SubstitutionTable};

use crate::analysis::AnalysisConfig;
use crate::descriptor::ExecutionDescriptor;
use crate::ensemble::{validate_summary_requires_eclbase, EnsembleConfig};
use crate::error::{ConfigValidationError, ErrorInfo, WarningInfo};
use crate::forward_model::{self, ForwardModelInvocation};
use crate::jobs::JobRegistry;
use crate::model::{read_templates, ModelConfig};
use crate::parse::{read_config, ConfigDict, Keyword, SITE_CONFIG_DEFAULTS};
use crate::queue::{validate_max_running, QueueConfig};
use crate::workflows::{load_workflows, HookStage, Workflow, WorkflowJob};

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub substitution: SubstitutionTable,
    pub ensemble: EnsembleConfig,
    pub analysis: AnalysisConfig,
    pub queue: QueueConfig,
    pub model: ModelConfig,
    pub env_vars: IndexMap<String, String>,
    pub run_templates: Vec<(String, String)>,
    pub jobs: JobRegistry,
    pub forward_model: Vec<ForwardModelInvocation>,
    pub workflow_jobs: IndexMap<String, WorkflowJob>,
    pub workflows: IndexMap<String, Workflow>,
    pub hooked_workflows: IndexMap<HookStage, Vec<String>>,
    pub num_cpu: Option<usize>,
    pub random_seed: Option<String>,
    pub ens_path: PathBuf,
    pub runpath_file: PathBuf,
    pub user_config_path: PathBuf,
    /// Advisory diagnostics collected during loading, never fatal.
    pub warnings: Vec<WarningInfo>,
}

impl Config {
    /// Load and resolve a configuration file over the built-in site
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigValidationError> {
        Self::from_file_with_site(path, SITE_CONFIG_DEFAULTS)
    }

    /// Load over an explicit site configuration source.
    pub fn from_file_with_site(
        path: &Path,
        site_source: &str,
    ) -> Result<Self, ConfigValidationError> {
        let dict = read_config(path, site_source)?;
        Self::from_dict(&dict, path)
    }

    /// Resolve an already loaded dictionary.
    pub fn from_dict(dict: &ConfigDict, user_path: &Path) -> Result<Self, ConfigValidationError> {
        let mut warnings = Vec::new();
        Self::from_dict_collecting(dict, user_path, &mut warnings)
    }

    /// Resolution core. Warnings accumulate into the caller's vector so
    /// they survive a hard failure.
    fn from_dict_collecting(
        dict: &ConfigDict,
        user_path: &Path,
        warnings: &mut Vec<WarningInfo>,
    ) -> Result<Self, ConfigValidationError> {
        let mut errors = Vec::new();

        let config_dir = user_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut table = seed_table(dict, user_path, &config_dir, &mut errors);

        // Independent validations and sub-configuration builds all run
        // before the first terminal check so one mistake cannot hide
        // another.
        errors.extend(validate_summary_requires_eclbase(dict));
        errors.extend(validate_max_running(dict));

        let ensemble = collect(EnsembleConfig::from_dict(dict, warnings), &mut errors);
        let analysis = collect(AnalysisConfig::from_dict(dict), &mut errors);
        let queue = collect(QueueConfig::from_dict(dict), &mut errors);
        let model = collect(ModelConfig::from_dict(dict), &mut errors);

        let num_cpu = match dict.get_single(Keyword::NumCpu) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => Some(n),
                Err(_) => {
                    errors.push(
                        ErrorInfo::new(format!("NUM_CPU is not an integer: {raw:?}"))
                            .with_context(raw),
                    );
                    None
                }
            },
            None => None,
        };
        let random_seed = dict.get_single(Keyword::RandomSeed).map(str::to_string);

        let (ensemble, analysis, queue, model) = match (ensemble, analysis, queue, model) {
            (Some(ensemble), Some(analysis), Some(queue), Some(model)) if errors.is_empty() => {
                (ensemble, analysis, queue, model)
            }
            _ => return Err(ConfigValidationError::from_collected(errors)),
        };

        seed_model_keys(&mut table, &model, num_cpu);

        let mut env_vars = IndexMap::new();
        for args in dict.args(Keyword::SetEnv) {
            env_vars.insert(args[0].clone(), args[1].clone());
        }

        let run_templates = match read_templates(dict) {
            Ok(templates) => templates,
            Err(err) => {
                errors.extend(err.errors().iter().cloned());
                Vec::new()
            }
        };

        let jobs = install_jobs(dict, &table, &config_dir, warnings, &mut errors);
        let forward_model = match &jobs {
            Some(registry) => match forward_model::resolve(dict, registry, &table) {
                Ok(invocations) => invocations,
                Err(err) => {
                    errors.extend(err.errors().iter().cloned());
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let workflow_state = match load_workflows(dict, &table, &config_dir, warnings) {
            Ok(state) => Some(state),
            Err(mut e) => {
                errors.append(&mut e);
                None
            }
        };

        let ens_path = dict
            .get_single(Keyword::Enspath)
            .map(PathBuf::from)
            .unwrap_or_default();
        let runpath_file = dict
            .get_single(Keyword::RunpathFile)
            .map(PathBuf::from)
            .unwrap_or_default();

        let (jobs, workflow_state) = match (jobs, workflow_state) {
            (Some(jobs), Some(workflow_state)) if errors.is_empty() => (jobs, workflow_state),
            _ => return Err(ConfigValidationError::from_collected(errors)),
        };
        let (workflow_jobs, workflows, hooked_workflows) = workflow_state;

        debug!(
            jobs = jobs.len(),
            forward_model_steps = forward_model.len(),
            workflows = workflows.len(),
            "configuration resolved"
        );

        Ok(Self {
            substitution: table,
            ensemble,
            analysis,
            queue,
            model,
            env_vars,
            run_templates,
            jobs,
            forward_model,
            workflow_jobs,
            workflows,
            hooked_workflows,
            num_cpu,
            random_seed,
            ens_path,
            runpath_file,
            user_config_path: user_path.to_path_buf(),
            warnings: warnings.clone(),
        })
    }

    /// Load purely for the advisory side channel: every warning the load
    /// accumulated, rendered for display. Warnings gathered before a hard
    /// failure are still reported.
    pub fn suggestions(path: &Path) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Ok(dict) = read_config(path, SITE_CONFIG_DEFAULTS) {
            let _ = Self::from_dict_collecting(&dict, path, &mut warnings);
        }
        warnings.iter().map(WarningInfo::to_string).collect()
    }

    /// Forward model job names in execution order.
    pub fn forward_model_job_names(&self) -> Vec<&str> {
        self.forward_model
            .iter()
            .map(|inv| inv.job.name.as_str())
            .collect()
    }

    /// Emit the execution descriptor for one realization and iteration.
    pub fn forward_model_data(
        &self,
        run_id: &str,
        realization: usize,
        iteration: usize,
    ) -> Result<ExecutionDescriptor, ConfigValidationError> {
        ExecutionDescriptor::build(
            &self.forward_model,
            &self.substitution,
            &self.env_vars,
            &self.user_config_path,
            run_id,
            realization,
            iteration,
        )
    }
}

/// Seed the substitution table: config-file identity keys, user DEFINEs
/// and the resolved runpath file.
fn seed_table(
    dict: &ConfigDict,
    user_path: &Path,
    config_dir: &Path,
    errors: &mut Vec<ErrorInfo>,
) -> SubstitutionTable {
    let mut table = SubstitutionTable::new();

    let define = |table: &mut SubstitutionTable, key: &str, value: String| {
        // Seeded key literals are valid by construction.
        if let Ok(key) = MacroKey::new(key) {
            table.define(key, value);
        }
    };
    define(
        &mut table,
        "<CONFIG_PATH>",
        config_dir.to_string_lossy().into_owned(),
    );
    if let Some(file_name) = user_path.file_name() {
        define(
            &mut table,
            "<CONFIG_FILE>",
            file_name.to_string_lossy().into_owned(),
        );
    }
    if let Some(stem) = user_path.file_stem() {
        define(
            &mut table,
            "<CONFIG_FILE_BASE>",
            stem.to_string_lossy().into_owned(),
        );
    }

    for decl in dict.entries(Keyword::Define) {
        let args = decl.args();
        if let Err(err) = table.insert(&args[0], &args[1]) {
            errors.push(
                ErrorInfo::new(format!("invalid DEFINE key {:?}: {err}", args[0]))
                    .with_file(&decl.source.file)
                    .with_context(&decl.source.context),
            );
        }
    }

    if let Some(runpath_file) = dict.get_single(Keyword::RunpathFile) {
        define(&mut table, "<RUNPATH_FILE>", runpath_file.to_string());
    }
    table
}

/// Derived keys only known once the model config exists.
fn seed_model_keys(table: &mut SubstitutionTable, model: &ModelConfig, num_cpu: Option<usize>) {
    let define = |table: &mut SubstitutionTable, key: &str, value: String| {
        if let Ok(key) = MacroKey::new(key) {
            table.define(key, value);
        }
    };
    define(table, "<RUNPATH>", model.runpath_format.clone());
    if let Some(eclbase) = &model.eclbase_format {
        define(table, "<ECLBASE>", eclbase.clone());
    }
    if let Some(num_cpu) = num_cpu {
        define(table, "<NUM_CPU>", num_cpu.to_string());
    }
}

fn collect<T>(result: Result<T, Vec<ErrorInfo>>, errors: &mut Vec<ErrorInfo>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(mut e) => {
            errors.append(&mut e);
            None
        }
    }
}

fn install_jobs(
    dict: &ConfigDict,
    table: &SubstitutionTable,
    config_dir: &Path,
    warnings: &mut Vec<WarningInfo>,
    errors: &mut Vec<ErrorInfo>,
) -> Option<JobRegistry> {
    let mut declarations = Vec::new();
    for decl in dict.entries(Keyword::InstallJob) {
        let args = decl.args();
        match table.substitute(&args[1], "expanding INSTALL_JOB path", varde_subst::DEFAULT_BUDGET)
        {
            Ok(path) => {
                declarations.push((args[0].clone(), resolve_path(config_dir, &path)));
            }
            Err(err) => {
                errors.push(
                    ErrorInfo::new(err.to_string())
                        .with_file(&decl.source.file)
                        .with_context(&decl.source.context),
                );
            }
        }
    }

    let mut directories = Vec::new();
    for decl in dict.entries(Keyword::InstallJobDirectory) {
        let args = decl.args();
        match table.substitute(
            &args[0],
            "expanding INSTALL_JOB_DIRECTORY path",
            varde_subst::DEFAULT_BUDGET,
        ) {
            Ok(dir) => directories.push(resolve_path(config_dir, &dir)),
            Err(err) => {
                errors.push(
                    ErrorInfo::new(err.to_string())
                        .with_file(&decl.source.file)
                        .with_context(&decl.source.context),
                );
            }
        }
    }

    match JobRegistry::install(&declarations, &directories, warnings) {
        Ok(registry) => Some(registry),
        Err(err) => {
            errors.extend(err.errors().iter().cloned());
            None
        }
    }
}

/// Paths in the configuration are relative to the config directory.
fn resolve_path(config_dir: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_dir.join(path)
    }
}
