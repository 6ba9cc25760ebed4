//! Raw configuration loading.
//!
//! The grammar boundary: configuration text goes in, a normalized
//! [`ConfigDict`] comes out. Each recognized keyword becomes a typed
//! declaration immediately at this boundary, so downstream components
//! never operate on untyped token lists. The site-wide default
//! configuration is parsed first and the user file is layered on top:
//! single-valued keywords take the last (user) occurrence, list keywords
//! accumulate both.

mod lexer;

pub use lexer::{lex_lines, LineToken, RawLine};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigValidationError, ErrorInfo};

/// Default ensemble storage directory, relative to the config file.
pub const DEFAULT_ENSPATH: &str = "storage";
/// Default runpath-list file name, relative to the config file.
pub const DEFAULT_RUNPATH_FILE: &str = ".runpath_list";

/// Site-wide defaults layered under every user configuration.
///
/// Deliberately minimal; a deployment overrides this through the site
/// config mechanism in the tools layer.
pub const SITE_CONFIG_DEFAULTS: &str = "\
QUEUE_SYSTEM LOCAL
MAX_SUBMIT 2
";

/// Recognized configuration keywords, one variant per keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Define,
    Enspath,
    RunpathFile,
    Runpath,
    JobName,
    NumRealizations,
    MinRealizations,
    NumCpu,
    RandomSeed,
    SetEnv,
    InstallJob,
    InstallJobDirectory,
    ForwardModel,
    SimulationJob,
    LoadWorkflowJob,
    WorkflowJobDirectory,
    LoadWorkflow,
    HookWorkflow,
    GenKw,
    DataFile,
    EclBase,
    Summary,
    RunTemplate,
    QueueSystem,
    QueueOption,
    MaxSubmit,
    MaxRuntime,
}

impl Keyword {
    pub fn from_str(word: &str) -> Option<Self> {
        Some(match word {
            "DEFINE" => Self::Define,
            "ENSPATH" => Self::Enspath,
            "RUNPATH_FILE" => Self::RunpathFile,
            "RUNPATH" => Self::Runpath,
            "JOBNAME" => Self::JobName,
            "NUM_REALIZATIONS" => Self::NumRealizations,
            "MIN_REALIZATIONS" => Self::MinRealizations,
            "NUM_CPU" => Self::NumCpu,
            "RANDOM_SEED" => Self::RandomSeed,
            "SETENV" => Self::SetEnv,
            "INSTALL_JOB" => Self::InstallJob,
            "INSTALL_JOB_DIRECTORY" => Self::InstallJobDirectory,
            "FORWARD_MODEL" => Self::ForwardModel,
            "SIMULATION_JOB" => Self::SimulationJob,
            "LOAD_WORKFLOW_JOB" => Self::LoadWorkflowJob,
            "WORKFLOW_JOB_DIRECTORY" => Self::WorkflowJobDirectory,
            "LOAD_WORKFLOW" => Self::LoadWorkflow,
            "HOOK_WORKFLOW" => Self::HookWorkflow,
            "GEN_KW" => Self::GenKw,
            "DATA_FILE" => Self::DataFile,
            "ECLBASE" => Self::EclBase,
            "SUMMARY" => Self::Summary,
            "RUN_TEMPLATE" => Self::RunTemplate,
            "QUEUE_SYSTEM" => Self::QueueSystem,
            "QUEUE_OPTION" => Self::QueueOption,
            "MAX_SUBMIT" => Self::MaxSubmit,
            "MAX_RUNTIME" => Self::MaxRuntime,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Define => "DEFINE",
            Self::Enspath => "ENSPATH",
            Self::RunpathFile => "RUNPATH_FILE",
            Self::Runpath => "RUNPATH",
            Self::JobName => "JOBNAME",
            Self::NumRealizations => "NUM_REALIZATIONS",
            Self::MinRealizations => "MIN_REALIZATIONS",
            Self::NumCpu => "NUM_CPU",
            Self::RandomSeed => "RANDOM_SEED",
            Self::SetEnv => "SETENV",
            Self::InstallJob => "INSTALL_JOB",
            Self::InstallJobDirectory => "INSTALL_JOB_DIRECTORY",
            Self::ForwardModel => "FORWARD_MODEL",
            Self::SimulationJob => "SIMULATION_JOB",
            Self::LoadWorkflowJob => "LOAD_WORKFLOW_JOB",
            Self::WorkflowJobDirectory => "WORKFLOW_JOB_DIRECTORY",
            Self::LoadWorkflow => "LOAD_WORKFLOW",
            Self::HookWorkflow => "HOOK_WORKFLOW",
            Self::GenKw => "GEN_KW",
            Self::DataFile => "DATA_FILE",
            Self::EclBase => "ECLBASE",
            Self::Summary => "SUMMARY",
            Self::RunTemplate => "RUN_TEMPLATE",
            Self::QueueSystem => "QUEUE_SYSTEM",
            Self::QueueOption => "QUEUE_OPTION",
            Self::MaxSubmit => "MAX_SUBMIT",
            Self::MaxRuntime => "MAX_RUNTIME",
        }
    }

    /// Argument count bounds: (min, max). `None` means unbounded.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Define => (2, None),
            Self::Enspath
            | Self::RunpathFile
            | Self::Runpath
            | Self::JobName
            | Self::NumRealizations
            | Self::MinRealizations
            | Self::NumCpu
            | Self::RandomSeed
            | Self::InstallJobDirectory
            | Self::WorkflowJobDirectory
            | Self::DataFile
            | Self::EclBase
            | Self::QueueSystem
            | Self::MaxSubmit
            | Self::MaxRuntime => (1, Some(1)),
            Self::SetEnv | Self::InstallJob | Self::HookWorkflow => (2, Some(2)),
            Self::LoadWorkflowJob | Self::LoadWorkflow => (1, Some(2)),
            Self::ForwardModel | Self::SimulationJob | Self::Summary => (1, None),
            Self::GenKw => (2, None),
            Self::RunTemplate => (2, None),
            Self::QueueOption => (2, None),
        }
    }

    /// Whether later declarations replace earlier ones when the user
    /// config is layered over the site config.
    pub fn is_single_valued(self) -> bool {
        matches!(
            self,
            Self::Enspath
                | Self::RunpathFile
                | Self::Runpath
                | Self::JobName
                | Self::NumRealizations
                | Self::MinRealizations
                | Self::NumCpu
                | Self::RandomSeed
                | Self::DataFile
                | Self::EclBase
                | Self::QueueSystem
                | Self::MaxSubmit
                | Self::MaxRuntime
        )
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a declaration came from, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub file: PathBuf,
    /// Original line text.
    pub context: String,
}

/// Forward model invocation arguments, in either grammar style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardModelArgs {
    /// Raw parenthesized body, parsed `<KEY>=value` at resolution time.
    Flat(String),
    /// Pre-split key/value pairs from a stricter grammar variant; loaded
    /// directly without re-parsing.
    Pairs(Vec<(String, String)>),
}

/// Typed payload of one declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclValue {
    /// Plain argument tuple.
    Args(Vec<String>),
    /// Templated forward model invocation.
    ForwardModel {
        job: String,
        args: Option<ForwardModelArgs>,
    },
}

/// One configuration declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub keyword: Keyword,
    pub value: DeclValue,
    pub source: SourceRef,
}

impl Decl {
    /// Plain argument tuple, empty for forward model declarations.
    pub fn args(&self) -> &[String] {
        match &self.value {
            DeclValue::Args(args) => args,
            DeclValue::ForwardModel { .. } => &[],
        }
    }
}

/// Normalized keyword -> argument-tuples mapping.
///
/// A keyword may appear any number of times; every appearance is a
/// separate entry in declaration order. The dict is the hand-off shape
/// between the grammar boundary and every downstream builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDict {
    decls: Vec<Decl>,
}

impl ConfigDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, decl: Decl) {
        self.decls.push(decl);
    }

    pub fn decls(&self) -> &[Decl] {
        &self.decls
    }

    /// All entries for a keyword, in declaration order.
    pub fn entries(&self, keyword: Keyword) -> impl Iterator<Item = &Decl> {
        self.decls.iter().filter(move |d| d.keyword == keyword)
    }

    /// Argument tuples for a keyword, in declaration order.
    pub fn args(&self, keyword: Keyword) -> impl Iterator<Item = &[String]> {
        self.entries(keyword).map(Decl::args)
    }

    pub fn contains(&self, keyword: Keyword) -> bool {
        self.decls.iter().any(|d| d.keyword == keyword)
    }

    /// Last value of a single-valued keyword. With the site config parsed
    /// first, the last occurrence is the user's override.
    pub fn get_single(&self, keyword: Keyword) -> Option<&str> {
        self.entries(keyword)
            .last()
            .and_then(|d| d.args().first())
            .map(String::as_str)
    }

    /// Requested forward model invocations of both declaration styles,
    /// in original declaration order.
    pub fn invocations(&self) -> impl Iterator<Item = &Decl> {
        self.decls.iter().filter(|d| {
            matches!(
                d.keyword,
                Keyword::ForwardModel | Keyword::SimulationJob
            )
        })
    }
}

/// Read a file, rejecting invalid UTF-8 with a fatal error naming the
/// offending byte. Not aggregated with other diagnostics: the parser
/// cannot continue past encoding damage.
pub fn read_to_string_checked(path: &Path) -> Result<String, ConfigValidationError> {
    let bytes = fs::read(path).map_err(|err| {
        ConfigValidationError::message(format!("could not read {}: {err}", path.display()), path)
    })?;
    String::from_utf8(bytes).map_err(|err| {
        let offset = err.utf8_error().valid_up_to();
        let byte = err.as_bytes()[offset];
        ConfigValidationError::message(
            format!(
                "unsupported non UTF-8 byte 0x{byte:02x} at offset {offset} in file: {}",
                path.display()
            ),
            path,
        )
    })
}

/// Parse configuration text into typed declarations.
///
/// Shape errors (unknown keywords, argument counts outside the keyword's
/// bounds) are aggregated across the whole source rather than reported
/// one at a time.
pub fn parse_source(source: &str, file: &Path) -> Result<Vec<Decl>, ConfigValidationError> {
    let mut decls = Vec::new();
    let mut errors = Vec::new();

    for line in lex_lines(source) {
        let (first, rest) = match line.tokens.split_first() {
            Some(split) => split,
            None => continue,
        };
        let keyword_word = match first {
            LineToken::Word(w) => w.as_str(),
            LineToken::Invocation { .. } => {
                errors.push(
                    ErrorInfo::new(format!("line {} does not start with a keyword", line.line_no))
                        .with_file(file)
                        .with_context(&line.text),
                );
                continue;
            }
        };
        let keyword = match Keyword::from_str(keyword_word) {
            Some(kw) => kw,
            None => {
                errors.push(
                    ErrorInfo::new(format!("unknown keyword {keyword_word:?}"))
                        .with_file(file)
                        .with_context(&line.text),
                );
                continue;
            }
        };
        let source_ref = SourceRef {
            file: file.to_path_buf(),
            context: line.text.clone(),
        };

        if keyword == Keyword::ForwardModel {
            match parse_forward_model(rest) {
                Ok((job, args)) => decls.push(Decl {
                    keyword,
                    value: DeclValue::ForwardModel { job, args },
                    source: source_ref,
                }),
                Err(message) => {
                    errors.push(
                        ErrorInfo::new(message)
                            .with_file(file)
                            .with_context(&line.text),
                    );
                }
            }
            continue;
        }

        let mut args = Vec::with_capacity(rest.len());
        let mut bad_token = false;
        for token in rest {
            match token {
                LineToken::Word(w) => args.push(w.clone()),
                LineToken::Invocation { .. } => {
                    errors.push(
                        ErrorInfo::new(format!(
                            "parenthesized arguments are only valid for FORWARD_MODEL, not {keyword}"
                        ))
                        .with_file(file)
                        .with_context(&line.text),
                    );
                    bad_token = true;
                    break;
                }
            }
        }
        if bad_token {
            continue;
        }

        // DEFINE joins everything after the key into one value, so a
        // definition may contain spaces without quoting.
        if keyword == Keyword::Define && args.len() > 2 {
            let value = args[1..].join(" ");
            args.truncate(1);
            args.push(value);
        }

        let (min, max) = keyword.arity();
        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            let expected = match max {
                Some(m) if m == min => format!("{min}"),
                Some(m) => format!("{min}..{m}"),
                None => format!("at least {min}"),
            };
            errors.push(
                ErrorInfo::new(format!(
                    "{keyword} takes {expected} argument(s), got {}",
                    args.len()
                ))
                .with_file(file)
                .with_context(&line.text),
            );
            continue;
        }

        decls.push(Decl {
            keyword,
            value: DeclValue::Args(args),
            source: source_ref,
        });
    }

    ConfigValidationError::check(decls, errors)
}

fn parse_forward_model(
    rest: &[LineToken],
) -> Result<(String, Option<ForwardModelArgs>), String> {
    match rest {
        [LineToken::Word(job)] => Ok((job.clone(), None)),
        [LineToken::Invocation { job, args }] => {
            if args.trim().is_empty() {
                Ok((job.clone(), None))
            } else {
                Ok((job.clone(), Some(ForwardModelArgs::Flat(args.clone()))))
            }
        }
        [] => Err("FORWARD_MODEL takes a job name".to_string()),
        _ => Err("FORWARD_MODEL takes a single job invocation".to_string()),
    }
}

/// Parse one file through the UTF-8 gate.
pub fn parse_file(path: &Path) -> Result<Vec<Decl>, ConfigValidationError> {
    let source = read_to_string_checked(path)?;
    parse_source(&source, path)
}

/// Load the full configuration dict: site defaults first, then the user
/// file layered on top, then path-default injection.
pub fn read_config(
    user_path: &Path,
    site_source: &str,
) -> Result<ConfigDict, ConfigValidationError> {
    let mut dict = ConfigDict::new();
    for decl in parse_source(site_source, Path::new("<site-config>"))? {
        dict.push(decl);
    }
    for decl in parse_file(user_path)? {
        dict.push(decl);
    }

    let config_dir = user_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    apply_path_defaults(&mut dict, &config_dir, user_path);
    Ok(dict)
}

/// Inject path defaults relative to the config directory: a missing
/// ENSPATH or RUNPATH_FILE is synthesized, and a relative RUNPATH_FILE is
/// resolved against the config directory.
pub fn apply_path_defaults(dict: &mut ConfigDict, config_dir: &Path, user_path: &Path) {
    if !dict.contains(Keyword::Enspath) {
        dict.push(synthesized(
            Keyword::Enspath,
            vec![config_dir.join(DEFAULT_ENSPATH).to_string_lossy().into_owned()],
            user_path,
        ));
    }
    match dict.get_single(Keyword::RunpathFile) {
        None => {
            dict.push(synthesized(
                Keyword::RunpathFile,
                vec![config_dir
                    .join(DEFAULT_RUNPATH_FILE)
                    .to_string_lossy()
                    .into_owned()],
                user_path,
            ));
        }
        Some(declared) if !Path::new(declared).is_absolute() => {
            let resolved = config_dir.join(declared).to_string_lossy().into_owned();
            dict.push(synthesized(Keyword::RunpathFile, vec![resolved], user_path));
        }
        Some(_) => {}
    }
}

fn synthesized(keyword: Keyword, args: Vec<String>, user_path: &Path) -> Decl {
    Decl {
        keyword,
        value: DeclValue::Args(args),
        source: SourceRef {
            file: user_path.to_path_buf(),
            context: format!("<default {keyword}>"),
        },
    }
}
