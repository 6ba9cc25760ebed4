//! Model sub-configuration: run paths, job naming and run templates.

use std::path::PathBuf;

use crate::error::{ConfigValidationError, ErrorInfo};
use crate::parse::{read_to_string_checked, ConfigDict, Keyword};

/// Default runpath format when no RUNPATH keyword is declared.
pub const DEFAULT_RUNPATH: &str = "simulations/realization-<REAL>/iter-<ITER>";
/// Default job name format when no JOBNAME keyword is declared.
pub const DEFAULT_JOB_NAME: &str = "<CONFIG_FILE_BASE>-<REAL>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Per-realization job name format; may reference `<REAL>`/`<ITER>`.
    pub job_name_format: String,
    /// Simulator base name format, with `%d` normalized to `<REAL>`.
    pub eclbase_format: Option<String>,
    /// Run directory format; may reference `<REAL>`/`<ITER>`.
    pub runpath_format: String,
    /// Simulator input deck, when declared.
    pub data_file: Option<PathBuf>,
}

impl ModelConfig {
    pub fn from_dict(dict: &ConfigDict) -> Result<Self, Vec<ErrorInfo>> {
        let job_name_format = dict
            .get_single(Keyword::JobName)
            .map(normalize_format)
            .unwrap_or_else(|| DEFAULT_JOB_NAME.to_string());
        let eclbase_format = dict.get_single(Keyword::EclBase).map(normalize_format);
        let runpath_format = dict
            .get_single(Keyword::Runpath)
            .map(normalize_format)
            .unwrap_or_else(|| DEFAULT_RUNPATH.to_string());
        let data_file = dict.get_single(Keyword::DataFile).map(PathBuf::from);

        Ok(Self {
            job_name_format,
            eclbase_format,
            runpath_format,
            data_file,
        })
    }
}

/// Legacy `%d` placeholders mean the realization index.
fn normalize_format(format: &str) -> String {
    format.replace("%d", "<REAL>")
}

/// Collect run templates: the DATA_FILE/ECLBASE pair synthesizes one
/// (the simulator deck gets macro replacement and lands next to the
/// base name), then explicit RUN_TEMPLATE declarations follow in order.
///
/// The deck must pass the encoding gate; a non-UTF-8 byte there is a
/// fatal error, not aggregated.
pub fn read_templates(dict: &ConfigDict) -> Result<Vec<(String, String)>, ConfigValidationError> {
    let mut templates = Vec::new();
    if let (Some(data_file), Some(eclbase)) = (
        dict.get_single(Keyword::DataFile),
        dict.get_single(Keyword::EclBase),
    ) {
        read_to_string_checked(std::path::Path::new(data_file))?;
        let target = format!("{}.DATA", normalize_format(eclbase));
        templates.push((data_file.to_string(), target));
    }
    for args in dict.args(Keyword::RunTemplate) {
        templates.push((args[0].clone(), args[1].clone()));
    }
    Ok(templates)
}
