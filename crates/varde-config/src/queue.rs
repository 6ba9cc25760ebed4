//! Queue sub-configuration.
//!
//! The queue system actually running jobs is out of scope; this only
//! validates and carries the declarations downstream consumers need.

use std::fmt;

use crate::error::ErrorInfo;
use crate::parse::{ConfigDict, Keyword};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueSystem {
    #[default]
    Local,
    Lsf,
    Slurm,
    Torque,
}

impl QueueSystem {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "LOCAL" => Self::Local,
            "LSF" => Self::Lsf,
            "SLURM" => Self::Slurm,
            "TORQUE" => Self::Torque,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Lsf => "LSF",
            Self::Slurm => "SLURM",
            Self::Torque => "TORQUE",
        }
    }
}

impl fmt::Display for QueueSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One QUEUE_OPTION declaration: `QUEUE_OPTION <system> <option> [values...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOption {
    pub system: String,
    pub option: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueConfig {
    pub system: QueueSystem,
    pub max_submit: usize,
    pub options: Vec<QueueOption>,
}

impl QueueConfig {
    pub fn from_dict(dict: &ConfigDict) -> Result<Self, Vec<ErrorInfo>> {
        let mut errors = Vec::new();

        let system = match dict.get_single(Keyword::QueueSystem) {
            Some(raw) => QueueSystem::from_name(raw).unwrap_or_else(|| {
                errors.push(
                    ErrorInfo::new(format!("unknown queue system {raw:?}")).with_context(raw),
                );
                QueueSystem::Local
            }),
            None => QueueSystem::Local,
        };

        let max_submit = match dict.get_single(Keyword::MaxSubmit) {
            Some(raw) => raw.parse::<usize>().unwrap_or_else(|_| {
                errors.push(
                    ErrorInfo::new(format!("MAX_SUBMIT is not an integer: {raw:?}"))
                        .with_context(raw),
                );
                2
            }),
            None => 2,
        };

        let options = dict
            .args(Keyword::QueueOption)
            .map(|args| QueueOption {
                system: args[0].clone(),
                option: args[1].clone(),
                values: args[2..].to_vec(),
            })
            .collect();

        if errors.is_empty() {
            Ok(Self {
                system,
                max_submit,
                options,
            })
        } else {
            Err(errors)
        }
    }
}

/// Cross-field check run with the other dictionary-level validations:
/// every `QUEUE_OPTION <system> MAX_RUNNING <value>` must carry a
/// non-negative integer.
pub fn validate_max_running(dict: &ConfigDict) -> Vec<ErrorInfo> {
    let mut errors = Vec::new();
    for decl in dict.entries(Keyword::QueueOption) {
        let args = decl.args();
        if args[1] != "MAX_RUNNING" {
            continue;
        }
        let value = args.get(2).map(String::as_str).unwrap_or("");
        match value.parse::<i64>() {
            Ok(n) if n < 0 => {
                errors.push(
                    ErrorInfo::new(format!("QUEUE_OPTION MAX_RUNNING is negative: {value:?}"))
                        .with_file(&decl.source.file)
                        .with_context(&decl.source.context),
                );
            }
            Ok(_) => {}
            Err(_) => {
                errors.push(
                    ErrorInfo::new(format!(
                        "QUEUE_OPTION MAX_RUNNING is not an integer: {value:?}"
                    ))
                    .with_file(&decl.source.file)
                    .with_context(&decl.source.context),
                );
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;
    use std::path::Path;

    fn dict(source: &str) -> ConfigDict {
        let mut dict = ConfigDict::new();
        for d in parse_source(source, Path::new("test.vrd")).unwrap() {
            dict.push(d);
        }
        dict
    }

    #[test]
    fn test_defaults() {
        let cfg = QueueConfig::from_dict(&dict("")).unwrap();
        assert_eq!(cfg.system, QueueSystem::Local);
        assert_eq!(cfg.max_submit, 2);
        assert!(cfg.options.is_empty());
    }

    #[test]
    fn test_options_collected_in_order() {
        let cfg = QueueConfig::from_dict(&dict(
            "QUEUE_SYSTEM SLURM\nQUEUE_OPTION SLURM PARTITION batch\nQUEUE_OPTION SLURM MAX_RUNNING 10\n",
        ))
        .unwrap();
        assert_eq!(cfg.system, QueueSystem::Slurm);
        assert_eq!(cfg.options.len(), 2);
        assert_eq!(cfg.options[0].option, "PARTITION");
    }

    #[test]
    fn test_max_running_not_an_integer() {
        let errors = validate_max_running(&dict("QUEUE_OPTION LOCAL MAX_RUNNING ten\n"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("not an integer"));
    }

    #[test]
    fn test_max_running_negative() {
        let errors = validate_max_running(&dict("QUEUE_OPTION LOCAL MAX_RUNNING -1\n"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("negative"));
    }

    #[test]
    fn test_max_running_valid() {
        let errors = validate_max_running(&dict("QUEUE_OPTION LOCAL MAX_RUNNING 0\n"));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_unknown_queue_system_is_error() {
        let errors = QueueConfig::from_dict(&dict("QUEUE_SYSTEM CLOUD\n")).unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
