//! Ensemble parameter configuration.
//!
//! GEN_KW declares a parameter group sampled per realization; SUMMARY
//! selects simulator summary vectors to load. Validation here is
//! independent of the other sub-configurations: it returns its own error
//! list and the caller concatenates.

use crate::error::{ErrorInfo, WarningInfo};
use crate::parse::{ConfigDict, Keyword};

/// One GEN_KW parameter group declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenKwConfig {
    pub name: String,
    /// Remaining declaration arguments: template, output file,
    /// distribution file and `OPTION:VALUE` tokens, as declared.
    pub args: Vec<String>,
}

impl GenKwConfig {
    /// First argument containing `needle`, case-insensitive. Used to find
    /// `INIT_FILES:` and `FORWARD_INIT:` option tokens.
    fn find_arg(&self, needle: &str) -> Option<&str> {
        let needle = needle.to_lowercase();
        self.args
            .iter()
            .find(|arg| arg.to_lowercase().contains(&needle))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsembleConfig {
    pub num_realizations: usize,
    pub gen_kws: Vec<GenKwConfig>,
    pub summary_keys: Vec<String>,
}

impl EnsembleConfig {
    pub fn from_dict(
        dict: &ConfigDict,
        warnings: &mut Vec<WarningInfo>,
    ) -> Result<Self, Vec<ErrorInfo>> {
        let mut errors = Vec::new();

        let num_realizations = match dict.get_single(Keyword::NumRealizations) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    errors.push(
                        ErrorInfo::new(format!("NUM_REALIZATIONS is not a positive integer: {raw:?}"))
                            .with_context(raw),
                    );
                    1
                }
            },
            None => 1,
        };

        let mut gen_kws: Vec<GenKwConfig> = Vec::new();
        for (args, source) in dict
            .entries(Keyword::GenKw)
            .map(|d| (d.args(), &d.source))
        {
            let name = args[0].clone();
            if gen_kws.iter().any(|g| g.name == name) {
                errors.push(
                    ErrorInfo::new(format!("found two GEN_KW {name:?} declarations"))
                        .with_file(&source.file)
                        .with_context(&source.context),
                );
                continue;
            }
            gen_kws.push(GenKwConfig {
                name,
                args: args[1..].to_vec(),
            });
        }

        for gen_kw in &gen_kws {
            if gen_kw.find_arg("FORWARD_INIT:TRUE").is_some() {
                errors.push(ErrorInfo::new(format!(
                    "GEN_KW {}: loading parameters from files created by the \
                     forward model is not supported",
                    gen_kw.name
                )));
            }
            if let Some(init_files) = gen_kw.find_arg("INIT_FILES:") {
                if !init_files.contains('%') {
                    errors.push(
                        ErrorInfo::new(format!(
                            "GEN_KW {}: loading from files requires a %d \
                             realization placeholder in the file pattern",
                            gen_kw.name
                        ))
                        .with_context(init_files),
                    );
                }
            }
        }

        let mut summary_keys: Vec<String> = Vec::new();
        for args in dict.args(Keyword::Summary) {
            for key in args {
                if summary_keys.contains(key) {
                    warnings.push(
                        WarningInfo::new(format!("SUMMARY key {key:?} is included twice"))
                            .with_context(key),
                    );
                    continue;
                }
                summary_keys.push(key.clone());
            }
        }

        if errors.is_empty() {
            Ok(Self {
                num_realizations,
                gen_kws,
                summary_keys,
            })
        } else {
            Err(errors)
        }
    }
}

/// Cross-field check: SUMMARY loading needs the eclipse base name to
/// locate summary files.
pub fn validate_summary_requires_eclbase(dict: &ConfigDict) -> Vec<ErrorInfo> {
    let mut errors = Vec::new();
    if dict.contains(Keyword::Summary) && !dict.contains(Keyword::EclBase) {
        let source = dict
            .entries(Keyword::Summary)
            .next()
            .map(|d| d.source.clone());
        let mut error = ErrorInfo::new(
            "when using SUMMARY keyword, the config must also specify ECLBASE",
        );
        if let Some(source) = source {
            error = error.with_file(source.file).with_context(source.context);
        }
        errors.push(error);
    }
    errors
}
