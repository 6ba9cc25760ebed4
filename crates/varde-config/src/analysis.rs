//! Analysis sub-configuration.

use crate::error::ErrorInfo;
use crate::parse::{ConfigDict, Keyword};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Minimum number of realizations that must succeed for an update.
    pub min_realizations: usize,
    /// Wall-clock limit per realization, in seconds. `None` is unlimited.
    pub max_runtime: Option<u64>,
}

impl AnalysisConfig {
    pub fn from_dict(dict: &ConfigDict) -> Result<Self, Vec<ErrorInfo>> {
        let mut errors = Vec::new();

        let min_realizations = match dict.get_single(Keyword::MinRealizations) {
            Some(raw) => raw.parse::<usize>().unwrap_or_else(|_| {
                errors.push(
                    ErrorInfo::new(format!("MIN_REALIZATIONS is not an integer: {raw:?}"))
                        .with_context(raw),
                );
                0
            }),
            None => 0,
        };

        let max_runtime = match dict.get_single(Keyword::MaxRuntime) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => None,
                Ok(seconds) => Some(seconds),
                Err(_) => {
                    errors.push(
                        ErrorInfo::new(format!("MAX_RUNTIME is not an integer: {raw:?}"))
                            .with_context(raw),
                    );
                    None
                }
            },
            None => None,
        };

        if errors.is_empty() {
            Ok(Self {
                min_realizations,
                max_runtime,
            })
        } else {
            Err(errors)
        }
    }
}
