//! Structured diagnostics for configuration loading.
//!
//! Validation is multi-phase and deliberately not fail-fast: independent
//! checks each return a list of [`ErrorInfo`] and callers concatenate the
//! lists before deciding whether to abort. A user fixing one mistake sees
//! every other independent mistake in the same run.
//!
//! # Design
//!
//! - `ErrorInfo` — one hard diagnostic, tagged with the file and the
//!   original source fragment it came from
//! - `WarningInfo` — advisory diagnostic, retained on a side channel and
//!   never fatal
//! - `ConfigValidationError` — the terminal aggregate; a phase either
//!   produces a fully valid result or raises this with the complete set

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A single hard validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Human-readable explanation.
    pub message: String,
    /// Configuration or declaration file the diagnostic refers to.
    pub file: Option<PathBuf>,
    /// Original source fragment, for pinpointing the offending text.
    pub context: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            context: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}: ", file.display())?;
        }
        write!(f, "{}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, " (at {context:?})")?;
        }
        Ok(())
    }
}

/// An advisory diagnostic. Same shape as [`ErrorInfo`], different fate:
/// warnings never abort loading and are surfaced through the suggestion
/// side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningInfo {
    pub message: String,
    pub file: Option<PathBuf>,
    pub context: Option<String>,
}

impl WarningInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            context: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for WarningInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}: ", file.display())?;
        }
        write!(f, "{}", self.message)
    }
}

/// Terminal aggregate of one loading phase's hard errors.
///
/// Construction of the resolved configuration is all-or-nothing: any
/// non-empty error set anywhere in the pipeline prevents the aggregate
/// root from ever existing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ConfigValidationError {
    errors: Vec<ErrorInfo>,
}

impl ConfigValidationError {
    /// Wrap a single diagnostic.
    pub fn single(error: ErrorInfo) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// Shorthand for a one-off message tied to a file.
    pub fn message(message: impl Into<String>, file: &Path) -> Self {
        Self::single(ErrorInfo::new(message).with_file(file))
    }

    /// Convert a non-empty accumulator into an error. Callers check
    /// emptiness first; an empty set means the phase succeeded.
    pub fn from_collected(errors: Vec<ErrorInfo>) -> Self {
        debug_assert!(!errors.is_empty());
        Self { errors }
    }

    /// The terminal check: `Ok(value)` when no errors accumulated.
    pub fn check<T>(value: T, errors: Vec<ErrorInfo>) -> Result<T, Self> {
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(Self::from_collected(errors))
        }
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// One diagnostic per line, for terminal output.
    pub fn cli_message(&self) -> String {
        self.errors
            .iter()
            .map(ErrorInfo::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            return write!(f, "{}", self.errors[0]);
        }
        write!(f, "{} configuration errors:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl From<ErrorInfo> for ConfigValidationError {
    fn from(error: ErrorInfo) -> Self {
        Self::single(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_display() {
        let err = ErrorInfo::new("bad keyword")
            .with_file("/tmp/test.vrd")
            .with_context("QUEUE_OPTION");
        let text = err.to_string();
        assert!(text.contains("/tmp/test.vrd"));
        assert!(text.contains("bad keyword"));
        assert!(text.contains("QUEUE_OPTION"));
    }

    #[test]
    fn test_aggregate_display_lists_all() {
        let err = ConfigValidationError::from_collected(vec![
            ErrorInfo::new("first problem"),
            ErrorInfo::new("second problem"),
        ]);
        assert_eq!(err.len(), 2);
        let text = err.to_string();
        assert!(text.contains("first problem"));
        assert!(text.contains("second problem"));
    }

    #[test]
    fn test_check_passes_through_on_empty() {
        let value = ConfigValidationError::check(42, Vec::new()).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_check_fails_on_nonempty() {
        let err = ConfigValidationError::check((), vec![ErrorInfo::new("boom")]).unwrap_err();
        assert_eq!(err.len(), 1);
    }
}
