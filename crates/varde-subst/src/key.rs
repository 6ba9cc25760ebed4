//! Validated macro key type.
//!
//! Keys are angle-bracket delimited tokens such as `<CONFIG_PATH>`.
//! Validating the delimiter syntax at construction catches malformed keys
//! where they are declared instead of at substitution time.

use std::borrow::Borrow;
use std::fmt;

use thiserror::Error;

/// Error constructing a [`MacroKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroKeyError {
    /// Key was empty or consisted only of delimiters.
    #[error("macro key is empty")]
    Empty,
    /// Key was not wrapped in `<` and `>`.
    #[error("macro key {0:?} must be delimited by '<' and '>'")]
    MissingDelimiters(String),
    /// Key body contained a character that can never match in text.
    #[error("macro key {key:?} contains invalid character {ch:?}")]
    InvalidCharacter { key: String, ch: char },
}

/// An angle-bracket delimited macro key, e.g. `<RUNPATH>`.
///
/// The wrapper guarantees the delimiter syntax holds, so a table never
/// stores a key that cannot occur as a token in configuration text.
///
/// # Examples
///
/// ```
/// # use varde_subst::MacroKey;
/// let key = MacroKey::new("<RUNPATH>").unwrap();
/// assert_eq!(key.as_str(), "<RUNPATH>");
/// assert_eq!(key.name(), "RUNPATH");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacroKey(String);

impl MacroKey {
    /// Validate and wrap a key string.
    pub fn new(key: impl Into<String>) -> Result<Self, MacroKeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(MacroKeyError::Empty);
        }
        if !key.starts_with('<') || !key.ends_with('>') {
            return Err(MacroKeyError::MissingDelimiters(key));
        }
        let body = &key[1..key.len() - 1];
        if body.is_empty() {
            return Err(MacroKeyError::Empty);
        }
        if let Some(ch) = body.chars().find(|c| c.is_whitespace() || matches!(c, '<' | '>')) {
            return Err(MacroKeyError::InvalidCharacter { key, ch });
        }
        Ok(Self(key))
    }

    /// The full delimited key, `<NAME>`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key body without delimiters.
    pub fn name(&self) -> &str {
        &self.0[1..self.0.len() - 1]
    }
}

impl fmt::Display for MacroKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for MacroKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MacroKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
