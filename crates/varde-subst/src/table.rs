//! The substitution table and its fixed-point expansion.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::key::{MacroKey, MacroKeyError};

/// Synthetic key carrying the current realization index.
pub const REAL_KEY: &str = "<REAL>";
/// Synthetic key carrying the current iteration index.
pub const ITER_KEY: &str = "<ITER>";

/// Default expansion budget for full substitution passes.
///
/// Each unit of budget is one sweep over every known key. Non-cyclic
/// tables reach a fixed point long before this. Cyclic definitions either
/// rotate back to their own input within one sweep, which is caught
/// immediately, or grow until the budget runs out.
pub const DEFAULT_BUDGET: usize = 100;

/// Failure during macro expansion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstitutionError {
    /// Expansion was still rewriting the text when the budget ran out.
    /// Indicates a cyclic definition such as `<A> -> <B>`, `<B> -> <A>`.
    #[error("substitution budget exhausted while {context}: {text:?} keeps expanding")]
    BudgetExhausted { context: String, text: String },
    /// A well-formed macro token survived expansion in a context that
    /// requires every token to resolve.
    #[error("unresolved macro {token:?} while {context}")]
    UnresolvedMacro { context: String, token: String },
}

/// Failure parsing a flat `<KEY>=value, ...` argument string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgStringError {
    #[error("missing '=' in argument {0:?}")]
    MissingEquals(String),
    #[error(transparent)]
    Key(#[from] MacroKeyError),
}

/// Ordered key -> value macro table.
///
/// Later definitions of the same key silently overwrite earlier ones;
/// this is internal bookkeeping, unlike user-facing job registries which
/// warn on duplicates. Insertion order is preserved so diagnostics that
/// walk the table are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionTable {
    entries: IndexMap<MacroKey, String>,
}

impl SubstitutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a key, overwriting any previous value.
    pub fn define(&mut self, key: MacroKey, value: impl Into<String>) {
        self.entries.insert(key, value.into());
    }

    /// Validate and define a key from raw strings.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), MacroKeyError> {
        self.define(MacroKey::new(key)?, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&MacroKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Parse a flat `"<A>=1, <B>=2"` argument string into a table.
    ///
    /// Entries are comma separated; whitespace around keys and values is
    /// trimmed. Keys must be well-formed macro keys.
    pub fn from_flat_string(args: &str) -> Result<Self, ArgStringError> {
        let mut table = Self::new();
        for part in args.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ArgStringError::MissingEquals(part.to_string()))?;
            table.define(MacroKey::new(key.trim())?, value.trim());
        }
        Ok(table)
    }

    /// One sweep: replace every occurrence of every known key, plus the
    /// given synthetic entries. The flag reports whether any replacement
    /// fired; a sweep can rewrite the text and still land back on its
    /// input when the definitions form a cycle.
    fn apply_once(&self, text: &str, extra: &[(&str, String)]) -> (String, bool) {
        let mut out = text.to_string();
        let mut changed = false;
        for (key, value) in &self.entries {
            if out.contains(key.as_str()) {
                out = out.replace(key.as_str(), value);
                changed = true;
            }
        }
        for (key, value) in extra {
            if out.contains(key) {
                out = out.replace(key, value);
                changed = true;
            }
        }
        (out, changed)
    }

    fn expand(
        &self,
        text: &str,
        extra: &[(&str, String)],
        context: &str,
        budget: usize,
    ) -> Result<String, SubstitutionError> {
        let mut current = text.to_string();
        for _ in 0..budget {
            let (next, changed) = self.apply_once(&current, extra);
            if !changed {
                return Ok(current);
            }
            if next == current {
                // Replacements fired yet the text is unchanged: the sweep
                // rotated through a cycle back to its own input.
                debug!(context, "substitution cycled back to its input");
                return Err(SubstitutionError::BudgetExhausted {
                    context: context.to_string(),
                    text: text.to_string(),
                });
            }
            current = next;
        }
        // Budget gone. If one more sweep would still rewrite the text we
        // are chasing a cycle, not converging.
        if self.apply_once(&current, extra).1 {
            debug!(context, "substitution did not reach a fixed point");
            return Err(SubstitutionError::BudgetExhausted {
                context: context.to_string(),
                text: text.to_string(),
            });
        }
        Ok(current)
    }

    /// Expand `text` to a fixed point.
    ///
    /// Unknown macros are left in place; use [`substitute_strict`] where
    /// every token must resolve.
    ///
    /// [`substitute_strict`]: SubstitutionTable::substitute_strict
    pub fn substitute(
        &self,
        text: &str,
        context: &str,
        budget: usize,
    ) -> Result<String, SubstitutionError> {
        self.expand(text, &[], context, budget)
    }

    /// Expand `text`, failing if any well-formed macro token remains.
    pub fn substitute_strict(
        &self,
        text: &str,
        context: &str,
        budget: usize,
    ) -> Result<String, SubstitutionError> {
        let out = self.expand(text, &[], context, budget)?;
        if let Some(token) = first_macro_token(&out) {
            return Err(SubstitutionError::UnresolvedMacro {
                context: context.to_string(),
                token: token.to_string(),
            });
        }
        Ok(out)
    }

    /// Expand `text` with the synthetic `<REAL>` and `<ITER>` keys bound
    /// to the given indices. The synthetic keys live only for this call.
    pub fn substitute_real_iter(
        &self,
        text: &str,
        realization: usize,
        iteration: usize,
    ) -> Result<String, SubstitutionError> {
        let extra = [
            (REAL_KEY, realization.to_string()),
            (ITER_KEY, iteration.to_string()),
        ];
        self.expand(
            text,
            &extra,
            &format!("substituting for realization {realization}, iteration {iteration}"),
            DEFAULT_BUDGET,
        )
    }

    /// A realization/iteration-specialized copy. The base table is not
    /// mutated.
    pub fn derived(&self, realization: usize, iteration: usize) -> Self {
        let mut copy = self.clone();
        // The key literals are valid by construction.
        copy.entries.insert(
            MacroKey::new(REAL_KEY).unwrap_or_else(|_| unreachable!()),
            realization.to_string(),
        );
        copy.entries.insert(
            MacroKey::new(ITER_KEY).unwrap_or_else(|_| unreachable!()),
            iteration.to_string(),
        );
        copy
    }
}

impl fmt::Display for SubstitutionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

/// Find the first well-formed macro token (`<NAME>`) in `text`.
pub fn first_macro_token(text: &str) -> Option<&str> {
    let mut search = text;
    let mut offset = 0;
    while let Some(start) = search.find('<') {
        let rest = &search[start + 1..];
        if let Some(end) = rest.find(|c: char| c == '<' || c == '>') {
            if rest.as_bytes()[end] == b'>' && end > 0 {
                let body = &rest[..end];
                if !body.chars().any(|c| c.is_whitespace()) {
                    return Some(&text[offset + start..offset + start + end + 2]);
                }
            }
            offset += start + 1;
            search = &search[start + 1..];
        } else {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(defs: &[(&str, &str)]) -> SubstitutionTable {
        let mut t = SubstitutionTable::new();
        for (k, v) in defs {
            t.insert(k, v).unwrap();
        }
        t
    }

    #[test]
    fn test_simple_replacement() {
        let t = table(&[("<NAME>", "world")]);
        let out = t.substitute("hello <NAME>", "test", DEFAULT_BUDGET).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_fixed_point_chained_keys() {
        // <A> expands to text containing <B>, which must also expand.
        let t = table(&[("<A>", "x <B>"), ("<B>", "y")]);
        let out = t.substitute("<A>", "test", DEFAULT_BUDGET).unwrap();
        assert_eq!(out, "x y");
        assert!(first_macro_token(&out).is_none());
    }

    #[test]
    fn test_cycle_exhausts_budget() {
        let t = table(&[("<A>", "<B>"), ("<B>", "<A>")]);
        let err = t.substitute("<A>", "test", 10).unwrap_err();
        assert!(matches!(err, SubstitutionError::BudgetExhausted { .. }));
    }

    #[test]
    fn test_two_key_cycle_detected_with_large_budget() {
        // <A> -> <B> -> <A> rewrites back to the input inside a single
        // sweep; that must fail rather than pass as a fixed point.
        let t = table(&[("<A>", "<B>"), ("<B>", "<A>")]);
        let err = t.substitute("<A>", "test", DEFAULT_BUDGET).unwrap_err();
        assert!(matches!(err, SubstitutionError::BudgetExhausted { .. }));
    }

    #[test]
    fn test_rotation_cycle_detected() {
        let t = table(&[("<A>", "<B>"), ("<B>", "<C>"), ("<C>", "<A>")]);
        let err = t.substitute("x <A>", "test", DEFAULT_BUDGET).unwrap_err();
        assert!(matches!(err, SubstitutionError::BudgetExhausted { .. }));
    }

    #[test]
    fn test_self_reference_growth_exhausts_budget() {
        let t = table(&[("<A>", "<A><A>")]);
        let err = t.substitute("<A>", "test", 5).unwrap_err();
        assert!(matches!(err, SubstitutionError::BudgetExhausted { .. }));
    }

    #[test]
    fn test_unknown_macro_left_in_place() {
        let t = table(&[("<A>", "a")]);
        let out = t.substitute("<A> <UNKNOWN>", "test", DEFAULT_BUDGET).unwrap();
        assert_eq!(out, "a <UNKNOWN>");
    }

    #[test]
    fn test_strict_rejects_unresolved() {
        let t = table(&[("<A>", "a")]);
        let err = t
            .substitute_strict("<A> <UNKNOWN>", "test", DEFAULT_BUDGET)
            .unwrap_err();
        assert_eq!(
            err,
            SubstitutionError::UnresolvedMacro {
                context: "test".to_string(),
                token: "<UNKNOWN>".to_string(),
            }
        );
    }

    #[test]
    fn test_last_wins_without_warning() {
        let mut t = SubstitutionTable::new();
        t.insert("<A>", "first").unwrap();
        t.insert("<A>", "second").unwrap();
        assert_eq!(t.get("<A>"), Some("second"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_real_iter_injected_per_call() {
        let t = table(&[("<PATH>", "run/real-<REAL>/iter-<ITER>")]);
        let out = t.substitute_real_iter("<PATH>", 3, 1).unwrap();
        assert_eq!(out, "run/real-3/iter-1");
        // The base table must not have picked up the synthetic keys.
        assert!(!t.contains_key(REAL_KEY));
        assert!(!t.contains_key(ITER_KEY));

        let again = t.substitute_real_iter("<PATH>", 7, 0).unwrap();
        assert_eq!(again, "run/real-7/iter-0");
    }

    #[test]
    fn test_derived_copy_does_not_mutate_base() {
        let t = table(&[("<PATH>", "p")]);
        let derived = t.derived(2, 4);
        assert_eq!(derived.get(REAL_KEY), Some("2"));
        assert_eq!(derived.get(ITER_KEY), Some("4"));
        assert!(!t.contains_key(REAL_KEY));
    }

    #[test]
    fn test_from_flat_string() {
        let t = SubstitutionTable::from_flat_string("<MSG>=hello, <N>=3").unwrap();
        assert_eq!(t.get("<MSG>"), Some("hello"));
        assert_eq!(t.get("<N>"), Some("3"));
    }

    #[test]
    fn test_from_flat_string_missing_equals() {
        let err = SubstitutionTable::from_flat_string("<MSG>hello").unwrap_err();
        assert!(matches!(err, ArgStringError::MissingEquals(_)));
    }

    #[test]
    fn test_from_flat_string_bad_key() {
        let err = SubstitutionTable::from_flat_string("MSG=hello").unwrap_err();
        assert!(matches!(err, ArgStringError::Key(_)));
    }

    #[test]
    fn test_first_macro_token() {
        assert_eq!(first_macro_token("a <B> c"), Some("<B>"));
        assert_eq!(first_macro_token("a < b > c"), None);
        assert_eq!(first_macro_token("no macros"), None);
        assert_eq!(first_macro_token("x < y <Z>"), Some("<Z>"));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let t = table(&[("<C>", "3"), ("<A>", "1"), ("<B>", "2")]);
        let keys: Vec<_> = t.iter().map(|(k, _)| k.as_str().to_string()).collect();
        assert_eq!(keys, vec!["<C>", "<A>", "<B>"]);
    }
}
