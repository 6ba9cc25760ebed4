//! Ordered macro substitution tables.
//!
//! Configuration text may contain delimited placeholder tokens
//! (`<NAME>`) that are textually replaced before use. Tables preserve
//! insertion order for diagnostic reproducibility, expand iteratively to
//! a fixed point, and protect against cyclic definitions with an
//! expansion budget.
//!
//! Two synthetic keys, `<REAL>` and `<ITER>`, carry the current
//! realization and iteration index. They are injected per call and never
//! stored in a base table, so a table shared across realizations cannot
//! leak one realization's index into another.

mod key;
mod table;

pub use key::{MacroKey, MacroKeyError};
pub use table::{
    first_macro_token, ArgStringError, SubstitutionError, SubstitutionTable, DEFAULT_BUDGET,
    ITER_KEY, REAL_KEY,
};
