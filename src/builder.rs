//! Query builders that rewrite a statement before it is attached to a span.
//!
//! A builder takes the query template and its positional arguments and returns
//! the text to record. Builders never touch the arguments, and the rewritten
//! text is only ever used for display: the driver always receives the original
//! query.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Signature shared by every query builder in a pipeline.
pub type QueryBuilderFn = fn(query: &str, args: &[&dyn fmt::Display]) -> String;

/// Rendered in place of a placeholder that has no matching argument.
const MISSING_ARG: &str = "%v";

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?|\$(\d+)").unwrap());

static SELECT_COLUMNS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"SELECT (.*) FROM").unwrap());

/// The named, built-in query builders.
///
/// Each option maps to exactly one [`QueryBuilderFn`]; the set is closed so
/// that every pipeline a tracer can run is enumerable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryBuilderOption {
    /// Inline argument values in place of their placeholders.
    ///
    /// `SELECT a FROM b WHERE c = ?` with `["d"]` becomes `SELECT a FROM b WHERE c = d`.
    RawQuery,
    /// Collapse the projected column list of a `SELECT`.
    ///
    /// `SELECT a, b FROM c WHERE d = ?` becomes `SELECT ... FROM c WHERE d = ?`.
    IgnoreSelectColumns,
}

impl QueryBuilderOption {
    /// Returns the builder function for this option.
    pub fn builder(self) -> QueryBuilderFn {
        match self {
            QueryBuilderOption::RawQuery => raw_query,
            QueryBuilderOption::IgnoreSelectColumns => ignore_select_columns,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryBuilderOption::RawQuery => "raw-query",
            QueryBuilderOption::IgnoreSelectColumns => "ignore-select-columns",
        }
    }
}

impl fmt::Display for QueryBuilderOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Replace placeholders with the display form of their arguments.
///
/// `?` consumes the next argument in order, `$N` renders argument `N`
/// (1-based). Surplus arguments are ignored and a placeholder with no
/// argument is rendered as `%v`. This is plain text substitution: no quoting
/// or escaping is applied.
pub fn raw_query(query: &str, args: &[&dyn fmt::Display]) -> String {
    let mut next = 0;
    PLACEHOLDER_REGEX
        .replace_all(query, |caps: &Captures<'_>| {
            let arg = match caps.get(1) {
                Some(index) => index
                    .as_str()
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|n| args.get(n)),
                None => {
                    next += 1;
                    args.get(next - 1)
                }
            };
            match arg {
                Some(arg) => arg.to_string(),
                None => MISSING_ARG.to_string(),
            }
        })
        .into_owned()
}

/// Replace the column list between `SELECT` and `FROM` with `...`.
///
/// The lowercase keywords are upper-cased wherever they appear (string
/// literals and identifiers included) and the match is greedy up to the last
/// `FROM` on the line. Statements without a `SELECT ... FROM` pass through
/// with only the case folding applied.
pub fn ignore_select_columns(query: &str, _args: &[&dyn fmt::Display]) -> String {
    let query = query.replace("select", "SELECT").replace("from", "FROM");
    SELECT_COLUMNS_REGEX
        .replace_all(&query, "SELECT ... FROM")
        .into_owned()
}

/// Run `builders` in order. Each builder sees the previous builder's output
/// and the untouched `args`.
pub fn apply(builders: &[QueryBuilderFn], query: &str, args: &[&dyn fmt::Display]) -> String {
    builders
        .iter()
        .fold(query.to_string(), |query, builder| builder(&query, args))
}
