//! Source-language front ends.
//!
//! Each submodule compiles one query language into the shared tree:
//! a logos lexer, a hand-written recursive-descent parser, and a
//! normalization step resolving classes, distances, and frames.
//! Parsers never fail hard; syntax problems produce `errors` entries in
//! the [`Reports`] accumulator and the affected fragment is dropped.

use koralq_core::{QueryNode, Reports};
use serde_json::Value;

pub mod annis;
pub mod cosmas2;
pub mod cql;
pub mod fcsql;
pub mod poliqarp;

#[cfg(test)]
mod cql_tests;
#[cfg(test)]
mod fcsql_tests;
#[cfg(test)]
mod poliqarp_tests;

/// Result of one front-end run: the query tree plus an optional
/// document constraint harvested from the query text (`meta` clauses).
#[derive(Debug, Default)]
pub struct Compilation {
    pub query: Option<QueryNode>,
    pub collection: Option<Value>,
}

impl Compilation {
    pub fn query(node: QueryNode) -> Self {
        Compilation { query: Some(node), collection: None }
    }

    pub fn empty() -> Self {
        Compilation::default()
    }
}

/// Ensures `reports` carries an error before a front end gives up
/// without a query, so failures are never silent.
pub(crate) fn ensure_reported(reports: &mut Reports, code: u32, message: &str) {
    if !reports.has_errors() {
        reports.error(code, message);
    }
}

/// Nesting ceiling for the recursive-descent parsers. Groups nested
/// deeper than this report an error instead of risking the stack.
pub(crate) const MAX_NESTING: usize = 64;

pub(crate) const NESTING_ERROR: &str = "The query is nested too deeply.";
