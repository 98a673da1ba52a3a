//! Core data structures for KoralQuery documents.
//!
//! Two layers:
//! - **Tree layer**: the language-independent query algebra
//!   ([`QueryNode`], [`Term`], [`Distance`], [`Frame`], ...) that every
//!   source language compiles to
//! - **Emission layer**: `to_value()` methods rendering the tree as the
//!   JSON-LD wire format consumed by the search engine
//!
//! Field names and enum strings in the emitted JSON are a contract;
//! downstream engines pattern-match on them literally.

mod bounds;
mod frame;
mod node;
mod report;
pub mod status;
mod term;

#[cfg(test)]
mod node_tests;

pub use bounds::{Boundary, Distance, DistanceKey};
pub use frame::{ClassRefCheck, ClassRefOp, Frame};
pub use node::{Group, QueryNode, RefOp, Reference, RelationSpec};
pub use report::Reports;
pub use term::{Flag, Match, Term, TermExpr, TermGroup, TermRelation, TermType};

/// JSON-LD context every document points at.
pub const CONTEXT: &str = "http://korap.ids-mannheim.de/ns/koral/0.3/context.jsonld";
