//! Status codes carried as data in the output document's `errors` list.
//!
//! Downstream consumers dispatch on the numeric code; the message text is
//! surfaced to the end user verbatim.

/// SRU profile violations: unsupported index, relation, or modifier.
pub const UNSUPPORTED_SRU_FEATURE: u32 = 105;

pub const SERIALIZATION_FAILED: u32 = 300;
pub const NO_QUERY: u32 = 301;
pub const MALFORMED_QUERY: u32 = 302;
pub const DEPRECATED_QUERY_ELEMENT: u32 = 303;
pub const INVALID_CLASS_REFERENCE: u32 = 304;
pub const INCOMPATIBLE_OPERATOR_AND_OPERAND: u32 = 305;
pub const UNKNOWN_QUERY_ELEMENT: u32 = 306;
pub const UNKNOWN_QUERY_LANGUAGE: u32 = 307;
pub const UNBOUND_ANNIS_RELATION: u32 = 308;
pub const MISSING_VERSION: u32 = 309;
pub const UNSUPPORTED_VERSION: u32 = 310;
pub const QUERY_TOO_COMPLEX: u32 = 311;
pub const UNKNOWN_QUERY_ERROR: u32 = 399;

// Proximity syntax diagnostics (COSMAS II `/wN:M` operator family).
pub const ERR_PROX_UNKNOWN: u32 = 320;
pub const ERR_PROX_MEAS_NULL: u32 = 321;
pub const ERR_PROX_MEAS_TOOGREAT: u32 = 322;
pub const ERR_PROX_VAL_NULL: u32 = 323;
pub const ERR_PROX_VAL_TOOGREAT: u32 = 324;
pub const ERR_PROX_DIR_TOOGREAT: u32 = 325;
pub const ERR_PROX_WRONG_CHARS: u32 = 326;

pub const ERR_LEM_WILDCARDS: u32 = 350;
