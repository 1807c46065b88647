//! URL handling module for Sumi-Harvest
//!
//! This module turns a configured search URL into the concrete URL of any
//! result page. The rule is deterministic and idempotent, so a URL that
//! already points at page `n` maps to itself.

mod pagination;

// Re-export main types and functions
pub use pagination::{apply_page, PageRequest, PAGE_PARAM};
