//! Utilities Module - shared infrastructure
//!
//! - `constants`: Reserved names and limits
//! - `jsonpath`: Minimal path parser for addressing into stuff content

pub mod constants;
pub mod jsonpath;

pub use constants::{
    CONTINUE_OUTCOME, DEFAULT_DRY_RUN_LIST_SIZE, DEFAULT_MAX_PIPE_DEPTH, IMPLICIT_DOMAIN,
    MAIN_STUFF_NAME, MAX_ALIAS_HOPS, MAX_REFINEMENT_DEPTH, NATIVE_DOMAIN,
};
