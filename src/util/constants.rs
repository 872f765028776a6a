//! Centralized constants for the pipegraph runtime
//!
//! Reserved names and limits in one place for easy tuning.

// ═══════════════════════════════════════════════════════════════
// Reserved names
// ═══════════════════════════════════════════════════════════════

/// Alias always pointing at the most recently produced stuff
pub const MAIN_STUFF_NAME: &str = "main_stuff";

/// Domain holding the fixed catalog of native concepts
pub const NATIVE_DOMAIN: &str = "native";

/// Domain where concepts referenced but never declared are synthesized
pub const IMPLICIT_DOMAIN: &str = "implicit";

/// Condition outcome meaning "run nothing, pass memory through"
pub const CONTINUE_OUTCOME: &str = "continue";

// ═══════════════════════════════════════════════════════════════
// Bounded walks
// ═══════════════════════════════════════════════════════════════

/// Maximum length of a concept refinement chain
pub const MAX_REFINEMENT_DEPTH: usize = 32;

/// Maximum number of alias hops before resolution gives up
pub const MAX_ALIAS_HOPS: usize = 16;

// ═══════════════════════════════════════════════════════════════
// Runtime defaults (overridable in RuntimeConfig)
// ═══════════════════════════════════════════════════════════════

/// Maximum nesting of pipe invocations
pub const DEFAULT_MAX_PIPE_DEPTH: usize = 50;

/// Number of items a dry run produces for "many, count undetermined" outputs
pub const DEFAULT_DRY_RUN_LIST_SIZE: usize = 3;
