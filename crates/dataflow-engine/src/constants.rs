//! Engine-wide constants
//!
//! Single source of truth for defaults and reserved names.

/// Default values for engine configuration
pub mod defaults {
    /// Maximum wall-clock time for one routine invocation
    pub const INVOCATION_TIMEOUT_MS: u64 = 3000;
    /// Maximum loop iterations per script call frame
    pub const LOOP_ITERATION_LIMIT: u64 = 10_000_000;
    /// Maximum script recursion depth
    pub const RECURSION_LIMIT: usize = 512;
}

/// Names that are part of the routine contract
pub mod routine {
    /// Function every routine source must define
    pub const ENTRY_POINT: &str = "execute";
    /// Input port that carries item lists in per-item run mode
    pub const DEFAULT_PORT: &str = "default";
}

/// Limits for value structure summaries
pub mod structure {
    /// Characters kept from string samples
    pub const STRING_SAMPLE_CHARS: usize = 50;
    /// Array items summarized
    pub const ARRAY_SAMPLE_ITEMS: usize = 3;
    /// Object fields summarized
    pub const OBJECT_SAMPLE_FIELDS: usize = 10;
}
