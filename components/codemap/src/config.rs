//! Storage configuration

/// What storage does when a caller breaks its contract
/// (overlapping registration, partial free).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationPolicy {
    /// Log a warning and report the problem to the caller. The index is left
    /// unchanged.
    Report,
    /// Panic. Useful in test builds of the code generator.
    Panic,
}

/// Configuration for [`CodemapStorage`](crate::CodemapStorage).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodemapConfig {
    /// Reaction to caller-contract violations
    pub violation_policy: ViolationPolicy,
    /// Upper bound on the length of a traceback returned by
    /// `unpack_traceback`; deeper chains are cut to their outermost frames
    pub max_traceback_depth: usize,
}

impl CodemapConfig {
    /// Default configuration, usable in `const` and `static` contexts.
    pub const DEFAULT: CodemapConfig = CodemapConfig {
        violation_policy: ViolationPolicy::Report,
        max_traceback_depth: 1024,
    };

    /// Same configuration with a different violation policy.
    pub const fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.violation_policy = policy;
        self
    }

    /// Same configuration with a different traceback depth cap.
    pub const fn with_max_traceback_depth(mut self, depth: usize) -> Self {
        self.max_traceback_depth = depth;
        self
    }
}

impl Default for CodemapConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
