//! Decoder configuration with builder pattern.

use std::fmt;

/// Default limit on nested constructed values.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Per-run decoder settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Trace every matcher step and frame change.
    pub debug: bool,
    /// Report end of input as soon as the first top-level definite-length
    /// SEQUENCE has been fully consumed.
    pub fast_stop: bool,
    /// Once a complete value has been read, push back a header that does
    /// not continue it and report end-of-structure; mismatches inside the
    /// value are errors. When unset, matching stops at the first mismatch
    /// and the rest of the input is consumed without a schema.
    pub honor_module_end: bool,
    /// Accept a truncated header after the first top-level SEQUENCE has
    /// been fully consumed.
    pub tolerate_garbage: bool,
    /// Maximum number of open constructed values.
    pub max_depth: usize,
}

impl DecoderConfig {
    /// Create a builder for decoder configuration.
    pub fn builder() -> DecoderConfigBuilder {
        DecoderConfigBuilder::default()
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfigBuilder::default().build()
    }
}

impl fmt::Debug for DecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderConfig")
            .field("fast_stop", &self.fast_stop)
            .field("honor_module_end", &self.honor_module_end)
            .field("tolerate_garbage", &self.tolerate_garbage)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

/// Builder for `DecoderConfig`.
pub struct DecoderConfigBuilder {
    debug: bool,
    fast_stop: bool,
    honor_module_end: bool,
    tolerate_garbage: bool,
    max_depth: usize,
}

impl Default for DecoderConfigBuilder {
    fn default() -> Self {
        Self {
            debug: false,
            fast_stop: false,
            honor_module_end: true,
            tolerate_garbage: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl fmt::Debug for DecoderConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderConfigBuilder")
            .field("fast_stop", &self.fast_stop)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl DecoderConfigBuilder {
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn fast_stop(mut self, enabled: bool) -> Self {
        self.fast_stop = enabled;
        self
    }

    pub fn honor_module_end(mut self, enabled: bool) -> Self {
        self.honor_module_end = enabled;
        self
    }

    pub fn tolerate_garbage(mut self, enabled: bool) -> Self {
        self.tolerate_garbage = enabled;
        self
    }

    /// Limit on nested constructed values. Values below 1 are raised to 1.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    pub fn build(self) -> DecoderConfig {
        DecoderConfig {
            debug: self.debug,
            fast_stop: self.fast_stop,
            honor_module_end: self.honor_module_end,
            tolerate_garbage: self.tolerate_garbage,
            max_depth: self.max_depth,
        }
    }
}
