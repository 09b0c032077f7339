use crate::verifier::MAX_EXAMPLES;

/// Tuning knobs of a verification session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// Operation cache size, in bits (the cache holds `2^cache_bits` entries).
    pub cache_bits: usize,
    /// Node count that triggers garbage collection during translation.
    pub gc_threshold: usize,
    /// Cap on the number of counterexamples returned at once.
    pub max_examples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_bits: 20,
            gc_threshold: 1 << 20,
            max_examples: MAX_EXAMPLES,
        }
    }
}
