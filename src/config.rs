/// Strategy for auto-generated `Int64` primary-key components.
///
/// `WallClockNanos` matches the historical behavior: the generated value is
/// the current wall-clock nanoseconds since epoch, which can collide under
/// load, so the write path is told to prefer insert-over-replace semantics.
/// `Counter` draws from the same per-table atomic counter the `Int32`
/// generator uses and never collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Int64KeyStrategy {
    #[default]
    WallClockNanos,
    Counter,
}

/// Runtime configuration for the document core.
#[derive(Debug, Clone)]
pub struct DockvConfig {
    pub int64_key_strategy: Int64KeyStrategy,
    /// Upper bound on the size of a document accepted by the key generator.
    pub max_document_bytes: usize,
}

impl Default for DockvConfig {
    fn default() -> Self {
        Self {
            int64_key_strategy: Int64KeyStrategy::WallClockNanos,
            max_document_bytes: 4 * 1024 * 1024,
        }
    }
}

impl DockvConfig {
    /// Profile with collision-free Int64 key generation.
    pub fn counter_keys() -> Self {
        Self {
            int64_key_strategy: Int64KeyStrategy::Counter,
            ..Self::default()
        }
    }
}
