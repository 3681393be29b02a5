use std::time::Duration;

/// Tuning knobs for [`SortedDictionary`](super::SortedDictionary).
///
/// ```
/// use std::time::Duration;
/// use parallel_core::data_structures::SortedDictionaryOptions;
///
/// let options = SortedDictionaryOptions::new()
///     .with_restart_delay_max(Duration::from_micros(20))
///     .with_descent_spin_limit(256);
/// assert_eq!(options.descent_spin_limit, 256);
/// ```
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortedDictionaryOptions {
    /// Upper bound of the randomized sleep before an aborted insert or
    /// remove starts over from the root.
    pub restart_delay_max: Duration,

    /// Failed attempts on a busy node during a writer's descent before the
    /// writer gives up and restarts. Readers always wait.
    pub descent_spin_limit: u32,
}

impl SortedDictionaryOptions {
    pub fn new() -> Self {
        SortedDictionaryOptions {
            restart_delay_max: Duration::from_micros(50),
            descent_spin_limit: 1 << 12,
        }
    }

    pub fn with_restart_delay_max(mut self, delay: Duration) -> Self {
        self.restart_delay_max = delay;
        self
    }

    pub fn with_descent_spin_limit(mut self, limit: u32) -> Self {
        self.descent_spin_limit = limit.max(1);
        self
    }
}

impl Default for SortedDictionaryOptions {
    fn default() -> Self {
        Self::new()
    }
}
