// Runtime settings shared by the network clients and the batch driver.

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MIN_DELAY_MS: u64 = 2000;
pub const DEFAULT_WORKERS: usize = 1;

#[derive(Debug, Clone)]
pub struct Config {
    /// Per-request timeout for both external services.
    pub timeout_secs: u64,
    /// Minimum gap between two requests to the ranking site, across all workers.
    pub min_delay_ms: u64,
    /// Contact address sent to CrossRef.
    pub mailto: Option<String>,
    /// Rows processed concurrently in batch mode.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            mailto: None,
            workers: DEFAULT_WORKERS,
        }
    }
}
