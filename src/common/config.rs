use std::time::Duration;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Fixed page header: type (2) + next page (4) + first free (2) + record size (2)
pub const PAGE_HEADER_SIZE: usize = 10;

/// Usable body bytes behind the header
pub const PAGE_BODY_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Smallest free run that can still hold a free-node header
pub const MIN_FRAGMENT_SIZE: usize = 4;

/// Fixed width of table names, attribute names and string values
pub const STRING_SIZE: usize = 64;

/// On-disk size of an `Address`: page (4) + offset (2)
pub const ADDRESS_SIZE: usize = 6;

/// Magic bytes at the start of the header page body
pub const HEADER_MAGIC: &[u8] = b"PROJECTDATA";

/// On-disk format version
pub const FORMAT_VERSION: i32 = 1;

/// Default number of pages kept in the page cache
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Default number of retries for a denied page acquisition (-1 = unbounded)
pub const DEFAULT_MAX_RETRIES: i32 = 20;

/// Default wait between acquisition attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Runtime knobs for a database instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of pages held in the page cache
    pub cache_capacity: usize,
    /// Retries before an acquisition is denied; -1 retries forever
    pub max_retries: i32,
    /// Bounded wait between two acquisition attempts
    pub retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl EngineConfig {
    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity.max(2);
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}
