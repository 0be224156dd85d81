//! Configuration for mapping tables and the local store
//!
//! Provides presets for the two store classes and validation for custom
//! configurations.

/// Largest number of writes one atomic commit may carry on Firestore.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Pseudotable configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum writes per committed chunk (capped again by the store)
    pub max_batch_size: usize,
    /// Documents requested per page during a full-table scan
    pub scan_page_size: usize,
    /// Fsync every local commit before acknowledging it
    pub sync_commits: bool,
    /// Local commit log rotation threshold (bytes)
    pub log_rotation_size_bytes: u64,
}

impl Config {
    /// Remote document store: Firestore's batch limit, moderate pages.
    pub fn firestore() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            scan_page_size: 300,
            sync_commits: true,
            log_rotation_size_bytes: 64 * 1024 * 1024,
        }
    }

    /// On-disk store: same batch discipline, scans are cheap.
    pub fn local() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            scan_page_size: 5_000,
            sync_commits: true,
            log_rotation_size_bytes: 64 * 1024 * 1024,
        }
    }

    /// Set the chunk size used for batch writes.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 || self.max_batch_size > 10_000 {
            return Err("max_batch_size must be in [1, 10000]".into());
        }
        if self.scan_page_size == 0 {
            return Err("scan_page_size must be > 0".into());
        }
        if self.log_rotation_size_bytes < 1024 * 1024 {
            return Err("log_rotation_size_bytes must be >= 1MB".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::firestore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_valid() {
        assert!(Config::firestore().validate().is_ok());
        assert!(Config::local().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = Config::default().with_max_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_batch_matches_firestore_limit() {
        assert_eq!(Config::default().max_batch_size, 500);
    }
}
