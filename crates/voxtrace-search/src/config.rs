//! Search configuration.

use std::time::Duration;

use crate::connectivity::Connectivity;
use crate::error::{Result, SearchError};
use crate::storage::{BackendChoice, BackendFactory, MemoryBudget, Thresholds};

/// Settings shared by every search mode.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use voxtrace_search::{BackendChoice, Connectivity, SearchConfig};
///
/// let config = SearchConfig::default()
///     .with_connectivity(Connectivity::Six)
///     .with_timeout(Duration::from_secs(30))
///     .with_backend(BackendChoice::Sparse);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchConfig {
    pub connectivity: Connectivity,
    /// Wall-clock budget; `None` runs until done.
    pub timeout: Option<Duration>,
    /// Minimum time between progress reports.
    pub report_interval: Duration,
    /// Loop iterations between timeout and progress checks. Cancellation is
    /// checked every iteration.
    pub check_interval: u64,
    pub backend: BackendChoice,
    /// Host memory override for automatic backend selection.
    pub memory: Option<MemoryBudget>,
    /// Resident slices kept by disk-backed storage.
    pub disk_cache_slices: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::TwentySix,
            timeout: None,
            report_interval: Duration::from_secs(1),
            check_interval: 10_000,
            backend: BackendChoice::Auto,
            memory: None,
            disk_cache_slices: 16,
        }
    }
}

impl SearchConfig {
    #[must_use]
    pub const fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_check_interval(mut self, iterations: u64) -> Self {
        self.check_interval = iterations;
        self
    }

    #[must_use]
    pub const fn with_backend(mut self, backend: BackendChoice) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub const fn with_memory(mut self, memory: MemoryBudget) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub const fn with_disk_cache_slices(mut self, slices: usize) -> Self {
        self.disk_cache_slices = slices;
        self
    }

    /// Reject values no search can run with.
    pub fn validate(&self) -> Result<()> {
        if self.check_interval == 0 {
            return Err(SearchError::InvalidConfig(
                "check_interval must be at least 1".into(),
            ));
        }
        if self.disk_cache_slices == 0 {
            return Err(SearchError::InvalidConfig(
                "disk_cache_slices must be at least 1".into(),
            ));
        }
        if let Some(budget) = self.memory {
            if budget.max_bytes == 0 {
                return Err(SearchError::InvalidConfig(
                    "memory budget must be non-zero".into(),
                ));
            }
        }
        Ok(())
    }

    /// Storage factory honouring the memory override.
    pub fn factory(&self) -> BackendFactory {
        let thresholds = match (self.backend, self.memory) {
            (BackendChoice::Auto, Some(budget)) => Thresholds::from_budget(budget),
            (BackendChoice::Auto, None) => Thresholds::detect(),
            // Thresholds are irrelevant for an explicit choice.
            _ => Thresholds::default(),
        };
        BackendFactory::new(thresholds).with_disk_cache_slices(self.disk_cache_slices)
    }
}
