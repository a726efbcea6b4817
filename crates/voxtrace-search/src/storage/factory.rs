//! Backend selection from the estimated working-set size.

use std::fmt;

use voxtrace_core::Bounds;

use super::pager::PageRecord;
use super::{ArrayStorage, BackendKind, DiskStorage, SearchImage, SliceField, SparseStorage};

/// Estimated working memory per voxel: costs, predecessor, state and the
/// overhead of reading the source.
pub const BYTES_PER_VOXEL_ESTIMATE: u64 = 25;

/// Share of total memory treated as the ceiling for search working memory.
const WORKING_FRACTION: f64 = 0.30;

const MB: u64 = 1024 * 1024;

/// Working-set estimate for searching the whole of `bounds`.
pub fn estimate_working_bytes(bounds: Bounds) -> u64 {
    bounds.len().saturating_mul(BYTES_PER_VOXEL_ESTIMATE)
}

// ---------------------------------------------------------------------------
// MemoryBudget
// ---------------------------------------------------------------------------

/// Memory reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryBudget {
    pub max_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryBudget {
    pub const fn new(max_bytes: u64, available_bytes: u64) -> Self {
        Self {
            max_bytes,
            available_bytes,
        }
    }

    /// Read `MemTotal` and `MemAvailable` from `/proc/meminfo`.
    ///
    /// Returns `None` where that file is missing or unreadable.
    pub fn detect() -> Option<Self> {
        let text = std::fs::read_to_string("/proc/meminfo").ok()?;
        Self::parse_meminfo(&text)
    }

    fn parse_meminfo(text: &str) -> Option<Self> {
        let field = |name: &str| -> Option<u64> {
            let line = text.lines().find(|l| l.starts_with(name))?;
            let kb: u64 = line[name.len()..]
                .trim_start_matches(':')
                .split_whitespace()
                .next()?
                .parse()
                .ok()?;
            Some(kb * 1024)
        };
        let max_bytes = field("MemTotal")?;
        let available_bytes = field("MemAvailable").unwrap_or(max_bytes);
        Some(Self::new(max_bytes, available_bytes))
    }

    /// Working-memory ceiling: a fixed share of the maximum, never more than
    /// what is currently available.
    pub fn working_ceiling(&self) -> u64 {
        let share = (self.max_bytes as f64 * WORKING_FRACTION) as u64;
        share.min(self.available_bytes)
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Working-set sizes above which sparse, then disk storage is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Thresholds {
    pub sparse_bytes: u64,
    pub disk_bytes: u64,
}

impl Default for Thresholds {
    /// Used when host memory cannot be detected.
    fn default() -> Self {
        Self {
            sparse_bytes: 1000 * MB,
            disk_bytes: 4000 * MB,
        }
    }
}

impl Thresholds {
    /// Tiered thresholds for a memory budget.
    ///
    /// | Working ceiling | Sparse above | Disk above |
    /// |---|---|---|
    /// | < 100 MB | 50 MB | 100 MB |
    /// | < 500 MB | ceiling / 4 | ceiling / 2 |
    /// | otherwise | min(ceiling / 3, 1000 MB) | min(ceiling / 2, 4000 MB) |
    pub fn from_budget(budget: MemoryBudget) -> Self {
        let ceiling_mb = budget.working_ceiling() / MB;
        let (sparse_mb, disk_mb) = if ceiling_mb < 100 {
            (50, 100)
        } else if ceiling_mb < 500 {
            (ceiling_mb / 4, ceiling_mb / 2)
        } else {
            ((ceiling_mb / 3).min(1000), (ceiling_mb / 2).min(4000))
        };
        Self {
            sparse_bytes: sparse_mb * MB,
            disk_bytes: disk_mb * MB,
        }
    }

    /// Thresholds for the detected host, or the defaults.
    pub fn detect() -> Self {
        match MemoryBudget::detect() {
            Some(budget) => {
                let t = Self::from_budget(budget);
                log::debug!(
                    "memory: max {} MB, available {} MB, ceiling {} MB; sparse above {} MB, disk above {} MB",
                    budget.max_bytes / MB,
                    budget.available_bytes / MB,
                    budget.working_ceiling() / MB,
                    t.sparse_bytes / MB,
                    t.disk_bytes / MB,
                );
                t
            }
            None => {
                log::warn!("could not detect host memory, using default storage thresholds");
                Self::default()
            }
        }
    }

    /// Backend for a working set of `estimated` bytes.
    pub fn select(&self, estimated: u64) -> BackendKind {
        if estimated > self.disk_bytes {
            BackendKind::Disk
        } else if estimated > self.sparse_bytes {
            BackendKind::Sparse
        } else {
            BackendKind::Array
        }
    }
}

// ---------------------------------------------------------------------------
// BackendChoice / BackendFactory
// ---------------------------------------------------------------------------

/// Caller preference for node storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendChoice {
    /// Let the factory decide from the volume size.
    #[default]
    Auto,
    Array,
    Sparse,
    Disk,
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Array => f.write_str("array"),
            Self::Sparse => f.write_str("sparse"),
            Self::Disk => f.write_str("disk"),
        }
    }
}

impl From<BackendKind> for BackendChoice {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Array => Self::Array,
            BackendKind::Sparse => Self::Sparse,
            BackendKind::Disk => Self::Disk,
        }
    }
}

/// Creates node storage sized to a volume.
#[derive(Clone, Copy, Debug)]
pub struct BackendFactory {
    thresholds: Thresholds,
    disk_cache_slices: usize,
}

impl Default for BackendFactory {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl BackendFactory {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            disk_cache_slices: 16,
        }
    }

    /// Factory with thresholds for the detected host.
    pub fn detect() -> Self {
        Self::new(Thresholds::detect())
    }

    /// Resident slice limit for disk storage.
    #[must_use]
    pub fn with_disk_cache_slices(mut self, slices: usize) -> Self {
        self.disk_cache_slices = slices.max(1);
        self
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Resolve a choice to a concrete backend for `bounds`.
    pub fn resolve(&self, choice: BackendChoice, bounds: Bounds) -> BackendKind {
        match choice {
            BackendChoice::Auto => {
                let estimated = estimate_working_bytes(bounds);
                let kind = self.thresholds.select(estimated);
                log::debug!(
                    "estimated working set {} MB for {} voxels, using {kind} storage",
                    estimated / MB,
                    bounds.len()
                );
                kind
            }
            BackendChoice::Array => BackendKind::Array,
            BackendChoice::Sparse => BackendKind::Sparse,
            BackendChoice::Disk => BackendKind::Disk,
        }
    }

    /// Fresh, empty storage of the given kind.
    pub fn create(&self, kind: BackendKind, bounds: Bounds) -> Box<dyn SearchImage> {
        match kind {
            BackendKind::Array => Box::new(ArrayStorage::new(bounds)),
            BackendKind::Sparse => Box::new(SparseStorage::new(bounds)),
            BackendKind::Disk => Box::new(DiskStorage::new(bounds, self.disk_cache_slices)),
        }
    }

    /// [`resolve`](Self::resolve) then [`create`](Self::create).
    pub fn create_for(&self, choice: BackendChoice, bounds: Bounds) -> Box<dyn SearchImage> {
        self.create(self.resolve(choice, bounds), bounds)
    }

    /// Per-voxel side table laid out like a `kind` node store.
    pub(crate) fn create_field<V: PageRecord>(
        &self,
        kind: BackendKind,
        bounds: Bounds,
        default: V,
    ) -> SliceField<V> {
        SliceField::new(kind, bounds, default, self.disk_cache_slices)
    }
}
