//! Minimum-cost path search and automatic tracing on voxel volumes.
//!
//! The engine searches the voxel grid directly; there is no explicit graph.
//! Edge costs come from a pluggable [`Cost`] of the intensity being entered,
//! and node state lives in a [`SearchImage`] chosen by size:
//!
//! - **A\*** between two voxels ([`AStarSearch`])
//! - **Bidirectional** search that stops at first contact
//!   ([`BidirectionalSearch`])
//! - **Flood fill** from one or more seeds, resumable with a higher cost
//!   threshold ([`FloodFill`])
//! - **Automatic tracing** of a whole branching structure from one seed
//!   ([`GwdtTracer`])
//!
//! [`Tubeness`] turns an image into a field that is bright on line-like
//! structures; searching it with [`TubenessCost`] keeps paths on neurites.
//!
//! # Storage backends
//!
//! | Backend | Chosen when the estimated working set is |
//! |---|---|
//! | [`ArrayStorage`] | below the lower threshold |
//! | [`SparseStorage`] | between the thresholds |
//! | [`DiskStorage`] | above the upper threshold |
//!
//! All three produce identical results; only memory use and speed differ.
//! See [`BackendFactory`] for the thresholds.
//!
//! # Outcomes and errors
//!
//! Running out of voxels, timing out and cancellation are not errors: they
//! are [`SearchStatus::Failed`] values in the returned outcome. Errors are
//! reserved for bad input and storage failures ([`SearchError`]).

mod astar;
mod bidirectional;
mod config;
mod connectivity;
mod cost;
mod error;
mod filler;
mod frontier;
mod heuristic;
mod node;
mod path;
mod scheduler;
mod search;
pub mod storage;
mod tracer;
mod tree;
mod tubeness;

pub use astar::AStarSearch;
pub use bidirectional::BidirectionalSearch;
pub use config::SearchConfig;
pub use connectivity::{Connectivity, NeighborTable};
pub use cost::{
    Cost, CostKind, Difference, DifferenceSq, OneMinusErf, Reciprocal, TubenessCost,
};
pub use error::{Result, SearchError};
pub use filler::{Fill, FillCompletion, FillConfig, FillNode, FillOutcome, FloodFill};
pub use heuristic::{Dijkstra, Euclidean, Heuristic, HeuristicKind};
pub use node::{Direction, NodeStatus, Phase, SearchNode};
pub use path::Path;
pub use scheduler::{OpenEntry, OpenSet};
pub use search::{
    CancelToken, ExitReason, ProgressListener, SearchOutcome, SearchStats, SearchStatus,
};
pub use storage::{
    ArrayStorage, BackendChoice, BackendFactory, BackendKind, DiskStorage, MemoryBudget,
    SearchImage, SparseStorage, Thresholds,
};
pub use tracer::{
    GwdtCost, GwdtTracer, IntensityCost, TraceOutcome, TraceStats, TracerConfig, auto_threshold,
    shell_radius,
};
pub use tree::{ResultTree, TreeNode};
pub use tubeness::Tubeness;
