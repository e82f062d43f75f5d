//! temporal-memory - an online sequence-learning engine over sparse
//! distributed representations (SDRs).
//!
//! At each time step the engine consumes a set of *active columns* and
//! produces two output SDRs: the *active cells* for the current step and
//! the *predictive cells* expected to become active next step. Internally
//! it maintains a graph of dendritic segments and synapses that is grown
//! and pruned incrementally via local, Hebbian-like learning -- there is no
//! offline training phase and no global objective being optimized.
//!
//! # Architecture
//!
//! - **Connections**: arena-backed cell/segment/synapse graph with O(indegree)
//!   overlap computation via an inverted presynaptic index
//! - **Activation**: classifies segment overlap into *active*/*matching*
//! - **Topology**: column <-> cell index arithmetic
//! - **TemporalMemory**: orchestrates the five-phase compute step
//! - **Snapshot**: versioned binary (de)serialization of engine state
//!
//! # Example
//!
//! ```
//! use temporal_memory::{TemporalMemory, TemporalMemoryParams};
//!
//! let params = TemporalMemoryParams {
//!     column_dimensions: vec![32],
//!     cells_per_column: 4,
//!     ..TemporalMemoryParams::default()
//! };
//! let mut tm = TemporalMemory::new(params).unwrap();
//!
//! tm.compute(&[0, 1, 2], true).unwrap();
//! let _active = tm.active_cells();
//! let _predictive = tm.predictive_cells();
//! ```

// Module declarations
pub mod activation;
pub mod connections;
pub mod error;
pub mod snapshot;
pub mod temporal_memory;
pub mod topology;
pub mod utils;

// Re-exports for convenient access
pub use activation::{classify_segments, ActiveSegment, SegmentActivity};
pub use connections::{
    CellIndex, Connections, ConnectionsLimits, RandomSource, SegmentData, SegmentId, SynapseData,
    SynapseId,
};
pub use error::{Result, TmError};
pub use temporal_memory::{TemporalMemory, TemporalMemoryParams};
pub use topology::Topology;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "temporal-memory";

/// Get version string
pub fn version() -> String {
    format!("{} v{}", NAME, VERSION)
}
