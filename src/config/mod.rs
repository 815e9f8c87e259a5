//! # Engine Configuration Constants
//!
//! Centralizes the tuning constants for the executor and the BW-tree index.
//! Interdependent values are co-located and their relationships documented so
//! a change to one is checked against the others.
//!
//! ```text
//! DEFAULT_TILE_CAPACITY (1024)
//!       └─> upper bound on rows per logical tile produced by a scan; also
//!           the tile-group allocation unit in storage
//!
//! DELTA_CHAIN_THRESHOLD (8)
//!       └─> chains longer than this are consolidated into a fresh base page
//!           after the next successful write to the owning PID
//!
//! LEAF_MAX_ENTRIES (64)
//!       └─> consolidated leaves above this split; must be >= 2 so both
//!           halves of a split are non-empty
//!
//! EPOCH_SLOTS (64)
//!       └─> maximum threads concurrently pinned inside the index; mirrors
//!           the transaction manager's active-slot capacity
//! ```

/// Rows per tile group, and the batch size for scan-produced logical tiles.
pub const DEFAULT_TILE_CAPACITY: usize = 1024;

/// Mapping-table slots. PIDs are allocated monotonically and never reused,
/// so this bounds the total number of structural modifications over the
/// tree's lifetime.
pub const MAPPING_TABLE_CAPACITY: usize = 1 << 16;

/// Delta-chain length that triggers consolidation.
pub const DELTA_CHAIN_THRESHOLD: usize = 8;

/// Entry count above which a consolidated leaf is split.
pub const LEAF_MAX_ENTRIES: usize = 64;

/// Maximum threads that can be pinned in an index epoch at once.
pub const EPOCH_SLOTS: usize = 64;

/// Bound on CAS retries for a single index operation before the operation
/// surfaces a resource-exhaustion error.
pub const CAS_RETRY_LIMIT: usize = 64;

/// Bound on records visited in one traversal. A chain that exceeds this
/// without reaching a base node is reported as corruption rather than
/// looping forever.
pub const MAX_TRAVERSAL_STEPS: usize = 4096;

/// Block id used by derived (non-storage) tiles.
pub const INVALID_BLOCK: u32 = u32::MAX;

const _: () = assert!(LEAF_MAX_ENTRIES >= 2);
const _: () = assert!(DELTA_CHAIN_THRESHOLD >= 1);
