//! # In-Memory Storage
//!
//! The minimal storage layer the executor runs against: columnar base
//! tiles with per-row MVCC headers ([`tile`]) grouped into tables with
//! index maintenance and constraint checks ([`table`]). Durability, WAL,
//! and buffer management are deliberately absent; a tile's lifetime is the
//! process.

mod table;
mod tile;

pub use table::DataTable;
pub use tile::{RowPointer, Tile};
