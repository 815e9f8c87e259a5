//! # VulcanDB — In-Memory Relational Engine Core
//!
//! An experimental in-memory relational database core built around two
//! tightly coupled subsystems:
//!
//! - A **Volcano-style query executor**: a tree of pull-based operators
//!   (scans, DML, joins, projection, limit, materialization) driven by a
//!   per-statement execution context under transactional control.
//! - A **BW-tree index**: a lock-free ordered map built on CAS-installed
//!   delta chains with epoch-based reclamation, consulted by index scans
//!   and maintained on every mutation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │   Executor Driver (plan ➜ pull loop) │
//! ├──────────────────────────────────────┤
//! │  Operators (scan/DML/join/limit/...) │
//! ├──────────────┬───────────────────────┤
//! │ Logical Tile │  Expression Evaluator │
//! ├──────────────┴───────┬───────────────┤
//! │  Tables & Base Tiles │ BW-Tree Index │
//! ├──────────────────────┴───────────────┤
//! │   Transactions (MVCC-lite snapshot)  │
//! └──────────────────────────────────────┘
//! ```
//!
//! Data flows upward as logical tiles: position-list views over base
//! tiles, produced fresh per pull. The index is oblivious to the
//! executor; the executor reaches it only through scans and the table's
//! DML entry points.
//!
//! ## Quick Start
//!
//! ```ignore
//! use vulcandb::executor::driver::{execute_plan, ValueRows};
//!
//! let status = execute_plan(&manager, &plan, &PlanState::default(),
//!                           &output_schema, &ValueRows, txn_id)?;
//! for row in status.rows {
//!     // caller-shaped tuples
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: tagged scalar values and the data-type system
//! - [`schema`]: typed column lists
//! - [`expr`]: expression trees, evaluation, host translation
//! - [`index`]: the BW-tree and its table-facing wrapper
//! - [`storage`]: base tiles and tables with MVCC row headers
//! - [`txn`]: transaction manager and snapshot visibility
//! - [`plan`]: plan nodes consumed by the driver
//! - [`executor`]: operators, logical tiles, and the driver
//! - [`config`]: engine tuning constants

pub mod config;
pub mod executor;
pub mod expr;
pub mod index;
pub mod plan;
pub mod schema;
pub mod storage;
pub mod txn;
pub mod types;

pub use executor::driver::{execute_plan, ExecutionStatus, TupleTransformer, ValueRows};
pub use executor::{ExecutorContext, LogicalTile};
pub use index::{BwTree, ScanBounds, TableIndex};
pub use schema::{Column, Schema};
pub use storage::{DataTable, RowPointer};
pub use txn::{TransactionManager, TxnResult};
pub use types::{DataType, Value};
