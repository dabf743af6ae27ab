//! dupetree - duplicate file finder with a directory-tree view
//!
//! Scans selected directories, hashes every file (BLAKE3), persists the
//! results in SQLite and groups them into a tree by file name, by content
//! or by both.
//!
//! - [`scanner`]: batched directory walking and chunked hashing
//! - [`pipeline`]: the scan run with throttled progress and cancellation
//! - [`store`]: persistence of scan results and selected directories
//! - [`grouping`]: duplicate index and tree with live view settings

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod grouping;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod signal;
pub mod store;

pub use app::run_app;
