//! OS state reader for Linux.
//!
//! Reads memory totals and per-process statistics from the `/proc`
//! filesystem, with support for mocking for testing on any OS.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ProcSnapshot                 │
//! │  - <root>/meminfo                            │
//! │  - <root>/[pid]/{stat,status,comm}           │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!                 ┌──────▼──────┐
//!                 │  FileSystem │ (trait)
//!                 └──────┬──────┘
//!              ┌─────────┴─────────┐
//!       ┌──────▼──────┐     ┌──────▼──────┐
//!       │   RealFs    │     │   MockFs    │
//!       │  (Linux)    │     │  (Testing)  │
//!       └─────────────┘     └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use procscrape::collector::{MockFs, ProcSnapshot};
//!
//! let fs = MockFs::typical_system();
//! let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();
//! assert_eq!(snapshot.processes().unwrap().len(), 3);
//! ```

pub mod mock;
pub mod procfs;
pub mod traits;

pub use mock::MockFs;
pub use procfs::{CollectError, MemInfo, ProcSnapshot, ProcessHandle};
pub use traits::{FileSystem, RealFs};
