//! Reader for the Linux `/proc` filesystem.
//!
//! This module provides parsers and a per-scrape snapshot for reading system
//! and process information from the `/proc` virtual filesystem.

pub mod parser;
pub mod snapshot;

pub use parser::{ParseError, ProcStat, ProcStatus};
pub use snapshot::{CollectError, MemInfo, ProcSnapshot, ProcessHandle};
