//! Utility modules for procscrape.

mod sysconf;

pub use sysconf::{DEFAULT_CLK_TCK, DEFAULT_PAGE_SIZE, clock_ticks_per_second, page_size};
