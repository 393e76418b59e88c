//! Metric collectors: turn a `/proc` snapshot into labelled samples.
//!
//! Every collector owns a fixed set of [`MetricDesc`]s and, on each call to
//! [`MetricCollector::collect`], opens a fresh snapshot and yields one
//! [`Sample`] per descriptor per entity. Nothing is cached between calls.
//!
//! ```
//! use procscrape::collector::MockFs;
//! use procscrape::metrics::{HostLabel, MemoryCollector, MetricCollector};
//!
//! let collector = MemoryCollector::new(MockFs::typical_system(), "/proc", HostLabel::new("node-7"));
//! let samples: Vec<_> = collector.collect().collect();
//! assert_eq!(samples.len(), 2);
//! assert!(samples.iter().all(|s| s.labels == ["node-7"]));
//! ```

mod host;
mod memory;
mod process;

pub use host::{HostError, HostLabel, UNKNOWN_HOST};
pub use memory::{AVAILABLE_MEMORY_BYTES, MemoryCollector, TOTAL_MEMORY_BYTES};
pub use process::{
    PROCESS_RESIDENT_MEMORY_BYTES, PROCESS_SYSTEM_SECONDS_TOTAL, PROCESS_USER_SECONDS_TOTAL,
    ProcessCollector, ProcessEntry, Units,
};

/// How a metric's value evolves, which decides its exposition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Can go up and down.
    Gauge,
    /// Monotonically non-decreasing for the lifetime of the entity.
    Counter,
}

/// Static metadata for one metric.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    /// Label names, in the order sample label values are given.
    pub labels: &'static [&'static str],
}

/// One value of one metric, with label values ordered as in its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub desc: &'static MetricDesc,
    pub value: f64,
    pub labels: Vec<String>,
}

impl Sample {
    pub fn new(desc: &'static MetricDesc, value: f64, labels: Vec<String>) -> Self {
        debug_assert_eq!(
            desc.labels.len(),
            labels.len(),
            "label arity mismatch for {}",
            desc.name
        );
        Self {
            desc,
            value,
            labels,
        }
    }

    /// Returns the value of the label called `name`, if the descriptor declares it.
    pub fn label(&self, name: &str) -> Option<&str> {
        let idx = self.desc.labels.iter().position(|l| *l == name)?;
        self.labels.get(idx).map(String::as_str)
    }
}

/// Lazily produced samples of a single scrape.
pub type Samples<'a> = Box<dyn Iterator<Item = Sample> + 'a>;

/// A source of metrics that the exposition layer can describe and scrape.
pub trait MetricCollector: Send + Sync {
    /// Every descriptor this collector can emit, available before any scrape.
    fn descriptors(&self) -> &'static [&'static MetricDesc];

    /// Performs one best-effort collection pass.
    ///
    /// Failures never propagate: a source that cannot be read contributes
    /// no samples for this pass.
    fn collect(&self) -> Samples<'_>;
}
