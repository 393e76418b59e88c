//! System-wide memory totals.

use std::iter;
use std::path::PathBuf;

use tracing::error;

use crate::collector::{FileSystem, ProcSnapshot};
use crate::metrics::{HostLabel, MetricCollector, MetricDesc, MetricKind, Sample, Samples};

pub static TOTAL_MEMORY_BYTES: MetricDesc = MetricDesc {
    name: "total_memory_bytes",
    help: "Total memory in bytes.",
    kind: MetricKind::Gauge,
    labels: &["host"],
};

pub static AVAILABLE_MEMORY_BYTES: MetricDesc = MetricDesc {
    name: "current_memory_available_bytes",
    help: "Free memory in bytes.",
    kind: MetricKind::Gauge,
    labels: &["host"],
};

static DESCRIPTORS: [&MetricDesc; 2] = [&TOTAL_MEMORY_BYTES, &AVAILABLE_MEMORY_BYTES];

/// Emits `total_memory_bytes` and `current_memory_available_bytes`.
pub struct MemoryCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    host: HostLabel,
}

impl<F: FileSystem> MemoryCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>, host: HostLabel) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            host,
        }
    }
}

impl<F: FileSystem> MetricCollector for MemoryCollector<F> {
    fn descriptors(&self) -> &'static [&'static MetricDesc] {
        &DESCRIPTORS
    }

    fn collect(&self) -> Samples<'_> {
        let snapshot = match ProcSnapshot::open(&self.fs, &self.proc_path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(root = %self.proc_path.display(), error = %e, "failed to open proc root");
                return Box::new(iter::empty());
            }
        };

        let mem = match snapshot.meminfo() {
            Ok(mem) => mem,
            Err(e) => {
                error!(root = %self.proc_path.display(), error = %e, "failed to read memory info");
                return Box::new(iter::empty());
            }
        };

        let host = self.host.to_string();
        Box::new(
            [
                Sample::new(&TOTAL_MEMORY_BYTES, mem.total as f64, vec![host.clone()]),
                Sample::new(&AVAILABLE_MEMORY_BYTES, mem.available as f64, vec![host]),
            ]
            .into_iter(),
        )
    }
}
