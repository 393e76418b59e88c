//! Per-process CPU time and resident memory.

use std::iter;
use std::path::PathBuf;

use tracing::{error, trace};

use crate::collector::procfs::ParseError;
use crate::collector::{CollectError, FileSystem, ProcSnapshot, ProcessHandle};
use crate::metrics::{HostLabel, MetricCollector, MetricDesc, MetricKind, Sample, Samples};
use crate::util;

const PROCESS_LABELS: &[&str] = &["uid", "process", "host", "pid"];

pub static PROCESS_RESIDENT_MEMORY_BYTES: MetricDesc = MetricDesc {
    name: "process_resident_memory_bytes",
    help: "Resident memory of the process in bytes.",
    kind: MetricKind::Gauge,
    labels: PROCESS_LABELS,
};

pub static PROCESS_SYSTEM_SECONDS_TOTAL: MetricDesc = MetricDesc {
    name: "process_system_seconds_total",
    help: "Total system CPU time of the process in seconds.",
    kind: MetricKind::Counter,
    labels: PROCESS_LABELS,
};

pub static PROCESS_USER_SECONDS_TOTAL: MetricDesc = MetricDesc {
    name: "process_user_seconds_total",
    help: "Total user CPU time of the process in seconds.",
    kind: MetricKind::Counter,
    labels: PROCESS_LABELS,
};

static DESCRIPTORS: [&MetricDesc; 3] = [
    &PROCESS_RESIDENT_MEMORY_BYTES,
    &PROCESS_SYSTEM_SECONDS_TOTAL,
    &PROCESS_USER_SECONDS_TOTAL,
];

/// Scale factors for raw `/proc` counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Units {
    /// Clock ticks per second (USER_HZ).
    pub clk_tck: u64,
    /// Bytes per memory page.
    pub page_size: u64,
}

impl Units {
    /// Reads both values from the running kernel.
    pub fn from_system() -> Self {
        Self {
            clk_tck: util::clock_ticks_per_second(),
            page_size: util::page_size(),
        }
    }
}

impl Default for Units {
    fn default() -> Self {
        Self {
            clk_tck: util::DEFAULT_CLK_TCK,
            page_size: util::DEFAULT_PAGE_SIZE,
        }
    }
}

/// One fully read process. Only built when stat, status and comm all succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Command name, surrounding whitespace removed.
    pub name: String,
    /// Real UID, the first entry of the status `Uid:` line.
    pub uid: u32,
    pub cpu_user_ticks: u64,
    pub cpu_system_ticks: u64,
    pub resident_bytes: u64,
}

impl ProcessEntry {
    /// Reads every file the entry needs; any failure discards the process.
    pub fn read<F: FileSystem>(
        handle: &ProcessHandle<'_, F>,
        units: Units,
    ) -> Result<Self, CollectError> {
        let stat = handle.stat()?;
        let status = handle.status()?;
        let comm = handle.comm()?;

        let uid = status
            .uids
            .first()
            .copied()
            .ok_or_else(|| ParseError::new("empty Uid list"))?;

        Ok(Self {
            pid: handle.pid(),
            name: comm.trim().to_string(),
            uid,
            cpu_user_ticks: stat.utime,
            cpu_system_ticks: stat.stime,
            resident_bytes: (stat.rss.max(0) as u64).saturating_mul(units.page_size),
        })
    }
}

/// Emits resident memory and user/system CPU seconds for every process.
///
/// All three samples of a process share the label tuple
/// `(uid, process, host, pid)`.
pub struct ProcessCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    host: HostLabel,
    units: Units,
}

impl<F: FileSystem> ProcessCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>, host: HostLabel, units: Units) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            host,
            units,
        }
    }

    fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / self.units.clk_tck as f64
    }

    fn samples(&self, entry: ProcessEntry) -> [Sample; 3] {
        let labels = vec![
            entry.uid.to_string(),
            entry.name,
            self.host.to_string(),
            entry.pid.to_string(),
        ];

        [
            Sample::new(
                &PROCESS_RESIDENT_MEMORY_BYTES,
                entry.resident_bytes as f64,
                labels.clone(),
            ),
            Sample::new(
                &PROCESS_SYSTEM_SECONDS_TOTAL,
                self.ticks_to_seconds(entry.cpu_system_ticks),
                labels.clone(),
            ),
            Sample::new(
                &PROCESS_USER_SECONDS_TOTAL,
                self.ticks_to_seconds(entry.cpu_user_ticks),
                labels,
            ),
        ]
    }
}

impl<F: FileSystem> MetricCollector for ProcessCollector<F> {
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

        let handles = match snapshot.processes() {
            Ok(handles) => handles,
            Err(e) => {
                error!(root = %self.proc_path.display(), error = %e, "failed to list processes");
                return Box::new(iter::empty());
            }
        };

        let units = self.units;
        Box::new(
            handles
                .into_iter()
                .filter_map(move |handle| match ProcessEntry::read(&handle, units) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        // Processes exit all the time; not worth more than a trace line.
                        trace!(pid = handle.pid(), error = %e, "skipping process");
                        None
                    }
                })
                .flat_map(move |entry| self.samples(entry)),
        )
    }
}
