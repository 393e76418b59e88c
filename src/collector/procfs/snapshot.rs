//! Point-in-time view of a `/proc` mount.
//!
//! A [`ProcSnapshot`] is opened once per scrape. It hands out the global
//! memory totals and a [`ProcessHandle`] per live pid; each handle reads its
//! files lazily, so a process that exits after enumeration surfaces as
//! [`CollectError::ProcessGone`] on the first read that misses. Per-process
//! files are decoded lossily: a task may rename itself to non-UTF-8 bytes.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::collector::procfs::parser::{
    ParseError, ProcStat, ProcStatus, parse_meminfo, parse_proc_stat, parse_proc_status,
};
use crate::collector::traits::FileSystem;

const KB: u64 = 1024;

/// Error type for collection failures.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The proc root itself is missing or not mounted.
    #[error("proc root {} is not available", .0.display())]
    RootUnavailable(PathBuf),
    /// Process disappeared during collection (`ENOENT` or `ESRCH`).
    #[error("process {0} disappeared")]
    ProcessGone(u32),
    /// I/O error reading a global proc file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Malformed proc file content.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// System-wide memory totals, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total: u64,
    pub available: u64,
}

/// An opened proc root.
pub struct ProcSnapshot<'a, F: FileSystem> {
    fs: &'a F,
    root: PathBuf,
}

impl<'a, F: FileSystem> ProcSnapshot<'a, F> {
    /// Opens the proc root at `root`.
    ///
    /// Fails with [`CollectError::RootUnavailable`] when the root does not
    /// exist. Nothing else is read until one of the accessors is called.
    pub fn open(fs: &'a F, root: impl AsRef<Path>) -> Result<Self, CollectError> {
        let root = root.as_ref().to_path_buf();
        if !fs.exists(&root) {
            return Err(CollectError::RootUnavailable(root));
        }
        Ok(Self { fs, root })
    }

    /// Reads `meminfo` and converts it to bytes.
    ///
    /// Kernels without `MemAvailable` get the classic estimate
    /// `MemFree + Buffers + Cached`.
    pub fn meminfo(&self) -> Result<MemInfo, CollectError> {
        let content = self.fs.read_to_string(&self.root.join("meminfo"))?;
        let info = parse_meminfo(&content)?;

        let available_kb = info.mem_available.unwrap_or_else(|| {
            info.mem_free
                .saturating_add(info.buffers)
                .saturating_add(info.cached)
        });

        Ok(MemInfo {
            total: info.mem_total.saturating_mul(KB),
            available: available_kb.saturating_mul(KB),
        })
    }

    /// Enumerates every numeric entry under the root.
    ///
    /// Handles are returned sorted by pid so successive scrapes walk the
    /// process table in a stable order.
    pub fn processes(&self) -> Result<Vec<ProcessHandle<'a, F>>, CollectError> {
        let entries = self.fs.read_dir(&self.root)?;

        let mut handles: Vec<ProcessHandle<'a, F>> = entries
            .into_iter()
            .filter_map(|entry| {
                let pid = entry.file_name()?.to_str()?.parse::<u32>().ok()?;
                Some(ProcessHandle {
                    fs: self.fs,
                    pid,
                    dir: entry,
                })
            })
            .collect();
        handles.sort_by_key(|h| h.pid);

        Ok(handles)
    }
}

/// Whether a failed read means the process has exited.
fn is_gone(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ESRCH)
}

/// Lazily-read view of `/proc/[pid]/`.
pub struct ProcessHandle<'a, F: FileSystem> {
    fs: &'a F,
    pid: u32,
    dir: PathBuf,
}

impl<F: FileSystem> ProcessHandle<'_, F> {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn read(&self, file: &str) -> Result<String, CollectError> {
        match self.fs.read(&self.dir.join(file)) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if is_gone(&e) => Err(CollectError::ProcessGone(self.pid)),
            Err(e) => Err(CollectError::Io(e)),
        }
    }

    /// Reads and parses `/proc/[pid]/stat`.
    pub fn stat(&self) -> Result<ProcStat, CollectError> {
        Ok(parse_proc_stat(&self.read("stat")?)?)
    }

    /// Reads and parses `/proc/[pid]/status`.
    pub fn status(&self) -> Result<ProcStatus, CollectError> {
        Ok(parse_proc_status(&self.read("status")?)?)
    }

    /// Reads `/proc/[pid]/comm`, trailing newline included. Invalid UTF-8 is
    /// replaced with U+FFFD.
    pub fn comm(&self) -> Result<String, CollectError> {
        self.read("comm")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_open_missing_root() {
        let fs = MockFs::new();
        let result = ProcSnapshot::open(&fs, "/proc");
        assert!(matches!(result, Err(CollectError::RootUnavailable(p)) if p == Path::new("/proc")));
    }

    #[test]
    fn test_meminfo_in_bytes() {
        let fs = MockFs::typical_system();
        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();

        let mem = snapshot.meminfo().unwrap();
        assert_eq!(mem.total, 16_384_000 * 1024);
        assert_eq!(mem.available, 12_000_000 * 1024);
    }

    #[test]
    fn test_meminfo_available_fallback() {
        let mut fs = MockFs::new();
        fs.add_file(
            "/proc/meminfo",
            "MemTotal: 4000 kB\nMemFree: 1000 kB\nBuffers: 200 kB\nCached: 300 kB\n",
        );
        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();

        let mem = snapshot.meminfo().unwrap();
        assert_eq!(mem.total, 4000 * 1024);
        assert_eq!(mem.available, 1500 * 1024);
    }

    #[test]
    fn test_meminfo_missing_file() {
        let mut fs = MockFs::new();
        fs.add_dir("/proc");
        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();

        assert!(matches!(snapshot.meminfo(), Err(CollectError::Io(_))));
    }

    #[test]
    fn test_processes_skip_non_numeric_entries() {
        let fs = MockFs::typical_system();
        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();

        let pids: Vec<u32> = snapshot.processes().unwrap().iter().map(|h| h.pid()).collect();
        assert_eq!(pids, vec![1, 1000, 1001]);
    }

    #[test]
    fn test_handle_reads() {
        let fs = MockFs::typical_system();
        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();
        let handles = snapshot.processes().unwrap();
        let bash = handles.iter().find(|h| h.pid() == 1000).unwrap();

        assert_eq!(bash.stat().unwrap().comm, "bash");
        assert_eq!(bash.status().unwrap().uids, vec![1000, 1000, 1000, 1000]);
        assert_eq!(bash.comm().unwrap(), "bash\n");
    }

    #[test]
    fn test_handle_process_gone() {
        let mut fs = MockFs::new();
        fs.add_dir("/proc/9999"); // Directory exists but no files

        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();
        let handles = snapshot.processes().unwrap();
        assert_eq!(handles.len(), 1);

        assert!(matches!(handles[0].stat(), Err(CollectError::ProcessGone(9999))));
        assert!(matches!(handles[0].status(), Err(CollectError::ProcessGone(9999))));
        assert!(matches!(handles[0].comm(), Err(CollectError::ProcessGone(9999))));
    }

    #[test]
    fn test_meminfo_saturates_on_huge_values() {
        let mut fs = MockFs::new();
        fs.add_file(
            "/proc/meminfo",
            "MemTotal: 18446744073709551615 kB\nMemFree: 18446744073709551615 kB\nBuffers: 1 kB\nCached: 1 kB\n",
        );
        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();

        let mem = snapshot.meminfo().unwrap();
        assert_eq!(mem.total, u64::MAX);
        assert_eq!(mem.available, u64::MAX);
    }

    #[test]
    fn test_handle_non_utf8_comm_is_decoded_lossily() {
        let mut fs = MockFs::new();
        fs.add_file(
            "/proc/42/stat",
            b"42 (bad\xffname) S 1 42 42 0 -1 0 0 0 0 0 7 3 0 0 20 0 1 0 10 1000 12 0".to_vec(),
        );
        fs.add_file("/proc/42/comm", b"bad\xffname\n".to_vec());

        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();
        let handles = snapshot.processes().unwrap();

        assert_eq!(handles[0].comm().unwrap(), "bad\u{fffd}name\n");
        let stat = handles[0].stat().unwrap();
        assert_eq!(stat.comm, "bad\u{fffd}name");
        assert_eq!(stat.utime, 7);
    }

    #[test]
    fn test_gone_only_for_missing_or_exited() {
        assert!(is_gone(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(is_gone(&io::Error::from_raw_os_error(libc::ESRCH)));
        assert!(!is_gone(&io::Error::from(io::ErrorKind::InvalidData)));
        assert!(!is_gone(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_handle_parse_error() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/5/stat", "garbage");

        let snapshot = ProcSnapshot::open(&fs, "/proc").unwrap();
        let handles = snapshot.processes().unwrap();
        assert!(matches!(handles[0].stat(), Err(CollectError::Parse(_))));
    }
}
