//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` filesystem states
//! for testing various system conditions.

use super::filesystem::MockFs;

impl MockFs {
    /// Creates a typical system with a few processes.
    ///
    /// Includes: init (PID 1, root), a bash shell and a `cat` child (UID 1000).
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
",
        );

        // PID 1 - init/systemd
        fs.add_process(
            1,
            "1 (systemd) S 0 1 1 0 -1 4194560 50000 1000000 100 500 1000 500 2000 1000 20 0 1 0 1 170000000 3000 18446744073709551615 0 0 0 0 0 0 0 0 1073745152 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tsystemd
Pid:\t1
PPid:\t0
Uid:\t0\t0\t0\t0
Gid:\t0\t0\t0\t0
",
            "systemd\n",
        );

        // PID 1000 - bash shell
        fs.add_process(
            1000,
            "1000 (bash) S 999 1000 1000 34816 1001 4194304 5000 50000 0 0 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tbash
Pid:\t1000
PPid:\t999
Uid:\t1000\t1000\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
",
            "bash\n",
        );

        // PID 1001 - cat command (child of bash)
        fs.add_process(
            1001,
            "1001 (cat) R 1000 1000 1000 34816 1001 4194304 100 0 0 0 5 2 0 0 20 0 1 0 100100 5000000 500 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tcat
Pid:\t1001
PPid:\t1000
Uid:\t1000\t1000\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
",
            "cat\n",
        );

        fs
    }

    /// Typical system where `cat` (PID 1001) exited after `/proc` was listed.
    ///
    /// The directory is still enumerated but its files are gone.
    pub fn with_exited_process() -> Self {
        let mut fs = Self::typical_system();
        fs.remove_file("/proc/1001/stat");
        fs.remove_file("/proc/1001/status");
        fs.remove_file("/proc/1001/comm");
        fs
    }

    /// Creates a system with processes that have special characters in names.
    pub fn with_special_names() -> Self {
        let mut fs = Self::typical_system();

        // Process with spaces in name (like Firefox's "Web Content")
        fs.add_process(
            5000,
            "5000 (Web Content) S 4999 5000 4999 0 -1 4194304 100000 0 500 0 5000 1000 0 0 20 0 20 0 500000 2000000000 50000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tWeb Content
Pid:\t5000
PPid:\t4999
Uid:\t1000\t1000\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
",
            "Web Content\n",
        );

        // Process with parentheses in name
        fs.add_process(
            5001,
            "5001 (test(1)) S 1 5001 5001 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 1 0 500100 10000000 1000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\ttest(1)
Pid:\t5001
PPid:\t1
Uid:\t1000\t1000\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
",
            "test(1)\n",
        );

        // comm padded with whitespace on both sides
        fs.add_process(
            5002,
            "5002 (  padded ) S 1 5002 5002 0 -1 4194304 0 0 0 0 250 125 0 0 20 0 1 0 500200 10000000 10 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tpadded
Pid:\t5002
PPid:\t1
Uid:\t33\t33\t33\t33
Gid:\t33\t33\t33\t33
",
            "  padded \t\n",
        );

        fs
    }

    /// Creates a system with a kernel thread (no user memory, RSS 0).
    pub fn with_kernel_thread() -> Self {
        let mut fs = Self::typical_system();

        fs.add_process(
            2,
            "2 (kthreadd) S 0 0 0 0 -1 2129984 0 0 0 0 0 3 0 0 20 0 1 0 2 0 0 18446744073709551615 0 0 0 0 0 0 0 2147483647 0 0 0 0 17 1 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tkthreadd
Pid:\t2
PPid:\t0
Uid:\t0\t0\t0\t0
Gid:\t0\t0\t0\t0
",
            "kthreadd\n",
        );

        fs
    }
}
