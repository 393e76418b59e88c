//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. They are designed to be easily testable with string inputs.

use thiserror::Error;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("parse error: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Parsed data from `/proc/[pid]/stat`.
///
/// Only the fields the exporter turns into metrics are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    /// User-mode CPU time, in clock ticks.
    pub utime: u64,
    /// Kernel-mode CPU time, in clock ticks.
    pub stime: u64,
    /// Resident set size, in pages. Kernel threads report 0.
    pub rss: i64,
}

/// Index of `rss` among the fields following the `(comm)` field.
const STAT_RSS_FIELD: usize = 21;

/// Parses `/proc/[pid]/stat` content.
///
/// The format is tricky because the comm field can contain spaces and parentheses.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    // comm is whatever sits between the first '(' and the LAST ')'
    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let comm = content[open_paren + 1..close_paren].to_string();

    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();

    if fields.len() <= STAT_RSS_FIELD {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected {}+, got {}",
            STAT_RSS_FIELD + 1,
            fields.len()
        )));
    }

    let parse_field = |idx: usize, name: &str| -> Result<i64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    let parse_field_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        utime: parse_field_u64(11, "utime")?,
        stime: parse_field_u64(12, "stime")?,
        rss: parse_field(STAT_RSS_FIELD, "rss")?,
    })
}

/// Parsed data from `/proc/[pid]/status`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcStatus {
    /// Real, effective, saved set and filesystem UIDs, in that order.
    pub uids: Vec<u32>,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line. A status without a `Uid:`
/// line is rejected: every process the kernel reports has an owner.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut status = ProcStatus::default();
    let mut saw_uid = false;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Uid" => {
                status.uids = value
                    .split_whitespace()
                    .map(|s| s.parse().map_err(|_| ParseError::new("invalid Uid")))
                    .collect::<Result<_, _>>()?;
                saw_uid = true;
            }
            _ => {}
        }
    }

    if !saw_uid || status.uids.is_empty() {
        return Err(ParseError::new("missing Uid in status"));
    }

    Ok(status)
}

/// Parsed data from `/proc/meminfo`, values in kB as the kernel reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemInfoKb {
    pub mem_total: u64,
    pub mem_free: u64,
    /// Absent on kernels older than 3.14.
    pub mem_available: Option<u64>,
    pub buffers: u64,
    pub cached: u64,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfoKb, ParseError> {
    let mut info = MemInfoKb::default();
    let mut saw_total = false;

    let parse_kb = |line: &str| -> u64 {
        line.split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            info.mem_total = parse_kb(line);
            saw_total = true;
        } else if line.starts_with("MemFree:") {
            info.mem_free = parse_kb(line);
        } else if line.starts_with("MemAvailable:") {
            info.mem_available = Some(parse_kb(line));
        } else if line.starts_with("Buffers:") {
            info.buffers = parse_kb(line);
        } else if line.starts_with("Cached:") {
            info.cached = parse_kb(line);
        }
    }

    if !saw_total {
        return Err(ParseError::new("missing MemTotal in meminfo"));
    }

    Ok(info)
}
