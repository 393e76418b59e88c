//! procscrape - Prometheus exporter for host memory and per-process usage.
//!
//! - `collector` — reads memory totals and per-process stats from `/proc`
//! - `metrics` — turns a `/proc` snapshot into labelled samples
//! - `exposition` — adapts collectors to a `prometheus::Registry`
//! - `server` — the `/metrics` HTTP endpoint
//! - `util` — kernel constants (clock ticks, page size)

pub mod collector;
pub mod exposition;
pub mod metrics;
pub mod server;
pub mod util;
