//! Bridges [`MetricCollector`]s into a `prometheus::Registry`.
//!
//! [`Exporter`] implements `prometheus::core::Collector`. Every scrape builds
//! brand-new metric vectors from the collector's descriptors, so nothing
//! from a previous scrape (an exited process, an old value) survives into
//! the next one and overlapping scrapes never share state.

use std::path::PathBuf;
use std::string::FromUtf8Error;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tracing::{debug, warn};

use crate::collector::FileSystem;
use crate::metrics::{
    HostLabel, MemoryCollector, MetricCollector, MetricDesc, MetricKind, ProcessCollector, Sample,
    Units,
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("encoded metrics are not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// A metric vector of the kind a descriptor asks for.
enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

impl Family {
    fn new(desc: &MetricDesc) -> prometheus::Result<Self> {
        let opts = Opts::new(desc.name, desc.help);
        match desc.kind {
            MetricKind::Gauge => GaugeVec::new(opts, desc.labels).map(Family::Gauge),
            MetricKind::Counter => CounterVec::new(opts, desc.labels).map(Family::Counter),
        }
    }

    fn observe(&self, sample: &Sample) -> prometheus::Result<()> {
        let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
        match self {
            Family::Gauge(vec) => vec.get_metric_with_label_values(&values)?.set(sample.value),
            Family::Counter(vec) => vec
                .get_metric_with_label_values(&values)?
                .inc_by(sample.value),
        }
        Ok(())
    }

    fn desc(&self) -> Vec<&Desc> {
        match self {
            Family::Gauge(vec) => vec.desc(),
            Family::Counter(vec) => vec.desc(),
        }
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self {
            Family::Gauge(vec) => vec.collect(),
            Family::Counter(vec) => vec.collect(),
        }
    }
}

/// Registers a [`MetricCollector`] with a `prometheus::Registry`.
pub struct Exporter<C> {
    collector: C,
    /// Built once so `desc()` can hand out references; never observed into.
    prototypes: Vec<Family>,
}

impl<C: MetricCollector> Exporter<C> {
    /// Fails if any descriptor has an invalid metric or label name.
    pub fn new(collector: C) -> prometheus::Result<Self> {
        let prototypes = collector
            .descriptors()
            .iter()
            .map(|desc| Family::new(desc))
            .collect::<prometheus::Result<Vec<_>>>()?;
        Ok(Self {
            collector,
            prototypes,
        })
    }

    fn scrape(&self) -> Vec<MetricFamily> {
        let descriptors = self.collector.descriptors();
        // Descriptors were validated in `new`, so this cannot drop anything.
        let families: Vec<(&MetricDesc, Family)> = descriptors
            .iter()
            .filter_map(|desc| Family::new(desc).ok().map(|f| (*desc, f)))
            .collect();

        let mut observed = 0usize;
        for sample in self.collector.collect() {
            let Some((_, family)) = families.iter().find(|(d, _)| d.name == sample.desc.name)
            else {
                warn!(metric = sample.desc.name, "dropping sample of undeclared metric");
                continue;
            };
            if let Err(e) = family.observe(&sample) {
                warn!(metric = sample.desc.name, error = %e, "dropping malformed sample");
                continue;
            }
            observed += 1;
        }
        debug!(samples = observed, "scrape complete");

        families
            .iter()
            .flat_map(|(_, family)| family.collect())
            .filter(|mf| !mf.get_metric().is_empty())
            .collect()
    }
}

impl<C: MetricCollector + 'static> Collector for Exporter<C> {
    fn desc(&self) -> Vec<&Desc> {
        self.prototypes.iter().flat_map(|f| f.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.scrape()
    }
}

/// Builds a registry exposing the memory and process families for `host`.
///
/// The registry is owned by the caller; nothing is registered globally.
pub fn build_registry<F>(
    fs: F,
    proc_path: impl Into<PathBuf>,
    host: HostLabel,
    units: Units,
) -> Result<Registry, ExportError>
where
    F: FileSystem + Clone + 'static,
{
    let proc_path = proc_path.into();
    let registry = Registry::new();

    registry.register(Box::new(Exporter::new(MemoryCollector::new(
        fs.clone(),
        proc_path.clone(),
        host.clone(),
    ))?))?;
    registry.register(Box::new(Exporter::new(ProcessCollector::new(
        fs, proc_path, host, units,
    ))?))?;

    Ok(registry)
}

/// Gathers the registry and renders it in the text exposition format.
pub fn render(registry: &Registry) -> Result<String, ExportError> {
    let families = registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::metrics::Samples;
    use prometheus::proto::MetricType;

    fn registry(fs: MockFs, host: &str) -> Registry {
        build_registry(fs, "/proc", HostLabel::new(host), Units::default()).unwrap()
    }

    fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> Option<&'a str> {
        metric
            .get_label()
            .iter()
            .find(|l| l.get_name() == name)
            .map(|l| l.get_value())
    }

    #[test]
    fn test_registry_describes_all_metrics() {
        let registry = registry(MockFs::new(), "h");
        // Descriptors are advertised even though nothing can be collected.
        assert!(registry.gather().is_empty());

        let mut names: Vec<String> = Exporter::new(ProcessCollector::new(
            MockFs::new(),
            "/proc",
            HostLabel::new("h"),
            Units::default(),
        ))
        .unwrap()
        .desc()
        .iter()
        .map(|d| d.fq_name.clone())
        .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "process_resident_memory_bytes",
                "process_system_seconds_total",
                "process_user_seconds_total",
            ]
        );
    }

    #[test]
    fn test_gather_types_and_counts() {
        let families = registry(MockFs::typical_system(), "node-7").gather();
        let names: Vec<&str> = families.iter().map(|mf| mf.get_name()).collect();
        assert_eq!(
            names,
            vec![
                "current_memory_available_bytes",
                "process_resident_memory_bytes",
                "process_system_seconds_total",
                "process_user_seconds_total",
                "total_memory_bytes",
            ]
        );

        for mf in &families {
            let expected = match mf.get_name() {
                "process_system_seconds_total" | "process_user_seconds_total" => {
                    MetricType::COUNTER
                }
                _ => MetricType::GAUGE,
            };
            assert_eq!(mf.get_field_type(), expected, "{}", mf.get_name());

            let expected_count = if mf.get_name().starts_with("process_") { 3 } else { 1 };
            assert_eq!(mf.get_metric().len(), expected_count, "{}", mf.get_name());

            for metric in mf.get_metric() {
                assert_eq!(label(metric, "host"), Some("node-7"));
            }
        }
    }

    #[test]
    fn test_counter_values() {
        let families = registry(MockFs::typical_system(), "h").gather();
        let user = families
            .iter()
            .find(|mf| mf.get_name() == "process_user_seconds_total")
            .unwrap();
        let init = user
            .get_metric()
            .iter()
            .find(|m| label(m, "pid") == Some("1"))
            .unwrap();

        assert_eq!(init.get_counter().get_value(), 10.0);
        assert_eq!(label(init, "uid"), Some("0"));
        assert_eq!(label(init, "process"), Some("systemd"));
    }

    #[test]
    fn test_repeated_scrapes_do_not_accumulate() {
        let registry = registry(MockFs::typical_system(), "h");
        let sorted_lines = |text: String| {
            let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
            lines.sort();
            lines
        };
        let first = sorted_lines(render(&registry).unwrap());
        let second = sorted_lines(render(&registry).unwrap());
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_overlapping_scrapes_are_independent() {
        let registry = registry(MockFs::with_special_names(), "h");
        let sorted_lines = |text: String| {
            let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
            lines.sort();
            lines
        };
        let expected = sorted_lines(render(&registry).unwrap());

        let barrier = std::sync::Barrier::new(4);
        let (barrier, registry) = (&barrier, &registry);
        let bodies: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        (0..25)
                            .map(|_| render(registry).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(bodies.len(), 100);
        for body in bodies {
            assert_eq!(sorted_lines(body), expected);
        }
    }

    #[test]
    fn test_render_text_format() {
        let text = render(&registry(MockFs::typical_system(), "node-7")).unwrap();

        assert!(text.contains("# HELP total_memory_bytes Total memory in bytes.\n"));
        assert!(text.contains("# TYPE total_memory_bytes gauge\n"));
        assert!(text.contains("total_memory_bytes{host=\"node-7\"} 16777216000\n"));
        assert!(text.contains("# TYPE process_user_seconds_total counter\n"));
        let bash = text
            .lines()
            .find(|l| l.starts_with("process_user_seconds_total{") && l.contains("pid=\"1000\""))
            .unwrap();
        for pair in ["host=\"node-7\"", "process=\"bash\"", "uid=\"1000\""] {
            assert!(bash.contains(pair), "{} missing from {}", pair, bash);
        }
        assert!(bash.ends_with("} 1"));
    }

    #[test]
    fn test_unreadable_root_still_renders() {
        let text = render(&registry(MockFs::new(), "h")).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_exited_process_absent_from_output() {
        let text = render(&registry(MockFs::with_exited_process(), "h")).unwrap();
        assert!(!text.contains("pid=\"1001\""));
        assert!(text.contains("pid=\"1000\""));
        assert!(text.contains("pid=\"1\""));
    }

    static GOOD: MetricDesc = MetricDesc {
        name: "good_total",
        help: "Good.",
        kind: MetricKind::Counter,
        labels: &["a"],
    };

    static STRAY: MetricDesc = MetricDesc {
        name: "stray",
        help: "Not declared.",
        kind: MetricKind::Gauge,
        labels: &[],
    };

    static GOOD_ONLY: [&MetricDesc; 1] = [&GOOD];

    struct Misbehaving;

    impl MetricCollector for Misbehaving {
        fn descriptors(&self) -> &'static [&'static MetricDesc] {
            &GOOD_ONLY
        }

        fn collect(&self) -> Samples<'_> {
            Box::new(
                vec![
                    Sample {
                        desc: &GOOD,
                        value: 1.0,
                        labels: vec!["x".into()],
                    },
                    // wrong arity
                    Sample {
                        desc: &GOOD,
                        value: 2.0,
                        labels: vec!["x".into(), "y".into()],
                    },
                    Sample {
                        desc: &STRAY,
                        value: 3.0,
                        labels: vec![],
                    },
                ]
                .into_iter(),
            )
        }
    }

    #[test]
    fn test_malformed_samples_are_dropped() {
        let families = Collector::collect(&Exporter::new(Misbehaving).unwrap());

        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_name(), "good_total");
        assert_eq!(families[0].get_metric().len(), 1);
        assert_eq!(families[0].get_metric()[0].get_counter().get_value(), 1.0);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = registry(MockFs::new(), "h");
        let again = Exporter::new(MemoryCollector::new(
            MockFs::new(),
            "/proc",
            HostLabel::new("h"),
        ))
        .unwrap();
        assert!(registry.register(Box::new(again)).is_err());
    }
}
