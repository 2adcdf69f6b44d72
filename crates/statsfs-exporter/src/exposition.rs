// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Prometheus exposition of the registered callbacks.
//!
//! [`StatsfsCollector`] reads every callback when the registry is gathered, so
//! each scrape reports the values the stats filesystem holds at that moment.

use crate::error::ExporterError;
use crate::meter::CallbackSet;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, Registry, TextEncoder};
use statsfs::{Accumulation, LabelSet, MetricCallback};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

struct Family {
    callback: MetricCallback,
    desc: Desc,
    name: String,
    help: String,
    accumulation: Accumulation,
}

/// Collector exposing one metric family per statsfs metric.
pub struct StatsfsCollector {
    families: Vec<Family>,
}

impl StatsfsCollector {
    /// Builds the family descriptors of `callbacks`.
    ///
    /// Two metrics whose names map onto the same family name cannot both be
    /// exposed; the first one in name order is kept and the other is logged.
    pub fn new(callbacks: &CallbackSet) -> Self {
        let mut names = HashSet::new();
        let mut families = Vec::new();
        for callback in callbacks.callbacks() {
            let Some(declaration) = callback.declaration() else {
                continue;
            };
            let name = family_name(callback.metric_name());
            if !names.insert(name.clone()) {
                warn!(
                    "Skipping {}: family {name} is already exported",
                    callback.metric_name()
                );
                continue;
            }
            let help = if declaration.description.is_empty() {
                callback.metric_name().to_string()
            } else {
                declaration.description.clone()
            };
            match Desc::new(name.clone(), help.clone(), vec![], HashMap::new()) {
                Ok(desc) => families.push(Family {
                    callback: callback.clone(),
                    desc,
                    name,
                    help,
                    accumulation: declaration.accumulation,
                }),
                Err(e) => warn!("Skipping {}: {e}", callback.metric_name()),
            }
        }
        Self { families }
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

impl Family {
    /// Reads every source now. `None` when no source could be read.
    fn collect(&self) -> Option<MetricFamily> {
        let mut family = MetricFamily::default();
        family.set_name(self.name.clone());
        family.set_help(self.help.clone());
        family.set_field_type(match self.accumulation {
            Accumulation::Cumulative => MetricType::COUNTER,
            Accumulation::Gauge => MetricType::GAUGE,
        });

        for observation in self.callback.observe() {
            let mut metric = Metric::default();
            metric.set_label(label_pairs(observation.labels).into());
            let value = observation.value.as_f64();
            match self.accumulation {
                Accumulation::Cumulative => {
                    let mut counter = Counter::default();
                    counter.set_value(value);
                    metric.set_counter(counter);
                }
                Accumulation::Gauge => {
                    let mut gauge = Gauge::default();
                    gauge.set_value(value);
                    metric.set_gauge(gauge);
                }
            }
            family.mut_metric().push(metric);
        }

        if family.get_metric().is_empty() {
            debug!("No readable source for {}", self.callback.metric_name());
            return None;
        }
        Some(family)
    }
}

impl Collector for StatsfsCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.families.iter().map(|family| &family.desc).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families.iter().filter_map(Family::collect).collect()
    }
}

/// Registry gathering every metric of `callbacks` on each call.
pub fn registry(callbacks: &CallbackSet) -> Result<Registry, ExporterError> {
    let registry = Registry::new();
    let collector = StatsfsCollector::new(callbacks);
    if collector.is_empty() {
        warn!("No metric can be exposed to Prometheus");
        return Ok(registry);
    }
    debug!("Exposing {} metric families", collector.len());
    registry.register(Box::new(collector))?;
    Ok(registry)
}

/// Gathers `registry` and encodes it in the text exposition format.
pub fn encode(registry: &Registry) -> Result<Vec<u8>, ExporterError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Content type of [`encode`]'s output.
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

/// Maps a `subsystem/metric` name onto `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn family_name(metric_name: &str) -> String {
    sanitize(metric_name, true)
}

fn sanitize(name: &str, allow_colon: bool) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Label pairs sorted by name. A key that maps onto a name already taken
/// keeps the first value.
fn label_pairs(labels: &LabelSet) -> Vec<LabelPair> {
    let mut by_name = BTreeMap::new();
    for (key, value) in labels.iter() {
        by_name.entry(sanitize(key, false)).or_insert(value);
    }
    by_name
        .into_iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name);
            pair.set_value(value.to_string());
            pair
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use statsfs::{register_all, StatsfsRegistry};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn callbacks_of(root: &Path) -> CallbackSet {
        let scan = StatsfsRegistry::scan(root).unwrap();
        assert!(scan.failures.is_empty());
        let mut callbacks = CallbackSet::default();
        register_all(&Arc::new(scan.registry), &mut callbacks);
        callbacks
    }

    fn exposition(root: &Path) -> String {
        let registry = registry(&callbacks_of(root)).unwrap();
        String::from_utf8(encode(&registry).unwrap()).unwrap()
    }

    #[test]
    fn test_counter_and_gauge_families() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "net/eth0/.schema",
            "LABEL\nbus pci\n\nMETRIC\nNAME rx\nFLAG CUMULATIVE\nTYPE INT\nDESC bytes received\n",
        );
        write(dir.path(), "net/eth0/rx", "7\n");
        write(dir.path(), "net/eth0/drops", "3\n");
        write(dir.path(), "net/drops", "1\n");

        let text = exposition(dir.path());
        assert!(text.contains("# HELP net_rx bytes received\n"), "{text}");
        assert!(text.contains("# TYPE net_rx counter\n"), "{text}");
        assert!(text.contains("net_rx{bus=\"pci\",device=\"eth0\"} 7\n"), "{text}");
        assert!(text.contains("# HELP net_drops net/drops\n"), "{text}");
        assert!(text.contains("# TYPE net_drops gauge\n"), "{text}");
        assert!(text.contains("net_drops{device=\"eth0\"} 3\n"), "{text}");
        assert!(text.contains("net_drops 1\n"), "{text}");
    }

    #[test]
    fn test_float_values() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "net/.schema",
            "METRIC\nNAME latency\nFLAG GAUGE\nTYPE FLOAT\nDESC mean latency\n",
        );
        write(dir.path(), "net/latency", "12.5\n");

        assert!(exposition(dir.path()).contains("net_latency 12.5\n"));
    }

    #[test]
    #[traced_test]
    fn test_colliding_names_export_one_family() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "net/eth0/rx.bytes", "1\n");
        write(dir.path(), "net/eth0/rx_bytes", "2\n");

        let callbacks = callbacks_of(dir.path());
        assert_eq!(callbacks.len(), 2);
        assert_eq!(StatsfsCollector::new(&callbacks).len(), 1);

        let text = exposition(dir.path());
        assert_eq!(text.matches("# TYPE net_rx_bytes").count(), 1, "{text}");
        assert!(text.contains("net_rx_bytes{device=\"eth0\"} 1\n"), "{text}");
        assert!(!text.contains("} 2\n"), "{text}");
        assert!(logs_contain("Skipping net/rx_bytes"));
    }

    #[test]
    fn test_unreadable_metric_is_left_out() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "disk/sda/reads", "5\n");
        write(dir.path(), "disk/sda/writes", "6\n");
        let registry = registry(&callbacks_of(dir.path())).unwrap();
        fs::remove_file(dir.path().join("disk/sda/writes")).unwrap();

        let text = String::from_utf8(encode(&registry).unwrap()).unwrap();
        assert!(text.contains("disk_reads{device=\"sda\"} 5\n"), "{text}");
        assert!(!text.contains("disk_writes"), "{text}");
    }

    #[test]
    fn test_each_gather_reads_current_values() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "disk/sda/reads", "5\n");
        let registry = registry(&callbacks_of(dir.path())).unwrap();

        let first = String::from_utf8(encode(&registry).unwrap()).unwrap();
        fs::write(dir.path().join("disk/sda/reads"), "6\n").unwrap();
        let second = String::from_utf8(encode(&registry).unwrap()).unwrap();
        assert!(first.contains("disk_reads{device=\"sda\"} 5\n"), "{first}");
        assert!(second.contains("disk_reads{device=\"sda\"} 6\n"), "{second}");
    }

    #[test]
    fn test_label_names_are_sanitized_and_values_escaped() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "gpu/.schema",
            "LABEL\npci-slot 0000:01\nmodel a\"b\n\nMETRIC\nNAME temp\nFLAG GAUGE\nTYPE INT\n",
        );
        write(dir.path(), "gpu/temp", "60\n");

        let text = exposition(dir.path());
        assert!(
            text.contains("gpu_temp{model=\"a\\\"b\",pci_slot=\"0000:01\"} 60\n"),
            "{text}"
        );
    }

    #[test]
    fn test_empty_callback_set_encodes_nothing() {
        let registry = registry(&CallbackSet::default()).unwrap();
        assert!(encode(&registry).unwrap().is_empty());
    }

    #[test]
    fn test_family_name() {
        assert_eq!(family_name("net/rx_bytes"), "net_rx_bytes");
        assert_eq!(family_name("kvm/exits.total"), "kvm_exits_total");
        assert_eq!(family_name("9p/reads"), "_9p_reads");
        assert_eq!(family_name("a:b/c"), "a:b_c");
    }

    #[test]
    fn test_content_type_is_text_format() {
        assert!(content_type().starts_with("text/plain; version=0.0.4"));
    }
}
