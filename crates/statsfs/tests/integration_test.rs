// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use statsfs::metric::DEVICE_LABEL;
use statsfs::{
    callbacks, Accumulation, Error, LabelSet, MetricDeclaration, StatsfsRegistry, Value,
    ValueType,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn testsys() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("testsys/kernel/stats")
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("relative path has a parent"))
        .expect("failed to create directories");
    fs::write(path, contents).expect("failed to write file");
}

fn device(value: &str) -> LabelSet {
    statsfs::path::device_labels(value)
}

#[test]
fn top_level_metric_shares_binding_with_device_metric() {
    let root = testsys();
    let scan = StatsfsRegistry::scan(&root).expect("testsys scan failed");
    assert!(scan.failures.is_empty(), "unexpected failures: {:?}", scan.failures);

    let binding = scan
        .registry
        .binding("subsys1", "subsys1/top_level_m")
        .expect("subsys1/top_level_m is registered");
    let sources: Vec<(&PathBuf, &LabelSet)> = binding.sources().iter().collect();
    assert_eq!(
        sources,
        vec![
            (&root.join("subsys1/dev0/top_level_m"), &device("dev0")),
            (&root.join("subsys1/top_level_m"), &LabelSet::new()),
        ]
    );
}

#[test]
fn testsys_registry_contents() {
    let root = testsys();
    let registry = StatsfsRegistry::scan(&root).expect("testsys scan failed").registry;

    assert_eq!(
        registry.subsystems().keys().collect::<Vec<_>>(),
        vec!["cpu", "net", "subsys0", "subsys1"]
    );
    assert_eq!(
        registry.subsystem("net").map(|s| s.subsystem_root().to_path_buf()),
        Some(root.join("net"))
    );

    let m0 = registry
        .binding("subsys0", "subsys0/m0")
        .expect("subsys0/m0 is registered");
    let devices: Vec<Option<&str>> = m0.sources().values().map(|l| l.get(DEVICE_LABEL)).collect();
    assert_eq!(devices, vec![Some("dev0"), Some("dev1")]);

    let rx = registry
        .binding("net", "net/rx_bytes")
        .expect("net/rx_bytes is registered");
    assert_eq!(
        rx.declaration(),
        &MetricDeclaration {
            name: "rx_bytes".to_string(),
            value_type: ValueType::Int,
            accumulation: Accumulation::Cumulative,
            description: "bytes received on the interface".to_string(),
        }
    );
    let eth1 = &rx.sources()[&root.join("net/eth1/rx_bytes")];
    assert_eq!(
        eth1.iter().collect::<Vec<_>>(),
        vec![
            ("subsystem", "net"),
            ("driver", "virtio"),
            (DEVICE_LABEL, "eth1")
        ]
    );

    // a file next to a schema that does not declare it falls back to a gauge
    let runnable = registry
        .binding("cpu", "cpu/runnable")
        .expect("cpu/runnable is registered");
    assert_eq!(
        runnable.declaration(),
        &MetricDeclaration::fallback("runnable", "cpu/runnable")
    );
    assert_eq!(registry.metric_count(), 6);
}

#[test]
fn scanning_twice_yields_equal_registries() {
    let first = StatsfsRegistry::scan(&testsys()).expect("scan failed").registry;
    let second = StatsfsRegistry::scan(&testsys()).expect("scan failed").registry;
    assert_eq!(first, second);
}

#[test]
fn conflicting_declaration_fails_only_its_subsystem() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let schema = "LABEL\nsubsystem net\n\nMETRIC\nNAME lat\nFLAG GAUGE\nTYPE INT\nDESC latency\n";
    write(dir.path(), "net/eth0/.schema", schema);
    write(dir.path(), "net/eth0/lat", "1\n");
    write(dir.path(), "net/eth1/.schema", &schema.replace("INT", "FLOAT"));
    write(dir.path(), "net/eth1/lat", "1.5\n");
    write(dir.path(), "disk/sda/reads", "3\n");

    let scan = StatsfsRegistry::scan(dir.path()).expect("scan failed");
    assert_eq!(
        scan.registry.subsystems().keys().collect::<Vec<_>>(),
        vec!["disk"]
    );
    assert_eq!(scan.failures.len(), 1);
    assert_eq!(scan.failures[0].subsystem, "net");
    assert!(matches!(
        scan.failures[0].error,
        Error::DeclarationConflict { ref metric, .. } if metric == "net/lat"
    ));
}

#[test]
fn identical_declarations_merge_into_one_binding() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let schema = "LABEL\nsubsystem net\n\nMETRIC\nNAME lat\nFLAG GAUGE\nTYPE INT\nDESC latency\n";
    write(dir.path(), "net/eth0/.schema", schema);
    write(dir.path(), "net/eth0/lat", "1\n");
    write(dir.path(), "net/eth1/.schema", schema);
    write(dir.path(), "net/eth1/lat", "2\n");

    let registry = StatsfsRegistry::scan(dir.path()).expect("scan failed").registry;
    let subsystem = registry.subsystem("net").expect("net is registered");
    assert_eq!(subsystem.bindings().len(), 1);
    let binding = subsystem.binding("net/lat").expect("net/lat is registered");
    assert_eq!(binding.sources().len(), 2);
    for labels in binding.sources().values() {
        assert_eq!(labels.get("subsystem"), Some("net"));
    }
}

#[test]
fn callbacks_report_every_readable_source() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    write(dir.path(), "subsys0/dev0/m0", "1\n");
    write(dir.path(), "subsys0/dev1/m0", "2\n");
    write(dir.path(), "subsys0/dev2/m0", "3\n");

    let registry = Arc::new(StatsfsRegistry::scan(dir.path()).expect("scan failed").registry);
    let callbacks = callbacks(&registry);
    assert_eq!(callbacks.len(), 1);

    fs::remove_file(dir.path().join("subsys0/dev1/m0")).expect("failed to remove file");
    let observed: Vec<(Value, Option<&str>)> = callbacks[0]
        .observe()
        .map(|o| (o.value, o.labels.get(DEVICE_LABEL)))
        .collect();
    assert_eq!(
        observed,
        vec![(Value::Int(1), Some("dev0")), (Value::Int(3), Some("dev2"))]
    );
}

#[test]
fn testsys_values_are_read_with_declared_types() {
    let registry = Arc::new(StatsfsRegistry::scan(&testsys()).expect("scan failed").registry);
    let latency = callbacks(&registry)
        .into_iter()
        .find(|c| c.metric_name() == "net/latency")
        .expect("net/latency is registered");

    let values: Vec<Value> = latency.observe().map(|o| o.value).collect();
    assert_eq!(values, vec![Value::Float(12.5), Value::Float(3.25)]);
}
