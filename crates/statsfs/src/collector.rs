// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collection callbacks handed to a metrics backend.
//!
//! The backend decides when callbacks run and how often. Each invocation reads
//! every source file of one metric at that moment. A source that cannot be read
//! is logged and skipped for that invocation only.

use crate::metric::{LabelSet, MetricDeclaration, Value};
use crate::reader::read_value;
use crate::registry::{MetricBinding, StatsfsRegistry};
use std::collections::btree_map;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Capability a backend exposes to receive metrics.
pub trait Meter {
    /// Registers one metric. The backend calls [`MetricCallback::observe`]
    /// whenever it collects.
    fn register(&mut self, callback: MetricCallback);
}

/// One value read from one source of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<'a> {
    pub path: &'a Path,
    pub value: Value,
    pub labels: &'a LabelSet,
}

/// Reads the sources of one metric of a shared registry.
#[derive(Debug, Clone)]
pub struct MetricCallback {
    registry: Arc<StatsfsRegistry>,
    subsystem: String,
    metric_name: String,
}

impl MetricCallback {
    pub fn new(
        registry: Arc<StatsfsRegistry>,
        subsystem: impl Into<String>,
        metric_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            subsystem: subsystem.into(),
            metric_name: metric_name.into(),
        }
    }

    /// Full `{subsystem}/{metric}` name.
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    fn binding(&self) -> Option<&MetricBinding> {
        self.registry.binding(&self.subsystem, &self.metric_name)
    }

    pub fn declaration(&self) -> Option<&MetricDeclaration> {
        self.binding().map(MetricBinding::declaration)
    }

    /// Starts a new collection. Files are read lazily as the iterator advances.
    pub fn observe(&self) -> Observations<'_> {
        match self.binding() {
            Some(binding) => Observations {
                metric_name: &self.metric_name,
                binding: Some(binding),
                sources: Some(binding.sources().iter()),
            },
            None => Observations {
                metric_name: &self.metric_name,
                binding: None,
                sources: None,
            },
        }
    }

    /// Reads every source now.
    pub fn collect(&self) -> Vec<Observation<'_>> {
        self.observe().collect()
    }
}

/// Lazy sequence of the readable sources of one metric.
pub struct Observations<'a> {
    metric_name: &'a str,
    binding: Option<&'a MetricBinding>,
    sources: Option<btree_map::Iter<'a, PathBuf, LabelSet>>,
}

impl<'a> Iterator for Observations<'a> {
    type Item = Observation<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let binding = self.binding?;
        let sources = self.sources.as_mut()?;
        let value_type = binding.declaration().value_type;
        for (path, labels) in sources.by_ref() {
            match read_value(path, value_type) {
                Ok(value) => {
                    return Some(Observation {
                        path: path.as_path(),
                        value,
                        labels,
                    })
                }
                Err(e) => warn!("Skipping source of {}: {e}", self.metric_name),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let upper = self.sources.as_ref().map_or(0, ExactSizeIterator::len);
        (0, Some(upper))
    }
}

/// Builds one callback per metric of `registry`.
pub fn callbacks(registry: &Arc<StatsfsRegistry>) -> Vec<MetricCallback> {
    registry
        .subsystems()
        .iter()
        .flat_map(|(subsystem, metrics)| {
            metrics
                .bindings()
                .keys()
                .map(move |metric_name| {
                    MetricCallback::new(Arc::clone(registry), subsystem, metric_name)
                })
        })
        .collect()
}

/// Registers every metric of `registry` with `meter`, returning how many.
pub fn register_all<M: Meter + ?Sized>(registry: &Arc<StatsfsRegistry>, meter: &mut M) -> usize {
    let callbacks = callbacks(registry);
    let count = callbacks.len();
    for callback in callbacks {
        meter.register(callback);
    }
    count
}
