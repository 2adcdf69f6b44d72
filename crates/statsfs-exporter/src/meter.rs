// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use statsfs::{LabelSet, Meter, MetricCallback, MetricDeclaration, Value};

/// Callbacks registered by the discovery engine, collected together on demand.
#[derive(Debug, Clone, Default)]
pub struct CallbackSet {
    callbacks: Vec<MetricCallback>,
}

impl Meter for CallbackSet {
    fn register(&mut self, callback: MetricCallback) {
        self.callbacks.push(callback);
    }
}

/// Values read from every source of one metric at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub name: String,
    pub declaration: MetricDeclaration,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub labels: LabelSet,
    pub value: Value,
}

impl CallbackSet {
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn callbacks(&self) -> &[MetricCallback] {
        &self.callbacks
    }

    /// Runs every callback once. Blocks on file reads.
    pub fn collect(&self) -> Vec<MetricSnapshot> {
        self.callbacks
            .iter()
            .filter_map(|callback| {
                let declaration = callback.declaration()?.clone();
                let points = callback
                    .observe()
                    .map(|observation| Point {
                        labels: observation.labels.clone(),
                        value: observation.value,
                    })
                    .collect();
                Some(MetricSnapshot {
                    name: callback.metric_name().to_string(),
                    declaration,
                    points,
                })
            })
            .collect()
    }
}
