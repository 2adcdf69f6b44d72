// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric semantics shared by the schema parser, the registry and the value reader.

use serde::Serialize;
use std::fmt;

/// Label key used for the device path of a metric file.
pub const DEVICE_LABEL: &str = "device";

/// Numeric type a metric file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    Int,
    Float,
}

impl ValueType {
    /// Parses the `TYPE` keyword value of a schema file.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "INT" => Some(Self::Int),
            "FLOAT" => Some(Self::Float),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
        }
    }
}

/// Accumulation semantics: monotonically increasing counter or point-in-time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Accumulation {
    Cumulative,
    Gauge,
}

impl Accumulation {
    /// Parses the `FLAG` keyword value of a schema file.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "CUMULATIVE" => Some(Self::Cumulative),
            "GAUGE" => Some(Self::Gauge),
            _ => None,
        }
    }
}

impl fmt::Display for Accumulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cumulative => write!(f, "CUMULATIVE"),
            Self::Gauge => write!(f, "GAUGE"),
        }
    }
}

/// Declared semantics of one logical metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDeclaration {
    pub name: String,
    pub value_type: ValueType,
    pub accumulation: Accumulation,
    pub description: String,
}

impl MetricDeclaration {
    /// Semantics given to a metric file that no schema describes: an integer
    /// gauge described by its full metric name.
    pub fn fallback(name: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: ValueType::Int,
            accumulation: Accumulation::Gauge,
            description: metric_name.into(),
        }
    }

    /// Two declarations agree when everything but the name matches.
    pub fn same_semantics(&self, other: &Self) -> bool {
        self.value_type == other.value_type
            && self.accumulation == other.accumulation
            && self.description == other.description
    }
}

impl fmt::Display for MetricDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}, \"{}\")",
            self.name, self.accumulation, self.value_type, self.description
        )
    }
}

/// Ordered `(key, value)` label pairs. Insertion order is kept as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LabelSet {
    pairs: Vec<(String, String)>,
}

impl LabelSet {
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Returns a new set holding `self` followed by `other`.
    #[must_use]
    pub fn concat(&self, other: &LabelSet) -> LabelSet {
        let mut pairs = Vec::with_capacity(self.pairs.len() + other.pairs.len());
        pairs.extend(self.pairs.iter().cloned());
        pairs.extend(other.pairs.iter().cloned());
        LabelSet { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        LabelSet {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// A value read from a metric file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    /// Value as carried by float-only backends.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        assert_eq!(ValueType::from_keyword("INT"), Some(ValueType::Int));
        assert_eq!(ValueType::from_keyword("FLOAT"), Some(ValueType::Float));
        assert_eq!(ValueType::from_keyword("float"), None);
        assert_eq!(
            Accumulation::from_keyword("CUMULATIVE"),
            Some(Accumulation::Cumulative)
        );
        assert_eq!(Accumulation::from_keyword("GAUGE"), Some(Accumulation::Gauge));
        assert_eq!(Accumulation::from_keyword("COUNTER"), None);
    }

    #[test]
    fn test_fallback_declaration() {
        let decl = MetricDeclaration::fallback("latency", "net/latency");
        assert_eq!(decl.name, "latency");
        assert_eq!(decl.description, "net/latency");
        assert_eq!(decl.value_type, ValueType::Int);
        assert_eq!(decl.accumulation, Accumulation::Gauge);
    }

    #[test]
    fn test_same_semantics_ignores_name() {
        let a = MetricDeclaration::fallback("a", "net/a");
        let b = MetricDeclaration {
            name: "b".to_string(),
            ..a.clone()
        };
        assert!(!a.same_semantics(&MetricDeclaration::fallback("a", "net/b")));
        assert!(a.same_semantics(&b));
    }

    #[test]
    fn test_label_set_keeps_insertion_order() {
        let mut shared = LabelSet::new();
        shared.push("subsystem", "net");
        shared.push("bus", "pci");
        let device: LabelSet = [(DEVICE_LABEL, "eth0")].into_iter().collect();

        let labels = shared.concat(&device);
        let keys: Vec<&str> = labels.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["subsystem", "bus", "device"]);
        assert_eq!(labels.get("device"), Some("eth0"));
        assert_eq!(labels.to_string(), "subsystem=net,bus=pci,device=eth0");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Int(2).as_f64(), 2.0);
    }
}
