// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric name and device label derivation from a file's position in a subsystem.
//!
//! A metric file lives at `{statsfs}/{subsystem}/{device paths, if any}/{leaf}`.
//! The metric name is `{subsystem}/{leaf}` and the device label is the device
//! paths joined with `/`, outer device first:
//!
//! ```
//! use std::path::Path;
//! use statsfs::path::{derive_label, metric_name};
//!
//! let root = Path::new("/stats/net");
//! let file = Path::new("/stats/net/eth0/sub0/latency");
//! assert_eq!(derive_label(root, file).as_deref(), Some("eth0/sub0"));
//! assert_eq!(metric_name("net", file).as_deref(), Some("net/latency"));
//! ```

use crate::metric::{LabelSet, DEVICE_LABEL};
use std::path::{Component, Path};

/// Separator used in metric names and device labels.
pub const SEPARATOR: &str = "/";

/// Label and metric name derived for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub metric_name: String,
    pub device: String,
}

/// Components of `file_path` below `subsystem_root`, or `None` when the file
/// is not strictly beneath it.
fn relative_segments(subsystem_root: &Path, file_path: &Path) -> Option<Vec<String>> {
    let relative = file_path.strip_prefix(subsystem_root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
            Component::CurDir => continue,
            _ => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Device label of `file_path`: the directories between `subsystem_root` and
/// the file, joined in order. Empty for a file directly in the root.
pub fn derive_label(subsystem_root: &Path, file_path: &Path) -> Option<String> {
    let mut segments = relative_segments(subsystem_root, file_path)?;
    segments.pop();
    Some(segments.join(SEPARATOR))
}

/// Logical name of a metric file that no schema describes.
pub fn metric_name(subsystem_name: &str, file_path: &Path) -> Option<String> {
    let leaf = file_path.file_name()?.to_string_lossy();
    Some(format!("{subsystem_name}{SEPARATOR}{leaf}"))
}

/// Both the metric name and the device label of `file_path`.
pub fn derive(subsystem_name: &str, subsystem_root: &Path, file_path: &Path) -> Option<Derived> {
    Some(Derived {
        device: derive_label(subsystem_root, file_path)?,
        metric_name: metric_name(subsystem_name, file_path)?,
    })
}

/// The device label as a label set; empty when the file sits in the subsystem root.
pub fn device_labels(device: &str) -> LabelSet {
    let mut labels = LabelSet::new();
    if !device.is_empty() {
        labels.push(DEVICE_LABEL, device);
    }
    labels
}
