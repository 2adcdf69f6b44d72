// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Registry of the metrics found in a stats filesystem.
//!
//! The stats filesystem is laid out as
//! `{statsfs}/{subsystem}/[{device}/[{subdevice}/]]{metric file}`. Every
//! immediate subdirectory of the root is a subsystem. A `.schema` file in a
//! directory declares the metrics of that directory; files that no schema
//! declares are registered as integer gauges named after the file.
//!
//! Registries are built once and never modified afterwards, which is what
//! makes them safe to share between collection callbacks.

use crate::errors::Error;
use crate::metric::{LabelSet, MetricDeclaration};
use crate::path::{self, SEPARATOR};
use crate::schema::{parse_schema_file, SchemaEntry, SCHEMA_FILE_NAME};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default mount point of the stats filesystem.
pub const DEFAULT_STATSFS_PATH: &str = "/sys/kernel/stats";

/// A logical metric and every file it can be read from.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricBinding {
    declaration: MetricDeclaration,
    sources: BTreeMap<PathBuf, LabelSet>,
}

impl MetricBinding {
    fn new(declaration: MetricDeclaration) -> Self {
        Self {
            declaration,
            sources: BTreeMap::new(),
        }
    }

    pub fn declaration(&self) -> &MetricDeclaration {
        &self.declaration
    }

    /// File paths realizing this metric, each with the labels of its device.
    pub fn sources(&self) -> &BTreeMap<PathBuf, LabelSet> {
        &self.sources
    }
}

/// Metrics of one subsystem, keyed by `{subsystem}/{metric}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsystemRegistry {
    statsfs_root: PathBuf,
    subsystem_name: String,
    subsystem_root: PathBuf,
    bindings: BTreeMap<String, MetricBinding>,
}

/// What a walk over a subsystem found, before merging.
#[derive(Default)]
struct Discovered {
    /// Schema directory and the entries of its `.schema` file
    schemas: Vec<(PathBuf, Vec<SchemaEntry>)>,
    /// Regular files no schema declares
    undeclared: Vec<PathBuf>,
}

impl SubsystemRegistry {
    /// Walks `{statsfs_root}/{subsystem_name}` and builds its registry.
    ///
    /// Fails on the first traversal error, schema syntax error or conflicting
    /// declaration; no partial registry is returned.
    pub fn build(statsfs_root: &Path, subsystem_name: &str) -> Result<Self, Error> {
        let subsystem_root = statsfs_root.join(subsystem_name);
        let mut discovered = Discovered::default();
        walk_dir(&subsystem_root, &mut discovered)?;

        let mut registry = Self {
            statsfs_root: statsfs_root.to_path_buf(),
            subsystem_name: subsystem_name.to_string(),
            subsystem_root,
            bindings: BTreeMap::new(),
        };

        for (dir, entries) in discovered.schemas {
            for entry in entries {
                registry.insert_declared(&dir, entry)?;
            }
        }
        // Undeclared files are merged last so that a schema declaration of the
        // same name wins regardless of where the walk met it.
        for file in discovered.undeclared {
            registry.insert_undeclared(file);
        }

        debug!(
            "Built {} metrics for subsystem {} at {}",
            registry.bindings.len(),
            registry.subsystem_name,
            registry.subsystem_root.display()
        );
        Ok(registry)
    }

    fn insert_declared(&mut self, dir: &Path, entry: SchemaEntry) -> Result<(), Error> {
        let SchemaEntry {
            declaration,
            labels,
        } = entry;
        let metric_path = dir.join(&declaration.name);
        let key = format!("{}{SEPARATOR}{}", self.subsystem_name, declaration.name);
        let device = path::derive_label(&self.subsystem_root, &metric_path).unwrap_or_default();
        let labels = labels.concat(&path::device_labels(&device));

        if !metric_path.is_file() {
            debug!(
                "{} declares {} but {} is not a regular file",
                dir.join(SCHEMA_FILE_NAME).display(),
                declaration.name,
                metric_path.display()
            );
        }

        match self.bindings.get_mut(&key) {
            Some(binding) => {
                if !binding.declaration.same_semantics(&declaration) {
                    return Err(Error::DeclarationConflict {
                        metric: key,
                        existing: Box::new(binding.declaration.clone()),
                        conflicting: Box::new(declaration),
                    });
                }
                binding.sources.insert(metric_path, labels);
            }
            None => {
                let mut binding = MetricBinding::new(declaration);
                binding.sources.insert(metric_path, labels);
                self.bindings.insert(key, binding);
            }
        }
        Ok(())
    }

    fn insert_undeclared(&mut self, file: PathBuf) {
        let Some(derived) = path::derive(&self.subsystem_name, &self.subsystem_root, &file) else {
            debug!("Skipping {}: not below the subsystem root", file.display());
            return;
        };
        let labels = path::device_labels(&derived.device);
        let binding = self
            .bindings
            .entry(derived.metric_name)
            .or_insert_with_key(|metric_name| {
                let leaf = file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                MetricBinding::new(MetricDeclaration::fallback(leaf, metric_name.clone()))
            });
        binding.sources.insert(file, labels);
    }

    pub fn statsfs_root(&self) -> &Path {
        &self.statsfs_root
    }

    pub fn subsystem_name(&self) -> &str {
        &self.subsystem_name
    }

    pub fn subsystem_root(&self) -> &Path {
        &self.subsystem_root
    }

    pub fn bindings(&self) -> &BTreeMap<String, MetricBinding> {
        &self.bindings
    }

    /// Looks up a metric by its full `{subsystem}/{metric}` name.
    pub fn binding(&self, metric_name: &str) -> Option<&MetricBinding> {
        self.bindings.get(metric_name)
    }
}

/// Visits `dir` and then its subdirectories, recording schemas and metric files.
fn walk_dir(dir: &Path, discovered: &mut Discovered) -> Result<(), Error> {
    let mut subdirs = Vec::new();
    let mut files = Vec::new();
    let mut schema = None;

    for entry in fs::read_dir(dir).map_err(|e| Error::walk(dir, e))? {
        let entry = entry.map_err(|e| Error::walk(dir, e))?;
        let entry_path = entry.path();
        let file_type = entry.file_type().map_err(|e| Error::walk(&entry_path, e))?;
        if file_type.is_dir() {
            subdirs.push(entry_path);
        } else if file_type.is_file() {
            if entry.file_name() == SCHEMA_FILE_NAME {
                schema = Some(entry_path);
            } else {
                files.push(entry_path);
            }
        } else {
            debug!(
                "Skipping {}: not a regular file or directory",
                entry_path.display()
            );
        }
    }

    let mut declared: BTreeSet<OsString> = BTreeSet::new();
    if let Some(schema_path) = schema {
        let entries = parse_schema_file(&schema_path)?;
        declared.extend(
            entries
                .iter()
                .map(|entry| OsString::from(&entry.declaration.name)),
        );
        discovered.schemas.push((dir.to_path_buf(), entries));
    }

    files.sort();
    discovered.undeclared.extend(
        files
            .into_iter()
            .filter(|file| !file.file_name().is_some_and(|name| declared.contains(name))),
    );

    subdirs.sort();
    for subdir in subdirs {
        walk_dir(&subdir, discovered)?;
    }
    Ok(())
}

impl fmt::Display for SubsystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "subsystem {} at {}",
            self.subsystem_name,
            self.subsystem_root.display()
        )?;
        for (name, binding) in &self.bindings {
            writeln!(f, "  {name}: {}", binding.declaration)?;
            for (source, labels) in &binding.sources {
                writeln!(f, "    {} [{labels}]", source.display())?;
            }
        }
        Ok(())
    }
}

/// A subsystem left out of a scan, and why.
#[derive(Debug)]
pub struct SubsystemFailure {
    pub subsystem: String,
    pub error: Error,
}

/// Result of scanning a stats filesystem: the subsystems that could be built
/// and the ones that could not.
#[derive(Debug)]
pub struct Scan {
    pub registry: StatsfsRegistry,
    pub failures: Vec<SubsystemFailure>,
}

/// Every subsystem of a stats filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsfsRegistry {
    statsfs_root: PathBuf,
    subsystems: BTreeMap<String, SubsystemRegistry>,
}

impl StatsfsRegistry {
    /// Builds a registry for each subsystem found under `statsfs_root`.
    ///
    /// A subsystem that fails to build is logged and reported in
    /// [`Scan::failures`] instead of failing the whole scan. Only a root that
    /// cannot be listed is an error.
    pub fn scan(statsfs_root: &Path) -> Result<Scan, Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(statsfs_root).map_err(|e| Error::walk(statsfs_root, e))? {
            let entry = entry.map_err(|e| Error::walk(statsfs_root, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| Error::walk(entry.path(), e))?;
            if !file_type.is_dir() {
                debug!("Skipping {}: not a subsystem directory", entry.path().display());
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let mut subsystems = BTreeMap::new();
        let mut failures = Vec::new();
        for name in names {
            match SubsystemRegistry::build(statsfs_root, &name) {
                Ok(subsystem) => {
                    subsystems.insert(name, subsystem);
                }
                Err(error) => {
                    warn!("Failed to build metrics for subsystem {name}: {error}");
                    failures.push(SubsystemFailure {
                        subsystem: name,
                        error,
                    });
                }
            }
        }

        let registry = Self {
            statsfs_root: statsfs_root.to_path_buf(),
            subsystems,
        };
        info!(
            "Found {} metrics in {} subsystems at {}, {} subsystems failed",
            registry.metric_count(),
            registry.subsystems.len(),
            statsfs_root.display(),
            failures.len()
        );
        Ok(Scan {
            registry,
            failures,
        })
    }

    pub fn statsfs_root(&self) -> &Path {
        &self.statsfs_root
    }

    pub fn subsystems(&self) -> &BTreeMap<String, SubsystemRegistry> {
        &self.subsystems
    }

    pub fn subsystem(&self, name: &str) -> Option<&SubsystemRegistry> {
        self.subsystems.get(name)
    }

    /// Looks up a metric of `subsystem` by its full `{subsystem}/{metric}` name.
    pub fn binding(&self, subsystem: &str, metric_name: &str) -> Option<&MetricBinding> {
        self.subsystem(subsystem)?.binding(metric_name)
    }

    pub fn metric_count(&self) -> usize {
        self.subsystems.values().map(|s| s.bindings.len()).sum()
    }
}

impl fmt::Display for StatsfsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "statsfs at {}", self.statsfs_root.display())?;
        for subsystem in self.subsystems.values() {
            write!(f, "{subsystem}")?;
        }
        Ok(())
    }
}
