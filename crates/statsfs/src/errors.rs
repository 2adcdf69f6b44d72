// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::metric::MetricDeclaration;
use std::path::PathBuf;

/// Malformed content in a `.schema` file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct SchemaSyntaxError {
    /// 1-based line number, 0 when the error is not tied to a line
    pub line: usize,
    pub reason: String,
}

impl SchemaSyntaxError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Errors that abort the construction of a subsystem registry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("syntax error in schema {path}: {source}")]
    SchemaSyntax {
        path: PathBuf,
        #[source]
        source: SchemaSyntaxError,
    },

    #[error("metric {metric} redeclared as {conflicting}, previously declared as {existing}")]
    DeclarationConflict {
        metric: String,
        existing: Box<MetricDeclaration>,
        conflicting: Box<MetricDeclaration>,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn walk(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Walk {
            path: path.into(),
            source,
        }
    }
}

/// Per-source failures when reading a metric value at collection time.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {raw:?} is not a valid {expected} value")]
    Parse {
        path: PathBuf,
        raw: String,
        expected: crate::metric::ValueType,
    },
}
