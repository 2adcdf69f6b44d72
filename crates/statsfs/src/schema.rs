// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parser for `.schema` files.
//!
//! A schema file describes the metric files of the directory it lives in. It is
//! made of blocks separated by blank lines:
//!
//! ```text
//! LABEL
//! <key> <value>
//! ...
//!
//! METRIC
//! NAME <metric-name>
//! FLAG <CUMULATIVE|GAUGE>
//! TYPE <INT|FLOAT>
//! DESC <free text>
//! ```
//!
//! A `LABEL` block applies to every `METRIC` block that follows it in the same
//! file, until the next `LABEL` block replaces it. Any syntax error rejects the
//! whole file.

use crate::errors::{Error, SchemaSyntaxError};
use crate::metric::{Accumulation, LabelSet, MetricDeclaration, ValueType, DEVICE_LABEL};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Reserved file name of schema files.
pub const SCHEMA_FILE_NAME: &str = ".schema";

const LABEL_KEYWORD: &str = "LABEL";
const METRIC_KEYWORD: &str = "METRIC";
const NAME_KEYWORD: &str = "NAME";
const FLAG_KEYWORD: &str = "FLAG";
const TYPE_KEYWORD: &str = "TYPE";
const DESC_KEYWORD: &str = "DESC";

/// One `METRIC` block together with the labels in effect for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub declaration: MetricDeclaration,
    pub labels: LabelSet,
}

/// Reads and parses the schema file at `path`.
pub fn parse_schema_file(path: &Path) -> Result<Vec<SchemaEntry>, Error> {
    let text = fs::read_to_string(path).map_err(|e| Error::walk(path, e))?;
    let entries = parse_schema(&text).map_err(|source| Error::SchemaSyntax {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        "Parsed {} metric declarations from {}",
        entries.len(),
        path.display()
    );
    Ok(entries)
}

/// Parses the content of a schema file.
pub fn parse_schema(text: &str) -> Result<Vec<SchemaEntry>, SchemaSyntaxError> {
    let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));
    let mut labels = LabelSet::new();
    let mut entries = Vec::new();

    while let Some((number, line)) = lines.next() {
        match line.trim() {
            "" => continue,
            LABEL_KEYWORD => labels = parse_labels(&mut lines)?,
            METRIC_KEYWORD => {
                let declaration = parse_metric(number, &mut lines)?;
                entries.push(SchemaEntry {
                    declaration,
                    labels: labels.clone(),
                });
            }
            other => {
                return Err(SchemaSyntaxError::new(
                    number,
                    format!("expected {LABEL_KEYWORD} or {METRIC_KEYWORD}, got {other:?}"),
                ))
            }
        }
    }
    Ok(entries)
}

/// Parses the `<key> <value>` lines of a `LABEL` block up to the next blank line.
fn parse_labels<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
) -> Result<LabelSet, SchemaSyntaxError> {
    let mut labels = LabelSet::new();
    for (number, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        match line.split(' ').collect::<Vec<_>>()[..] {
            [DEVICE_LABEL, _] => {
                return Err(SchemaSyntaxError::new(
                    number,
                    format!("label {DEVICE_LABEL:?} is reserved for the device path"),
                ))
            }
            [key, _] if labels.get(key).is_some() => {
                return Err(SchemaSyntaxError::new(
                    number,
                    format!("label {key:?} given twice in one {LABEL_KEYWORD} block"),
                ))
            }
            [key, value] if !key.is_empty() && !value.is_empty() => labels.push(key, value),
            _ => {
                return Err(SchemaSyntaxError::new(
                    number,
                    format!("label line must be \"<key> <value>\", got {line:?}"),
                ))
            }
        }
    }
    Ok(labels)
}

/// Parses the keyword lines of a `METRIC` block up to the next blank line.
/// `start` is the line number of the `METRIC` keyword.
fn parse_metric<'a>(
    start: usize,
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
) -> Result<MetricDeclaration, SchemaSyntaxError> {
    let mut name: Option<String> = None;
    let mut accumulation: Option<Accumulation> = None;
    let mut value_type: Option<ValueType> = None;
    let mut description: Option<String> = None;

    for (number, line) in lines {
        if line.trim().is_empty() {
            break;
        }
        let (keyword, rest) = match line.split_once(' ') {
            Some((keyword, rest)) => (keyword, Some(rest)),
            None => (line, None),
        };

        if keyword == DESC_KEYWORD {
            set_once(&mut description, rest.unwrap_or_default().to_string(), keyword, number)?;
            continue;
        }

        let value = match rest {
            Some(value) if !value.is_empty() && !value.contains(' ') => value,
            _ => {
                return Err(SchemaSyntaxError::new(
                    number,
                    format!("{keyword} expects exactly one value, got {line:?}"),
                ))
            }
        };
        match keyword {
            NAME_KEYWORD => {
                validate_name(value).map_err(|reason| SchemaSyntaxError::new(number, reason))?;
                set_once(&mut name, value.to_string(), keyword, number)?;
            }
            FLAG_KEYWORD => {
                let flag = Accumulation::from_keyword(value).ok_or_else(|| {
                    SchemaSyntaxError::new(number, format!("unknown {FLAG_KEYWORD} {value}"))
                })?;
                set_once(&mut accumulation, flag, keyword, number)?;
            }
            TYPE_KEYWORD => {
                let kind = ValueType::from_keyword(value).ok_or_else(|| {
                    SchemaSyntaxError::new(number, format!("unknown {TYPE_KEYWORD} {value}"))
                })?;
                set_once(&mut value_type, kind, keyword, number)?;
            }
            _ => {
                return Err(SchemaSyntaxError::new(
                    number,
                    format!("unknown keyword {keyword:?} in {METRIC_KEYWORD} block"),
                ))
            }
        }
    }

    let missing = |keyword: &str| {
        SchemaSyntaxError::new(start, format!("{METRIC_KEYWORD} block is missing {keyword}"))
    };
    Ok(MetricDeclaration {
        name: name.ok_or_else(|| missing(NAME_KEYWORD))?,
        accumulation: accumulation.ok_or_else(|| missing(FLAG_KEYWORD))?,
        value_type: value_type.ok_or_else(|| missing(TYPE_KEYWORD))?,
        description: description.unwrap_or_default(),
    })
}

fn set_once<T>(
    slot: &mut Option<T>,
    value: T,
    keyword: &str,
    line: usize,
) -> Result<(), SchemaSyntaxError> {
    if slot.is_some() {
        return Err(SchemaSyntaxError::new(
            line,
            format!("{keyword} given twice in one {METRIC_KEYWORD} block"),
        ));
    }
    *slot = Some(value);
    Ok(())
}

/// The metric name is joined to the schema's directory, so it must be a single
/// path component.
fn validate_name(name: &str) -> Result<(), String> {
    if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(format!("invalid metric name {name:?}"));
    }
    if name == SCHEMA_FILE_NAME {
        return Err(format!("metric name cannot be {SCHEMA_FILE_NAME}"));
    }
    Ok(())
}
