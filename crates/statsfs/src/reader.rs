// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reads the single number a metric file holds.

use crate::errors::ValueError;
use crate::metric::{Value, ValueType};
use std::fs;
use std::path::Path;

/// Reads `path` and parses its content as `value_type`.
///
/// The file must contain one decimal number, optionally followed by a single
/// newline. Failures are returned as is; retrying is up to the caller.
pub fn read_value(path: &Path, value_type: ValueType) -> Result<Value, ValueError> {
    let bytes = fs::read(path).map_err(|source| ValueError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = |raw: String| ValueError::Parse {
        path: path.to_path_buf(),
        raw,
        expected: value_type,
    };
    let contents = match String::from_utf8(bytes) {
        Ok(contents) => contents,
        Err(e) => return Err(malformed(String::from_utf8_lossy(e.as_bytes()).into_owned())),
    };
    match parse_value(&contents, value_type) {
        Some(value) => Ok(value),
        None => Err(malformed(contents)),
    }
}

/// Parses the raw content of a metric file, or `None` when it is malformed.
pub fn parse_value(contents: &str, value_type: ValueType) -> Option<Value> {
    let text = contents.strip_suffix('\n').unwrap_or(contents);
    match value_type {
        ValueType::Int => text.parse::<i64>().ok().map(Value::Int),
        ValueType::Float => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Value::Float),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_value("42\n", ValueType::Int), Some(Value::Int(42)));
        assert_eq!(parse_value("42", ValueType::Int), Some(Value::Int(42)));
        assert_eq!(parse_value("-7\n", ValueType::Int), Some(Value::Int(-7)));
        assert_eq!(parse_value("1.5\n", ValueType::Int), None);
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(
            parse_value("1.25\n", ValueType::Float),
            Some(Value::Float(1.25))
        );
        assert_eq!(parse_value("3\n", ValueType::Float), Some(Value::Float(3.0)));
        assert_eq!(parse_value("NaN\n", ValueType::Float), None);
        assert_eq!(parse_value("inf", ValueType::Float), None);
    }

    #[test]
    fn test_only_one_trailing_newline_is_trimmed() {
        assert_eq!(parse_value("42\n\n", ValueType::Int), None);
        assert_eq!(parse_value(" 42\n", ValueType::Int), None);
        assert_eq!(parse_value("42 \n", ValueType::Int), None);
        assert_eq!(parse_value("", ValueType::Int), None);
    }

    #[test]
    fn test_read_value_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency");
        fs::write(&path, "1234\n").unwrap();

        assert_eq!(read_value(&path, ValueType::Int).unwrap(), Value::Int(1234));
        assert_eq!(
            read_value(&path, ValueType::Float).unwrap(),
            Value::Float(1234.0)
        );
    }

    #[test]
    fn test_read_value_missing_file() {
        let path = PathBuf::from("/nonexistent/statsfs/metric");
        match read_value(&path, ValueType::Int) {
            Err(ValueError::Read { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected read error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_value_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency");
        fs::write(&path, "fast\n").unwrap();

        match read_value(&path, ValueType::Int) {
            Err(ValueError::Parse { raw, expected, .. }) => {
                assert_eq!(raw, "fast\n");
                assert_eq!(expected, ValueType::Int);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_value_non_utf8_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency");
        fs::write(&path, b"4\xff2\n").unwrap();

        match read_value(&path, ValueType::Int) {
            Err(ValueError::Parse { raw, .. }) => assert_eq!(raw, "4\u{fffd}2\n"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
