// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that stop the exporter
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to scan stats filesystem: {0}")]
    Scan(#[from] statsfs::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode metrics: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Collection task failed: {0}")]
    Collection(#[from] tokio::task::JoinError),
}
