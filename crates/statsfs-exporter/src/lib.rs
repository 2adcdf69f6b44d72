// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backends for the metrics discovered by [`statsfs`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod exposition;
pub mod meter;
pub mod pull;
pub mod push;

use config::{ExporterConfig, ExporterKind};
use error::ExporterError;
use meter::CallbackSet;
use statsfs::{register_all, StatsfsRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scans the configured stats filesystem and runs the configured backend
/// until `cancel` fires.
pub async fn run(config: ExporterConfig, cancel: CancellationToken) -> Result<(), ExporterError> {
    let statsfs_path = config.statsfs_path.clone();
    let scan = tokio::task::spawn_blocking(move || StatsfsRegistry::scan(&statsfs_path)).await??;
    if !scan.failures.is_empty() {
        let names: Vec<&str> = scan.failures.iter().map(|f| f.subsystem.as_str()).collect();
        warn!("Not exporting failed subsystems: {}", names.join(", "));
    }

    let registry = Arc::new(scan.registry);
    debug!("Discovered metrics:\n{registry}");

    let mut callbacks = CallbackSet::default();
    let count = register_all(&registry, &mut callbacks);
    info!(
        "Registered {count} metrics from {} subsystems under {}",
        registry.subsystems().len(),
        config.statsfs_path.display()
    );

    match config.exporter {
        ExporterKind::Prometheus => {
            let registry = exposition::registry(&callbacks)?;
            pull::bind_and_serve(&config.prometheus_addr(), registry, cancel).await
        }
        ExporterKind::Stdout => push::run(Arc::new(callbacks), config.push_interval, cancel).await,
    }
}
