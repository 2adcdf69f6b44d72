// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic export of every metric as one JSON document per line.

use crate::error::ExporterError;
use crate::meter::{CallbackSet, MetricSnapshot};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
struct Document<'a> {
    /// Seconds since the Unix epoch
    timestamp: u64,
    metrics: &'a [MetricSnapshot],
}

/// Writes `snapshots` as a single JSON line.
pub fn write_snapshot<W: Write>(
    out: &mut W,
    timestamp: u64,
    snapshots: &[MetricSnapshot],
) -> Result<(), ExporterError> {
    serde_json::to_writer(
        &mut *out,
        &Document {
            timestamp,
            metrics: snapshots,
        },
    )?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Collects `callbacks` every `period` and writes the result to stdout until
/// `cancel` fires.
pub async fn run(
    callbacks: Arc<CallbackSet>,
    period: Duration,
    cancel: CancellationToken,
) -> Result<(), ExporterError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Stdout exporter shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                let callbacks = Arc::clone(&callbacks);
                let snapshots = tokio::task::spawn_blocking(move || callbacks.collect()).await?;
                let timestamp = UNIX_EPOCH.elapsed().map_or(0, |d| d.as_secs());
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = write_snapshot(&mut stdout, timestamp, &snapshots) {
                    error!("Failed to export metrics: {e}");
                }
                debug!("Exported {} metrics", snapshots.len());
            }
        }
    }
}
