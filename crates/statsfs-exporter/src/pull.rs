// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP endpoint serving the Prometheus exposition on every scrape.

use crate::error::ExporterError;
use crate::exposition;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use prometheus::Registry;
use std::convert::Infallible;
use std::io;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const METRICS_ENDPOINT_PATH: &str = "/metrics";

/// Binds `addr` and serves until `cancel` fires.
pub async fn bind_and_serve(
    addr: &str,
    registry: Registry,
    cancel: CancellationToken,
) -> Result<(), ExporterError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ExporterError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!("Serving metrics on http://{addr}{METRICS_ENDPOINT_PATH}");
    serve(listener, registry, cancel).await
}

/// Accepts connections on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    registry: Registry,
    cancel: CancellationToken,
) -> Result<(), ExporterError> {
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            () = cancel.cancelled() => {
                debug!("Metrics endpoint shutting down");
                joinset.abort_all();
                return Ok(());
            },
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(e.into());
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
        };
        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let registry = registry.clone();
        let service = hyper::service::service_fn(move |req| handle(req, registry.clone()));
        joinset.spawn(async move {
            if let Err(e) = server.serve_connection(conn, service).await {
                error!("Connection error: {e}");
            }
        });
    }
}

async fn handle(
    req: Request<Incoming>,
    registry: Registry,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    drop(req);

    match (&method, path.as_str()) {
        (&Method::GET, METRICS_ENDPOINT_PATH) => {
            let body = tokio::task::spawn_blocking(move || exposition::encode(&registry)).await;
            let error = match body {
                Ok(Ok(body)) => {
                    let content_type = HeaderValue::from_str(&exposition::content_type())
                        .unwrap_or_else(|_| HeaderValue::from_static("text/plain"));
                    return Ok(response(StatusCode::OK, content_type, body));
                }
                Ok(Err(e)) => e,
                Err(e) => ExporterError::from(e),
            };
            error!("Metrics collection failed: {error}");
            Ok(response(
                StatusCode::INTERNAL_SERVER_ERROR,
                HeaderValue::from_static("text/plain"),
                "collection failed\n",
            ))
        }
        (_, METRICS_ENDPOINT_PATH) => Ok(response(
            StatusCode::METHOD_NOT_ALLOWED,
            HeaderValue::from_static("text/plain"),
            "method not allowed\n",
        )),
        (_, path) => {
            debug!("No route for {path}");
            Ok(response(
                StatusCode::NOT_FOUND,
                HeaderValue::from_static("text/plain"),
                "not found\n",
            ))
        }
    }
}

fn response(
    status: StatusCode,
    content_type: HeaderValue,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    response
}
