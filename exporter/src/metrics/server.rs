//! HTTP exporter serving `/metrics` with `hyper`.
//!
//! Binding and serving are split so the binary can treat a bind failure as
//! a startup error before the poll loop starts:
//!
//! ```ignore
//! let listener = bind_metrics_listener(cfg.metrics.listen_addr).await?;
//! tokio::spawn(serve_metrics(listener, metrics.clone()));
//! ```

use std::{convert::Infallible, future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header::CONTENT_TYPE, header::HeaderValue,
    server::conn::http1, service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use super::registry::MetricsRegistry;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds the metrics listener.
pub async fn bind_metrics_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Serves `GET /metrics` on `listener` for the life of the process.
///
/// Each connection is handled on its own task. Scrapes only read the
/// registry, so they run concurrently with collection passes. Accept
/// errors are logged and retried after a short pause.
pub async fn serve_metrics(listener: TcpListener, metrics: Arc<MetricsRegistry>) {
    loop {
        let (stream, peer) = next_connection(|| listener.accept()).await;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!(%peer, "metrics connection error: {err}");
            }
        });
    }
}

async fn next_connection<A, F, S>(mut accept: A) -> (S, SocketAddr)
where
    A: FnMut() -> F,
    F: Future<Output = io::Result<(S, SocketAddr)>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(err) => {
                tracing::warn!("metrics listener accept failed: {err}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut resp = Response::new(Full::new(Bytes::from(metrics.gather_text())));
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
            Ok(resp)
        }
        _ => {
            let mut resp = Response::new(Full::new(Bytes::from_static(b"not found")));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            Ok(resp)
        }
    }
}
