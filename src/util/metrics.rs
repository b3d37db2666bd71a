//! Prometheus metrics for the reconcile loop, served over a bare `hyper`
//! listener (no axum/tower here — this binary's only HTTP surface is
//! `/metrics` and `/healthz`, so a full router is unneeded weight).

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use owo_colors::OwoColorize;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};
use std::convert::Infallible;
use tokio::net::TcpListener;

pub struct ControllerMetrics {
    registry: Registry,
    pub reconcile_passes_total: IntCounterVec,
    pub reconcile_errors_total: IntCounterVec,
    pub admissions_total: IntCounterVec,
    pub pass_duration_seconds: HistogramVec,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let reconcile_passes_total = IntCounterVec::new(
            prometheus::Opts::new(
                "reboot_reconcile_passes_total",
                "Total reconciliation passes attempted, by phase outcome",
            ),
            &["outcome"],
        )
        .expect("metric registration");

        let reconcile_errors_total = IntCounterVec::new(
            prometheus::Opts::new(
                "reboot_reconcile_errors_total",
                "Total reconciliation passes aborted by an error, by error kind",
            ),
            &["kind"],
        )
        .expect("metric registration");

        let admissions_total = IntCounterVec::new(
            prometheus::Opts::new(
                "reboot_admissions_total",
                "Total nodes admitted into the pre-check phase",
            ),
            &["node"],
        )
        .expect("metric registration");

        let pass_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "reboot_pass_duration_seconds",
                "Wall time of one full five-phase reconciliation pass",
            ),
            &["outcome"],
        )
        .expect("metric registration");

        registry
            .register(Box::new(reconcile_passes_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(reconcile_errors_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(admissions_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(pass_duration_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            reconcile_passes_total,
            reconcile_errors_total,
            admissions_total,
            pass_duration_seconds,
        }
    }

    fn render(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode(&families, &mut buf).expect("encode metrics");
        buf
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle(
    metrics: std::sync::Arc<ControllerMetrics>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = match req.uri().path() {
        "/healthz" | "/readyz" => Bytes::from_static(b"ok"),
        "/metrics" => Bytes::from(metrics.render()),
        _ => {
            return Ok(Response::builder()
                .status(404)
                .body(Full::new(Bytes::from_static(b"not found")))
                .unwrap());
        }
    };
    Ok(Response::new(Full::new(body)))
}

/// Spawns the metrics server in the background. Never returns an error to
/// the caller: a bind failure here is logged and the process continues
/// without metrics, since metrics are an observability aid, not part of
/// the reconciliation protocol's correctness.
pub fn spawn(port: u16, metrics: std::sync::Arc<ControllerMetrics>) {
    tokio::spawn(async move {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                eprintln!(
                    "{}",
                    format!("🛑 failed to bind metrics server to {addr}: {e}").red()
                );
                return;
            }
        };
        println!(
            "{}{}",
            "📈 metrics server listening • port=".green(),
            port.to_string().green().dimmed()
        );
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    eprintln!("{}", format!("metrics server accept error: {e}").red());
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let metrics = metrics.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| handle(metrics.clone(), req));
                if let Err(e) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    eprintln!("metrics connection error: {e}");
                }
            });
        }
    });
}
