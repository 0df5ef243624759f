// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Submission / confirmation --------
pub static SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("submissions_total", "transactions or groups submitted (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static CONFIRMATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "confirmation_outcomes_total",
            "wait outcomes (label: outcome = confirmed|rejected|timeout|cancelled)",
        ),
        &["outcome"],
    )
    .unwrap()
});

pub static CONFIRM_ROUNDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("confirmation_rounds", "ledger rounds waited per confirmation")
            .buckets(vec![0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
    )
    .unwrap()
});

pub static TRANSIENT_QUERY_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "status_query_transient_total",
        "status queries that failed or found nothing yet",
    )
    .unwrap()
});

// -------- Seeding --------
pub static TICKS_SEEDED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("ticks_seeded_total", "ticks minted").unwrap());

pub static TICKS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ticks_skipped_total", "ticks skipped because both legs were zero").unwrap()
});

pub static DEPOSITED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("liquidity_deposited_total", "units deposited (label: leg = a|b)"),
        &["leg"],
    )
    .unwrap()
});

// -------- Orchestrator --------
pub static STAGE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("orchestrator_stage", "index of the last stage entered").unwrap()
});

pub static JOURNAL_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("journal_events_dropped_total", "journal events dropped on a full or closed channel")
        .unwrap()
});

pub static CONFIG_CURVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_curve", "curve configuration (label: param)"),
        &["param"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(SUBMISSIONS.clone())),
        REGISTRY.register(Box::new(CONFIRMATIONS.clone())),
        REGISTRY.register(Box::new(CONFIRM_ROUNDS.clone())),
        REGISTRY.register(Box::new(TRANSIENT_QUERY_ERRORS.clone())),
        REGISTRY.register(Box::new(TICKS_SEEDED.clone())),
        REGISTRY.register(Box::new(TICKS_SKIPPED.clone())),
        REGISTRY.register(Box::new(DEPOSITED.clone())),
        REGISTRY.register(Box::new(STAGE.clone())),
        REGISTRY.register(Box::new(JOURNAL_DROPPED.clone())),
        REGISTRY.register(Box::new(CONFIG_CURVE.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Tiny HTTP 1.1 responder: any request gets the metrics page
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Metrics server lives on its own OS thread, off the runtime
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(%addr, ?e, "metrics bind failed, metrics disabled");
                return;
            }
        };
        tracing::info!("metrics listening on http://{addr}/metrics");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(?e, "metrics accept error"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_are_encoded() {
        init();
        SUBMISSIONS.with_label_values(&["mint"]).inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("submissions_total"));
    }
}
