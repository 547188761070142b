//! Prometheus metrics for the peer network and block sync.
//!
//! Naming convention: `dc_<area>_<metric>[_<unit>]`.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Registry served on `GET /metrics`.
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PEER NETWORK (dc-01)
    // =========================================================================

    pub static ref PEERS_KNOWN: Gauge = Gauge::new(
        "dc_peers_known",
        "Peers currently held in the peer repository"
    ).expect("metric creation failed");

    pub static ref PEERS_ACCEPTED: Counter = Counter::new(
        "dc_peers_accepted_total",
        "Peers admitted after verification"
    ).expect("metric creation failed");

    pub static ref PEER_REJECTIONS: CounterVec = CounterVec::new(
        Opts::new("dc_peers_rejected_total", "Peer admissions refused, by reason"),
        &["reason"]
    ).expect("metric creation failed");

    pub static ref PEER_SUSPENSIONS: CounterVec = CounterVec::new(
        Opts::new("dc_peers_suspended_total", "Peer suspensions, by offence"),
        &["offence"]
    ).expect("metric creation failed");

    pub static ref NETWORK_QUORUM: Gauge = Gauge::new(
        "dc_network_quorum",
        "Share of sampled peers agreeing with the local chain"
    ).expect("metric creation failed");

    pub static ref NETWORK_HEIGHT: Gauge = Gauge::new(
        "dc_network_height",
        "Median height reported by eligible peers"
    ).expect("metric creation failed");

    /// Time spent serving peer wire requests.
    pub static ref PEER_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "dc_api_peer_request_duration_seconds",
            "Time spent answering peer requests"
        ).buckets(exponential_buckets(0.0005, 2.0, 14).expect("valid buckets")),
        &["route"]
    ).expect("metric creation failed");

    // =========================================================================
    // BLOCK SYNC (dc-02)
    // =========================================================================

    pub static ref CHAIN_HEIGHT: Gauge = Gauge::new(
        "dc_chain_height",
        "Height of the local tip"
    ).expect("metric creation failed");

    pub static ref BLOCKS_ACCEPTED: Counter = Counter::new(
        "dc_blocks_accepted_total",
        "Blocks applied to the local chain"
    ).expect("metric creation failed");

    pub static ref BLOCKS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("dc_blocks_rejected_total", "Blocks not applied, by reason"),
        &["reason"]
    ).expect("metric creation failed");

    pub static ref BLOCKS_REVERTED: Counter = Counter::new(
        "dc_blocks_reverted_total",
        "Blocks removed by rollbacks"
    ).expect("metric creation failed");

    pub static ref FORKS_DETECTED: CounterVec = CounterVec::new(
        Opts::new("dc_forks_detected_total", "Fork signals, by reason"),
        &["reason"]
    ).expect("metric creation failed");

    pub static ref SYNC_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new("dc_sync_transitions_total", "Sync state machine entries, by state"),
        &["state"]
    ).expect("metric creation failed");
}

/// Register every metric with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Peer network
        Box::new(PEERS_KNOWN.clone()),
        Box::new(PEERS_ACCEPTED.clone()),
        Box::new(PEER_REJECTIONS.clone()),
        Box::new(PEER_SUSPENSIONS.clone()),
        Box::new(NETWORK_QUORUM.clone()),
        Box::new(NETWORK_HEIGHT.clone()),
        Box::new(PEER_REQUEST_DURATION.clone()),
        // Block sync
        Box::new(CHAIN_HEIGHT.clone()),
        Box::new(BLOCKS_ACCEPTED.clone()),
        Box::new(BLOCKS_REJECTED.clone()),
        Box::new(BLOCKS_REVERTED.clone()),
        Box::new(FORKS_DETECTED.clone()),
        Box::new(SYNC_TRANSITIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Observes the elapsed time into a histogram when dropped.
pub struct HistogramTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    pub fn new(histogram: prometheus::Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing a labelled histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr, $label:expr) => {
        $crate::metrics::HistogramTimer::new($histogram.with_label_values(&[$label]))
    };
}
