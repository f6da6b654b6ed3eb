use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Ingestion
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_messages_total",
        "Total readings received from MQTT"
    ))
    .unwrap();
    pub static ref VALID_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_valid_messages_total",
        "Total readings accepted after validation"
    ))
    .unwrap();
    pub static ref INVALID_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_invalid_messages_total",
        "Total readings rejected"
    ))
    .unwrap();
    pub static ref READINGS_SKIPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_readings_skipped_total",
        "Readings not stored because the device is unknown or the reading is a duplicate"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_db_failures_total",
        "Total database insert failures"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "assistant_ingest_latency_seconds",
            "Time taken to ingest batch into DB"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
    pub static ref BATCH_SIZE: Gauge = Gauge::with_opts(Opts::new(
        "assistant_batch_size",
        "Current batch size being processed"
    ))
    .unwrap();
    pub static ref CHANNEL_FULL_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_channel_full_total",
        "Total number of times channel was full (backpressure events)"
    ))
    .unwrap();

    // Chat pipeline
    pub static ref CHAT_QUERIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("assistant_chat_queries_total", "Chat queries by classified intent"),
        &["intent"]
    )
    .unwrap();
    pub static ref NLM_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("assistant_nlm_failures_total", "Failed language model calls"),
        &["call"]
    )
    .unwrap();
    pub static ref UNKNOWN_INTENTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_unknown_intents_total",
        "Classifier replies outside the known intent set"
    ))
    .unwrap();
    pub static ref EXTRACTION_FALLBACKS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_extraction_fallbacks_total",
        "Extractor replies that held no JSON object"
    ))
    .unwrap();
    pub static ref STORAGE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "assistant_storage_failures_total",
        "Chat handlers that failed on a storage error"
    ))
    .unwrap();
    pub static ref CHAT_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "assistant_chat_latency_seconds",
            "End-to-end chat pipeline latency"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(MESSAGES_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(VALID_MESSAGES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INVALID_MESSAGES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(READINGS_SKIPPED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DB_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INGEST_LATENCY_SECONDS.clone()))
        .unwrap();
    REGISTRY.register(Box::new(BATCH_SIZE.clone())).unwrap();
    REGISTRY
        .register(Box::new(CHANNEL_FULL_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CHAT_QUERIES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(NLM_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(UNKNOWN_INTENTS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(EXTRACTION_FALLBACKS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(STORAGE_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CHAT_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
