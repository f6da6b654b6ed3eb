use assistant::config::Config;
use assistant::errors::Result;
use assistant::nlm::ChatCompletionsClient;
use assistant::router::ChatPipeline;
use assistant::store::PgEnergyStore;
use assistant::{batching, db, metrics, mqtt, rest};
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("Starting energy assistant");
    info!("MQTT broker: {}:{}", config.mqtt_broker, config.mqtt_port);
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.redacted_database_url());
    info!("Language model: {} via {}", config.nlm.model, config.nlm.base_url);
    if config.nlm.api_key.is_none() {
        warn!("No NLM_API_KEY set; every query will be answered as off-topic");
    }

    metrics::init_metrics();

    let pool = match db::make_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let nlm = match ChatCompletionsClient::new(&config.nlm) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build language model client: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = Arc::new(ChatPipeline::new(
        nlm.clone(),
        nlm.clone(),
        Arc::new(PgEnergyStore::new(pool.clone())),
    ));

    info!("Channel capacity: {}", config.channel_capacity);
    let (tx, rx) = mpsc::channel(config.channel_capacity);

    let client_id = format!("assistant-{}", uuid::Uuid::new_v4());
    let (broker, port) = (config.mqtt_broker.clone(), config.mqtt_port);
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt::run_mqtt(broker, port, client_id, tx).await {
            error!("MQTT task failed: {}", e);
        }
    });

    let batcher_pool = pool.clone();
    let (batch_size, batch_timeout_ms) = (config.batch_size, config.batch_timeout_ms);
    let batcher_handle = tokio::spawn(async move {
        batching::run_batcher(rx, batcher_pool, batch_size, batch_timeout_ms).await;
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(pipeline, nlm.model()));

    let http_addr = config.http_addr.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = serve(&http_addr, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = mqtt_handle => {
            error!("MQTT task terminated");
        }
        _ = batcher_handle => {
            error!("Batcher task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

async fn serve(addr: &str, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
