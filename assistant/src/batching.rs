use crate::db::insert_batch;
use crate::metrics::{BATCH_SIZE, INGEST_LATENCY_SECONDS};
use crate::model::EnergyReading;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info};

pub async fn run_batcher(
    mut rx: mpsc::Receiver<EnergyReading>,
    pool: PgPool,
    max_batch: usize,
    max_wait_ms: u64,
) {
    info!(
        "Starting batcher with max_batch={}, max_wait_ms={}",
        max_batch, max_wait_ms
    );

    let mut buffer: Vec<EnergyReading> = Vec::with_capacity(max_batch);
    let mut ticker = interval(Duration::from_millis(max_wait_ms.max(1)));

    loop {
        tokio::select! {
            reading = rx.recv() => {
                match reading {
                    Some(r) => {
                        buffer.push(r);
                        if buffer.len() >= max_batch {
                            flush_batch(&pool, &mut buffer).await;
                        }
                    }
                    None => {
                        info!("Channel closed, flushing remaining batch");
                        flush_batch(&pool, &mut buffer).await;
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush_batch(&pool, &mut buffer).await;
                }
            }
        }
    }

    info!("Batcher stopped");
}

/// Writes the buffer and clears it. Retries happen inside `insert_batch`; a batch that
/// still fails is dropped so ingestion keeps moving.
async fn flush_batch(pool: &PgPool, buffer: &mut Vec<EnergyReading>) {
    let batch_len = buffer.len();
    if batch_len == 0 {
        return;
    }

    debug!("Flushing batch of {} readings", batch_len);
    BATCH_SIZE.set(batch_len as f64);

    let start = Instant::now();
    match insert_batch(pool, buffer).await {
        Ok(inserted) => {
            let elapsed = start.elapsed().as_secs_f64();
            INGEST_LATENCY_SECONDS.observe(elapsed);
            debug!(
                "Inserted {}/{} readings in {:.3}s",
                inserted, batch_len, elapsed
            );
        }
        Err(e) => {
            error!("Failed to insert batch: {}", e);
            error!(
                "CRITICAL: {} readings dropped due to persistent DB failure",
                batch_len
            );
        }
    }

    buffer.clear();
    BATCH_SIZE.set(0.0);
}
