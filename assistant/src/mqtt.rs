use crate::errors::{Error, Result};
use crate::metrics::{
    CHANNEL_FULL_TOTAL, INVALID_MESSAGES_TOTAL, MESSAGES_TOTAL, VALID_MESSAGES_TOTAL,
};
use crate::model::EnergyReading;
use crate::retry::{with_backoff, Backoff};
use crate::validate::validate;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub const TELEMETRY_TOPIC: &str = "telemetry/#";

const HANDOFF_BACKOFF: Backoff =
    Backoff::new(2, Duration::from_millis(100), Duration::from_millis(2000));

pub async fn run_mqtt(
    broker: String,
    port: u16,
    client_id: String,
    tx: mpsc::Sender<EnergyReading>,
) -> Result<()> {
    info!("Connecting to MQTT broker at {}:{}", broker, port);

    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(false);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10000);

    client.subscribe(TELEMETRY_TOPIC, QoS::AtLeastOnce).await?;
    info!("Subscribed to {} with QoS 1", TELEMETRY_TOPIC);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                MESSAGES_TOTAL.inc();
                debug!(
                    "Received message on topic {}, size: {} bytes",
                    publish.topic,
                    publish.payload.len()
                );

                let handed_off = with_backoff(
                    &HANDOFF_BACKOFF,
                    "Reading handoff",
                    is_retryable_error,
                    || process_message(&publish.payload, &tx),
                )
                .await;

                if let Err(e) = handed_off {
                    debug!("Dropped message on {}: {}", publish.topic, e);
                    INVALID_MESSAGES_TOTAL.inc();
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                // rumqttc reconnects on the next poll
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Decodes, validates and forwards one payload to the batcher.
async fn process_message(payload: &[u8], tx: &mpsc::Sender<EnergyReading>) -> Result<()> {
    let reading = serde_json::from_slice::<EnergyReading>(payload)
        .map_err(|e| Error::Validation(format!("JSON parse error: {}", e)))?;

    validate(&reading)?;

    match tx.try_send(reading) {
        Ok(()) => {
            VALID_MESSAGES_TOTAL.inc();
            Ok(())
        }
        Err(mpsc::error::TrySendError::Full(reading)) => {
            CHANNEL_FULL_TOTAL.inc();
            debug!("Channel full, waiting for capacity");
            tx.send(reading).await.map_err(|_| Error::ChannelSend)?;
            VALID_MESSAGES_TOTAL.inc();
            Ok(())
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            error!("Channel closed, cannot forward reading");
            Err(Error::ChannelSend)
        }
    }
}

/// Only a failed channel handoff is worth another attempt; bad payloads stay bad.
fn is_retryable_error(error: &Error) -> bool {
    matches!(error, Error::ChannelSend)
}
