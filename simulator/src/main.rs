mod reading;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Parser;
use rand::Rng;
use reading::{generate_reading, generated_meters, parse_meters, Meter};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "simulator", about = "Publishes simulated smart-meter energy readings over MQTT")]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value = "1883")]
    port: u16,

    /// Target publish rate in messages per second
    #[arg(long, env = "RATE", default_value = "1000")]
    rate: u64,

    /// Comma-separated meter ids, each optionally `id=device_type`
    #[arg(long, env = "DEVICE_IDS")]
    device_ids: Option<String>,

    /// Number of generated meters when no ids are given
    #[arg(long, env = "DEVICES", default_value = "100")]
    devices: usize,

    /// Publish one reading per minute per meter for this many past hours before going live
    #[arg(long, env = "BACKFILL_HOURS", default_value = "0")]
    backfill_hours: u32,
}

const BURST_SIZE: usize = 200;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let meters = match args.device_ids.as_deref() {
        Some(ids) => parse_meters(ids),
        None => generated_meters(args.devices),
    };
    if meters.is_empty() {
        error!("No meters configured");
        std::process::exit(1);
    }
    let rate = args.rate.max(1);

    info!("Starting energy meter simulator");
    info!(
        "Broker: {}:{}, Rate: {} msg/s, Meters: {}",
        args.broker,
        args.port,
        rate,
        meters.len()
    );

    let client_id = format!("sim-{}", uuid::Uuid::new_v4());
    let mut mqtt_options = MqttOptions::new(&client_id, &args.broker, args.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 20000);

    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    info!("Connected to MQTT broker");

    if args.backfill_hours > 0 {
        let published = backfill(&client, &meters, args.backfill_hours, rate).await;
        info!("Backfilled {} historical readings", published);
    }

    info!("Publishing live readings in bursts of {}", BURST_SIZE);
    let burst_interval = Duration::from_millis((BURST_SIZE as u64 * 1000) / rate);
    let mut rng = rand::thread_rng();
    let mut counter = 0u64;

    loop {
        let burst_start = std::time::Instant::now();

        for _ in 0..BURST_SIZE {
            let meter = &meters[(counter % meters.len() as u64) as usize];
            if publish(&client, &mut rng, meter, Utc::now()).await {
                counter += 1;
            }
        }

        if counter % 10_000 < BURST_SIZE as u64 {
            info!("Published {} readings", counter);
        }

        let elapsed = burst_start.elapsed();
        if elapsed < burst_interval {
            tokio::time::sleep(burst_interval - elapsed).await;
        } else if elapsed > burst_interval * 2 {
            warn!(
                "Burst took {:?}, target was {:?} - broker may be overloaded",
                elapsed, burst_interval
            );
        }
    }
}

/// Publishes a minute-by-minute history ending now, paced to `rate`.
async fn backfill(client: &AsyncClient, meters: &[Meter], hours: u32, rate: u64) -> u64 {
    let mut rng = rand::thread_rng();
    let start = Utc::now() - ChronoDuration::hours(hours as i64);
    let pause = Duration::from_micros(1_000_000 / rate);
    let mut published = 0u64;

    for minute in 0..(hours as i64 * 60) {
        let at = start + ChronoDuration::minutes(minute);
        for meter in meters {
            if publish(client, &mut rng, meter, at).await {
                published += 1;
            }
            tokio::time::sleep(pause).await;
        }
    }

    published
}

async fn publish(
    client: &AsyncClient,
    rng: &mut impl Rng,
    meter: &Meter,
    at: DateTime<Utc>,
) -> bool {
    let reading = generate_reading(rng, meter, at);
    let topic = format!("telemetry/{}", reading.device_id);
    let payload = match serde_json::to_string(&reading) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to serialize reading: {}", e);
            return false;
        }
    };

    match client.publish(&topic, QoS::AtLeastOnce, false, payload).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Failed to publish: {}", e);
            false
        }
    }
}
