use assistant::aggregate::{rank_by_average, summarize};
use assistant::compose::{GREETING, NO_DEVICES};
use assistant::errors::{Error, Result};
use assistant::model::{Device, DeviceAverage, ReadingStats, TelemetryReading, UserId};
use assistant::nlm::{Classifier, Extractor};
use assistant::router::ChatPipeline;
use assistant::store::EnergyStore;
use assistant::window::TimeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Store over fixed vectors, applying the same owner and window rules as Postgres.
#[derive(Default)]
struct MemoryStore {
    devices: Vec<Device>,
    readings: Vec<TelemetryReading>,
}

impl MemoryStore {
    fn add_device(&mut self, owner: UserId, name: &str, device_type: &str) -> i64 {
        let id = self.devices.len() as i64 + 1;
        self.devices.push(Device {
            id,
            device_id: format!("dev-{id}"),
            name: name.to_string(),
            device_type: device_type.to_string(),
            user_id: owner,
            is_active: true,
            created_at: DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap(),
        });
        id
    }

    fn add_readings(&mut self, device_id: i64, at: DateTime<Utc>, watts: &[f64]) {
        for (i, w) in watts.iter().enumerate() {
            self.readings.push(TelemetryReading {
                device_id,
                timestamp: at + Duration::seconds(i as i64),
                energy_watts: *w,
            });
        }
    }

    fn owned(&self, owner: UserId, device_id: i64) -> bool {
        self.devices
            .iter()
            .any(|d| d.id == device_id && d.user_id == owner)
    }

    fn matching(
        &self,
        owner: UserId,
        device_ids: &[i64],
        window: TimeWindow,
    ) -> Vec<TelemetryReading> {
        self.readings
            .iter()
            .filter(|r| device_ids.contains(&r.device_id) && self.owned(owner, r.device_id))
            .filter(|r| window.contains(r.timestamp))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EnergyStore for MemoryStore {
    async fn list_devices(&self, owner: UserId) -> Result<Vec<Device>> {
        Ok(self
            .devices
            .iter()
            .filter(|d| d.user_id == owner)
            .cloned()
            .collect())
    }

    async fn find_device_by_name(&self, owner: UserId, name: &str) -> Result<Option<Device>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .devices
            .iter()
            .find(|d| d.user_id == owner && d.name.to_lowercase() == wanted)
            .cloned())
    }

    async fn query_readings(
        &self,
        owner: UserId,
        device_ids: &[i64],
        window: TimeWindow,
        limit: i64,
    ) -> Result<Vec<TelemetryReading>> {
        let mut readings = self.matching(owner, device_ids, window);
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readings.truncate(limit.max(0) as usize);
        Ok(readings)
    }

    async fn aggregate_readings(
        &self,
        owner: UserId,
        device_ids: &[i64],
        window: TimeWindow,
    ) -> Result<ReadingStats> {
        Ok(summarize(&self.matching(owner, device_ids, window)))
    }

    async fn rank_devices_by_average(
        &self,
        owner: UserId,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<DeviceAverage>> {
        let ids: Vec<i64> = self
            .devices
            .iter()
            .filter(|d| d.user_id == owner)
            .map(|d| d.id)
            .collect();

        let mut by_device: BTreeMap<i64, Vec<TelemetryReading>> = BTreeMap::new();
        for r in self.matching(owner, &ids, window) {
            by_device.entry(r.device_id).or_default().push(r);
        }

        let averages = by_device
            .into_iter()
            .filter_map(|(id, readings)| {
                let device = self.devices.iter().find(|d| d.id == id)?.clone();
                Some(DeviceAverage {
                    device,
                    average_power_watts: summarize(&readings).average_power_watts,
                })
            })
            .collect();

        Ok(rank_by_average(averages, limit))
    }
}

/// Language model stand-in with a fixed label and parameter reply.
struct ScriptedModel {
    label: &'static str,
    params: Option<&'static str>,
    extract_calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(label: &'static str, params: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            label,
            params,
            extract_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Classifier for ScriptedModel {
    async fn classify(&self, _text: &str) -> Result<String> {
        Ok(self.label.to_string())
    }
}

#[async_trait]
impl Extractor for ScriptedModel {
    async fn extract_parameters(&self, _text: &str) -> Result<String> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.params
            .map(str::to_string)
            .ok_or_else(|| Error::Nlm("model unavailable".to_string()))
    }
}

fn today_midnight() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn pipeline(model: &Arc<ScriptedModel>, store: MemoryStore) -> ChatPipeline {
    ChatPipeline::new(model.clone(), model.clone(), Arc::new(store))
}

const ALICE: UserId = 1;
const BOB: UserId = 2;

#[tokio::test]
async fn greeting_skips_extraction_and_storage() {
    let model = ScriptedModel::new("GREETING", Some("{}"));

    let response = pipeline(&model, MemoryStore::default())
        .process("Hello", ALICE, None)
        .await;

    assert_eq!(response.answer, GREETING);
    assert!(response.data.is_none());
    assert!(!response.chat_id.is_empty());
    assert_eq!(model.extract_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn device_usage_for_yesterday() {
    let mut store = MemoryStore::default();
    let fridge = store.add_device(ALICE, "Kitchen Fridge", "refrigerator");
    let yesterday_noon = today_midnight() - Duration::hours(12);
    store.add_readings(fridge, yesterday_noon, &[100.0, 150.0, 50.0]);
    store.add_readings(fridge, today_midnight(), &[900.0]);

    let model = ScriptedModel::new(
        "ENERGY_USAGE",
        Some(r#"{"device_name": "kitchen fridge", "time_period": "yesterday"}"#),
    );
    let response = pipeline(&model, store)
        .process("How much energy did my fridge use yesterday?", ALICE, Some("c-1".into()))
        .await;

    assert_eq!(response.chat_id, "c-1");
    assert!(response.answer.contains("Kitchen Fridge (yesterday)"));
    assert!(response.answer.contains("Average power: 100.0 watts"));
    assert!(response.answer.contains("Peak power: 150.0 watts"));
    assert!(response.answer.contains("Total readings: 3"));

    let data = response.data.expect("usage data");
    assert_eq!(data["average_power"], 100.0);
    assert_eq!(data["max_power"], 150.0);
    assert_eq!(data["readings_count"], 3);
    assert_eq!(model.extract_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_device_lists_only_own_devices() {
    let mut store = MemoryStore::default();
    store.add_device(ALICE, "Living Room AC", "air_conditioner");
    store.add_device(ALICE, "TV", "television");
    store.add_device(BOB, "fridge", "refrigerator");

    let model = ScriptedModel::new(
        "ENERGY_USAGE",
        Some(r#"{"device_name": "fridge", "time_period": "yesterday"}"#),
    );
    let response = pipeline(&model, store)
        .process("How much energy did my fridge use yesterday?", ALICE, None)
        .await;

    assert!(response.answer.contains("couldn't find a device named 'fridge'"));
    assert!(response.answer.contains("Living Room AC (air_conditioner)"));
    assert!(response.answer.contains("TV (television)"));
    assert!(!response.answer.contains("refrigerator"));
    assert!(response.data.is_none());
}

#[tokio::test]
async fn top_consumers_is_capped_at_ten() {
    let mut store = MemoryStore::default();
    for i in 0..15 {
        let id = store.add_device(ALICE, &format!("Plug {i}"), "appliance");
        store.add_readings(id, today_midnight(), &[100.0 + i as f64]);
    }

    let model = ScriptedModel::new("TOP_CONSUMERS", Some(r#"{"limit": 50}"#));
    let response = pipeline(&model, store)
        .process("What are my top 50 energy consumers?", ALICE, None)
        .await;

    let data = response.data.expect("ranking data");
    let top = data["top_consumers"].as_array().expect("list");
    assert_eq!(top.len(), 10);
    assert_eq!(top[0]["name"], "Plug 14");
    assert_eq!(top[9]["name"], "Plug 5");
    assert!(response.answer.starts_with("Top 10 energy consuming devices (all time):"));
}

#[tokio::test]
async fn non_json_extraction_falls_back_to_today() {
    let mut store = MemoryStore::default();
    let ac = store.add_device(ALICE, "Living Room AC", "air_conditioner");
    store.add_readings(ac, today_midnight(), &[1000.0, 3000.0]);
    store.add_readings(ac, today_midnight() - Duration::days(3), &[9000.0]);

    let model = ScriptedModel::new("ENERGY_SUMMARY", Some("Sure! Here is what I found."));
    let response = pipeline(&model, store)
        .process("Show me my energy summary", ALICE, None)
        .await;

    assert!(response.answer.starts_with("Energy summary (today):"));
    assert!(response.answer.contains("Average power: 2000.0 watts"));
    assert!(response.answer.contains("Minimum power: 1000.0 watts"));

    let data = response.data.expect("summary data");
    assert_eq!(data["time_period"], "today");
    assert_eq!(data["reading_count"], 2);
    assert_eq!(data["max_power_watts"], 3000.0);
}

#[tokio::test]
async fn extraction_outage_still_summarizes() {
    let mut store = MemoryStore::default();
    let tv = store.add_device(ALICE, "TV", "television");
    store.add_readings(tv, today_midnight(), &[80.0]);

    let model = ScriptedModel::new("ENERGY_SUMMARY", None);
    let response = pipeline(&model, store)
        .process("Energy report please", ALICE, None)
        .await;

    assert!(response.answer.contains("Total readings: 1"));
    assert!(response.data.is_some());
}

#[tokio::test]
async fn colliding_names_stay_with_their_owner() {
    let mut store = MemoryStore::default();
    let alice_tv = store.add_device(ALICE, "TV", "television");
    let bob_tv = store.add_device(BOB, "TV", "television");
    store.add_readings(alice_tv, today_midnight(), &[100.0]);
    store.add_readings(bob_tv, today_midnight(), &[5000.0, 5000.0]);

    let model = ScriptedModel::new("ENERGY_USAGE", Some(r#"{"device_name": "TV"}"#));
    let response = pipeline(&model, store)
        .process("How much is my TV using today?", ALICE, None)
        .await;

    let data = response.data.expect("usage data");
    assert_eq!(data["device_id"], "dev-1");
    assert_eq!(data["max_power"], 100.0);
    assert_eq!(data["readings_count"], 1);
}

#[tokio::test]
async fn ranking_never_includes_other_users() {
    let mut store = MemoryStore::default();
    let fridge = store.add_device(ALICE, "Kitchen Fridge", "refrigerator");
    let heater = store.add_device(BOB, "Pool Heater", "appliance");
    store.add_readings(fridge, today_midnight(), &[120.0]);
    store.add_readings(heater, today_midnight(), &[6000.0]);

    let model = ScriptedModel::new("DEVICE_COMPARISON", Some(r#"{"comparison": "true"}"#));
    let response = pipeline(&model, store)
        .process("Compare my devices", ALICE, None)
        .await;

    assert!(response.answer.contains("Kitchen Fridge"));
    assert!(!response.answer.contains("Pool Heater"));
}

#[tokio::test]
async fn ranking_ties_follow_creation_order() {
    let mut store = MemoryStore::default();
    for name in ["Washer", "Dryer", "Dishwasher"] {
        let id = store.add_device(ALICE, name, "appliance");
        store.add_readings(id, today_midnight(), &[500.0]);
    }
    let model = ScriptedModel::new("TOP_CONSUMERS", Some("{}"));
    let pipeline = pipeline(&model, store);

    let first = pipeline.process("Top consumers?", ALICE, None).await;
    let second = pipeline.process("Top consumers?", ALICE, None).await;

    assert_eq!(first.answer, second.answer);
    assert_eq!(first.data, second.data);
    let top = first.data.expect("ranking data");
    assert_eq!(top["top_consumers"][0]["name"], "Washer");
    assert_eq!(top["top_consumers"][1]["name"], "Dryer");
    assert_eq!(top["top_consumers"][2]["name"], "Dishwasher");
}

#[tokio::test]
async fn device_type_summary_and_missing_type() {
    let mut store = MemoryStore::default();
    let washer = store.add_device(ALICE, "Washing Machine", "appliance");
    let dish = store.add_device(ALICE, "Dishwasher", "appliance");
    store.add_device(ALICE, "TV", "television");
    store.add_readings(washer, today_midnight(), &[400.0]);
    store.add_readings(dish, today_midnight(), &[600.0]);

    let model = ScriptedModel::new("ENERGY_USAGE", Some(r#"{"device_type": "Appliance"}"#));
    let response = pipeline(&model, store)
        .process("How much are my appliances using?", ALICE, None)
        .await;
    let data = response.data.expect("summary data");
    assert_eq!(data["device_count"], 2);
    assert_eq!(data["average_power_watts"], 500.0);

    let mut store = MemoryStore::default();
    store.add_device(ALICE, "TV", "television");
    let model = ScriptedModel::new("ENERGY_USAGE", Some(r#"{"device_type": "heater"}"#));
    let response = pipeline(&model, store)
        .process("How much are my heaters using?", ALICE, None)
        .await;
    assert!(response.answer.contains("any devices of type 'heater'"));
    assert!(response.data.is_none());
}

#[tokio::test]
async fn device_list_without_devices() {
    let model = ScriptedModel::new("DEVICE_LIST", Some("{}"));
    let response = pipeline(&model, MemoryStore::default())
        .process("What devices do I have?", ALICE, None)
        .await;

    assert_eq!(response.answer, NO_DEVICES);
    assert!(response.data.is_none());
    assert_eq!(model.extract_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn every_intent_produces_an_answer() {
    let labels = [
        "ENERGY_USAGE",
        "DEVICE_COMPARISON",
        "TOP_CONSUMERS",
        "ENERGY_SUMMARY",
        "DEVICE_LIST",
        "GREETING",
        "THANKS",
        "GOODBYE",
        "OFF_TOPIC",
        "SOMETHING_ELSE",
    ];
    for label in labels {
        let model = ScriptedModel::new(label, Some("not json"));
        let response = pipeline(&model, MemoryStore::default())
            .process("anything", ALICE, Some("  ".into()))
            .await;
        assert!(!response.chat_id.trim().is_empty(), "{label}");
        assert!(!response.answer.is_empty(), "{label}");
    }
}
