//! Driver flow tests
//!
//! Feeds internal-bus messages, SCADA commands and connection events into a
//! `SyncDriver` and checks what it publishes.

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::disallowed_methods)]

use gateway_common::FixedTimeProvider;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sparkplug_sync::{
    CatalogDevice, CatalogPoint, ChannelPublisher, ConnectionEvent, DataType, DeviceStatus,
    InboundMessage, MetricValue, OutboundMessage, Publisher, RegisterType, SparkplugMessageType,
    SparkplugTopic, StaticCatalog, SyncConfig, SyncDriver, SyncEngine, WireMetric, WirePayload,
    WireValue,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const NOW: u64 = 1_700_000_000_000_000;
const GROUP: &str = "UWC nodes";
const EDGE: &str = "edge-1";

#[derive(Default)]
struct RecordingPublisher {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl RecordingPublisher {
    fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, message: OutboundMessage) -> sparkplug_sync::Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

fn point(id: &str, data_type: &str, register_type: RegisterType, realtime: bool) -> CatalogPoint {
    CatalogPoint {
        id: id.to_string(),
        data_type: data_type.to_string(),
        width: 1,
        address: 40001,
        register_type,
        poll_interval_ms: 1000,
        realtime,
    }
}

fn config() -> SyncConfig {
    SyncConfig {
        edge_node_id: EDGE.to_string(),
        catalog: StaticCatalog {
            devices: vec![CatalogDevice {
                site: "PL0".to_string(),
                device: "flowmeter".to_string(),
                points: vec![
                    point("Flow", "uint", RegisterType::HoldingRegister, false),
                    point("Valve", "boolean", RegisterType::Coil, true),
                ],
            }],
        },
        ..Default::default()
    }
}

fn setup() -> (Arc<SyncDriver>, Arc<RecordingPublisher>) {
    setup_with(config())
}

fn setup_with(config: SyncConfig) -> (Arc<SyncDriver>, Arc<RecordingPublisher>) {
    let engine = Arc::new(SyncEngine::new(
        config,
        Arc::new(FixedTimeProvider::new(NOW)),
    ));
    let publisher = Arc::new(RecordingPublisher::default());
    let driver = Arc::new(SyncDriver::new(engine, publisher.clone()));
    (driver, publisher)
}

/// Driver with a live SCADA session and the connect burst discarded
fn connected() -> (Arc<SyncDriver>, Arc<RecordingPublisher>) {
    let (driver, publisher) = setup();
    driver.prepare_session();
    driver.handle(InboundMessage::Connection(ConnectionEvent::ScadaConnected));
    publisher.take();
    (driver, publisher)
}

fn internal(driver: &SyncDriver, topic: &str, payload: Value) {
    driver.handle(InboundMessage::Internal {
        topic: topic.to_string(),
        payload: serde_json::to_vec(&payload).unwrap(),
    });
}

fn sparkplug(message: &OutboundMessage) -> (&SparkplugTopic, &WirePayload) {
    match message {
        OutboundMessage::Sparkplug { topic, payload } => (topic, payload),
        other => panic!("expected Sparkplug message, got {:?}", other),
    }
}

fn kinds(messages: &[OutboundMessage]) -> Vec<(SparkplugMessageType, Option<String>)> {
    messages
        .iter()
        .filter_map(|m| match m {
            OutboundMessage::Sparkplug { topic, .. } => {
                Some((topic.message_type, topic.device_id.clone()))
            }
            OutboundMessage::Internal { .. } => None,
        })
        .collect()
}

fn device_kind(kind: SparkplugMessageType, device: &str) -> (SparkplugMessageType, Option<String>) {
    (kind, Some(device.to_string()))
}

fn update(value: &str) -> Value {
    json!({"metric": "Flow", "value": value, "status": "Good", "usec": "", "error_code": "0"})
}

fn vendor_metrics(flow: i32, level: f64) -> Value {
    json!({"metrics": [
        {"name": "Flow", "dataType": "Int32", "value": flow},
        {"name": "Level", "dataType": "Double", "value": level}
    ]})
}

// ============================================================================
// Session start
// ============================================================================

#[test]
fn test_scada_connect_publishes_node_then_device_births() {
    let (driver, publisher) = setup();

    let will = driver.prepare_session();
    let (will_topic, will_payload) = sparkplug(&will);
    assert_eq!(will_topic.message_type, SparkplugMessageType::NDeath);
    assert!(will_payload.metric("bdSeq").is_some());

    driver.handle(InboundMessage::Connection(ConnectionEvent::ScadaConnected));
    let messages = publisher.take();
    assert_eq!(messages.len(), 3);

    let (topic, nbirth) = sparkplug(&messages[0]);
    assert_eq!(
        *topic,
        SparkplugTopic::node(GROUP, SparkplugMessageType::NBirth, EDGE)
    );
    assert_eq!(nbirth.seq, Some(0));
    assert_eq!(nbirth.metric("bdSeq"), will_payload.metric("bdSeq"));

    let (topic, dbirth) = sparkplug(&messages[1]);
    assert_eq!(topic.device_id.as_deref(), Some("flowmeter-PL0"));
    assert_eq!(dbirth.seq, Some(1));
    assert_eq!(
        dbirth.metric_names(),
        vec!["Properties/Site info name", "Flow", "Valve"]
    );
    let flow = dbirth.metric("Flow").unwrap();
    assert_eq!(flow.datatype, DataType::UInt16.wire_code());
    assert_eq!(flow.property("Addr"), Some(&WireValue::IntValue(40001)));

    assert_eq!(
        messages[2],
        OutboundMessage::Internal {
            topic: "START_BIRTH_PROCESS".to_string(),
            payload: json!({}),
        }
    );
}

#[test]
fn test_nothing_published_while_scada_offline() {
    let (driver, publisher) = setup();
    internal(&driver, "/flowmeter/PL0/Flow/update", update("0x0010"));
    assert!(publisher.take().is_empty());

    let device = driver.engine().real_device("flowmeter", "PL0").unwrap();
    assert_eq!(device.last_known_status(), DeviceStatus::Up);
}

// ============================================================================
// Real devices
// ============================================================================

#[test]
fn test_real_device_update_sends_data_only_on_change() {
    let (driver, publisher) = connected();

    internal(&driver, "/flowmeter/PL0/Flow/update", update("0x0064"));
    let messages = publisher.take();
    assert_eq!(
        kinds(&messages),
        vec![device_kind(SparkplugMessageType::DData, "flowmeter-PL0")]
    );
    let (_, data) = sparkplug(&messages[0]);
    assert_eq!(data.seq, Some(2));
    assert_eq!(data.metric_names(), vec!["Flow"]);
    assert_eq!(data.metric("Flow").unwrap().value, WireValue::IntValue(100));

    internal(&driver, "/flowmeter/PL0/Flow/update", update("0x0064"));
    assert!(publisher.take().is_empty());
}

#[test]
fn test_scaled_value_preferred_over_registers() {
    let (driver, publisher) = connected();
    internal(
        &driver,
        "/flowmeter/PL0/Flow/update",
        json!({"metric": "Flow", "value": "0x0001", "scaledValue": 250, "status": "Good"}),
    );
    let messages = publisher.take();
    let (_, data) = sparkplug(&messages[0]);
    assert_eq!(data.metric("Flow").unwrap().value, WireValue::IntValue(250));
}

#[test]
fn test_death_error_code_produces_death_once() {
    let (driver, publisher) = connected();
    let dead = json!({
        "metric": "Flow", "status": "Bad", "error_code": "2003",
        "usec": "1700000005000000", "lastGoodUsec": "1700000000000000"
    });

    internal(&driver, "/flowmeter/PL0/Flow/update", dead.clone());
    internal(&driver, "/flowmeter/PL0/Flow/update", dead);
    let messages = publisher.take();
    assert_eq!(
        kinds(&messages),
        vec![device_kind(SparkplugMessageType::DDeath, "flowmeter-PL0")]
    );
    let (_, death) = sparkplug(&messages[0]);
    assert!(death.metrics.is_empty());
    assert_eq!(death.timestamp, 1_700_000_005_000);

    let other_failure = json!({"metric": "Flow", "status": "Bad", "error_code": "1000"});
    internal(&driver, "/flowmeter/PL0/Flow/update", other_failure);
    assert!(publisher.take().is_empty());

    internal(&driver, "/flowmeter/PL0/Flow/update", update("0x0001"));
    assert_eq!(
        kinds(&publisher.take()),
        vec![device_kind(SparkplugMessageType::DBirth, "flowmeter-PL0")]
    );
}

#[test]
fn test_update_for_unknown_point_is_dropped() {
    let (driver, publisher) = connected();
    internal(&driver, "/flowmeter/PL0/Pressure/update", update("0x0001"));
    internal(&driver, "/pump/PL9/Flow/update", update("0x0001"));
    assert!(publisher.take().is_empty());
}

// ============================================================================
// Vendor apps
// ============================================================================

#[test]
fn test_vendor_birth_data_and_death_cascade() {
    let (driver, publisher) = connected();

    internal(&driver, "BIRTH/APP1/D1", vendor_metrics(10, 1.0));
    internal(&driver, "BIRTH/APP1/D2", vendor_metrics(20, 2.0));
    assert_eq!(
        kinds(&publisher.take()),
        vec![
            device_kind(SparkplugMessageType::DBirth, "APP1-D1"),
            device_kind(SparkplugMessageType::DBirth, "APP1-D2"),
        ]
    );

    internal(&driver, "DATA/APP1/D1", json!({"metrics": [
        {"name": "Flow", "dataType": "Int32", "value": 11},
        {"name": "Pressure", "dataType": "Float", "value": 1.5}
    ]}));
    let messages = publisher.take();
    assert_eq!(
        kinds(&messages),
        vec![device_kind(SparkplugMessageType::DData, "APP1-D1")]
    );
    assert_eq!(sparkplug(&messages[0]).1.metric_names(), vec!["Flow"]);

    internal(&driver, "DEATH/APP1", json!({}));
    assert_eq!(
        kinds(&publisher.take()),
        vec![
            device_kind(SparkplugMessageType::DDeath, "APP1-D1"),
            device_kind(SparkplugMessageType::DDeath, "APP1-D2"),
        ]
    );
    assert!(driver.engine().vendor_apps().get("APP1").unwrap().is_dead());

    internal(&driver, "DATA/APP1/D1", vendor_metrics(12, 1.0));
    assert_eq!(
        kinds(&publisher.take()),
        vec![device_kind(SparkplugMessageType::DBirth, "APP1-D1")]
    );
}

#[test]
fn test_vendor_rebirth_with_same_structure_is_data() {
    let (driver, publisher) = connected();
    internal(&driver, "BIRTH/APP1/D1", vendor_metrics(10, 1.0));
    publisher.take();

    internal(&driver, "BIRTH/APP1/D1", vendor_metrics(10, 1.0));
    assert!(publisher.take().is_empty());

    internal(&driver, "BIRTH/APP1/D1", vendor_metrics(10, 3.0));
    let messages = publisher.take();
    assert_eq!(
        kinds(&messages),
        vec![device_kind(SparkplugMessageType::DData, "APP1-D1")]
    );
    assert_eq!(sparkplug(&messages[0]).1.metric_names(), vec!["Level"]);
}

#[test]
fn test_data_from_unknown_vendor_device_is_dropped() {
    let (driver, publisher) = connected();
    internal(&driver, "DATA/APP9/D1", vendor_metrics(1, 1.0));
    assert!(publisher.take().is_empty());
    assert!(driver.engine().device("APP9-D1").is_none());
}

#[test]
fn test_template_def_triggers_node_rebirth() {
    let (driver, publisher) = connected();
    internal(&driver, "BIRTH/APP1/D1", vendor_metrics(10, 1.0));
    publisher.take();

    internal(&driver, "TemplateDef", json!({"metrics": [{
        "name": "Pump",
        "dataType": "Template",
        "value": {
            "version": "1.0",
            "metrics": [
                {"name": "speed", "dataType": "UInt16", "value": null},
                {"name": "running", "dataType": "Boolean", "value": null}
            ],
            "parameters": []
        }
    }]}));

    let messages = publisher.take();
    assert_eq!(
        kinds(&messages),
        vec![
            (SparkplugMessageType::NBirth, None),
            device_kind(SparkplugMessageType::DBirth, "APP1-D1"),
            device_kind(SparkplugMessageType::DBirth, "flowmeter-PL0"),
        ]
    );
    let (_, nbirth) = sparkplug(&messages[0]);
    assert_eq!(nbirth.seq, Some(0));
    match &nbirth.metric("Pump").unwrap().value {
        WireValue::TemplateValue(template) => {
            assert!(template.is_definition);
            assert_eq!(template.metrics.len(), 2);
        }
        other => panic!("expected template definition, got {:?}", other),
    }
    assert_eq!(sparkplug(&messages[2]).1.seq, Some(2));

    internal(&driver, "BIRTH/APP1/P", json!({"metrics": [
        {"name": "P1", "dataType": "Template", "value": {
            "udt_ref": {"name": "Pump", "version": "1.0"},
            "metrics": [{"name": "speed", "dataType": "UInt16", "value": 3}]
        }},
        {"name": "P2", "dataType": "Template", "value": {
            "udt_ref": {"name": "Valve", "version": "1.0"},
            "metrics": []
        }}
    ]}));
    let messages = publisher.take();
    let (_, dbirth) = sparkplug(&messages[0]);
    assert_eq!(dbirth.metric_names(), vec!["P1"]);
}

#[test]
fn test_udt_instance_with_undeclared_child_is_skipped() {
    let (driver, publisher) = connected();
    internal(&driver, "TemplateDef", json!({"metrics": [{
        "name": "Pump",
        "dataType": "Template",
        "value": {
            "version": "1.0",
            "metrics": [{"name": "speed", "dataType": "UInt16", "value": null}],
            "parameters": []
        }
    }]}));
    publisher.take();

    internal(&driver, "BIRTH/APP1/P", json!({"metrics": [
        {"name": "Flow", "dataType": "Int32", "value": 5},
        {"name": "P1", "dataType": "Template", "value": {
            "udt_ref": {"name": "Pump", "version": "1.0"},
            "metrics": [{"name": "speed", "dataType": "UInt16", "value": 3}]
        }},
        {"name": "P2", "dataType": "Template", "value": {
            "udt_ref": {"name": "Pump", "version": "1.0"},
            "metrics": [
                {"name": "speed", "dataType": "UInt16", "value": 3},
                {"name": "torque", "dataType": "Double", "value": 1.5}
            ]
        }},
        {"name": "P3", "dataType": "Template", "value": {
            "udt_ref": {"name": "Pump", "version": "1.0"},
            "metrics": [{"name": "speed", "dataType": "String", "value": "fast"}]
        }}
    ]}));

    let messages = publisher.take();
    let (_, dbirth) = sparkplug(&messages[0]);
    assert_eq!(dbirth.metric_names(), vec!["Flow", "P1"]);
    assert_eq!(
        driver.engine().device("APP1-P").unwrap().metric_names(),
        vec!["Flow", "P1"]
    );
}

// ============================================================================
// SCADA commands
// ============================================================================

fn command(device: &str, metrics: Vec<WireMetric>) -> InboundMessage {
    let topic = SparkplugTopic::device(GROUP, SparkplugMessageType::DCmd, EDGE, device);
    let mut payload = WirePayload::new(NOW / 1_000);
    payload.metrics = metrics;
    InboundMessage::ScadaCommand {
        topic: topic.to_string(),
        payload,
    }
}

fn command_metric(name: &str, value: MetricValue) -> WireMetric {
    let mut metric = WireMetric {
        name: name.to_string(),
        ..Default::default()
    };
    value.to_wire_metric(&mut metric);
    metric
}

fn internal_message(message: &OutboundMessage) -> (&str, &Value) {
    match message {
        OutboundMessage::Internal { topic, payload } => (topic, payload),
        other => panic!("expected internal message, got {:?}", other),
    }
}

#[test]
fn test_command_to_real_device_becomes_write_request() {
    let (driver, publisher) = connected();

    driver.handle(command(
        "flowmeter-PL0",
        vec![
            command_metric("Flow", MetricValue::I32(300)),
            command_metric("Valve", MetricValue::Bool(true)),
            command_metric("Missing", MetricValue::I32(1)),
            command_metric("Flow", MetricValue::I32(-1)),
        ],
    ));

    let messages = publisher.take();
    assert_eq!(messages.len(), 2);

    let (topic, flow) = internal_message(&messages[0]);
    assert_eq!(topic, "/flowmeter/PL0/Flow/write");
    assert_eq!(flow["wellhead"], "PL0");
    assert_eq!(flow["command"], "Flow");
    assert_eq!(flow["value"], "0x012c");
    assert_eq!(flow["version"], "2.0");
    assert_eq!(flow["app_seq"], "0");
    assert_eq!(flow["realtime"], "0");
    assert_eq!(flow["usec"], NOW.to_string());
    assert_eq!(flow["timestamp"], "2023-11-14 22:13:20");

    let (topic, valve) = internal_message(&messages[1]);
    assert_eq!(topic, "/flowmeter/PL0/Valve/write");
    assert_eq!(valve["app_seq"], "1");
    assert_eq!(valve["realtime"], "1");
}

#[test]
fn test_failed_write_does_not_drop_rest_of_command() {
    let mut config = config();
    config.catalog.devices = vec![CatalogDevice {
        site: "PL0".to_string(),
        device: "fm".to_string(),
        points: vec![
            point("Flow", "uint", RegisterType::HoldingRegister, false),
            point("Tag", "string", RegisterType::HoldingRegister, false),
        ],
    }];
    let (driver, publisher) = setup_with(config);
    driver.prepare_session();
    driver.handle(InboundMessage::Connection(ConnectionEvent::ScadaConnected));
    publisher.take();

    driver.handle(command(
        "fm-PL0",
        vec![
            command_metric("Tag", MetricValue::String("TOO LONG".to_string())),
            command_metric("Flow", MetricValue::U16(300)),
        ],
    ));

    let messages = publisher.take();
    let topics: Vec<&str> = messages.iter().map(|m| internal_message(m).0).collect();
    assert_eq!(topics, vec!["/fm/PL0/Flow/write"]);
    let (_, flow) = internal_message(&messages[0]);
    assert_eq!(flow["value"], "0x012c");
    assert_eq!(flow["app_seq"], "0");
}

#[test]
fn test_command_to_vendor_device_is_forwarded() {
    let (driver, publisher) = connected();
    internal(&driver, "BIRTH/APP1/D1", vendor_metrics(10, 1.0));
    publisher.take();

    driver.handle(command(
        "APP1-D1",
        vec![
            command_metric("Flow", MetricValue::U8(42)),
            command_metric("Level", MetricValue::String("high".into())),
        ],
    ));

    let messages = publisher.take();
    assert_eq!(messages.len(), 1);
    let (topic, payload) = internal_message(&messages[0]);
    assert_eq!(topic, "CMD/APP1/D1");
    let metrics = payload["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0]["name"], "Flow");
    assert_eq!(metrics[0]["dataType"], "Int32");
    assert_eq!(metrics[0]["value"], 42);
}

#[test]
fn test_command_for_unknown_device_is_dropped() {
    let (driver, publisher) = connected();
    driver.handle(command(
        "nobody",
        vec![command_metric("Flow", MetricValue::I32(1))],
    ));
    assert!(publisher.take().is_empty());
}

// ============================================================================
// Internal bus outages
// ============================================================================

#[test]
fn test_internal_timeout_kills_published_devices_and_restore_rebirths() {
    let (driver, publisher) = connected();
    internal(&driver, "BIRTH/APP1/D1", vendor_metrics(10, 1.0));
    publisher.take();

    let lost_at = Instant::now();
    driver.handle(InboundMessage::Connection(ConnectionEvent::InternalLost));

    driver.check_internal_timeout(lost_at + Duration::from_secs(30));
    assert!(publisher.take().is_empty());

    driver.check_internal_timeout(lost_at + Duration::from_secs(61));
    assert_eq!(
        kinds(&publisher.take()),
        vec![
            device_kind(SparkplugMessageType::DDeath, "APP1-D1"),
            device_kind(SparkplugMessageType::DDeath, "flowmeter-PL0"),
        ]
    );

    driver.check_internal_timeout(lost_at + Duration::from_secs(120));
    assert!(publisher.take().is_empty());

    driver.handle(InboundMessage::Connection(ConnectionEvent::InternalConnected));
    let messages = publisher.take();
    assert_eq!(internal_message(&messages[0]).0, "START_BIRTH_PROCESS");
    assert_eq!(
        kinds(&messages),
        vec![
            device_kind(SparkplugMessageType::DBirth, "APP1-D1"),
            device_kind(SparkplugMessageType::DBirth, "flowmeter-PL0"),
        ]
    );
}

// ============================================================================
// Workers
// ============================================================================

#[test]
fn test_workers_process_queues_until_stopped() {
    let engine = Arc::new(SyncEngine::new(
        config(),
        Arc::new(FixedTimeProvider::new(NOW)),
    ));
    let (publisher, outbound) = ChannelPublisher::new();
    let driver = Arc::new(SyncDriver::new(engine, Arc::new(publisher)));
    driver.prepare_session();

    let (internal_tx, internal_rx) = crossbeam::channel::unbounded();
    let (scada_tx, scada_rx) = crossbeam::channel::unbounded();
    let handle = driver.spawn(internal_rx, scada_rx).unwrap();

    scada_tx
        .send(InboundMessage::Connection(ConnectionEvent::ScadaConnected))
        .unwrap();
    let timeout = Duration::from_secs(5);
    let nbirth = outbound.recv_timeout(timeout).unwrap();
    assert_eq!(sparkplug(&nbirth).0.message_type, SparkplugMessageType::NBirth);
    let dbirth = outbound.recv_timeout(timeout).unwrap();
    assert_eq!(sparkplug(&dbirth).0.message_type, SparkplugMessageType::DBirth);
    let start = outbound.recv_timeout(timeout).unwrap();
    assert_eq!(start.topic(), "START_BIRTH_PROCESS");

    internal_tx
        .send(InboundMessage::Internal {
            topic: "/flowmeter/PL0/Flow/update".to_string(),
            payload: serde_json::to_vec(&update("0x0007")).unwrap(),
        })
        .unwrap();
    let data = outbound.recv_timeout(timeout).unwrap();
    let (topic, payload) = sparkplug(&data);
    assert_eq!(topic.message_type, SparkplugMessageType::DData);
    assert_eq!(payload.metric("Flow").unwrap().value, WireValue::IntValue(7));

    handle.stop();
}
