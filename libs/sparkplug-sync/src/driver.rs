//! Synchronization driver
//!
//! Receives internal-bus readings, SCADA commands and connection events,
//! runs them through the engine and hands the resulting messages to a
//! [`Publisher`]. Two worker threads drain the inbound queues; all
//! Sparkplug rendering and publishing is serialized so sequence numbers go
//! out in order.

use crate::device::{BirthOutcome, ChangeSet, Device, DeviceStatus};
use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::node::{micros_to_millis, MetricNode, SimpleMetric};
use crate::topic::{
    vendor_command_topic, write_request_topic, InternalTopic, SparkplugMessageType,
    SparkplugTopic, START_BIRTH_PROCESS,
};
use crate::update::{encode_register_hex, RealDeviceUpdate, UpdateEvaluation};
use crate::wire::{WireMetric, WirePayload, WireValue};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often idle workers check for shutdown and connection timeouts
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

const WRITE_REQUEST_VERSION: &str = "2.0";

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ScadaConnected,
    ScadaLost,
    InternalConnected,
    InternalLost,
}

#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// Raw message from the internal bus
    Internal { topic: String, payload: Vec<u8> },
    /// Decoded Sparkplug command from the SCADA broker
    ScadaCommand { topic: String, payload: WirePayload },
    Connection(ConnectionEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Sparkplug {
        topic: SparkplugTopic,
        payload: WirePayload,
    },
    Internal { topic: String, payload: Value },
}

impl OutboundMessage {
    pub fn topic(&self) -> String {
        match self {
            OutboundMessage::Sparkplug { topic, .. } => topic.to_string(),
            OutboundMessage::Internal { topic, .. } => topic.clone(),
        }
    }
}

/// Transport seam; implementations encode and send
pub trait Publisher: Send + Sync {
    fn publish(&self, message: OutboundMessage) -> Result<()>;
}

/// Publisher feeding a channel drained by the transport
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: Sender<OutboundMessage>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, Receiver<OutboundMessage>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, message: OutboundMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|e| gateway_common::Error::other(format!("outbound channel closed: {}", e)).into())
    }
}

/// Sparkplug-side effect of processing one message
#[derive(Debug, Clone)]
pub enum SparkplugAction {
    /// NBIRTH followed by a DBIRTH for every live device
    NodeRebirth,
    DeviceBirth(Arc<Device>),
    DeviceData(Arc<Device>, ChangeSet),
    DeviceDeath(Arc<Device>),
}

// ============================================================================
// Connection monitor
// ============================================================================

/// Tracks an internal-bus outage against the configured timeout
#[derive(Debug)]
pub struct ConnectionMonitor {
    timeout: Duration,
    lost_since: Option<Instant>,
    expired: bool,
}

impl ConnectionMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            lost_since: None,
            expired: false,
        }
    }

    pub fn on_lost(&mut self, now: Instant) {
        if self.lost_since.is_none() && !self.expired {
            self.lost_since = Some(now);
        }
    }

    /// Returns whether the outage had expired
    pub fn on_connected(&mut self) -> bool {
        self.lost_since = None;
        std::mem::take(&mut self.expired)
    }

    /// True exactly once per outage, when it first exceeds the timeout
    pub fn check_expired(&mut self, now: Instant) -> bool {
        match self.lost_since {
            Some(since) if now.saturating_duration_since(since) >= self.timeout => {
                self.lost_since = None;
                self.expired = true;
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

pub struct SyncDriver {
    engine: Arc<SyncEngine>,
    publisher: Arc<dyn Publisher>,
    /// Held while rendering and publishing Sparkplug messages
    publish_lock: Mutex<()>,
    monitor: Mutex<ConnectionMonitor>,
    /// Devices declared dead by an internal-bus timeout
    timed_out: Mutex<Vec<Arc<Device>>>,
    scada_online: AtomicBool,
    bd_seq: AtomicU64,
    app_seq: AtomicU16,
}

impl SyncDriver {
    pub fn new(engine: Arc<SyncEngine>, publisher: Arc<dyn Publisher>) -> Self {
        let monitor = ConnectionMonitor::new(engine.config().internal_timeout());
        Self {
            engine,
            publisher,
            publish_lock: Mutex::new(()),
            monitor: Mutex::new(monitor),
            timed_out: Mutex::new(Vec::new()),
            scada_online: AtomicBool::new(false),
            bd_seq: AtomicU64::new(0),
            app_seq: AtomicU16::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    fn node_topic(&self, kind: SparkplugMessageType) -> SparkplugTopic {
        let config = self.engine.config();
        SparkplugTopic::node(&config.group_id, kind, &config.edge_node_id)
    }

    fn device_topic(&self, kind: SparkplugMessageType, device: &Device) -> SparkplugTopic {
        let config = self.engine.config();
        SparkplugTopic::device(
            &config.group_id,
            kind,
            &config.edge_node_id,
            device.telemetry_name(),
        )
    }

    /// Start a SCADA session; returns the NDEATH to register as will message
    pub fn prepare_session(&self) -> OutboundMessage {
        let bd_seq = self.engine.begin_session();
        self.bd_seq.store(bd_seq, Ordering::Release);
        OutboundMessage::Sparkplug {
            topic: self.node_topic(SparkplugMessageType::NDeath),
            payload: self.engine.build_node_death(bd_seq),
        }
    }

    /// Next write-request application sequence number, 0..=65535 wrapping
    pub fn next_app_seq(&self) -> u16 {
        self.app_seq.fetch_add(1, Ordering::AcqRel)
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Process one inbound message and publish the results
    pub fn handle(&self, message: InboundMessage) {
        match message {
            InboundMessage::Internal { topic, payload } => {
                match self.process_internal(&topic, &payload) {
                    Ok(actions) => self.publish_actions(actions),
                    Err(e) => warn!("Dropped internal message on {}: {}", topic, e),
                }
            }
            InboundMessage::ScadaCommand { topic, payload } => {
                let result = SparkplugTopic::parse(&topic)
                    .and_then(|t| self.process_scada_command(&t, &payload));
                match result {
                    Ok(messages) => messages.into_iter().for_each(|m| self.send(m)),
                    Err(e) => warn!("Dropped SCADA command on {}: {}", topic, e),
                }
            }
            InboundMessage::Connection(event) => self.on_connection_event(event),
        }
    }

    fn on_connection_event(&self, event: ConnectionEvent) {
        info!("Connection event: {:?}", event);
        match event {
            ConnectionEvent::ScadaConnected => {
                self.scada_online.store(true, Ordering::Release);
                self.publish_actions(vec![SparkplugAction::NodeRebirth]);
                self.send(start_birth_process());
            }
            ConnectionEvent::ScadaLost => {
                self.scada_online.store(false, Ordering::Release);
            }
            ConnectionEvent::InternalLost => {
                self.monitor.lock().on_lost(Instant::now());
            }
            ConnectionEvent::InternalConnected => {
                let expired = self.monitor.lock().on_connected();
                self.send(start_birth_process());
                if expired {
                    let actions = self.on_internal_restored();
                    self.publish_actions(actions);
                }
            }
        }
    }

    /// Fire the internal-bus timeout if the current outage has exceeded it
    pub fn check_internal_timeout(&self, now: Instant) {
        if self.monitor.lock().check_expired(now) {
            let actions = self.on_internal_timeout();
            self.publish_actions(actions);
        }
    }

    // ------------------------------------------------------------------------
    // Internal bus
    // ------------------------------------------------------------------------

    /// Classify and apply one internal-bus message
    pub fn process_internal(&self, topic: &str, payload: &[u8]) -> Result<Vec<SparkplugAction>> {
        match InternalTopic::parse(topic)? {
            InternalTopic::VendorBirth { app, device } => self.on_vendor_birth(&app, &device, payload),
            InternalTopic::VendorData { app, device } => self.on_vendor_data(&app, &device, payload),
            InternalTopic::VendorDeath { app, device } => self.on_vendor_death(&app, device.as_deref()),
            InternalTopic::DeviceUpdate {
                device,
                site,
                point,
            } => self.on_device_update(&device, &site, &point, payload),
            InternalTopic::TemplateDef => self.on_template_def(payload),
        }
    }

    /// Decode the `metrics` array of a vendor message, skipping bad entries
    fn decode_metrics(&self, payload: &[u8], timestamp: u64) -> Result<Vec<MetricNode>> {
        let message: Value = serde_json::from_slice(payload)?;
        let records = message
            .get("metrics")
            .and_then(Value::as_array)
            .ok_or_else(|| SyncError::malformed("message has no metrics array"))?;

        let mut nodes = Vec::with_capacity(records.len());
        for record in records {
            let mut node = match MetricNode::from_record(record, timestamp) {
                Ok(node) => node,
                Err(e) => {
                    warn!("Skipping metric record: {}", e);
                    continue;
                }
            };
            if let Some(udt) = node.as_composite_mut() {
                if let Err(e) = udt.bind_definitions(self.engine.definitions()) {
                    warn!("Skipping UDT '{}': {}", udt.name(), e);
                    continue;
                }
            }
            if let Err(e) = node.validate(self.engine.definitions()) {
                warn!("Skipping UDT '{}': {}", node.name(), e);
                continue;
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    fn on_vendor_birth(&self, app: &str, device: &str, payload: &[u8]) -> Result<Vec<SparkplugAction>> {
        let now = self.engine.now();
        let metrics = self.decode_metrics(payload, now)?;
        let device = self.engine.get_or_create_vendor_device(app, device);
        if let Some(app) = self.engine.vendor_apps().get(app) {
            app.mark_alive();
        }

        Ok(match device.ingest_birth(metrics, now) {
            BirthOutcome::Rebirth => {
                info!("Device {} born", device.telemetry_name());
                vec![SparkplugAction::DeviceBirth(device)]
            }
            BirthOutcome::DataOnly(changes) if changes.is_empty() => Vec::new(),
            BirthOutcome::DataOnly(changes) => vec![SparkplugAction::DeviceData(device, changes)],
        })
    }

    fn on_vendor_data(&self, app: &str, device: &str, payload: &[u8]) -> Result<Vec<SparkplugAction>> {
        let device = self
            .engine
            .vendor_device(app, device)
            .ok_or_else(|| SyncError::UnknownDevice(format!("{}-{}", app, device)))?;
        let now = self.engine.now();
        let metrics = self.decode_metrics(payload, now)?;

        let owes_birth = device.needs_birth();
        let batch = device.apply_data(metrics, self.engine.definitions(), now);
        for rejected in &batch.rejected {
            warn!("Device {}: {}", device.telemetry_name(), rejected);
        }
        device.mark_alive();

        Ok(self.birth_or_data(device, owes_birth, batch.changes))
    }

    fn birth_or_data(&self, device: Arc<Device>, owes_birth: bool, changes: ChangeSet) -> Vec<SparkplugAction> {
        if owes_birth {
            debug!("Device {} owes a birth", device.telemetry_name());
            vec![SparkplugAction::DeviceBirth(device)]
        } else if changes.is_empty() {
            Vec::new()
        } else {
            vec![SparkplugAction::DeviceData(device, changes)]
        }
    }

    fn on_vendor_death(&self, app_name: &str, device: Option<&str>) -> Result<Vec<SparkplugAction>> {
        let app = self
            .engine
            .vendor_apps()
            .get(app_name)
            .ok_or_else(|| SyncError::UnknownDevice(app_name.to_string()))?;

        let devices = match device {
            Some(name) => {
                let device = self
                    .engine
                    .vendor_device(app_name, name)
                    .ok_or_else(|| SyncError::UnknownDevice(format!("{}-{}", app_name, name)))?;
                vec![device]
            }
            None => {
                info!("Vendor app {} died", app_name);
                app.mark_dead();
                app.devices()
            }
        };

        let now = self.engine.now();
        Ok(devices
            .into_iter()
            .filter_map(|device| self.declare_dead(device, now))
            .collect())
    }

    /// Death action for a device not already known dead
    fn declare_dead(&self, device: Arc<Device>, timestamp: u64) -> Option<SparkplugAction> {
        if device.last_known_status() == DeviceStatus::Down {
            return None;
        }
        device.mark_dead(timestamp);
        if device.last_published_status() != DeviceStatus::Up {
            debug!("Device {} died before its birth was published", device.telemetry_name());
            return None;
        }
        info!("Device {} died", device.telemetry_name());
        Some(SparkplugAction::DeviceDeath(device))
    }

    fn on_device_update(
        &self,
        device: &str,
        site: &str,
        point: &str,
        payload: &[u8],
    ) -> Result<Vec<SparkplugAction>> {
        let device = self
            .engine
            .real_device(device, site)
            .ok_or_else(|| SyncError::UnknownDevice(format!("{}-{}", device, site)))?;
        let declared = device
            .metric(point)
            .map(|node| node.declared_type())
            .ok_or_else(|| SyncError::unknown_metric(device.telemetry_name(), point))?;

        let update = RealDeviceUpdate::parse(payload)?;
        let timestamp = match update.usec {
            0 => self.engine.now(),
            usec => usec,
        };

        match update.evaluate(declared, &self.engine.config().death_error_codes)? {
            UpdateEvaluation::DeviceDead => {
                Ok(self.declare_dead(device, timestamp).into_iter().collect())
            }
            UpdateEvaluation::BadRead(code) => {
                debug!(
                    "Device {}: bad read of {} (error {})",
                    device.telemetry_name(),
                    point,
                    code
                );
                Ok(Vec::new())
            }
            UpdateEvaluation::Value(value) => {
                let incoming = MetricNode::Simple(SimpleMetric::with_value(point, value, timestamp));
                let owes_birth = device.needs_birth();
                let result = device.ingest(point, incoming, timestamp);
                device.mark_alive();
                Ok(self.birth_or_data(device, owes_birth, result.into_change_set()))
            }
        }
    }

    fn on_template_def(&self, payload: &[u8]) -> Result<Vec<SparkplugAction>> {
        let message: Value = serde_json::from_slice(payload)?;
        let records = message
            .get("metrics")
            .and_then(Value::as_array)
            .ok_or_else(|| SyncError::malformed("TemplateDef has no metrics array"))?;

        let now = self.engine.now();
        let mut registered = 0;
        for record in records {
            match MetricNode::from_record(record, now) {
                Ok(MetricNode::Composite(udt)) if udt.is_definition() => {
                    self.engine.definitions().register(udt);
                    registered += 1;
                }
                Ok(other) => warn!("TemplateDef: '{}' is not a UDT definition", other.name()),
                Err(e) => warn!("TemplateDef: skipping record: {}", e),
            }
        }

        if registered == 0 {
            return Ok(Vec::new());
        }
        info!("Registered {} UDT definitions, node rebirth", registered);
        Ok(vec![SparkplugAction::NodeRebirth])
    }

    /// Internal bus down past the timeout: every published device dies
    pub fn on_internal_timeout(&self) -> Vec<SparkplugAction> {
        let now = self.engine.now();
        warn!("Internal bus unavailable, declaring devices dead");
        let actions: Vec<SparkplugAction> = self
            .engine
            .devices()
            .into_iter()
            .filter_map(|device| self.declare_dead(device, now))
            .collect();

        let mut timed_out = self.timed_out.lock();
        timed_out.extend(actions.iter().filter_map(|action| match action {
            SparkplugAction::DeviceDeath(device) => Some(device.clone()),
            _ => None,
        }));
        actions
    }

    /// Internal bus back: re-birth devices the timeout declared dead
    pub fn on_internal_restored(&self) -> Vec<SparkplugAction> {
        let devices = std::mem::take(&mut *self.timed_out.lock());
        devices
            .into_iter()
            .filter(|device| device.last_known_status() == DeviceStatus::Down && device.has_metrics())
            .map(|device| {
                device.mark_alive();
                SparkplugAction::DeviceBirth(device)
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // SCADA commands
    // ------------------------------------------------------------------------

    /// Validate a DCMD and build the internal-bus requests it maps to
    pub fn process_scada_command(
        &self,
        topic: &SparkplugTopic,
        payload: &WirePayload,
    ) -> Result<Vec<OutboundMessage>> {
        let device_name = match (topic.message_type, topic.device_id.as_deref()) {
            (SparkplugMessageType::DCmd, Some(device)) => device,
            _ => return Err(SyncError::InvalidTopic(topic.to_string())),
        };
        let device = self
            .engine
            .device(device_name)
            .ok_or_else(|| SyncError::UnknownDevice(device_name.to_string()))?;

        let now = self.engine.now();
        let mut accepted = Vec::new();
        for metric in &payload.metrics {
            match self.validate_command(&device, metric, now) {
                Ok(node) => accepted.push(node),
                Err(e) => warn!(
                    "Device {}: rejecting command for '{}': {}",
                    device.telemetry_name(),
                    metric.name,
                    e
                ),
            }
        }
        if accepted.is_empty() {
            return Ok(Vec::new());
        }

        if device.is_external_app() {
            let app = device.app().unwrap_or_default();
            let records: Vec<Value> = accepted.iter().map(MetricNode::to_record).collect();
            return Ok(vec![OutboundMessage::Internal {
                topic: vendor_command_topic(app, device.local_name()),
                payload: json!({
                    "metrics": records,
                    "sourcetopic": topic.to_string(),
                    "timestamp": micros_to_millis(now),
                }),
            }]);
        }

        let mut requests = Vec::with_capacity(accepted.len());
        for node in &accepted {
            match self.write_request(&device, node, now) {
                Ok(request) => requests.push(request),
                Err(e) => warn!(
                    "Device {}: skipping write for '{}': {}",
                    device.telemetry_name(),
                    node.name(),
                    e
                ),
            }
        }
        Ok(requests)
    }

    /// Check one command metric against the device and coerce it to the stored type
    fn validate_command(
        &self,
        device: &Device,
        metric: &WireMetric,
        timestamp: u64,
    ) -> Result<MetricNode> {
        let node = MetricNode::from_wire_metric(metric)?;
        let declared = device.check_metric(node.name(), node.declared_type())?;
        match &node {
            MetricNode::Composite(_) if device.is_external_app() => Ok(node),
            MetricNode::Composite(_) => Err(SyncError::UnsupportedType(format!(
                "UDT write to real device metric '{}'",
                node.name()
            ))),
            MetricNode::Simple(simple) => {
                let value = simple
                    .value()
                    .ok_or_else(|| SyncError::malformed(format!("'{}' carries no value", node.name())))?;
                let coerced = value
                    .coerce_to(declared)
                    .ok_or_else(|| SyncError::type_mismatch(node.name(), declared, value.data_type()))?;
                Ok(MetricNode::Simple(SimpleMetric::with_value(
                    node.name(),
                    coerced,
                    timestamp,
                )))
            }
        }
    }

    fn write_request(&self, device: &Device, node: &MetricNode, now: u64) -> Result<OutboundMessage> {
        let value = node
            .as_simple()
            .and_then(SimpleMetric::value)
            .ok_or_else(|| SyncError::malformed(format!("'{}' carries no value", node.name())))?;

        let stored = device.metric(node.name());
        let property = |key: &str| {
            stored
                .as_ref()
                .and_then(MetricNode::as_simple)
                .and_then(|m| m.properties().iter().find(|p| p.key == key))
                .map(|p| p.value.clone())
        };
        let width = match property("Width") {
            Some(WireValue::IntValue(width)) if width > 0 => width,
            _ => 1,
        };
        let realtime = matches!(property("Realtime"), Some(WireValue::BooleanValue(true)));

        let site = device.site().unwrap_or_default();
        let timestamp = i64::try_from(now)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_micros)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        Ok(OutboundMessage::Internal {
            topic: write_request_topic(device.local_name(), site, node.name()),
            payload: json!({
                "wellhead": site,
                "command": node.name(),
                "value": encode_register_hex(value, width)?,
                "timestamp": timestamp,
                "usec": now.to_string(),
                "version": WRITE_REQUEST_VERSION,
                "app_seq": self.next_app_seq().to_string(),
                "realtime": if realtime { "1" } else { "0" },
            }),
        })
    }

    // ------------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------------

    /// Turn an action into payloads, stamping sequence numbers
    ///
    /// Device state transitions happen here even when SCADA is offline.
    fn render(&self, action: SparkplugAction) -> Vec<OutboundMessage> {
        let now = self.engine.now();
        match action {
            SparkplugAction::NodeRebirth => {
                let mut out = vec![OutboundMessage::Sparkplug {
                    topic: self.node_topic(SparkplugMessageType::NBirth),
                    payload: self
                        .engine
                        .build_node_birth(self.bd_seq.load(Ordering::Acquire)),
                }];
                for device in self.engine.devices() {
                    if device.has_metrics() && device.last_known_status() != DeviceStatus::Down {
                        out.push(self.device_birth(&device, now));
                    }
                }
                out
            }
            SparkplugAction::DeviceBirth(device) => vec![self.device_birth(&device, now)],
            SparkplugAction::DeviceData(device, changes) => device
                .build_data_message(&changes, now)
                .map(|payload| OutboundMessage::Sparkplug {
                    topic: self.device_topic(SparkplugMessageType::DData, &device),
                    payload: self.stamp(payload),
                })
                .into_iter()
                .collect(),
            SparkplugAction::DeviceDeath(device) => vec![OutboundMessage::Sparkplug {
                topic: self.device_topic(SparkplugMessageType::DDeath, &device),
                payload: self.stamp(device.build_death_message()),
            }],
        }
    }

    fn device_birth(&self, device: &Device, now: u64) -> OutboundMessage {
        OutboundMessage::Sparkplug {
            topic: self.device_topic(SparkplugMessageType::DBirth, device),
            payload: self.stamp(device.build_birth_message(now)),
        }
    }

    fn stamp(&self, mut payload: WirePayload) -> WirePayload {
        payload.seq = Some(self.engine.next_seq());
        payload
    }

    pub fn publish_actions(&self, actions: Vec<SparkplugAction>) {
        if actions.is_empty() {
            return;
        }
        let _guard = self.publish_lock.lock();
        for action in actions {
            for message in self.render(action) {
                self.send(message);
            }
        }
    }

    fn send(&self, message: OutboundMessage) {
        if matches!(message, OutboundMessage::Sparkplug { .. })
            && !self.scada_online.load(Ordering::Acquire)
        {
            debug!("SCADA offline, not publishing {}", message.topic());
            return;
        }
        let topic = message.topic();
        if let Err(e) = self.publisher.publish(message) {
            error!("Failed to publish on {}: {}", topic, e);
        }
    }

    // ------------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------------

    /// Start the internal and SCADA worker threads
    pub fn spawn(
        self: &Arc<Self>,
        internal: Receiver<InboundMessage>,
        scada: Receiver<InboundMessage>,
    ) -> Result<DriverHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(2);
        for (name, rx) in [("internal-worker", internal), ("scada-worker", scada)] {
            let driver = Arc::clone(self);
            let shutdown = Arc::clone(&shutdown);
            let worker = thread::Builder::new()
                .name(name.to_string())
                .spawn(move || driver.run_worker(name, rx, &shutdown))
                .map_err(gateway_common::Error::from)?;
            workers.push(worker);
        }
        info!("Sync driver started");
        Ok(DriverHandle { shutdown, workers })
    }

    fn run_worker(&self, name: &str, rx: Receiver<InboundMessage>, shutdown: &AtomicBool) {
        debug!("{} running", name);
        while !shutdown.load(Ordering::Acquire) {
            match rx.recv_timeout(WORKER_POLL_INTERVAL) {
                Ok(message) => self.handle(message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("{}: inbound queue closed", name);
                    break;
                }
            }
            self.check_internal_timeout(Instant::now());
        }
        debug!("{} stopped", name);
    }
}

fn start_birth_process() -> OutboundMessage {
    OutboundMessage::Internal {
        topic: START_BIRTH_PROCESS.to_string(),
        payload: json!({}),
    }
}

/// Running worker threads
pub struct DriverHandle {
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl DriverHandle {
    /// Signal the workers and wait for them to finish
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers {
            if worker.join().is_err() {
                error!("Sync driver worker panicked");
            }
        }
        info!("Sync driver stopped");
    }
}
