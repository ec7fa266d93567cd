//! Engine context
//!
//! `SyncEngine` owns the device registry, the vendor app list and the UDT
//! definitions. It is built explicitly and shared by `Arc`; there is no
//! global instance.

use crate::catalog::DeviceCatalog;
use crate::config::SyncConfig;
use crate::device::Device;
use crate::node::micros_to_millis;
use crate::template::DefinitionRegistry;
use crate::value::MetricValue;
use crate::vendor::VendorAppList;
use crate::wire::{WireMetric, WirePayload};
use gateway_common::TimeProvider;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const NODE_NAME_METRIC: &str = "Name";
pub const BD_SEQ_METRIC: &str = "bdSeq";

/// Sparkplug sequence number, 0..=255 wrapping
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU8);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, then advance
    pub fn next(&self) -> u64 {
        u64::from(self.0.fetch_add(1, Ordering::AcqRel))
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

pub struct SyncEngine {
    config: SyncConfig,
    /// Keyed by telemetry name
    devices: RwLock<BTreeMap<String, Arc<Device>>>,
    vendor_apps: VendorAppList,
    definitions: DefinitionRegistry,
    seq: SequenceCounter,
    bd_seq: SequenceCounter,
    clock: Arc<dyn TimeProvider>,
}

impl SyncEngine {
    /// Engine with the devices of the configured catalog
    pub fn new(config: SyncConfig, clock: Arc<dyn TimeProvider>) -> Self {
        let engine = Self {
            config,
            devices: RwLock::new(BTreeMap::new()),
            vendor_apps: VendorAppList::new(),
            definitions: DefinitionRegistry::new(),
            seq: SequenceCounter::new(),
            bd_seq: SequenceCounter::new(),
            clock,
        };
        let catalog = engine.config.catalog.clone();
        engine.register_catalog(&catalog);
        engine
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn vendor_apps(&self) -> &VendorAppList {
        &self.vendor_apps
    }

    pub fn definitions(&self) -> &DefinitionRegistry {
        &self.definitions
    }

    /// Current time in microseconds
    pub fn now(&self) -> u64 {
        self.clock.now_micros()
    }

    /// Add every catalog device not yet known; returns how many were added
    pub fn register_catalog(&self, catalog: &dyn DeviceCatalog) -> usize {
        let now = self.now();
        let mut added = 0;
        for entry in catalog.devices() {
            let device = Arc::new(entry.to_device(now));
            let metric_count = device.metric_names().len();
            let mut devices = self.devices.write();
            if devices.contains_key(device.telemetry_name()) {
                continue;
            }
            debug!(
                "Catalog device {} with {} metrics",
                device.telemetry_name(),
                metric_count
            );
            devices.insert(device.telemetry_name().to_string(), device);
            added += 1;
        }
        info!("Registered {} catalog devices", added);
        added
    }

    pub fn device(&self, telemetry_name: &str) -> Option<Arc<Device>> {
        self.devices.read().get(telemetry_name).cloned()
    }

    /// Catalog device by its bus identity
    pub fn real_device(&self, device: &str, site: &str) -> Option<Arc<Device>> {
        self.device(&format!("{}-{}", device, site))
            .filter(|d| !d.is_external_app())
    }

    pub fn vendor_device(&self, app: &str, device: &str) -> Option<Arc<Device>> {
        self.device(&format!("{}-{}", app, device))
            .filter(|d| d.is_external_app())
    }

    /// Device announced by a vendor app, created on first sight
    pub fn get_or_create_vendor_device(&self, app: &str, device: &str) -> Arc<Device> {
        let candidate = Device::for_vendor_app(app, device);
        let device = {
            let mut devices = self.devices.write();
            devices
                .entry(candidate.telemetry_name().to_string())
                .or_insert_with(|| {
                    info!("New vendor app device {}", candidate.telemetry_name());
                    Arc::new(candidate)
                })
                .clone()
        };
        // Registry lock released before the app list is touched
        self.vendor_apps.register_device(app, device.clone());
        device
    }

    /// Snapshot of all devices
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().values().cloned().collect()
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.next()
    }

    /// Start a new SCADA session; returns the session's bdSeq
    pub fn begin_session(&self) -> u64 {
        self.bd_seq.next()
    }

    fn bd_seq_metric(&self, bd_seq: u64, timestamp_ms: u64) -> WireMetric {
        let mut metric = WireMetric {
            name: BD_SEQ_METRIC.to_string(),
            timestamp: timestamp_ms,
            ..Default::default()
        };
        MetricValue::U64(bd_seq).to_wire_metric(&mut metric);
        metric
    }

    /// NBIRTH: node identity, bdSeq and every UDT definition
    ///
    /// Resets the sequence number; the birth itself carries seq 0.
    pub fn build_node_birth(&self, bd_seq: u64) -> WirePayload {
        let timestamp_ms = micros_to_millis(self.now());
        self.seq.reset();

        let mut name = WireMetric {
            name: NODE_NAME_METRIC.to_string(),
            timestamp: timestamp_ms,
            ..Default::default()
        };
        MetricValue::String(self.config.app_name.clone()).to_wire_metric(&mut name);

        let mut payload = WirePayload::new(timestamp_ms);
        payload.seq = Some(self.seq.next());
        payload.metrics.push(name);
        payload.metrics.push(self.bd_seq_metric(bd_seq, timestamp_ms));
        payload.metrics.extend(self.definitions.to_birth_metrics());
        payload
    }

    /// NDEATH, registered as the broker will message of a session
    pub fn build_node_death(&self, bd_seq: u64) -> WirePayload {
        let timestamp_ms = micros_to_millis(self.now());
        let mut payload = WirePayload::new(timestamp_ms);
        payload.metrics.push(self.bd_seq_metric(bd_seq, timestamp_ms));
        payload
    }
}
