//! Per-device metric repository and lifecycle state
//!
//! A `Device` owns its metric tree behind a mutex and exposes two status
//! atomics: what was last published to SCADA and what was last heard from
//! the source. The lock is held for exactly one ingest or one message build.

use crate::error::{Result, SyncError};
use crate::node::{micros_to_millis, MetricChange, MetricNode};
use crate::template::DefinitionRegistry;
use crate::value::{AssignOutcome, DataType, MetricValue};
use crate::wire::{WireMetric, WirePayload};
use parking_lot::Mutex;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tracing::{debug, warn};

/// Identity metric carried by the birth of catalog devices
pub const SITE_INFO_METRIC: &str = "Properties/Site info name";

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceStatus {
    None = 0,
    Up = 1,
    Down = 2,
}

#[derive(Debug)]
struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    fn new(status: DeviceStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    fn load(&self) -> DeviceStatus {
        match self.0.load(Ordering::Acquire) {
            1 => DeviceStatus::Up,
            2 => DeviceStatus::Down,
            _ => DeviceStatus::None,
        }
    }

    fn store(&self, status: DeviceStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

// ============================================================================
// Change sets
// ============================================================================

/// Root metrics (and, for composites, children) to include in a Data message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: BTreeMap<String, MetricChange>,
}

fn merge_change(existing: &mut MetricChange, incoming: MetricChange) {
    match (existing, incoming) {
        (MetricChange::Whole, _) => {}
        (slot, MetricChange::Whole) => *slot = MetricChange::Whole,
        (MetricChange::Children(current), MetricChange::Children(more)) => {
            for (name, change) in more {
                match current.entry(name) {
                    Entry::Occupied(mut entry) => merge_change(entry.get_mut(), change),
                    Entry::Vacant(entry) => {
                        entry.insert(change);
                    }
                }
            }
        }
    }
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&MetricChange> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Add a root change; repeated changes to one root are unioned
    pub fn record(&mut self, name: impl Into<String>, change: MetricChange) {
        match self.entries.entry(name.into()) {
            Entry::Occupied(mut entry) => merge_change(entry.get_mut(), change),
            Entry::Vacant(entry) => {
                entry.insert(change);
            }
        }
    }

    pub fn extend(&mut self, other: ChangeSet) {
        for (name, change) in other.entries {
            self.record(name, change);
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &MetricChange)> {
        self.entries.iter()
    }
}

/// Classification of one `Device::ingest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeResult {
    pub metric: String,
    pub outcome: AssignOutcome,
    /// Set when `outcome` is `Assigned`
    pub change: Option<MetricChange>,
}

impl ChangeResult {
    fn new(metric: &str, outcome: AssignOutcome, change: Option<MetricChange>) -> Self {
        Self {
            metric: metric.to_string(),
            outcome,
            change,
        }
    }

    /// Changed children of a composite root
    pub fn changed_children(&self) -> Option<Vec<&str>> {
        match &self.change {
            Some(MetricChange::Children(children)) => {
                Some(children.keys().map(String::as_str).collect())
            }
            _ => None,
        }
    }

    pub fn into_change_set(self) -> ChangeSet {
        let mut set = ChangeSet::new();
        if let Some(change) = self.change {
            set.record(self.metric, change);
        }
        set
    }
}

/// Result of applying a batch of Data updates
#[derive(Debug, Default)]
pub struct DataBatch {
    pub changes: ChangeSet,
    /// Per-metric failures; the rest of the batch was still applied
    pub rejected: Vec<SyncError>,
}

/// What a (re)birth announcement from the source requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BirthOutcome {
    /// Metric set replaced; a full Birth is owed
    Rebirth,
    /// Same structure as already published; only values changed
    DataOnly(ChangeSet),
}

// ============================================================================
// Device
// ============================================================================

#[derive(Debug)]
pub struct Device {
    local_name: String,
    telemetry_name: String,
    site: Option<String>,
    app: Option<String>,
    is_external_app: bool,
    metrics: Mutex<BTreeMap<String, MetricNode>>,
    last_published: AtomicStatus,
    last_known: AtomicStatus,
    /// Microseconds since epoch
    death_timestamp: AtomicU64,
}

impl Device {
    pub fn new(
        local_name: impl Into<String>,
        telemetry_name: impl Into<String>,
        is_external_app: bool,
    ) -> Self {
        Self {
            local_name: local_name.into(),
            telemetry_name: telemetry_name.into(),
            site: None,
            app: None,
            is_external_app,
            metrics: Mutex::new(BTreeMap::new()),
            last_published: AtomicStatus::new(DeviceStatus::None),
            last_known: AtomicStatus::new(DeviceStatus::None),
            death_timestamp: AtomicU64::new(0),
        }
    }

    /// Catalog device; published as `{device}-{site}`
    pub fn for_site(device: impl Into<String>, site: impl Into<String>) -> Self {
        let device = device.into();
        let site = site.into();
        let mut dev = Self::new(device.clone(), format!("{}-{}", device, site), false);
        dev.site = Some(site);
        dev
    }

    /// Device announced by vendor app `app`; published as `{app}-{device}`
    pub fn for_vendor_app(app: impl Into<String>, device: impl Into<String>) -> Self {
        let app = app.into();
        let device = device.into();
        let mut dev = Self::new(device.clone(), format!("{}-{}", app, device), true);
        dev.app = Some(app);
        dev
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn telemetry_name(&self) -> &str {
        &self.telemetry_name
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    /// Owning vendor app, for external application devices
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    pub fn is_external_app(&self) -> bool {
        self.is_external_app
    }

    pub fn last_published_status(&self) -> DeviceStatus {
        self.last_published.load()
    }

    pub fn last_known_status(&self) -> DeviceStatus {
        self.last_known.load()
    }

    pub fn death_timestamp(&self) -> u64 {
        self.death_timestamp.load(Ordering::Acquire)
    }

    /// Record that the source went down at `timestamp` (µs)
    pub fn mark_dead(&self, timestamp: u64) {
        self.death_timestamp.store(timestamp, Ordering::Release);
    }

    /// Record that the source is delivering data
    pub fn mark_alive(&self) {
        self.last_known.store(DeviceStatus::Up);
    }

    /// Birth is owed when none was published or the source was seen down since
    pub fn needs_birth(&self) -> bool {
        self.last_published.load() != DeviceStatus::Up || self.last_known.load() == DeviceStatus::Down
    }

    /// Insert a metric without classification; catalog setup only
    pub fn add_metric(&self, node: MetricNode) {
        self.metrics.lock().insert(node.name().to_string(), node);
    }

    pub fn metric(&self, name: &str) -> Option<MetricNode> {
        self.metrics.lock().get(name).cloned()
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.lock().keys().cloned().collect()
    }

    pub fn has_metrics(&self) -> bool {
        !self.metrics.lock().is_empty()
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    fn ingest_locked(
        &self,
        tree: &mut BTreeMap<String, MetricNode>,
        metric_name: &str,
        mut incoming: MetricNode,
        source_timestamp: u64,
    ) -> ChangeResult {
        if incoming.name() != metric_name {
            warn!(
                "Device {}: update for '{}' carries metric '{}'",
                self.telemetry_name,
                metric_name,
                incoming.name()
            );
            return ChangeResult::new(metric_name, AssignOutcome::TypeMismatch, None);
        }
        incoming.set_timestamp(source_timestamp);

        match tree.get_mut(metric_name) {
            Some(existing) => {
                let result = existing.assign_new_value(&incoming);
                if result.outcome == AssignOutcome::TypeMismatch {
                    warn!(
                        "Device {}: rejected {} update of {} metric '{}'",
                        self.telemetry_name,
                        incoming.declared_type(),
                        existing.declared_type(),
                        metric_name
                    );
                }
                ChangeResult::new(metric_name, result.outcome, result.change)
            }
            None => {
                debug!("Device {}: new metric '{}'", self.telemetry_name, metric_name);
                tree.insert(metric_name.to_string(), incoming);
                ChangeResult::new(
                    metric_name,
                    AssignOutcome::Assigned,
                    Some(MetricChange::Whole),
                )
            }
        }
    }

    /// Merge one incoming metric, creating it if unknown
    pub fn ingest(
        &self,
        metric_name: &str,
        incoming: MetricNode,
        source_timestamp: u64,
    ) -> ChangeResult {
        let mut tree = self.metrics.lock();
        self.ingest_locked(&mut tree, metric_name, incoming, source_timestamp)
    }

    /// Apply a Data batch; metrics the device does not have are rejected
    ///
    /// A composite instance whose definition is registered is accepted as new.
    pub fn apply_data(
        &self,
        batch: Vec<MetricNode>,
        registry: &DefinitionRegistry,
        source_timestamp: u64,
    ) -> DataBatch {
        let mut result = DataBatch::default();
        let mut tree = self.metrics.lock();

        for incoming in batch {
            let name = incoming.name().to_string();
            if !tree.contains_key(&name) {
                let defined = incoming.as_composite().is_some_and(|udt| {
                    registry
                        .lookup(udt.definition_name(), udt.definition_version())
                        .is_some()
                });
                if !defined {
                    warn!("Device {}: unknown metric '{}' in data", self.telemetry_name, name);
                    result
                        .rejected
                        .push(SyncError::unknown_metric(&self.telemetry_name, name));
                    continue;
                }
            }

            let change = self.ingest_locked(&mut tree, &name, incoming, source_timestamp);
            match (change.outcome, change.change) {
                (AssignOutcome::Assigned, Some(c)) => result.changes.record(name, c),
                (AssignOutcome::TypeMismatch, _) => {
                    let existing = tree.get(&name).map(MetricNode::declared_type);
                    result.rejected.push(SyncError::type_mismatch(
                        name,
                        existing.unwrap_or(DataType::Unknown),
                        "incompatible update",
                    ));
                }
                _ => {}
            }
        }
        result
    }

    /// Apply a Birth announcement from the source
    ///
    /// When the device is already published with the same structure, the
    /// announcement is folded in as Data; otherwise the tree is replaced.
    pub fn ingest_birth(&self, metrics: Vec<MetricNode>, source_timestamp: u64) -> BirthOutcome {
        let mut tree = self.metrics.lock();
        let was_down = self.needs_birth();

        let same_structure = tree.len() == metrics.len()
            && metrics.iter().all(|incoming| {
                tree.get(incoming.name())
                    .is_some_and(|existing| existing.compare_structure(incoming))
            });

        self.mark_alive();

        if same_structure && !was_down {
            let mut changes = ChangeSet::new();
            for incoming in metrics {
                let name = incoming.name().to_string();
                let result = self.ingest_locked(&mut tree, &name, incoming, source_timestamp);
                if let (AssignOutcome::Assigned, Some(change)) = (result.outcome, result.change) {
                    changes.record(name, change);
                }
            }
            debug!(
                "Device {}: rebirth with unchanged structure, {} changed",
                self.telemetry_name,
                changes.len()
            );
            return BirthOutcome::DataOnly(changes);
        }

        tree.clear();
        for mut incoming in metrics {
            incoming.set_timestamp(source_timestamp);
            tree.insert(incoming.name().to_string(), incoming);
        }
        BirthOutcome::Rebirth
    }

    /// Validate a command target: the metric must exist with a compatible type
    ///
    /// Returns the stored declared type.
    pub fn check_metric(&self, name: &str, data_type: DataType) -> Result<DataType> {
        let tree = self.metrics.lock();
        let node = tree
            .get(name)
            .ok_or_else(|| SyncError::unknown_metric(&self.telemetry_name, name))?;
        let declared = node.declared_type();
        if declared.is_compatible_with(data_type) {
            Ok(declared)
        } else {
            Err(SyncError::type_mismatch(name, declared, data_type))
        }
    }

    // ------------------------------------------------------------------------
    // Message builders
    // ------------------------------------------------------------------------

    fn identity_metrics(&self, timestamp_ms: u64) -> Vec<WireMetric> {
        let Some(site) = &self.site else {
            return Vec::new();
        };
        let mut metric = WireMetric {
            name: SITE_INFO_METRIC.to_string(),
            timestamp: timestamp_ms,
            ..Default::default()
        };
        MetricValue::String(site.clone()).to_wire_metric(&mut metric);
        vec![metric]
    }

    /// Full-state payload; marks the device published UP
    pub fn build_birth_message(&self, timestamp: u64) -> WirePayload {
        let timestamp_ms = micros_to_millis(timestamp);
        let mut payload = WirePayload::new(timestamp_ms);
        payload.metrics = self.identity_metrics(timestamp_ms);
        {
            let tree = self.metrics.lock();
            payload
                .metrics
                .extend(tree.values().map(MetricNode::to_birth_metric));
        }
        self.last_published.store(DeviceStatus::Up);
        payload
    }

    /// Payload of the changed metrics; `None` when nothing changed
    pub fn build_data_message(&self, changes: &ChangeSet, timestamp: u64) -> Option<WirePayload> {
        if changes.is_empty() {
            return None;
        }
        let mut payload = WirePayload::new(micros_to_millis(timestamp));
        {
            let tree = self.metrics.lock();
            for (name, change) in changes.iter() {
                match tree.get(name) {
                    Some(node) => payload.metrics.push(node.to_data_metric(change)),
                    None => warn!(
                        "Device {}: change set names missing metric '{}'",
                        self.telemetry_name, name
                    ),
                }
            }
        }
        if payload.metrics.is_empty() {
            return None;
        }
        self.last_published.store(DeviceStatus::Up);
        Some(payload)
    }

    /// Identity and death time only; marks the source DOWN
    pub fn build_death_message(&self) -> WirePayload {
        self.last_known.store(DeviceStatus::Down);
        WirePayload::new(micros_to_millis(self.death_timestamp()))
    }
}
