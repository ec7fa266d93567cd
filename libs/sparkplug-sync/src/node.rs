//! Metric tree nodes
//!
//! A `MetricNode` is either a simple typed value or a composite (UDT) group of
//! child nodes and parameters. Every node knows how to compare itself to an
//! incoming update, merge it, and serialize itself for Birth, Data and the
//! generic JSON record.
//!
//! Generic record shape:
//!
//! ```json
//! {"name": "Flow", "dataType": "Int32", "value": 15, "timestamp": 1700000000000000}
//! {"name": "P1", "dataType": "Template", "timestamp": 1700000000000000,
//!  "value": {"udt_ref": {"name": "Pump", "version": "1.0"},
//!            "metrics": [ ... ], "parameters": [{"name": "rated", "dataType": "Float", "value": 7.5}]}}
//! ```
//!
//! A definition carries `"version"` in place of `"udt_ref"`.

use crate::error::{Result, SyncError};
use crate::template::{DefinitionId, DefinitionRegistry};
use crate::value::{AssignOutcome, DataType, MetricValue, ValueComparison};
use crate::wire::{WireMetric, WireParameter, WireProperty, WireTemplate, WireValue};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

pub const KEY_NAME: &str = "name";
pub const KEY_DATA_TYPE: &str = "dataType";
pub const KEY_VALUE: &str = "value";
pub const KEY_TIMESTAMP: &str = "timestamp";
const KEY_METRICS: &str = "metrics";
const KEY_PARAMETERS: &str = "parameters";
const KEY_UDT_REF: &str = "udt_ref";
const KEY_VERSION: &str = "version";

/// Node timestamps are microseconds; Sparkplug carries milliseconds
pub fn micros_to_millis(us: u64) -> u64 {
    us / 1_000
}

// ============================================================================
// Change tracking
// ============================================================================

/// What changed in one metric as a result of an assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricChange {
    /// Whole metric is new or its scalar value changed
    Whole,
    /// Composite whose listed children changed; all parameters are resent
    Children(BTreeMap<String, MetricChange>),
}

/// Result of `MetricNode::assign_new_value`
///
/// `change` is set exactly when `outcome` is `Assigned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignResult {
    pub outcome: AssignOutcome,
    pub change: Option<MetricChange>,
}

impl AssignResult {
    pub fn no_change() -> Self {
        Self {
            outcome: AssignOutcome::NoChange,
            change: None,
        }
    }

    pub fn type_mismatch() -> Self {
        Self {
            outcome: AssignOutcome::TypeMismatch,
            change: None,
        }
    }

    pub fn assigned(change: MetricChange) -> Self {
        Self {
            outcome: AssignOutcome::Assigned,
            change: Some(change),
        }
    }
}

/// Result of merging an incoming composite into an existing one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeDiff {
    pub outcome: AssignOutcome,
    /// Exactly the children to include in a Data message
    pub changed: BTreeMap<String, MetricChange>,
}

// ============================================================================
// Node types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MetricMeta {
    pub name: String,
    /// Name used on the Sparkplug side; defaults to `name`
    pub sparkplug_name: String,
    /// Microseconds since epoch
    pub timestamp: u64,
}

impl MetricMeta {
    fn new(name: impl Into<String>, timestamp: u64) -> Self {
        let name = name.into();
        Self {
            sparkplug_name: name.clone(),
            name,
            timestamp,
        }
    }
}

/// Leaf metric holding one typed value
///
/// `value` is `None` until the first reading arrives; the declared type is
/// fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleMetric {
    meta: MetricMeta,
    declared_type: DataType,
    value: Option<MetricValue>,
    properties: Vec<WireProperty>,
}

/// UDT metric: ordered children and parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeMetric {
    meta: MetricMeta,
    metrics: BTreeMap<String, MetricNode>,
    parameters: BTreeMap<String, MetricValue>,
    definition_name: String,
    definition_version: String,
    is_definition: bool,
    definition: Option<DefinitionId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricNode {
    Simple(SimpleMetric),
    Composite(CompositeMetric),
}

// ============================================================================
// SimpleMetric
// ============================================================================

impl SimpleMetric {
    pub fn new(
        name: impl Into<String>,
        declared_type: DataType,
        value: Option<MetricValue>,
        timestamp: u64,
    ) -> Self {
        Self {
            meta: MetricMeta::new(name, timestamp),
            declared_type,
            value,
            properties: Vec::new(),
        }
    }

    /// Build from a value, taking the declared type from it
    pub fn with_value(name: impl Into<String>, value: MetricValue, timestamp: u64) -> Self {
        let declared_type = value.data_type();
        Self::new(name, declared_type, Some(value), timestamp)
    }

    pub fn declared_type(&self) -> DataType {
        self.declared_type
    }

    pub fn value(&self) -> Option<&MetricValue> {
        self.value.as_ref()
    }

    pub fn properties(&self) -> &[WireProperty] {
        &self.properties
    }

    pub fn set_properties(&mut self, properties: Vec<WireProperty>) {
        self.properties = properties;
    }

    fn compare_value(&self, other: &SimpleMetric) -> ValueComparison {
        if self.declared_type != other.declared_type {
            return ValueComparison::TypeMismatch;
        }
        match (&self.value, &other.value) {
            (Some(current), Some(incoming)) => current.compare(incoming),
            (None, None) => ValueComparison::Equal,
            _ => ValueComparison::ValueDifferent,
        }
    }

    fn assign_new_value(&mut self, other: &SimpleMetric) -> AssignResult {
        if self.declared_type != other.declared_type {
            return AssignResult::type_mismatch();
        }
        // A null update carries no usable data
        let Some(incoming) = &other.value else {
            return AssignResult::no_change();
        };
        let outcome = match self.value.as_mut() {
            Some(current) => current.assign_if_different(incoming),
            None => {
                self.value = Some(incoming.clone());
                AssignOutcome::Assigned
            }
        };
        match outcome {
            AssignOutcome::Assigned => {
                self.meta.timestamp = other.meta.timestamp;
                AssignResult::assigned(MetricChange::Whole)
            }
            AssignOutcome::NoChange => AssignResult::no_change(),
            AssignOutcome::TypeMismatch => AssignResult::type_mismatch(),
        }
    }

    fn write_value(&self, out: &mut WireMetric) {
        out.datatype = self.declared_type.wire_code();
        match &self.value {
            Some(value) => value.to_wire_metric(out),
            None => {
                out.is_null = true;
                out.value = WireValue::Null;
            }
        }
    }

    fn to_birth_metric(&self) -> WireMetric {
        let mut out = WireMetric {
            name: self.meta.sparkplug_name.clone(),
            timestamp: micros_to_millis(self.meta.timestamp),
            properties: self.properties.clone(),
            ..Default::default()
        };
        self.write_value(&mut out);
        out
    }

    fn to_data_metric(&self) -> WireMetric {
        let mut out = WireMetric {
            name: self.meta.sparkplug_name.clone(),
            timestamp: micros_to_millis(self.meta.timestamp),
            ..Default::default()
        };
        self.write_value(&mut out);
        out
    }

    fn to_record(&self) -> Value {
        let mut map = Map::new();
        map.insert(KEY_NAME.to_string(), Value::from(self.meta.name.as_str()));
        map.insert(
            KEY_DATA_TYPE.to_string(),
            Value::from(self.declared_type.as_str()),
        );
        match &self.value {
            Some(value) => value.to_json_field(&mut map, KEY_VALUE),
            None => {
                map.insert(KEY_VALUE.to_string(), Value::Null);
            }
        }
        map.insert(KEY_TIMESTAMP.to_string(), Value::from(self.meta.timestamp));
        Value::Object(map)
    }
}

// ============================================================================
// CompositeMetric
// ============================================================================

impl CompositeMetric {
    /// Instance of the UDT `definition_name`/`version`
    pub fn instance(
        name: impl Into<String>,
        definition_name: impl Into<String>,
        version: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            meta: MetricMeta::new(name, timestamp),
            metrics: BTreeMap::new(),
            parameters: BTreeMap::new(),
            definition_name: definition_name.into(),
            definition_version: version.into(),
            is_definition: false,
            definition: None,
        }
    }

    /// UDT definition; its metric name is the definition name
    pub fn definition(name: impl Into<String>, version: impl Into<String>, timestamp: u64) -> Self {
        let name = name.into();
        let mut def = Self::instance(name.clone(), name, version, timestamp);
        def.is_definition = true;
        def
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn metrics(&self) -> &BTreeMap<String, MetricNode> {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<&MetricNode> {
        self.metrics.get(name)
    }

    pub fn parameters(&self) -> &BTreeMap<String, MetricValue> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&MetricValue> {
        self.parameters.get(name)
    }

    pub fn insert_metric(&mut self, node: MetricNode) {
        self.metrics.insert(node.name().to_string(), node);
    }

    pub fn insert_parameter(&mut self, name: impl Into<String>, value: MetricValue) {
        self.parameters.insert(name.into(), value);
    }

    pub fn definition_name(&self) -> &str {
        &self.definition_name
    }

    pub fn definition_version(&self) -> &str {
        &self.definition_version
    }

    pub fn is_definition(&self) -> bool {
        self.is_definition
    }

    pub fn definition_id(&self) -> Option<DefinitionId> {
        self.definition
    }

    pub(crate) fn mark_as_definition(&mut self) {
        self.is_definition = true;
        self.definition = None;
        if self.definition_name.is_empty() {
            self.definition_name = self.meta.name.clone();
        }
    }

    fn same_definition(&self, other: &CompositeMetric) -> bool {
        self.definition_name.is_empty()
            || other.definition_name.is_empty()
            || self.definition_name == other.definition_name
    }

    fn compare_value(&self, incoming: &CompositeMetric) -> ValueComparison {
        if !self.same_definition(incoming) {
            return ValueComparison::TypeMismatch;
        }
        for (name, child) in &incoming.metrics {
            let differs = match self.metrics.get(name) {
                Some(existing) => existing.compare_value(child) == ValueComparison::ValueDifferent,
                None => true,
            };
            if differs {
                return ValueComparison::ValueDifferent;
            }
        }
        for (name, value) in &incoming.parameters {
            let differs = self
                .parameters
                .get(name)
                .map_or(true, |p| p.compare(value) == ValueComparison::ValueDifferent);
            if differs {
                return ValueComparison::ValueDifferent;
            }
        }
        ValueComparison::Equal
    }

    /// Merge `incoming` child by child
    ///
    /// Existing compatible children are assigned recursively, unknown children
    /// are inserted, incompatible ones are rejected and keep their value.
    /// Children absent from `incoming` are left untouched.
    pub fn merge(&mut self, incoming: &CompositeMetric) -> CompositeDiff {
        if !self.same_definition(incoming) {
            warn!(
                "UDT '{}' is a {} but update refers to {}",
                self.meta.name, self.definition_name, incoming.definition_name
            );
            return CompositeDiff {
                outcome: AssignOutcome::TypeMismatch,
                changed: BTreeMap::new(),
            };
        }

        let mut changed = BTreeMap::new();
        let mut mismatches = 0usize;
        let mut parameters_changed = false;

        for (name, child) in &incoming.metrics {
            match self.metrics.get_mut(name) {
                Some(existing) => {
                    let result = existing.assign_new_value(child);
                    match (result.outcome, result.change) {
                        (AssignOutcome::Assigned, Some(change)) => {
                            changed.insert(name.clone(), change);
                        }
                        (AssignOutcome::TypeMismatch, _) => {
                            warn!(
                                "UDT '{}': rejected update of '{}' ({} -> {})",
                                self.meta.name,
                                name,
                                existing.declared_type(),
                                child.declared_type()
                            );
                            mismatches += 1;
                        }
                        _ => {}
                    }
                }
                None => {
                    self.metrics.insert(name.clone(), child.clone());
                    changed.insert(name.clone(), MetricChange::Whole);
                }
            }
        }

        for (name, value) in &incoming.parameters {
            match self.parameters.get_mut(name) {
                Some(existing) => match existing.assign_if_different(value) {
                    AssignOutcome::Assigned => parameters_changed = true,
                    AssignOutcome::TypeMismatch => mismatches += 1,
                    AssignOutcome::NoChange => {}
                },
                None => {
                    self.parameters.insert(name.clone(), value.clone());
                    parameters_changed = true;
                }
            }
        }

        let total = incoming.metrics.len() + incoming.parameters.len();
        let outcome = if !changed.is_empty() || parameters_changed {
            self.meta.timestamp = incoming.meta.timestamp;
            AssignOutcome::Assigned
        } else if mismatches > 0 && mismatches == total {
            AssignOutcome::TypeMismatch
        } else {
            AssignOutcome::NoChange
        };

        CompositeDiff { outcome, changed }
    }

    fn wire_parameters(&self) -> Vec<WireParameter> {
        self.parameters
            .iter()
            .map(|(name, value)| value.to_wire_parameter(name.as_str()))
            .collect()
    }

    fn wire_template(&self, metrics: Vec<WireMetric>) -> WireTemplate {
        WireTemplate {
            version: (!self.definition_version.is_empty()).then(|| self.definition_version.clone()),
            metrics,
            parameters: self.wire_parameters(),
            template_ref: (!self.is_definition).then(|| self.definition_name.clone()),
            is_definition: self.is_definition,
        }
    }

    fn wire_metric(&self, template: WireTemplate) -> WireMetric {
        WireMetric {
            name: self.meta.sparkplug_name.clone(),
            timestamp: micros_to_millis(self.meta.timestamp),
            datatype: DataType::Template.wire_code(),
            value: WireValue::TemplateValue(template),
            ..Default::default()
        }
    }

    /// Full state, including definition declarations for definitions
    pub fn to_birth_metric(&self) -> WireMetric {
        let metrics = self.metrics.values().map(MetricNode::to_birth_metric).collect();
        self.wire_metric(self.wire_template(metrics))
    }

    /// Only the listed children, plus every parameter
    pub fn data_metric_for(&self, changed: &BTreeMap<String, MetricChange>) -> WireMetric {
        let metrics = changed
            .iter()
            .filter_map(|(name, change)| {
                self.metrics
                    .get(name)
                    .map(|child| child.to_data_metric(change))
            })
            .collect();
        self.wire_metric(self.wire_template(metrics))
    }

    fn all_children_data_metric(&self) -> WireMetric {
        let metrics = self
            .metrics
            .values()
            .map(|child| child.to_data_metric(&MetricChange::Whole))
            .collect();
        self.wire_metric(self.wire_template(metrics))
    }

    fn record_body(&self) -> Value {
        let metrics: Vec<Value> = self.metrics.values().map(MetricNode::to_record).collect();
        let parameters: Vec<Value> = self
            .parameters
            .iter()
            .map(|(name, value)| {
                let mut map = Map::new();
                map.insert(KEY_NAME.to_string(), Value::from(name.as_str()));
                map.insert(
                    KEY_DATA_TYPE.to_string(),
                    Value::from(value.data_type().as_str()),
                );
                value.to_json_field(&mut map, KEY_VALUE);
                Value::Object(map)
            })
            .collect();

        if self.is_definition {
            json!({
                KEY_VERSION: self.definition_version,
                KEY_METRICS: metrics,
                KEY_PARAMETERS: parameters,
            })
        } else {
            json!({
                KEY_UDT_REF: {
                    KEY_NAME: self.definition_name,
                    KEY_VERSION: self.definition_version,
                },
                KEY_METRICS: metrics,
                KEY_PARAMETERS: parameters,
            })
        }
    }

    fn from_record_value(name: &str, value: &Value, timestamp: u64) -> Result<Self> {
        let body = value
            .as_object()
            .ok_or_else(|| SyncError::malformed(format!("UDT '{}' value is not an object", name)))?;
        let metrics = body
            .get(KEY_METRICS)
            .and_then(Value::as_array)
            .ok_or_else(|| SyncError::malformed(format!("UDT '{}' has no metrics array", name)))?;

        let mut composite = match body.get(KEY_UDT_REF) {
            Some(udt_ref) => {
                let def_name = udt_ref.get(KEY_NAME).and_then(Value::as_str);
                let version = udt_ref.get(KEY_VERSION).and_then(Value::as_str);
                match (def_name, version) {
                    (Some(def_name), Some(version)) => {
                        Self::instance(name, def_name, version, timestamp)
                    }
                    _ => {
                        return Err(SyncError::malformed(format!(
                            "UDT '{}' has an incomplete udt_ref",
                            name
                        )))
                    }
                }
            }
            None => {
                let version = body.get(KEY_VERSION).and_then(Value::as_str).ok_or_else(|| {
                    SyncError::malformed(format!("UDT '{}' has neither udt_ref nor version", name))
                })?;
                Self::definition(name, version, timestamp)
            }
        };

        for child in metrics {
            match MetricNode::from_record(child, timestamp) {
                Ok(node) => composite.insert_metric(node),
                Err(e) => warn!("UDT '{}': skipping child: {}", name, e),
            }
        }

        if let Some(parameters) = body.get(KEY_PARAMETERS).and_then(Value::as_array) {
            for parameter in parameters {
                match parse_parameter(parameter) {
                    Ok((param_name, param_value)) => {
                        composite.insert_parameter(param_name, param_value)
                    }
                    Err(e) => warn!("UDT '{}': skipping parameter: {}", name, e),
                }
            }
        }

        Ok(composite)
    }

    fn from_wire_template(name: &str, template: &WireTemplate, timestamp: u64) -> Self {
        let version = template.version.clone().unwrap_or_default();
        let mut composite = if template.is_definition {
            Self::definition(name, version, timestamp)
        } else {
            let def_name = template.template_ref.clone().unwrap_or_default();
            Self::instance(name, def_name, version, timestamp)
        };

        for child in &template.metrics {
            match MetricNode::from_wire_metric(child) {
                Ok(node) => composite.insert_metric(node),
                Err(e) => warn!("UDT '{}': skipping child '{}': {}", name, child.name, e),
            }
        }
        for parameter in &template.parameters {
            match MetricValue::from_wire(parameter.datatype, &parameter.value) {
                Ok(value) => composite.insert_parameter(parameter.name.as_str(), value),
                Err(e) => warn!(
                    "UDT '{}': skipping parameter '{}': {}",
                    name, parameter.name, e
                ),
            }
        }
        composite
    }

    fn compare_structure(&self, other: &CompositeMetric) -> bool {
        self.meta.name == other.meta.name
            && self.definition_name == other.definition_name
            && self.definition_version == other.definition_version
            && self.metrics.len() == other.metrics.len()
            && self.metrics.iter().all(|(name, child)| {
                other
                    .metrics
                    .get(name)
                    .is_some_and(|o| child.compare_structure(o))
            })
            && self.parameters.len() == other.parameters.len()
            && self.parameters.iter().all(|(name, value)| {
                other
                    .parameters
                    .get(name)
                    .is_some_and(|o| o.data_type() == value.data_type())
            })
    }

    /// Resolve definition handles of this instance and nested instances
    pub fn bind_definitions(&mut self, registry: &DefinitionRegistry) -> Result<()> {
        if !self.is_definition && !self.definition_name.is_empty() {
            let id = registry
                .lookup(&self.definition_name, &self.definition_version)
                .ok_or_else(|| SyncError::UnknownDefinition {
                    name: self.definition_name.clone(),
                    version: self.definition_version.clone(),
                })?;
            self.definition = Some(id);
        }
        for child in self.metrics.values_mut() {
            if let MetricNode::Composite(composite) = child {
                composite.bind_definitions(registry)?;
            }
        }
        Ok(())
    }

    fn validate(&self, registry: &DefinitionRegistry) -> Result<()> {
        if let (false, Some(id)) = (self.is_definition, self.definition) {
            let definition = registry.get(id).ok_or_else(|| SyncError::UnknownDefinition {
                name: self.definition_name.clone(),
                version: self.definition_version.clone(),
            })?;
            for (name, child) in &self.metrics {
                let declared = definition.metrics.get(name).ok_or_else(|| {
                    SyncError::unknown_metric(format!("UDT {}", self.definition_name), name)
                })?;
                if !declared
                    .declared_type()
                    .is_compatible_with(child.declared_type())
                {
                    return Err(SyncError::type_mismatch(
                        format!("{}/{}", self.meta.name, name),
                        declared.declared_type(),
                        child.declared_type(),
                    ));
                }
            }
        }
        self.metrics
            .values()
            .try_for_each(|child| child.validate(registry))
    }
}

fn parse_parameter(record: &Value) -> Result<(String, MetricValue)> {
    let name = record
        .get(KEY_NAME)
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::malformed("parameter has no name"))?;
    let data_type: DataType = record
        .get(KEY_DATA_TYPE)
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::malformed(format!("parameter '{}' has no dataType", name)))?
        .parse()?;
    let value = record
        .get(KEY_VALUE)
        .ok_or_else(|| SyncError::malformed(format!("parameter '{}' has no value", name)))?;
    Ok((name.to_string(), MetricValue::from_json(data_type, value)?))
}

// ============================================================================
// MetricNode
// ============================================================================

impl MetricNode {
    pub fn meta(&self) -> &MetricMeta {
        match self {
            MetricNode::Simple(m) => &m.meta,
            MetricNode::Composite(m) => &m.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut MetricMeta {
        match self {
            MetricNode::Simple(m) => &mut m.meta,
            MetricNode::Composite(m) => &mut m.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn sparkplug_name(&self) -> &str {
        &self.meta().sparkplug_name
    }

    pub fn set_sparkplug_name(&mut self, sparkplug_name: impl Into<String>) {
        self.meta_mut().sparkplug_name = sparkplug_name.into();
    }

    pub fn timestamp(&self) -> u64 {
        self.meta().timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.meta_mut().timestamp = timestamp;
    }

    pub fn declared_type(&self) -> DataType {
        match self {
            MetricNode::Simple(m) => m.declared_type,
            MetricNode::Composite(_) => DataType::Template,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleMetric> {
        match self {
            MetricNode::Simple(m) => Some(m),
            MetricNode::Composite(_) => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeMetric> {
        match self {
            MetricNode::Composite(m) => Some(m),
            MetricNode::Simple(_) => None,
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut CompositeMetric> {
        match self {
            MetricNode::Composite(m) => Some(m),
            MetricNode::Simple(_) => None,
        }
    }

    /// Identity check: same name and declared type, value ignored
    pub fn same_identity(&self, other: &MetricNode) -> bool {
        self.name() == other.name() && self.declared_type() == other.declared_type()
    }

    pub fn compare_value(&self, other: &MetricNode) -> ValueComparison {
        match (self, other) {
            (MetricNode::Simple(a), MetricNode::Simple(b)) => a.compare_value(b),
            (MetricNode::Composite(a), MetricNode::Composite(b)) => a.compare_value(b),
            _ => ValueComparison::TypeMismatch,
        }
    }

    pub fn assign_new_value(&mut self, other: &MetricNode) -> AssignResult {
        match (self, other) {
            (MetricNode::Simple(a), MetricNode::Simple(b)) => a.assign_new_value(b),
            (MetricNode::Composite(a), MetricNode::Composite(b)) => {
                let diff = a.merge(b);
                match diff.outcome {
                    AssignOutcome::Assigned => {
                        AssignResult::assigned(MetricChange::Children(diff.changed))
                    }
                    AssignOutcome::NoChange => AssignResult::no_change(),
                    AssignOutcome::TypeMismatch => AssignResult::type_mismatch(),
                }
            }
            _ => AssignResult::type_mismatch(),
        }
    }

    /// Decode `record` and merge it into this node
    ///
    /// On a decoding failure the node is left untouched.
    pub fn process_record(&mut self, record: &Value, timestamp: u64) -> Result<AssignResult> {
        let incoming = MetricNode::from_record(record, timestamp)?;
        if incoming.name() != self.name() {
            return Err(SyncError::malformed(format!(
                "record for '{}' applied to '{}'",
                incoming.name(),
                self.name()
            )));
        }
        Ok(self.assign_new_value(&incoming))
    }

    /// Decode one generic record element
    ///
    /// `timestamp` is used when the record carries none.
    pub fn from_record(record: &Value, timestamp: u64) -> Result<MetricNode> {
        let object = record
            .as_object()
            .ok_or_else(|| SyncError::malformed("metric record is not an object"))?;
        let name = object
            .get(KEY_NAME)
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::malformed("metric record has no name"))?;
        let data_type: DataType = object
            .get(KEY_DATA_TYPE)
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::malformed(format!("metric '{}' has no dataType", name)))?
            .parse()?;
        let timestamp = object
            .get(KEY_TIMESTAMP)
            .and_then(Value::as_u64)
            .unwrap_or(timestamp);
        let value = object
            .get(KEY_VALUE)
            .ok_or_else(|| SyncError::malformed(format!("metric '{}' has no value", name)))?;

        match data_type {
            DataType::Template => Ok(MetricNode::Composite(CompositeMetric::from_record_value(
                name, value, timestamp,
            )?)),
            DataType::Unknown => Err(SyncError::UnsupportedType(format!(
                "metric '{}' declares type Unknown",
                name
            ))),
            scalar => {
                let value = if value.is_null() {
                    None
                } else {
                    Some(MetricValue::from_json(scalar, value)?)
                };
                Ok(MetricNode::Simple(SimpleMetric::new(
                    name, scalar, value, timestamp,
                )))
            }
        }
    }

    /// Decode a metric from a decoded Sparkplug payload
    pub fn from_wire_metric(metric: &WireMetric) -> Result<MetricNode> {
        let data_type = DataType::from_wire_code(metric.datatype)?;
        let timestamp = metric.timestamp.saturating_mul(1_000);

        match (data_type, &metric.value) {
            (DataType::Template, WireValue::TemplateValue(template)) => Ok(MetricNode::Composite(
                CompositeMetric::from_wire_template(&metric.name, template, timestamp),
            )),
            (DataType::Template, other) => Err(SyncError::malformed(format!(
                "template metric '{}' carries {:?}",
                metric.name, other
            ))),
            (scalar, value) => {
                let value = if metric.is_null || value.is_null() {
                    None
                } else {
                    Some(MetricValue::from_wire(metric.datatype, value)?)
                };
                let mut simple = SimpleMetric::new(metric.name.as_str(), scalar, value, timestamp);
                simple.properties = metric.properties.clone();
                Ok(MetricNode::Simple(simple))
            }
        }
    }

    pub fn to_birth_metric(&self) -> WireMetric {
        match self {
            MetricNode::Simple(m) => m.to_birth_metric(),
            MetricNode::Composite(m) => m.to_birth_metric(),
        }
    }

    /// Data form of this node restricted to `change`
    pub fn to_data_metric(&self, change: &MetricChange) -> WireMetric {
        match (self, change) {
            (MetricNode::Simple(m), _) => m.to_data_metric(),
            (MetricNode::Composite(m), MetricChange::Children(changed)) => m.data_metric_for(changed),
            (MetricNode::Composite(m), MetricChange::Whole) => m.all_children_data_metric(),
        }
    }

    pub fn to_record(&self) -> Value {
        match self {
            MetricNode::Simple(m) => m.to_record(),
            MetricNode::Composite(m) => json!({
                KEY_NAME: m.meta.name,
                KEY_DATA_TYPE: DataType::Template.as_str(),
                KEY_VALUE: m.record_body(),
                KEY_TIMESTAMP: m.meta.timestamp,
            }),
        }
    }

    /// Same names, declared types and UDT shape at every level
    pub fn compare_structure(&self, other: &MetricNode) -> bool {
        match (self, other) {
            (MetricNode::Simple(a), MetricNode::Simple(b)) => {
                a.meta.name == b.meta.name && a.declared_type == b.declared_type
            }
            (MetricNode::Composite(a), MetricNode::Composite(b)) => a.compare_structure(b),
            _ => false,
        }
    }

    pub fn validate(&self, registry: &DefinitionRegistry) -> Result<()> {
        match self {
            MetricNode::Simple(_) => Ok(()),
            MetricNode::Composite(m) => m.validate(registry),
        }
    }
}
