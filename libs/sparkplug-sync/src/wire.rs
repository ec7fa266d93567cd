//! Decoded Sparkplug B payload tree
//!
//! Mirrors the Tahu protobuf `Payload` message closely enough that a transport
//! can encode it field by field. Encoding itself happens outside this crate.

use serde::{Deserialize, Serialize};

/// One Sparkplug payload (NBIRTH, DBIRTH, DDATA, DDEATH, NDEATH, DCMD)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    /// Payload timestamp in milliseconds since epoch
    pub timestamp: u64,
    /// Sequence number, stamped by the publisher path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub metrics: Vec<WireMetric>,
}

impl WirePayload {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn metric(&self, name: &str) -> Option<&WireMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMetric {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<u64>,
    /// Milliseconds since epoch
    pub timestamp: u64,
    /// Sparkplug datatype code
    pub datatype: u32,
    #[serde(default)]
    pub is_null: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<WireProperty>,
    pub value: WireValue,
}

impl WireMetric {
    pub fn property(&self, key: &str) -> Option<&WireValue> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| &p.value)
    }
}

/// Typed entry of a metric's property set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireProperty {
    pub key: String,
    pub datatype: u32,
    pub value: WireValue,
}

/// Template parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireParameter {
    pub name: String,
    pub datatype: u32,
    pub value: WireValue,
}

/// Template body, used both for definitions and instances
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub metrics: Vec<WireMetric>,
    #[serde(default)]
    pub parameters: Vec<WireParameter>,
    /// Definition name; set on instances only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<String>,
    #[serde(default)]
    pub is_definition: bool,
}

/// The `oneof value` of a Sparkplug metric
///
/// Integers up to 32 bits travel in `int_value`, 64-bit ones in `long_value`.
/// Signed values are carried as their two's-complement bit pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireValue {
    IntValue(u32),
    LongValue(u64),
    FloatValue(f32),
    DoubleValue(f64),
    BooleanValue(bool),
    StringValue(String),
    TemplateValue(WireTemplate),
    #[default]
    Null,
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::StringValue(s) => Some(s),
            _ => None,
        }
    }
}
