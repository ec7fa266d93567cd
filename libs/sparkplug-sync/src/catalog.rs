//! Site/device/point catalog
//!
//! The catalog supplies the real (Modbus) devices known at startup. Each
//! point becomes a typed metric whose birth carries the point's addressing
//! properties.

use crate::device::Device;
use crate::error::Result;
use crate::node::{MetricNode, SimpleMetric};
use crate::value::{DataType, MetricValue};
use crate::wire::WireProperty;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Source of catalog devices
pub trait DeviceCatalog: Send + Sync {
    fn devices(&self) -> Vec<CatalogDevice>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegisterType {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl RegisterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::Coil => "COIL",
            RegisterType::DiscreteInput => "DISCRETE_INPUT",
            RegisterType::HoldingRegister => "HOLDING_REGISTER",
            RegisterType::InputRegister => "INPUT_REGISTER",
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_width() -> u32 {
    1
}

fn default_poll_interval() -> u32 {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPoint {
    /// Stable point id, used as the metric name
    pub id: String,
    /// `boolean`, `uint`, `int`, `float`, `double` or `string`
    pub data_type: String,
    /// Width in 16-bit registers
    #[serde(default = "default_width")]
    pub width: u32,
    pub address: u32,
    pub register_type: RegisterType,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u32,
    #[serde(default)]
    pub realtime: bool,
}

fn property(key: &str, value: MetricValue) -> WireProperty {
    WireProperty {
        key: key.to_string(),
        datatype: value.data_type().wire_code(),
        value: value.to_wire_value(),
    }
}

impl CatalogPoint {
    pub fn declared_type(&self) -> Result<DataType> {
        DataType::from_catalog(&self.data_type, self.width)
    }

    /// Null metric of the point's declared type, with birth properties
    pub fn to_metric(&self, timestamp: u64) -> Result<MetricNode> {
        let mut metric = SimpleMetric::new(self.id.as_str(), self.declared_type()?, None, timestamp);
        metric.set_properties(vec![
            property("Addr", MetricValue::U32(self.address)),
            property("Width", MetricValue::U32(self.width)),
            property("DataType", MetricValue::String(self.data_type.clone())),
            property("Type", MetricValue::String(self.register_type.to_string())),
            property("Pollinterval", MetricValue::U32(self.poll_interval_ms)),
            property("Realtime", MetricValue::Bool(self.realtime)),
        ]);
        Ok(MetricNode::Simple(metric))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDevice {
    pub site: String,
    pub device: String,
    #[serde(default)]
    pub points: Vec<CatalogPoint>,
}

impl CatalogDevice {
    /// Build the device with one metric per usable point
    pub fn to_device(&self, timestamp: u64) -> Device {
        let device = Device::for_site(self.device.as_str(), self.site.as_str());
        for point in &self.points {
            match point.to_metric(timestamp) {
                Ok(metric) => device.add_metric(metric),
                Err(e) => warn!(
                    "Catalog device {}: skipping point {}: {}",
                    device.telemetry_name(),
                    point.id,
                    e
                ),
            }
        }
        device
    }

    pub fn point(&self, id: &str) -> Option<&CatalogPoint> {
        self.points.iter().find(|p| p.id == id)
    }
}

/// Catalog held in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub devices: Vec<CatalogDevice>,
}

impl DeviceCatalog for StaticCatalog {
    fn devices(&self) -> Vec<CatalogDevice> {
        self.devices.clone()
    }
}
