//! Sparkplug Sync
//!
//! Keeps a per-device tree of typed metrics in step with readings from the
//! plant bus and decides what goes to SCADA: a full Birth, a minimal Data
//! message of what changed, or a Death.
//!
//! # Layout
//!
//! - `value` / `node`: typed values and the metric tree (simple and UDT metrics)
//! - `template`: UDT definition registry
//! - `device` / `vendor`: device state, status tracking and vendor apps
//! - `engine`: shared context built once and passed by `Arc`
//! - `driver`: message processing, publishing and worker threads
//! - `wire` / `topic`: decoded Sparkplug payloads and topic formats
//! - `catalog` / `update`: catalog devices and their register readings

pub mod catalog;
pub mod config;
pub mod device;
pub mod driver;
pub mod engine;
pub mod error;
pub mod node;
pub mod template;
pub mod topic;
pub mod update;
pub mod value;
pub mod vendor;
pub mod wire;

pub use catalog::{CatalogDevice, CatalogPoint, DeviceCatalog, RegisterType, StaticCatalog};
pub use config::SyncConfig;
pub use device::{BirthOutcome, ChangeResult, ChangeSet, DataBatch, Device, DeviceStatus};
pub use driver::{
    ChannelPublisher, ConnectionEvent, DriverHandle, InboundMessage, OutboundMessage, Publisher,
    SparkplugAction, SyncDriver,
};
pub use engine::{SequenceCounter, SyncEngine};
pub use error::{Result, SyncError};
pub use node::{
    AssignResult, CompositeDiff, CompositeMetric, MetricChange, MetricNode, SimpleMetric,
};
pub use template::{DefinitionId, DefinitionRegistry};
pub use topic::{InternalTopic, SparkplugMessageType, SparkplugTopic};
pub use value::{AssignOutcome, DataType, MetricValue, ValueComparison};
pub use vendor::{VendorApp, VendorAppList};
pub use wire::{WireMetric, WirePayload, WireValue};
