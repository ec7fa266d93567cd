//! Topic formats on the internal bus and on the SCADA broker

use crate::error::{Result, SyncError};
use std::fmt;

/// Sparkplug B namespace
pub const SPARKPLUG_NAMESPACE: &str = "spBv1.0";

/// Published on the internal bus to ask vendor apps to announce themselves
pub const START_BIRTH_PROCESS: &str = "START_BIRTH_PROCESS";

pub const TEMPLATE_DEF: &str = "TemplateDef";

/// Inbound internal-bus topic, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalTopic {
    /// `BIRTH/{app}/{device}`
    VendorBirth { app: String, device: String },
    /// `DATA/{app}/{device}`
    VendorData { app: String, device: String },
    /// `DEATH/{app}` or `DEATH/{app}/{device}`
    VendorDeath { app: String, device: Option<String> },
    /// `/{device}/{site}/{point}/update`
    DeviceUpdate {
        device: String,
        site: String,
        point: String,
    },
    TemplateDef,
}

fn non_empty(parts: &[&str]) -> bool {
    parts.iter().all(|p| !p.is_empty())
}

impl InternalTopic {
    pub fn parse(topic: &str) -> Result<Self> {
        let parts: Vec<&str> = topic.split('/').collect();
        let invalid = || SyncError::InvalidTopic(topic.to_string());

        match parts.as_slice() {
            [TEMPLATE_DEF] => Ok(InternalTopic::TemplateDef),
            ["BIRTH", app, device] if non_empty(&[*app, *device]) => Ok(InternalTopic::VendorBirth {
                app: app.to_string(),
                device: device.to_string(),
            }),
            ["DATA", app, device] if non_empty(&[*app, *device]) => Ok(InternalTopic::VendorData {
                app: app.to_string(),
                device: device.to_string(),
            }),
            ["DEATH", app] if !app.is_empty() => Ok(InternalTopic::VendorDeath {
                app: app.to_string(),
                device: None,
            }),
            ["DEATH", app, device] if non_empty(&[*app, *device]) => {
                Ok(InternalTopic::VendorDeath {
                    app: app.to_string(),
                    device: Some(device.to_string()),
                })
            }
            ["", device, site, point, "update"] if non_empty(&[*device, *site, *point]) => {
                Ok(InternalTopic::DeviceUpdate {
                    device: device.to_string(),
                    site: site.to_string(),
                    point: point.to_string(),
                })
            }
            _ => Err(invalid()),
        }
    }
}

/// Vendor app command topic, `CMD/{app}/{device}`
pub fn vendor_command_topic(app: &str, device: &str) -> String {
    format!("CMD/{}/{}", app, device)
}

/// Real device write request topic, `/{device}/{site}/{point}/write`
pub fn write_request_topic(device: &str, site: &str, point: &str) -> String {
    format!("/{}/{}/{}/write", device, site, point)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparkplugMessageType {
    NBirth,
    NDeath,
    NData,
    NCmd,
    DBirth,
    DDeath,
    DData,
    DCmd,
}

impl SparkplugMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SparkplugMessageType::NBirth => "NBIRTH",
            SparkplugMessageType::NDeath => "NDEATH",
            SparkplugMessageType::NData => "NDATA",
            SparkplugMessageType::NCmd => "NCMD",
            SparkplugMessageType::DBirth => "DBIRTH",
            SparkplugMessageType::DDeath => "DDEATH",
            SparkplugMessageType::DData => "DDATA",
            SparkplugMessageType::DCmd => "DCMD",
        }
    }

    fn from_topic_part(s: &str) -> Option<Self> {
        Some(match s {
            "NBIRTH" => SparkplugMessageType::NBirth,
            "NDEATH" => SparkplugMessageType::NDeath,
            "NDATA" => SparkplugMessageType::NData,
            "NCMD" => SparkplugMessageType::NCmd,
            "DBIRTH" => SparkplugMessageType::DBirth,
            "DDEATH" => SparkplugMessageType::DDeath,
            "DDATA" => SparkplugMessageType::DData,
            "DCMD" => SparkplugMessageType::DCmd,
            _ => return None,
        })
    }

    pub fn is_device_level(&self) -> bool {
        matches!(
            self,
            SparkplugMessageType::DBirth
                | SparkplugMessageType::DDeath
                | SparkplugMessageType::DData
                | SparkplugMessageType::DCmd
        )
    }
}

/// `spBv1.0/{group}/{type}/{edge}[/{device}]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparkplugTopic {
    pub group_id: String,
    pub message_type: SparkplugMessageType,
    pub edge_node_id: String,
    pub device_id: Option<String>,
}

impl SparkplugTopic {
    pub fn node(group_id: &str, message_type: SparkplugMessageType, edge_node_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            message_type,
            edge_node_id: edge_node_id.to_string(),
            device_id: None,
        }
    }

    pub fn device(
        group_id: &str,
        message_type: SparkplugMessageType,
        edge_node_id: &str,
        device_id: &str,
    ) -> Self {
        Self {
            device_id: Some(device_id.to_string()),
            ..Self::node(group_id, message_type, edge_node_id)
        }
    }

    pub fn parse(topic: &str) -> Result<Self> {
        let invalid = || SyncError::InvalidTopic(topic.to_string());
        let parts: Vec<&str> = topic.split('/').collect();
        let (group, kind, edge, device) = match parts.as_slice() {
            [SPARKPLUG_NAMESPACE, group, kind, edge] => (*group, *kind, *edge, None),
            [SPARKPLUG_NAMESPACE, group, kind, edge, device] => {
                (*group, *kind, *edge, Some(*device))
            }
            _ => return Err(invalid()),
        };
        let message_type = SparkplugMessageType::from_topic_part(kind).ok_or_else(invalid)?;
        if message_type.is_device_level() != device.is_some() {
            return Err(invalid());
        }
        Ok(Self {
            group_id: group.to_string(),
            message_type,
            edge_node_id: edge.to_string(),
            device_id: device.map(str::to_string),
        })
    }
}

impl fmt::Display for SparkplugTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            SPARKPLUG_NAMESPACE,
            self.group_id,
            self.message_type.as_str(),
            self.edge_node_id
        )?;
        if let Some(device) = &self.device_id {
            write!(f, "/{}", device)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_internal_topics() {
        assert_eq!(
            InternalTopic::parse("BIRTH/APP1/D1").unwrap(),
            InternalTopic::VendorBirth {
                app: "APP1".into(),
                device: "D1".into()
            }
        );
        assert_eq!(
            InternalTopic::parse("DEATH/APP1").unwrap(),
            InternalTopic::VendorDeath {
                app: "APP1".into(),
                device: None
            }
        );
        assert_eq!(
            InternalTopic::parse("/flowmeter/PL0/Flow/update").unwrap(),
            InternalTopic::DeviceUpdate {
                device: "flowmeter".into(),
                site: "PL0".into(),
                point: "Flow".into()
            }
        );
        assert_eq!(
            InternalTopic::parse("TemplateDef").unwrap(),
            InternalTopic::TemplateDef
        );
    }

    #[test]
    fn test_invalid_internal_topics() {
        for topic in [
            "BIRTH/APP1",
            "DATA//D1",
            "/flowmeter/PL0/Flow/write",
            "CMD/APP1/D1",
            "",
        ] {
            assert!(
                matches!(InternalTopic::parse(topic), Err(SyncError::InvalidTopic(_))),
                "{}",
                topic
            );
        }
    }

    #[test]
    fn test_sparkplug_topic_format() {
        let topic = SparkplugTopic::device(
            "UWC nodes",
            SparkplugMessageType::DBirth,
            "edge-1",
            "flowmeter-PL0",
        );
        assert_eq!(
            topic.to_string(),
            "spBv1.0/UWC nodes/DBIRTH/edge-1/flowmeter-PL0"
        );
        let topic = SparkplugTopic::node("UWC nodes", SparkplugMessageType::NBirth, "edge-1");
        assert_eq!(topic.to_string(), "spBv1.0/UWC nodes/NBIRTH/edge-1");
    }

    #[test]
    fn test_sparkplug_topic_parse() {
        let topic = SparkplugTopic::parse("spBv1.0/G/DCMD/edge-1/APP1-D1").unwrap();
        assert_eq!(topic.message_type, SparkplugMessageType::DCmd);
        assert_eq!(topic.device_id.as_deref(), Some("APP1-D1"));

        assert!(SparkplugTopic::parse("spBv1.0/G/DCMD/edge-1").is_err());
        assert!(SparkplugTopic::parse("spBv1.0/G/NBIRTH/edge-1/x").is_err());
        assert!(SparkplugTopic::parse("spAv1.0/G/DCMD/edge-1/x").is_err());
    }

    #[test]
    fn test_outbound_internal_topics() {
        assert_eq!(vendor_command_topic("APP1", "D1"), "CMD/APP1/D1");
        assert_eq!(
            write_request_topic("flowmeter", "PL0", "Flow"),
            "/flowmeter/PL0/Flow/write"
        );
    }
}
