//! Readings published by the Modbus side for real devices
//!
//! Topic: `/{device}/{site}/{point}/update`. Example payload:
//!
//! ```json
//! {"metric": "Flow", "value": "0x00000FA0", "status": "Good",
//!  "usec": "1571887474111145", "lastGoodUsec": "1571887474111145", "error_code": "0"}
//! ```
//!
//! Register values are hex strings, most significant byte first.

use crate::error::{Result, SyncError};
use crate::value::{DataType, MetricValue};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Numbers arrive either as JSON numbers or as decimal strings
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.is_empty() => Some(0),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => Some(0),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom(format!("expected unsigned number, got {}", value)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ReadStatus {
    #[serde(alias = "good", alias = "GOOD")]
    Good,
    #[serde(alias = "bad", alias = "BAD")]
    Bad,
}

fn good() -> ReadStatus {
    ReadStatus::Good
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealDeviceUpdate {
    pub metric: String,
    /// Raw register contents as hex
    #[serde(default)]
    pub value: Option<String>,
    /// Engineering value, preferred over the raw registers when present
    #[serde(default, rename = "scaledValue")]
    pub scaled_value: Option<Value>,
    #[serde(default = "good")]
    pub status: ReadStatus,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub usec: u64,
    #[serde(default, rename = "lastGoodUsec", deserialize_with = "lenient_u64")]
    pub last_good_usec: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub error_code: u64,
}

/// What a reading means for the device
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvaluation {
    Value(MetricValue),
    /// Bad read with a configured death code
    DeviceDead,
    /// Bad read that says nothing about device liveness
    BadRead(u64),
}

impl RealDeviceUpdate {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Interpret the reading for a metric declared as `declared`
    pub fn evaluate(&self, declared: DataType, death_codes: &[u64]) -> Result<UpdateEvaluation> {
        if self.status == ReadStatus::Bad {
            return Ok(if death_codes.contains(&self.error_code) {
                UpdateEvaluation::DeviceDead
            } else {
                UpdateEvaluation::BadRead(self.error_code)
            });
        }

        if let Some(scaled) = self.scaled_value.as_ref().filter(|v| !v.is_null()) {
            match MetricValue::from_json(declared, scaled) {
                Ok(value) => return Ok(UpdateEvaluation::Value(value)),
                Err(e) if self.value.is_none() => return Err(e),
                Err(_) => {}
            }
        }

        let raw = self.value.as_deref().ok_or_else(|| {
            SyncError::malformed(format!("update for '{}' carries no value", self.metric))
        })?;
        decode_register_hex(raw, declared).map(UpdateEvaluation::Value)
    }
}

fn register_bytes(raw: &str) -> Result<Vec<u8>> {
    let digits = raw
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{}", digits);
        padded.as_str()
    } else {
        digits
    };
    hex::decode(digits).map_err(|e| SyncError::malformed(format!("bad hex '{}': {}", raw, e)))
}

/// Right-align `bytes` into an `N`-byte big-endian buffer
fn fit<const N: usize>(bytes: &[u8], raw: &str) -> Result<[u8; N]> {
    let significant = bytes
        .iter()
        .position(|b| *b != 0)
        .map_or(&bytes[bytes.len()..], |i| &bytes[i..]);
    let source = if bytes.len() <= N { bytes } else { significant };
    if source.len() > N {
        return Err(SyncError::malformed(format!(
            "'{}' does not fit in {} bytes",
            raw, N
        )));
    }
    let mut out = [0u8; N];
    out[N - source.len()..].copy_from_slice(source);
    Ok(out)
}

/// Decode a hex register string as `data_type`
pub fn decode_register_hex(raw: &str, data_type: DataType) -> Result<MetricValue> {
    let bytes = register_bytes(raw)?;
    Ok(match data_type {
        DataType::Boolean => MetricValue::Bool(bytes.iter().any(|b| *b != 0)),
        DataType::UInt8 => MetricValue::U8(u8::from_be_bytes(fit(&bytes, raw)?)),
        DataType::UInt16 => MetricValue::U16(u16::from_be_bytes(fit(&bytes, raw)?)),
        DataType::UInt32 => MetricValue::U32(u32::from_be_bytes(fit(&bytes, raw)?)),
        DataType::UInt64 => MetricValue::U64(u64::from_be_bytes(fit(&bytes, raw)?)),
        DataType::Int8 => MetricValue::I8(i8::from_be_bytes(fit(&bytes, raw)?)),
        DataType::Int16 => MetricValue::I16(i16::from_be_bytes(fit(&bytes, raw)?)),
        DataType::Int32 => MetricValue::I32(i32::from_be_bytes(fit(&bytes, raw)?)),
        DataType::Int64 => MetricValue::I64(i64::from_be_bytes(fit(&bytes, raw)?)),
        DataType::Float => MetricValue::Float(f32::from_be_bytes(fit(&bytes, raw)?)),
        DataType::Double => MetricValue::Double(f64::from_be_bytes(fit(&bytes, raw)?)),
        DataType::String => {
            let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            let text = String::from_utf8(bytes[..end].to_vec())
                .map_err(|e| SyncError::malformed(format!("'{}' is not UTF-8: {}", raw, e)))?;
            MetricValue::String(text)
        }
        DataType::Template | DataType::Unknown => {
            return Err(SyncError::UnsupportedType(format!(
                "{} cannot be read from registers",
                data_type
            )))
        }
    })
}

/// Encode a value as a hex register string for a write request
///
/// `width` is in 16-bit registers and only affects strings, which are
/// NUL-padded to fill it.
pub fn encode_register_hex(value: &MetricValue, width: u32) -> Result<String> {
    let bytes: Vec<u8> = match value {
        MetricValue::Bool(v) => vec![u8::from(*v)],
        MetricValue::U8(v) => v.to_be_bytes().to_vec(),
        MetricValue::U16(v) => v.to_be_bytes().to_vec(),
        MetricValue::U32(v) => v.to_be_bytes().to_vec(),
        MetricValue::U64(v) => v.to_be_bytes().to_vec(),
        MetricValue::I8(v) => v.to_be_bytes().to_vec(),
        MetricValue::I16(v) => v.to_be_bytes().to_vec(),
        MetricValue::I32(v) => v.to_be_bytes().to_vec(),
        MetricValue::I64(v) => v.to_be_bytes().to_vec(),
        MetricValue::Float(v) => v.to_be_bytes().to_vec(),
        MetricValue::Double(v) => v.to_be_bytes().to_vec(),
        MetricValue::String(v) => {
            let mut bytes = v.as_bytes().to_vec();
            let capacity = width as usize * 2;
            if bytes.len() > capacity {
                return Err(SyncError::malformed(format!(
                    "string of {} bytes exceeds {} registers",
                    bytes.len(),
                    width
                )));
            }
            bytes.resize(capacity, 0);
            bytes
        }
        MetricValue::Unknown => {
            return Err(SyncError::UnsupportedType("Unknown".to_string()));
        }
    };
    Ok(format!("0x{}", hex::encode(bytes)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_update_with_string_numbers() {
        let update = RealDeviceUpdate::parse(
            br#"{"metric":"Flow","value":"0x0FA0","status":"Good","usec":"1571887474111145","lastGoodUsec":"1571887474111000","error_code":"0"}"#,
        )
        .unwrap();
        assert_eq!(update.metric, "Flow");
        assert_eq!(update.usec, 1_571_887_474_111_145);
        assert_eq!(update.last_good_usec, 1_571_887_474_111_000);
        assert_eq!(update.status, ReadStatus::Good);
        assert_eq!(
            update.evaluate(DataType::UInt16, &[2003]).unwrap(),
            UpdateEvaluation::Value(MetricValue::U16(4000))
        );
    }

    #[test]
    fn test_bad_status_with_death_code() {
        let update = RealDeviceUpdate::parse(
            br#"{"metric":"Flow","value":"","status":"Bad","usec":1,"error_code":2003}"#,
        )
        .unwrap();
        assert_eq!(
            update.evaluate(DataType::UInt16, &[2003]).unwrap(),
            UpdateEvaluation::DeviceDead
        );
        assert_eq!(
            update.evaluate(DataType::UInt16, &[2002]).unwrap(),
            UpdateEvaluation::BadRead(2003)
        );
    }

    #[test]
    fn test_scaled_value_preferred() {
        let update = RealDeviceUpdate::parse(
            br#"{"metric":"Temp","value":"0x0001","scaledValue":21.5,"status":"Good"}"#,
        )
        .unwrap();
        assert_eq!(
            update.evaluate(DataType::Double, &[]).unwrap(),
            UpdateEvaluation::Value(MetricValue::Double(21.5))
        );
        // Not an integer: fall back to the registers
        assert_eq!(
            update.evaluate(DataType::UInt16, &[]).unwrap(),
            UpdateEvaluation::Value(MetricValue::U16(1))
        );
    }

    #[test]
    fn test_missing_value_is_malformed() {
        let update = RealDeviceUpdate::parse(br#"{"metric":"Flow","status":"Good"}"#).unwrap();
        assert!(matches!(
            update.evaluate(DataType::UInt16, &[]),
            Err(SyncError::MalformedRecord(_))
        ));
        assert!(RealDeviceUpdate::parse(br#"{"value":"0x01"}"#).is_err());
    }

    #[test]
    fn test_decode_registers() {
        assert_eq!(
            decode_register_hex("0xFFFF", DataType::Int16).unwrap(),
            MetricValue::I16(-1)
        );
        assert_eq!(
            decode_register_hex("0x00000001", DataType::Int64).unwrap(),
            MetricValue::I64(1)
        );
        assert_eq!(
            decode_register_hex("0x41A80000", DataType::Float).unwrap(),
            MetricValue::Float(21.0)
        );
        assert_eq!(
            decode_register_hex("0x0001", DataType::Boolean).unwrap(),
            MetricValue::Bool(true)
        );
        assert_eq!(
            decode_register_hex("0x4F4B0000", DataType::String).unwrap(),
            MetricValue::String("OK".to_string())
        );
        assert_eq!(
            decode_register_hex("0x1", DataType::UInt16).unwrap(),
            MetricValue::U16(1)
        );
        // Leading zero registers beyond the type are tolerated
        assert_eq!(
            decode_register_hex("0x00000005", DataType::UInt16).unwrap(),
            MetricValue::U16(5)
        );
        assert!(decode_register_hex("0x010000", DataType::UInt16).is_err());
        assert!(decode_register_hex("0xZZ", DataType::UInt16).is_err());
    }

    #[test]
    fn test_encode_registers() {
        assert_eq!(encode_register_hex(&MetricValue::U16(4000), 1).unwrap(), "0x0fa0");
        assert_eq!(encode_register_hex(&MetricValue::Bool(true), 1).unwrap(), "0x01");
        assert_eq!(
            encode_register_hex(&MetricValue::I32(-2), 2).unwrap(),
            "0xfffffffe"
        );
        assert_eq!(
            encode_register_hex(&MetricValue::String("OK".into()), 2).unwrap(),
            "0x4f4b0000"
        );
        assert!(encode_register_hex(&MetricValue::String("TOO LONG".into()), 1).is_err());
    }

    #[test]
    fn test_encode_decode_agree() {
        for (value, data_type) in [
            (MetricValue::U32(123_456), DataType::UInt32),
            (MetricValue::I16(-300), DataType::Int16),
            (MetricValue::Double(-0.5), DataType::Double),
        ] {
            let raw = encode_register_hex(&value, 4).unwrap();
            assert_eq!(decode_register_hex(&raw, data_type).unwrap(), value);
        }
    }
}
