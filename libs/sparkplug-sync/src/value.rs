//! Typed metric values
//!
//! `MetricValue` is a tagged scalar: the variant is the type tag and carries
//! the payload. Values convert losslessly to the Sparkplug wire value, to
//! template parameters and to JSON fields.

use crate::error::{Result, SyncError};
use crate::wire::{WireMetric, WireParameter, WireValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// DataType
// ============================================================================

/// Declared type of a metric
///
/// The numeric codes are the Sparkplug B datatype codes. Codes for DateTime,
/// Text, UUID, DataSet, Bytes and File have no counterpart here and are
/// rejected as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Boolean,
    String,
    /// Composite (UDT) metric
    Template,
    Unknown,
}

impl DataType {
    pub fn wire_code(self) -> u32 {
        match self {
            DataType::Unknown => 0,
            DataType::Int8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            DataType::UInt8 => 5,
            DataType::UInt16 => 6,
            DataType::UInt32 => 7,
            DataType::UInt64 => 8,
            DataType::Float => 9,
            DataType::Double => 10,
            DataType::Boolean => 11,
            DataType::String => 12,
            DataType::Template => 19,
        }
    }

    /// Map a Sparkplug datatype code to a supported type
    pub fn from_wire_code(code: u32) -> Result<Self> {
        Ok(match code {
            1 => DataType::Int8,
            2 => DataType::Int16,
            3 => DataType::Int32,
            4 => DataType::Int64,
            5 => DataType::UInt8,
            6 => DataType::UInt16,
            7 => DataType::UInt32,
            8 => DataType::UInt64,
            9 => DataType::Float,
            10 => DataType::Double,
            11 => DataType::Boolean,
            12 => DataType::String,
            19 => DataType::Template,
            other => {
                return Err(SyncError::UnsupportedType(format!(
                    "Sparkplug datatype code {}",
                    other
                )))
            }
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int8 => "Int8",
            DataType::Int16 => "Int16",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::UInt8 => "UInt8",
            DataType::UInt16 => "UInt16",
            DataType::UInt32 => "UInt32",
            DataType::UInt64 => "UInt64",
            DataType::Float => "Float",
            DataType::Double => "Double",
            DataType::Boolean => "Boolean",
            DataType::String => "String",
            DataType::Template => "Template",
            DataType::Unknown => "Unknown",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }

    /// Acceptance rule for inbound values: identical types, or any two integer types
    pub fn is_compatible_with(self, other: DataType) -> bool {
        self == other || (self.is_integer() && other.is_integer())
    }

    /// Type of a catalog point from its data kind and register width
    ///
    /// Width is in 16-bit registers: 1, 2 or 4.
    pub fn from_catalog(kind: &str, width: u32) -> Result<Self> {
        let by_width = |w16, w32, w64| match width {
            1 => Ok(w16),
            2 => Ok(w32),
            4 => Ok(w64),
            _ => Err(SyncError::UnsupportedType(format!(
                "{} with register width {}",
                kind, width
            ))),
        };

        match kind.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "uint" => by_width(DataType::UInt16, DataType::UInt32, DataType::UInt64),
            "int" => by_width(DataType::Int16, DataType::Int32, DataType::Int64),
            "float" => Ok(DataType::Float),
            "double" => Ok(DataType::Double),
            "string" => Ok(DataType::String),
            other => Err(SyncError::UnsupportedType(format!(
                "catalog data type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = SyncError;

    /// Case-insensitive; `UDT` is accepted for `Template`
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "int8" => DataType::Int8,
            "int16" => DataType::Int16,
            "int32" => DataType::Int32,
            "int64" => DataType::Int64,
            "uint8" => DataType::UInt8,
            "uint16" => DataType::UInt16,
            "uint32" => DataType::UInt32,
            "uint64" => DataType::UInt64,
            "float" => DataType::Float,
            "double" => DataType::Double,
            "boolean" | "bool" => DataType::Boolean,
            "string" => DataType::String,
            "template" | "udt" => DataType::Template,
            _ => return Err(SyncError::UnsupportedType(s.to_string())),
        })
    }
}

// ============================================================================
// Comparison results
// ============================================================================

/// Outcome of comparing two values without mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueComparison {
    Equal,
    TypeMismatch,
    ValueDifferent,
}

/// Outcome of an assign-if-different
///
/// This is the unit of "did anything change" all the way up to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    NoChange,
    Assigned,
    TypeMismatch,
}

impl AssignOutcome {
    pub fn is_assigned(self) -> bool {
        self == AssignOutcome::Assigned
    }
}

// ============================================================================
// MetricValue
// ============================================================================

/// A scalar metric value; the variant is the type tag
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Unknown,
}

impl MetricValue {
    pub fn data_type(&self) -> DataType {
        match self {
            MetricValue::Bool(_) => DataType::Boolean,
            MetricValue::U8(_) => DataType::UInt8,
            MetricValue::U16(_) => DataType::UInt16,
            MetricValue::U32(_) => DataType::UInt32,
            MetricValue::U64(_) => DataType::UInt64,
            MetricValue::I8(_) => DataType::Int8,
            MetricValue::I16(_) => DataType::Int16,
            MetricValue::I32(_) => DataType::Int32,
            MetricValue::I64(_) => DataType::Int64,
            MetricValue::Float(_) => DataType::Float,
            MetricValue::Double(_) => DataType::Double,
            MetricValue::String(_) => DataType::String,
            MetricValue::Unknown => DataType::Unknown,
        }
    }

    /// Zero value of a scalar type; `None` for `Template`
    pub fn default_for(data_type: DataType) -> Option<Self> {
        Some(match data_type {
            DataType::Boolean => MetricValue::Bool(false),
            DataType::UInt8 => MetricValue::U8(0),
            DataType::UInt16 => MetricValue::U16(0),
            DataType::UInt32 => MetricValue::U32(0),
            DataType::UInt64 => MetricValue::U64(0),
            DataType::Int8 => MetricValue::I8(0),
            DataType::Int16 => MetricValue::I16(0),
            DataType::Int32 => MetricValue::I32(0),
            DataType::Int64 => MetricValue::I64(0),
            DataType::Float => MetricValue::Float(0.0),
            DataType::Double => MetricValue::Double(0.0),
            DataType::String => MetricValue::String(String::new()),
            DataType::Unknown => MetricValue::Unknown,
            DataType::Template => return None,
        })
    }

    fn as_integer(&self) -> Option<i128> {
        match *self {
            MetricValue::U8(v) => Some(v.into()),
            MetricValue::U16(v) => Some(v.into()),
            MetricValue::U32(v) => Some(v.into()),
            MetricValue::U64(v) => Some(v.into()),
            MetricValue::I8(v) => Some(v.into()),
            MetricValue::I16(v) => Some(v.into()),
            MetricValue::I32(v) => Some(v.into()),
            MetricValue::I64(v) => Some(v.into()),
            _ => None,
        }
    }

    fn from_integer(data_type: DataType, v: i128) -> Option<Self> {
        match data_type {
            DataType::UInt8 => u8::try_from(v).ok().map(MetricValue::U8),
            DataType::UInt16 => u16::try_from(v).ok().map(MetricValue::U16),
            DataType::UInt32 => u32::try_from(v).ok().map(MetricValue::U32),
            DataType::UInt64 => u64::try_from(v).ok().map(MetricValue::U64),
            DataType::Int8 => i8::try_from(v).ok().map(MetricValue::I8),
            DataType::Int16 => i16::try_from(v).ok().map(MetricValue::I16),
            DataType::Int32 => i32::try_from(v).ok().map(MetricValue::I32),
            DataType::Int64 => i64::try_from(v).ok().map(MetricValue::I64),
            _ => None,
        }
    }

    /// Convert into `target`, within the integer family only
    ///
    /// Returns `None` when the types are incompatible or the value does not fit.
    pub fn coerce_to(&self, target: DataType) -> Option<Self> {
        if self.data_type() == target {
            return Some(self.clone());
        }
        if !target.is_integer() {
            return None;
        }
        self.as_integer()
            .and_then(|v| Self::from_integer(target, v))
    }

    fn same_payload(&self, other: &Self) -> bool {
        match (self, other) {
            // Bitwise so that a NaN reading does not count as a change every poll
            (MetricValue::Float(a), MetricValue::Float(b)) => a.to_bits() == b.to_bits(),
            (MetricValue::Double(a), MetricValue::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }

    pub fn compare(&self, other: &MetricValue) -> ValueComparison {
        if self.data_type() != other.data_type() {
            ValueComparison::TypeMismatch
        } else if self.same_payload(other) {
            ValueComparison::Equal
        } else {
            ValueComparison::ValueDifferent
        }
    }

    pub fn assign_if_different(&mut self, other: &MetricValue) -> AssignOutcome {
        match self.compare(other) {
            ValueComparison::Equal => AssignOutcome::NoChange,
            ValueComparison::TypeMismatch => AssignOutcome::TypeMismatch,
            ValueComparison::ValueDifferent => {
                *self = other.clone();
                AssignOutcome::Assigned
            }
        }
    }

    // ------------------------------------------------------------------------
    // Wire encoding
    // ------------------------------------------------------------------------

    pub fn to_wire_value(&self) -> WireValue {
        match self {
            MetricValue::Bool(v) => WireValue::BooleanValue(*v),
            MetricValue::U8(v) => WireValue::IntValue(u32::from(*v)),
            MetricValue::U16(v) => WireValue::IntValue(u32::from(*v)),
            MetricValue::U32(v) => WireValue::IntValue(*v),
            MetricValue::U64(v) => WireValue::LongValue(*v),
            // Sign-extend to 32 bits, as Tahu does for int_value
            MetricValue::I8(v) => WireValue::IntValue(i32::from(*v) as u32),
            MetricValue::I16(v) => WireValue::IntValue(i32::from(*v) as u32),
            MetricValue::I32(v) => WireValue::IntValue(*v as u32),
            MetricValue::I64(v) => WireValue::LongValue(*v as u64),
            MetricValue::Float(v) => WireValue::FloatValue(*v),
            MetricValue::Double(v) => WireValue::DoubleValue(*v),
            MetricValue::String(v) => WireValue::StringValue(v.clone()),
            MetricValue::Unknown => WireValue::Null,
        }
    }

    /// Fill datatype and value of a wire metric
    pub fn to_wire_metric(&self, out: &mut WireMetric) {
        out.datatype = self.data_type().wire_code();
        out.value = self.to_wire_value();
        out.is_null = matches!(self, MetricValue::Unknown);
    }

    pub fn to_wire_parameter(&self, name: impl Into<String>) -> WireParameter {
        WireParameter {
            name: name.into(),
            datatype: self.data_type().wire_code(),
            value: self.to_wire_value(),
        }
    }

    /// Decode a wire value declared with Sparkplug datatype `code`
    pub fn from_wire(code: u32, value: &WireValue) -> Result<Self> {
        let data_type = DataType::from_wire_code(code)?;
        let mismatch = || {
            SyncError::malformed(format!(
                "wire value {:?} does not carry a {}",
                value, data_type
            ))
        };

        Ok(match (data_type, value) {
            (DataType::Int8, WireValue::IntValue(v)) => {
                MetricValue::I8(i8::try_from(*v as i32).map_err(|_| mismatch())?)
            }
            (DataType::Int16, WireValue::IntValue(v)) => {
                MetricValue::I16(i16::try_from(*v as i32).map_err(|_| mismatch())?)
            }
            (DataType::Int32, WireValue::IntValue(v)) => MetricValue::I32(*v as i32),
            (DataType::Int64, WireValue::LongValue(v)) => MetricValue::I64(*v as i64),
            (DataType::UInt8, WireValue::IntValue(v)) => {
                MetricValue::U8(u8::try_from(*v).map_err(|_| mismatch())?)
            }
            (DataType::UInt16, WireValue::IntValue(v)) => {
                MetricValue::U16(u16::try_from(*v).map_err(|_| mismatch())?)
            }
            (DataType::UInt32, WireValue::IntValue(v)) => MetricValue::U32(*v),
            (DataType::UInt64, WireValue::LongValue(v)) => MetricValue::U64(*v),
            (DataType::Float, WireValue::FloatValue(v)) => MetricValue::Float(*v),
            (DataType::Double, WireValue::DoubleValue(v)) => MetricValue::Double(*v),
            (DataType::Boolean, WireValue::BooleanValue(v)) => MetricValue::Bool(*v),
            (DataType::String, WireValue::StringValue(v)) => MetricValue::String(v.clone()),
            (DataType::Template, _) => {
                return Err(SyncError::UnsupportedType(
                    "Template is not a scalar value".to_string(),
                ))
            }
            _ => return Err(mismatch()),
        })
    }

    // ------------------------------------------------------------------------
    // JSON encoding
    // ------------------------------------------------------------------------

    pub fn to_json_value(&self) -> Value {
        match self {
            MetricValue::Bool(v) => Value::from(*v),
            MetricValue::U8(v) => Value::from(*v),
            MetricValue::U16(v) => Value::from(*v),
            MetricValue::U32(v) => Value::from(*v),
            MetricValue::U64(v) => Value::from(*v),
            MetricValue::I8(v) => Value::from(*v),
            MetricValue::I16(v) => Value::from(*v),
            MetricValue::I32(v) => Value::from(*v),
            MetricValue::I64(v) => Value::from(*v),
            MetricValue::Float(v) => Value::from(*v),
            MetricValue::Double(v) => Value::from(*v),
            MetricValue::String(v) => Value::from(v.as_str()),
            MetricValue::Unknown => Value::Null,
        }
    }

    pub fn to_json_field(&self, out: &mut Map<String, Value>, key: &str) {
        out.insert(key.to_string(), self.to_json_value());
    }

    /// Decode a JSON scalar as `data_type`
    ///
    /// Strict: integers must be integral and in range, booleans must be JSON
    /// booleans, strings must be JSON strings.
    pub fn from_json(data_type: DataType, value: &Value) -> Result<Self> {
        let mismatch = || {
            SyncError::malformed(format!("value {} is not a valid {}", value, data_type))
        };

        match data_type {
            DataType::Boolean => value.as_bool().map(MetricValue::Bool).ok_or_else(mismatch),
            DataType::Float => value
                .as_f64()
                .map(|v| MetricValue::Float(v as f32))
                .ok_or_else(mismatch),
            DataType::Double => value.as_f64().map(MetricValue::Double).ok_or_else(mismatch),
            DataType::String => value
                .as_str()
                .map(|s| MetricValue::String(s.to_string()))
                .ok_or_else(mismatch),
            DataType::Template => Err(SyncError::UnsupportedType(
                "Template is not a scalar value".to_string(),
            )),
            DataType::Unknown => Err(SyncError::UnsupportedType(data_type.to_string())),
            integer => {
                let v = value
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| value.as_u64().map(i128::from))
                    .ok_or_else(mismatch)?;
                Self::from_integer(integer, v).ok_or_else(mismatch)
            }
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::String(v) => f.write_str(v),
            MetricValue::Unknown => f.write_str("<unknown>"),
            other => write!(f, "{}", other.to_json_value()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    fn one_of_each() -> Vec<MetricValue> {
        vec![
            MetricValue::Bool(true),
            MetricValue::U8(200),
            MetricValue::U16(60_000),
            MetricValue::U32(4_000_000_000),
            MetricValue::U64(u64::MAX),
            MetricValue::I8(-100),
            MetricValue::I16(-30_000),
            MetricValue::I32(-2_000_000_000),
            MetricValue::I64(i64::MIN),
            MetricValue::Float(3.5),
            MetricValue::Double(-1.25e10),
            MetricValue::String("pump running".to_string()),
        ]
    }

    #[test]
    fn test_wire_code_round_trip() {
        for value in one_of_each() {
            let code = value.data_type().wire_code();
            assert_eq!(DataType::from_wire_code(code).unwrap(), value.data_type());
        }
        assert_eq!(DataType::from_wire_code(19).unwrap(), DataType::Template);
    }

    #[test]
    fn test_unsupported_wire_codes() {
        // DateTime, Text, UUID, DataSet, Bytes, File
        for code in [0, 13, 14, 15, 16, 17, 18, 42] {
            assert!(matches!(
                DataType::from_wire_code(code),
                Err(SyncError::UnsupportedType(_))
            ));
        }
    }

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("int32".parse::<DataType>().unwrap(), DataType::Int32);
        assert_eq!("UInt64".parse::<DataType>().unwrap(), DataType::UInt64);
        assert_eq!("UDT".parse::<DataType>().unwrap(), DataType::Template);
        assert_eq!("Boolean".parse::<DataType>().unwrap(), DataType::Boolean);
        assert!("DateTime".parse::<DataType>().is_err());
    }

    #[test]
    fn test_catalog_types() {
        assert_eq!(DataType::from_catalog("uint", 1).unwrap(), DataType::UInt16);
        assert_eq!(DataType::from_catalog("uint", 2).unwrap(), DataType::UInt32);
        assert_eq!(DataType::from_catalog("int", 4).unwrap(), DataType::Int64);
        assert_eq!(DataType::from_catalog("float", 2).unwrap(), DataType::Float);
        assert_eq!(DataType::from_catalog("boolean", 1).unwrap(), DataType::Boolean);
        assert!(DataType::from_catalog("int", 3).is_err());
        assert!(DataType::from_catalog("bcd", 1).is_err());
    }

    #[test]
    fn test_integer_compatibility() {
        assert!(DataType::UInt16.is_compatible_with(DataType::Int64));
        assert!(DataType::Int8.is_compatible_with(DataType::UInt32));
        assert!(DataType::Float.is_compatible_with(DataType::Float));
        assert!(!DataType::Float.is_compatible_with(DataType::Double));
        assert!(!DataType::Int32.is_compatible_with(DataType::Boolean));
        assert!(!DataType::Template.is_compatible_with(DataType::Int32));
    }

    #[test]
    fn test_compare() {
        let a = MetricValue::I32(10);
        assert_eq!(a.compare(&MetricValue::I32(10)), ValueComparison::Equal);
        assert_eq!(a.compare(&MetricValue::I32(15)), ValueComparison::ValueDifferent);
        assert_eq!(a.compare(&MetricValue::I64(10)), ValueComparison::TypeMismatch);
        assert_eq!(
            MetricValue::Double(f64::NAN).compare(&MetricValue::Double(f64::NAN)),
            ValueComparison::Equal
        );
    }

    #[test]
    fn test_assign_if_different_is_idempotent() {
        let mut value = MetricValue::Float(1.0);
        let update = MetricValue::Float(2.5);

        assert_eq!(value.assign_if_different(&update), AssignOutcome::Assigned);
        assert_eq!(value.assign_if_different(&update), AssignOutcome::NoChange);
        assert_eq!(value, MetricValue::Float(2.5));

        assert_eq!(
            value.assign_if_different(&MetricValue::Bool(true)),
            AssignOutcome::TypeMismatch
        );
        assert_eq!(value, MetricValue::Float(2.5));
    }

    #[test]
    fn test_wire_round_trip() {
        for value in one_of_each() {
            let mut metric = WireMetric::default();
            value.to_wire_metric(&mut metric);
            let decoded = MetricValue::from_wire(metric.datatype, &metric.value).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_signed_values_are_sign_extended() {
        assert_eq!(
            MetricValue::I8(-1).to_wire_value(),
            WireValue::IntValue(0xFFFF_FFFF)
        );
        assert_eq!(
            MetricValue::I16(-2).to_wire_value(),
            WireValue::IntValue(0xFFFF_FFFE)
        );
        assert_eq!(
            MetricValue::I64(-1).to_wire_value(),
            WireValue::LongValue(u64::MAX)
        );
    }

    #[test]
    fn test_from_wire_rejects_wrong_field() {
        let err = MetricValue::from_wire(3, &WireValue::StringValue("x".into())).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord(_)));

        let err = MetricValue::from_wire(5, &WireValue::IntValue(300)).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord(_)));

        let err = MetricValue::from_wire(1, &WireValue::IntValue(300)).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord(_)));

        let err = MetricValue::from_wire(2, &WireValue::IntValue(70_000)).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord(_)));

        // Sign-extended negatives still decode
        assert_eq!(
            MetricValue::from_wire(1, &WireValue::IntValue(-100i32 as u32)).unwrap(),
            MetricValue::I8(-100)
        );
        assert_eq!(
            MetricValue::from_wire(2, &WireValue::IntValue(-30_000i32 as u32)).unwrap(),
            MetricValue::I16(-30_000)
        );

        let err = MetricValue::from_wire(17, &WireValue::Null).unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedType(_)));
    }

    #[test]
    fn test_json_round_trip() {
        for value in one_of_each() {
            let mut map = Map::new();
            value.to_json_field(&mut map, "value");
            let decoded = MetricValue::from_json(value.data_type(), &map["value"]).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_from_json_is_strict() {
        assert!(MetricValue::from_json(DataType::UInt8, &json!(256)).is_err());
        assert!(MetricValue::from_json(DataType::UInt16, &json!(-1)).is_err());
        assert!(MetricValue::from_json(DataType::Int32, &json!(1.5)).is_err());
        assert!(MetricValue::from_json(DataType::Boolean, &json!(1)).is_err());
        assert!(MetricValue::from_json(DataType::String, &json!(12)).is_err());
        assert_eq!(
            MetricValue::from_json(DataType::Double, &json!(12)).unwrap(),
            MetricValue::Double(12.0)
        );
    }

    #[test]
    fn test_coerce_within_integer_family() {
        assert_eq!(
            MetricValue::I64(42).coerce_to(DataType::UInt16),
            Some(MetricValue::U16(42))
        );
        assert_eq!(MetricValue::I32(-1).coerce_to(DataType::UInt32), None);
        assert_eq!(MetricValue::U32(70_000).coerce_to(DataType::Int16), None);
        assert_eq!(MetricValue::Float(1.0).coerce_to(DataType::Int32), None);
        assert_eq!(
            MetricValue::Float(1.0).coerce_to(DataType::Float),
            Some(MetricValue::Float(1.0))
        );
    }

    #[test]
    fn test_default_for() {
        assert_eq!(MetricValue::default_for(DataType::Int16), Some(MetricValue::I16(0)));
        assert_eq!(MetricValue::default_for(DataType::Template), None);
    }
}
