//! Property schema and coercion of client-supplied overrides.
//!
//! Coercion is a pure function of `(schema, raw overrides)`. A raw `null`
//! survives as [`CoercedValue::Reset`]; it is never dropped and never run
//! through the type conversion.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

pub const SERVICE_ID: &str = "ksql.service.id";
pub const SINK_REPLICAS: &str = "ksql.sink.replicas";
pub const TRANSIENT_PREFIX: &str = "ksql.transient.prefix";
pub const NUM_STREAM_THREADS: &str = "ksql.streams.num.stream.threads";
pub const CACHE_MAX_BYTES: &str = "cache.max.bytes.buffering";
pub const AUTO_OFFSET_RESET: &str = "auto.offset.reset";
pub const PULL_QUERIES_ENABLE: &str = "ksql.query.pull.enable";

static STANDARD: Lazy<PropertySchema> = Lazy::new(|| {
    PropertySchema::new()
        .allow_unknown(true)
        .define(SERVICE_ID, PropertyType::String)
        .define(SINK_REPLICAS, PropertyType::Short)
        .define(TRANSIENT_PREFIX, PropertyType::String)
        .define(NUM_STREAM_THREADS, PropertyType::Int)
        .define(CACHE_MAX_BYTES, PropertyType::Long)
        .define(
            AUTO_OFFSET_RESET,
            PropertyType::Enum(vec!["earliest".into(), "latest".into()]),
        )
        .define(PULL_QUERIES_ENABLE, PropertyType::Boolean)
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("invalid value for property '{name}': '{value}' ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
    #[error("unknown property '{name}'")]
    UnknownProperty { name: String },
}

/// Semantic type declared for a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Boolean,
    Short,
    Int,
    Long,
    Double,
    /// String restricted to one of the listed values.
    Enum(Vec<String>),
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::String => f.write_str("string"),
            PropertyType::Boolean => f.write_str("boolean"),
            PropertyType::Short => f.write_str("short"),
            PropertyType::Int => f.write_str("int"),
            PropertyType::Long => f.write_str("long"),
            PropertyType::Double => f.write_str("double"),
            PropertyType::Enum(values) => write!(f, "one of [{}]", values.join(", ")),
        }
    }
}

/// A coerced, typed property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Short(i16),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Short(v) => Value::from(*v),
            PropertyValue::Int(v) => Value::from(*v),
            PropertyValue::Long(v) => Value::from(*v),
            PropertyValue::Double(v) => Value::from(*v),
            PropertyValue::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Short(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::String(s) => f.write_str(s),
        }
    }
}

/// Outcome of coercing one present key. A missing key is simply absent from
/// [`CoercedProperties`].
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    /// The client sent `null`: reset the property to its default.
    Reset,
    Value(PropertyValue),
}

impl CoercedValue {
    pub fn value(&self) -> Option<&PropertyValue> {
        match self {
            CoercedValue::Reset => None,
            CoercedValue::Value(v) => Some(v),
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, CoercedValue::Reset)
    }

    pub fn to_json(&self) -> Value {
        match self {
            CoercedValue::Reset => Value::Null,
            CoercedValue::Value(v) => v.to_json(),
        }
    }
}

impl Serialize for CoercedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CoercedValue::Reset => serializer.serialize_none(),
            CoercedValue::Value(v) => v.serialize(serializer),
        }
    }
}

/// Validated overrides keyed by property name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CoercedProperties {
    values: BTreeMap<String, CoercedValue>,
}

impl CoercedProperties {
    pub fn get(&self, name: &str) -> Option<&CoercedValue> {
        self.values.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CoercedValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Declared property types plus the policy for keys the schema does not know.
#[derive(Debug, Clone, Default)]
pub struct PropertySchema {
    types: BTreeMap<String, PropertyType>,
    allow_unknown: bool,
}

impl PropertySchema {
    /// Empty schema that rejects unknown keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Well-known server properties; unknown keys pass through unvalidated.
    pub fn standard() -> &'static PropertySchema {
        &STANDARD
    }

    pub fn define(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.types.insert(name.into(), ty);
        self
    }

    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    pub fn allows_unknown(&self) -> bool {
        self.allow_unknown
    }

    pub fn property_type(&self, name: &str) -> Option<&PropertyType> {
        self.types.get(name)
    }

    /// Coerces a single raw value for `name`.
    pub fn coerce_value(&self, name: &str, raw: &Value) -> Result<CoercedValue, PropertyError> {
        if raw.is_null() {
            return Ok(CoercedValue::Reset);
        }
        let converted = match self.types.get(name) {
            Some(ty) => convert(ty, raw),
            None if self.allow_unknown => passthrough(raw),
            None => {
                return Err(PropertyError::UnknownProperty {
                    name: name.to_string(),
                });
            }
        };
        converted
            .map(CoercedValue::Value)
            .map_err(|reason| PropertyError::InvalidValue {
                name: name.to_string(),
                value: literal(raw),
                reason,
            })
    }
}

/// Coerces every entry of `raw` against `schema`, failing on the first
/// offending key in key order.
pub fn coerce(
    schema: &PropertySchema,
    raw: &BTreeMap<String, Value>,
) -> Result<CoercedProperties, PropertyError> {
    let mut values = BTreeMap::new();
    for (name, value) in raw {
        values.insert(name.clone(), schema.coerce_value(name, value)?);
    }
    Ok(CoercedProperties { values })
}

fn literal(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn convert(ty: &PropertyType, raw: &Value) -> Result<PropertyValue, String> {
    match ty {
        PropertyType::String => match raw {
            Value::String(s) => Ok(PropertyValue::String(s.trim().to_string())),
            _ => Err("expected a string".into()),
        },
        PropertyType::Boolean => match raw {
            Value::Bool(b) => Ok(PropertyValue::Bool(*b)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => {
                Ok(PropertyValue::Bool(true))
            }
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => {
                Ok(PropertyValue::Bool(false))
            }
            _ => Err("expected a boolean".into()),
        },
        PropertyType::Short => integer(raw)?
            .try_into()
            .map(PropertyValue::Short)
            .map_err(|_| "out of range for short".into()),
        PropertyType::Int => integer(raw)?
            .try_into()
            .map(PropertyValue::Int)
            .map_err(|_| "out of range for int".into()),
        PropertyType::Long => integer(raw).map(PropertyValue::Long),
        PropertyType::Double => match raw {
            Value::Number(n) => n
                .as_f64()
                .map(PropertyValue::Double)
                .ok_or_else(|| "expected a double".into()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(PropertyValue::Double)
                .map_err(|_| "expected a double".into()),
            _ => Err("expected a double".into()),
        },
        PropertyType::Enum(allowed) => match raw {
            Value::String(s) if allowed.iter().any(|a| a == s.trim()) => {
                Ok(PropertyValue::String(s.trim().to_string()))
            }
            _ => Err(format!("expected {ty}")),
        },
    }
}

fn integer(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| "expected an integer".to_string()),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| "expected an integer".to_string()),
        _ => Err("expected an integer".into()),
    }
}

fn passthrough(raw: &Value) -> Result<PropertyValue, String> {
    match raw {
        Value::Bool(b) => Ok(PropertyValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(PropertyValue::Long(i)),
            None => n
                .as_f64()
                .map(PropertyValue::Double)
                .ok_or_else(|| "unsupported number".into()),
        },
        Value::String(s) => Ok(PropertyValue::String(s.clone())),
        Value::Array(_) | Value::Object(_) => Err("expected a scalar value".into()),
        Value::Null => Err("null reached conversion".into()),
    }
}
