use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::properties::{CoercedProperties, PropertyError, PropertySchema, coerce};

/// Unit submitted by a client: statement text, raw property overrides and an
/// optional consistency bound.
///
/// Missing or `null` wire fields normalize on the way in: text becomes `""`,
/// properties become `{}`, and the sequence number becomes absent. On the way
/// out `commandSequenceNumber` is always written, as `null` when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    ksql: String,
    #[serde(
        rename = "streamsProperties",
        default,
        deserialize_with = "null_as_default"
    )]
    streams_properties: BTreeMap<String, Value>,
    #[serde(rename = "commandSequenceNumber", default)]
    command_sequence_number: Option<u64>,
    #[serde(skip)]
    coerced: OnceLock<Result<CoercedProperties, PropertyError>>,
}

impl RequestEnvelope {
    pub fn new(
        ksql: impl Into<String>,
        streams_properties: BTreeMap<String, Value>,
        command_sequence_number: Option<u64>,
    ) -> Self {
        Self {
            ksql: ksql.into(),
            streams_properties,
            command_sequence_number,
            coerced: OnceLock::new(),
        }
    }

    /// Builds an envelope from optional parts, normalizing absent pieces the
    /// same way deserialization does.
    pub fn from_parts(
        ksql: Option<String>,
        streams_properties: Option<BTreeMap<String, Value>>,
        command_sequence_number: Option<u64>,
    ) -> Self {
        Self::new(
            ksql.unwrap_or_default(),
            streams_properties.unwrap_or_default(),
            command_sequence_number,
        )
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn ksql(&self) -> &str {
        &self.ksql
    }

    /// Overrides exactly as the client sent them, explicit `null`s included.
    pub fn raw_properties(&self) -> &BTreeMap<String, Value> {
        &self.streams_properties
    }

    pub fn command_sequence_number(&self) -> Option<u64> {
        self.command_sequence_number
    }

    /// Overrides coerced against [`PropertySchema::standard`].
    ///
    /// Computed on first access and cached for the life of the envelope; a
    /// failure is cached too and returned again on every later call.
    pub fn streams_properties(&self) -> Result<&CoercedProperties, PropertyError> {
        self.coerced
            .get_or_init(|| coerce(PropertySchema::standard(), &self.streams_properties))
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl PartialEq for RequestEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.ksql == other.ksql
            && self.streams_properties == other.streams_properties
            && self.command_sequence_number == other.command_sequence_number
    }
}

impl Eq for RequestEnvelope {}

impl Hash for RequestEnvelope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ksql.hash(state);
        self.streams_properties.len().hash(state);
        for (key, value) in &self.streams_properties {
            key.hash(state);
            hash_json(value, state);
        }
        self.command_sequence_number.hash(state);
    }
}

fn hash_json<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            n.to_string().hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_json(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            map.len().hash(state);
            for (k, v) in map {
                k.hash(state);
                hash_json(v, state);
            }
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
