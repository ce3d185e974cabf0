//! Wire form of documents and the field codec.
//!
//! The local store keeps binary attachments in native form; payloads are
//! only rendered transport-safe here, at the gateway boundary. Binary
//! values travel as tagged base64 strings inside an otherwise plain JSON
//! object.

use crate::error::{GatewayError, GatewayResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use satchel_model::{FieldMap, FieldValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object key that tags a binary attachment on the wire.
const BINARY_TAG: &str = "$binary";

/// A document as the remote store sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDocument {
    /// Server-assigned identifier; absent on create requests.
    pub id: Option<String>,
    /// Transport-safe payload object.
    pub fields: Value,
}

impl WireDocument {
    /// Builds a wire document from native fields.
    pub fn from_fields(id: Option<String>, fields: &FieldMap) -> Self {
        Self {
            id,
            fields: encode_fields(fields),
        }
    }

    /// Decodes the payload back to native fields.
    pub fn decode_fields(&self) -> GatewayResult<FieldMap> {
        decode_fields(&self.fields)
    }
}

/// Renders native fields as a transport-safe JSON object.
pub fn encode_fields(fields: &FieldMap) -> Value {
    let mut object = Map::new();
    for (name, value) in fields {
        object.insert(name.clone(), encode_value(value));
    }
    Value::Object(object)
}

fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Integer(i) => Value::from(*i),
        FieldValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Binary(bytes) => {
            let mut tagged = Map::new();
            tagged.insert(BINARY_TAG.to_string(), Value::String(BASE64.encode(bytes)));
            Value::Object(tagged)
        }
    }
}

/// Decodes a transport payload back to native fields.
pub fn decode_fields(value: &Value) -> GatewayResult<FieldMap> {
    let object = value
        .as_object()
        .ok_or_else(|| GatewayError::Protocol("document payload is not an object".into()))?;

    let mut fields = FieldMap::new();
    for (name, value) in object {
        fields.insert(name.clone(), decode_value(name, value)?);
    }
    Ok(fields)
}

fn decode_value(name: &str, value: &Value) -> GatewayResult<FieldValue> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(b) => Ok(FieldValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(FieldValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(FieldValue::Float(f))
            } else {
                Err(GatewayError::Protocol(format!(
                    "field '{name}' holds an unrepresentable number"
                )))
            }
        }
        Value::String(s) => Ok(FieldValue::Text(s.clone())),
        Value::Object(map) => {
            let encoded = map
                .get(BINARY_TAG)
                .and_then(Value::as_str)
                .filter(|_| map.len() == 1)
                .ok_or_else(|| {
                    GatewayError::Protocol(format!("field '{name}' is not a scalar or attachment"))
                })?;
            let bytes = BASE64.decode(encoded).map_err(|e| {
                GatewayError::Protocol(format!("field '{name}' has invalid base64: {e}"))
            })?;
            Ok(FieldValue::from(bytes))
        }
        Value::Array(_) => Err(GatewayError::Protocol(format!(
            "field '{name}' is not a scalar or attachment"
        ))),
    }
}
