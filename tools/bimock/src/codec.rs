use crate::errors::BimockError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Structural (de)serialization used for invocation logs.
///
/// Unknown fields are ignored on decode, so logs written by a newer build with
/// extra fields still load.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn to_json<T: Serialize>(&self, value: &T) -> Result<String, BimockError> {
        serde_json::to_string(value).map_err(|e| BimockError::Codec(e.to_string()))
    }

    pub fn to_json_pretty<T: Serialize>(&self, value: &T) -> Result<String, BimockError> {
        serde_json::to_string_pretty(value).map_err(|e| BimockError::Codec(e.to_string()))
    }

    pub fn from_json<T: DeserializeOwned>(&self, text: &str) -> Result<T, BimockError> {
        serde_json::from_str(text).map_err(|e| BimockError::Codec(e.to_string()))
    }

    pub fn to_json_value<T: Serialize>(&self, value: &T) -> Result<Value, BimockError> {
        serde_json::to_value(value).map_err(|e| BimockError::Codec(e.to_string()))
    }

    pub fn from_json_value<T: DeserializeOwned>(&self, value: Value) -> Result<T, BimockError> {
        serde_json::from_value(value).map_err(|e| BimockError::Codec(e.to_string()))
    }
}
