//! JSON codec for decoded contract reads
//!
//! Cached and accelerator values are plain JSON: integers as decimal strings
//! (numbers are accepted on the way in), addresses as hex strings.

use alloy_primitives::{Address, U256};
use serde_json::Value;

/// A decoded read result that can live in the cache
pub trait ReadValue: Sized + Send + Sync + 'static {
    fn to_json(&self) -> Value;

    fn from_json(value: &Value) -> Option<Self>;
}

impl ReadValue for U256 {
    fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => crate::chain::parse_token_id(s).ok(),
            Value::Number(n) => n.as_u64().map(U256::from),
            _ => None,
        }
    }
}

impl ReadValue for Address {
    fn to_json(&self) -> Value {
        Value::String(format!("0x{}", hex::encode(self.as_slice())))
    }

    fn from_json(value: &Value) -> Option<Self> {
        value.as_str()?.parse().ok()
    }
}

impl ReadValue for String {
    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_json(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl ReadValue for bool {
    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_json(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl<T: ReadValue> ReadValue for Vec<T> {
    fn to_json(&self) -> Value {
        Value::Array(self.iter().map(ReadValue::to_json).collect())
    }

    fn from_json(value: &Value) -> Option<Self> {
        value.as_array()?.iter().map(T::from_json).collect()
    }
}
