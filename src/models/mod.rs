//! Data models for the gallery gateway

mod account;
mod token;

pub use account::*;
pub use token::*;

/// Serde adapter writing `U256` as a decimal string
pub mod u256_decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        crate::chain::parse_token_id(&raw).map_err(serde::de::Error::custom)
    }
}
