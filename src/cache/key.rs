//! Composite cache keys
//!
//! Format: `{namespace}:{resource}:{method}:{arg1},{arg2}`. Arguments are
//! normalized so the same logical call always yields the same key: addresses
//! are lowercase hex, integers are decimal, strings are prefixed so that
//! `"7"` and `7` never collide.

use alloy_primitives::{Address, U256};
use std::fmt;

/// One normalized key argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyArg {
    Address(Address),
    Uint(U256),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for KeyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(a) => write!(f, "0x{}", hex::encode(a.as_slice())),
            Self::Uint(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "s:{}", s),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl KeyArg {
    /// Value without the type prefix, for query strings
    pub fn plain(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<Address> for KeyArg {
    fn from(a: Address) -> Self {
        Self::Address(a)
    }
}

impl From<U256> for KeyArg {
    fn from(v: U256) -> Self {
        Self::Uint(v)
    }
}

impl From<u64> for KeyArg {
    fn from(v: u64) -> Self {
        Self::Uint(U256::from(v))
    }
}

impl From<&str> for KeyArg {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<[u8; 4]> for KeyArg {
    fn from(b: [u8; 4]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

/// Builder for composite cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from its parts
    pub fn new(namespace: &str, resource: &str, method: &str, args: &[KeyArg]) -> Self {
        let args = args
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self(format!("{}:{}:{}:{}", namespace, resource.to_lowercase(), method, args))
    }

    /// Key for a contract read
    pub fn contract_read(contract: Address, method: &str, args: &[KeyArg]) -> Self {
        Self::new(
            crate::constants::namespaces::CONTRACT,
            &KeyArg::Address(contract).to_string(),
            method,
            args,
        )
    }

    /// Prefix covering every read of `method` on `contract`
    pub fn contract_method_prefix(contract: Address, method: &str) -> String {
        format!(
            "{}:{}:{}:",
            crate::constants::namespaces::CONTRACT,
            KeyArg::Address(contract),
            method
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
