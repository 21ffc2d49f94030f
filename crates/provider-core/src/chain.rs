//! Chain identifiers and the chain-state transport seam.
//!
//! The provider never talks JSON-RPC over the wire itself. Reads of chain
//! state (nonce, gas price, gas estimates, balances, receipts), raw
//! transaction broadcast and the generic passthrough for every method the
//! façade does not handle are delegated to a [`ChainReader`] supplied by the
//! embedding application.

use core::fmt;
use core::str::FromStr;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, Result};

/// An EVM chain identifier.
///
/// Accepts an integer or a numeric string (decimal or `0x` hex) when
/// deserialized. Immutable once a provider is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl ChainId {
    /// RSK mainnet.
    pub const RSK_MAINNET: Self = Self(30);

    /// RSK testnet.
    pub const RSK_TESTNET: Self = Self(31);

    /// Ethereum mainnet.
    pub const ETHEREUM_MAINNET: Self = Self(1);

    /// Creates a chain id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the id as a lowercase `0x`-prefixed hex string.
    ///
    /// # Example
    ///
    /// ```
    /// use hardware_evm_provider_core::ChainId;
    ///
    /// assert_eq!(ChainId::new(30).to_hex(), "0x1e");
    /// ```
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:#x}", self.0)
    }

    /// Returns the id as lowercase hex without prefix.
    #[must_use]
    pub fn to_unprefixed_hex(self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for ChainId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed
            .map(Self)
            .map_err(|_| Error::input(format!("invalid chain id `{s}`")))
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        struct ChainIdVisitor;

        impl Visitor<'_> for ChainIdVisitor {
            type Value = ChainId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a chain id as integer or numeric string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> core::result::Result<ChainId, E> {
                Ok(ChainId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> core::result::Result<ChainId, E> {
                u64::try_from(v)
                    .map(ChainId)
                    .map_err(|_| E::custom("chain id must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> core::result::Result<ChainId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ChainIdVisitor)
    }
}

/// A rejection from the chain-state transport.
///
/// Passed through to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ChainError {
    /// Transport or node message.
    pub message: String,

    /// JSON-RPC error code reported by the node, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,

    /// JSON-RPC error data reported by the node, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ChainError {
    /// Creates an error with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            data: None,
        }
    }

    /// Attaches a JSON-RPC error code.
    #[must_use]
    pub const fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

/// The call object sent to `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Value as `0x` hex.
    pub value: String,

    /// Call data as `0x` hex.
    pub data: String,
}

/// Chain-state transport consumed by the provider.
///
/// Implementations wrap a JSON-RPC client. All numeric results are already
/// decoded; any failure is reported as a [`ChainError`].
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Pending transaction count (nonce) of `address`.
    async fn get_transaction_count(&self, address: &str) -> core::result::Result<u64, ChainError>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> core::result::Result<U256, ChainError>;

    /// Gas estimate for `request`.
    async fn estimate_gas(&self, request: &CallRequest) -> core::result::Result<u64, ChainError>;

    /// Broadcasts a signed, `0x`-prefixed raw transaction and returns its hash.
    async fn send_raw_transaction(&self, raw: &str) -> core::result::Result<String, ChainError>;

    /// Executes a read-only call at `block` (latest when `None`).
    async fn call(
        &self,
        request: &Value,
        block: Option<&Value>,
    ) -> core::result::Result<Value, ChainError>;

    /// Balance of `address` in wei.
    async fn get_balance(&self, address: &str) -> core::result::Result<U256, ChainError>;

    /// Receipt of `hash`, or `None` while pending or unknown.
    async fn get_transaction_receipt(
        &self,
        hash: &str,
    ) -> core::result::Result<Option<Value>, ChainError>;

    /// Forwards any other JSON-RPC method verbatim.
    async fn request(&self, method: &str, params: Value) -> core::result::Result<Value, ChainError>;
}
