//! Error types for the hardware EVM provider.
//!
//! This module provides the [`enum@Error`] taxonomy shared by the provider
//! façade, the device session and the transaction assembler, together with
//! the two normalized shapes that reach callers:
//!
//! - [`ErrorEnvelope`]: a translated device failure (`message` plus an
//!   optional vendor code). Raw vendor error objects never leave a device
//!   session; they are converted through the family translator first.
//! - [`ProviderRpcError`]: the EIP-1193 error object (`code`, `message`,
//!   `data`) that dapps expect from `request`.
//!
//! # Error Categories
//!
//! - **Caller errors**: malformed input, unauthorized accounts, requests
//!   issued before the device is connected. Raised before any device or
//!   network round-trip.
//! - **Chain errors**: rejections from the chain-state transport, passed
//!   through unchanged.
//! - **Device errors**: translated vendor failures.
//!
//! # Example
//!
//! ```
//! use hardware_evm_provider_core::{Error, ProviderRpcError};
//!
//! let err = Error::Unauthorized { account: "0xabc".to_string() };
//! let rpc = ProviderRpcError::from(&err);
//! assert_eq!(rpc.code, 4100);
//! ```

use core::fmt;
use core::result::Result as CoreResult;

use hex::FromHexError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::chain::{ChainError, ChainId};

/// EIP-1193 code: the requested account has not been authorized.
pub const UNAUTHORIZED: i64 = 4100;

/// EIP-1193 code: the provider is disconnected from the device.
pub const DISCONNECTED: i64 = 4900;

/// JSON-RPC code: invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;

/// JSON-RPC code: internal error.
pub const INTERNAL_ERROR: i64 = -32603;

/// The main error type for the hardware EVM provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// No derivation path is known for the chain and none was supplied.
    #[error("network {0} is not supported, please specify the derivation path")]
    UnsupportedNetwork(ChainId),

    /// An operation that needs a connected device was issued too early.
    #[error("you need to connect the device first")]
    NotConnected,

    /// The request named an account other than the selected one.
    #[error("the requested account has not been authorized by the user")]
    Unauthorized {
        /// The account named by the rejected request.
        account: String,
    },

    /// The caller supplied malformed input.
    #[error("invalid input: {0}")]
    CallerInput(String),

    /// The provider configuration is incomplete or invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Chain Errors
    // =========================================================================
    /// The chain-state transport rejected a read or a broadcast.
    #[error(transparent)]
    ChainReadFailed(#[from] ChainError),

    // =========================================================================
    // Device Errors
    // =========================================================================
    /// A vendor SDK call failed; the payload is already translated.
    #[error("{0}")]
    Device(ErrorEnvelope),

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// The EIP-712 document could not be parsed or hashed.
    #[error("invalid EIP-712 typed data: {0}")]
    InvalidTypedData(String),

    /// The device returned a signature that could not be decoded.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Failed to parse hex data.
    #[error("hex decoding failed: {0}")]
    HexDecodeFailed(String),
}

impl Error {
    /// Returns the EIP-1193 / JSON-RPC code for this error.
    ///
    /// Chain errors keep the transport's own code when it carried one.
    #[must_use]
    pub const fn rpc_code(&self) -> i64 {
        match self {
            Self::Unauthorized { .. } => UNAUTHORIZED,
            Self::NotConnected => DISCONNECTED,
            Self::CallerInput(_) | Self::InvalidTypedData(_) | Self::HexDecodeFailed(_) => {
                INVALID_PARAMS
            }
            Self::ChainReadFailed(err) => match err.code {
                Some(code) => code,
                None => INTERNAL_ERROR,
            },
            _ => INTERNAL_ERROR,
        }
    }

    /// Shorthand for [`Error::CallerInput`].
    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Self::CallerInput(msg.into())
    }
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Self::HexDecodeFailed(err.to_string())
    }
}

/// A device failure after translation.
///
/// Produced by a family's error translator from whatever shape the vendor
/// SDK rejected with. Unmapped vendor errors keep their original message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human readable, actionable message.
    pub message: String,

    /// Vendor code (status word, error identifier), when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorEnvelope {
    /// Creates an envelope without a vendor code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attaches a vendor code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The EIP-1193 `ProviderRpcError` object.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct ProviderRpcError {
    /// Numeric error code.
    pub code: i64,

    /// Error message.
    pub message: String,

    /// Extra data; carries the vendor code for device failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&Error> for ProviderRpcError {
    fn from(err: &Error) -> Self {
        let data = match err {
            Error::Device(envelope) => envelope.code.clone().map(Value::String),
            Error::ChainReadFailed(chain) => chain.data.clone(),
            _ => None,
        };
        Self {
            code: err.rpc_code(),
            message: err.to_string(),
            data,
        }
    }
}

impl From<Error> for ProviderRpcError {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

/// A specialized [`Result`] type for provider operations.
pub type Result<T> = CoreResult<T, Error>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnsupportedNetwork(ChainId::new(137));
        assert_eq!(
            err.to_string(),
            "network 137 is not supported, please specify the derivation path"
        );

        let err = Error::Device(ErrorEnvelope::new("Unlock the device to connect."));
        assert_eq!(err.to_string(), "Unlock the device to connect.");
    }

    #[test]
    fn unauthorized_maps_to_4100() {
        let err = Error::Unauthorized {
            account: "0x1".to_string(),
        };
        let rpc = ProviderRpcError::from(err);
        assert_eq!(rpc.code, UNAUTHORIZED);
        assert_eq!(
            rpc.message,
            "the requested account has not been authorized by the user"
        );
    }

    #[test]
    fn rpc_codes() {
        assert_eq!(Error::NotConnected.rpc_code(), DISCONNECTED);
        assert_eq!(Error::input("bad").rpc_code(), INVALID_PARAMS);
        assert_eq!(
            Error::InvalidTypedData("missing domain".into()).rpc_code(),
            INVALID_PARAMS
        );
        assert_eq!(
            Error::Device(ErrorEnvelope::new("x")).rpc_code(),
            INTERNAL_ERROR
        );
    }

    #[test]
    fn chain_error_keeps_transport_code() {
        let chain = ChainError::new("nonce too low").with_code(-32000);
        let err: Error = chain.into();
        assert_eq!(err.rpc_code(), -32000);
        assert_eq!(err.to_string(), "nonce too low");
    }

    #[test]
    fn device_error_carries_vendor_code_as_data() {
        let err = Error::Device(ErrorEnvelope::new("locked").with_code("0x6b0c"));
        let rpc = ProviderRpcError::from(&err);
        assert_eq!(rpc.data, Some(json!("0x6b0c")));
    }

    #[test]
    fn from_hex_error() {
        let hex_err = FromHexError::InvalidHexCharacter { c: 'g', index: 0 };
        let err: Error = hex_err.into();
        assert!(matches!(err, Error::HexDecodeFailed(_)));
    }
}
