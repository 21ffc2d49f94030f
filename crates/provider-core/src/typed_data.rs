//! EIP-712 typed structured data.
//!
//! Hashing is delegated to a [`TypedDataHasher`]. The default
//! [`Eip712Hasher`] is backed by `alloy-dyn-abi`; devices that sign the
//! digest parts (Ledger, Trezor) consume the domain separator and message
//! hash, devices that parse the document themselves (D'CENT) consume the
//! JSON.
//!
//! # Hash Computation
//!
//! ```text
//! keccak256("\x19\x01" || domainSeparator || hashStruct(message))
//! ```
//!
//! [EIP-712]: https://eips.ethereum.org/EIPS/eip-712

use core::fmt;

pub use alloy_dyn_abi::TypedData;
use alloy_primitives::B256;
use serde_json::Value;

use crate::error::{Error, Result};

/// The three digests of an EIP-712 document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedDataHashes {
    /// `hashStruct(EIP712Domain)`.
    pub domain_separator: B256,

    /// `hashStruct(message)` for the primary type.
    pub message_hash: B256,

    /// The final digest a device signs.
    pub signing_hash: B256,
}

/// EIP-712 hashing collaborator.
pub trait TypedDataHasher: Send + Sync {
    /// Computes the digests of `typed_data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTypedData`] when the types do not describe
    /// the message.
    fn hash(&self, typed_data: &TypedData) -> Result<TypedDataHashes>;
}

/// [`TypedDataHasher`] backed by `alloy-dyn-abi`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip712Hasher;

impl TypedDataHasher for Eip712Hasher {
    fn hash(&self, typed_data: &TypedData) -> Result<TypedDataHashes> {
        let message_hash = typed_data
            .hash_struct()
            .map_err(|e| Error::InvalidTypedData(e.to_string()))?;
        let signing_hash = typed_data
            .eip712_signing_hash()
            .map_err(|e| Error::InvalidTypedData(e.to_string()))?;
        Ok(TypedDataHashes {
            domain_separator: typed_data.domain.separator(),
            message_hash,
            signing_hash,
        })
    }
}

impl fmt::Display for TypedDataHashes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "domain={} message={}",
            self.domain_separator, self.message_hash
        )
    }
}

/// Parses the typed-data parameter of `eth_signTypedData_v4`.
///
/// Dapps send the document either as a JSON object or as a string holding
/// JSON.
///
/// # Errors
///
/// Returns [`Error::InvalidTypedData`] if the value is neither.
pub fn parse_typed_data(value: &Value) -> Result<TypedData> {
    let parsed = match value {
        Value::String(json) => serde_json::from_str(json),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|e| Error::InvalidTypedData(e.to_string()))
}
