//! Ethereum account addresses and account authorization.
//!
//! Devices report addresses in whatever casing their firmware prefers
//! (usually EIP-55 checksummed). The provider keeps the selected account as a
//! lowercase `0x`-prefixed string and compares every account a request names
//! against it case-insensitively.
//!
//! # Example
//!
//! ```
//! use hardware_evm_provider_core::Address;
//!
//! let addr = Address::from_hex("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
//! assert_eq!(addr.to_hex(), "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
//! ```

use std::fmt;

use alloy_primitives::Address as AlloyAddress;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An Ethereum address (20 bytes).
///
/// Thin wrapper around [`alloy_primitives::Address`] with the hex forms the
/// provider hands to vendor SDKs and dapps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(AlloyAddress);

impl Address {
    /// The length of an Ethereum address in bytes.
    pub const BYTE_LEN: usize = 20;

    /// Creates a new address from a 20-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; Self::BYTE_LEN]) -> Self {
        Self(AlloyAddress::new(bytes))
    }

    /// Returns the zero address (`0x0000...0000`).
    #[must_use]
    pub const fn zero() -> Self {
        Self(AlloyAddress::ZERO)
    }

    /// Returns the [`Address`] as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::BYTE_LEN] {
        self.0.as_ref()
    }

    /// Returns the [`Address`] as an EIP-55 checksummed hex string.
    #[must_use]
    pub fn to_checksum_hex(&self) -> String {
        self.0.to_checksum(None)
    }

    /// Returns the [`Address`] as a lowercase hex string with `0x` prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }

    /// Parses an [`Address`] from a hex string, `0x` prefix optional.
    ///
    /// Checksums are not enforced; devices and dapps disagree on casing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallerInput`] if the string is not 20 hex-encoded
    /// bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|e| Error::input(format!("invalid address `{hex_str}`: {e}")))?;

        let bytes: [u8; Self::BYTE_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::input(format!(
                "invalid address `{hex_str}`: expected {} bytes, got {}",
                Self::BYTE_LEN,
                b.len()
            ))
        })?;
        Ok(Self::new(bytes))
    }

    /// Returns the inner [`alloy_primitives::Address`].
    #[must_use]
    pub const fn inner(&self) -> AlloyAddress {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_checksum_hex())
    }
}

impl From<AlloyAddress> for Address {
    fn from(addr: AlloyAddress) -> Self {
        Self(addr)
    }
}

impl From<Address> for AlloyAddress {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self::new(bytes)
    }
}

/// Lowercases an account string and makes sure it carries a `0x` prefix.
#[must_use]
pub fn normalize_account(account: &str) -> String {
    let lower = account.trim().to_ascii_lowercase();
    if lower.starts_with("0x") {
        lower
    } else {
        format!("0x{lower}")
    }
}

/// Checks that `requested` names the `selected` account.
///
/// # Errors
///
/// - [`Error::NotConnected`] when there is no selected account yet
/// - [`Error::Unauthorized`] when the accounts differ, ignoring case
pub fn authorize(selected: Option<&str>, requested: &str) -> Result<()> {
    let selected = selected.ok_or(Error::NotConnected)?;
    if normalize_account(selected) == normalize_account(requested) {
        Ok(())
    } else {
        Err(Error::Unauthorized {
            account: requested.to_string(),
        })
    }
}
