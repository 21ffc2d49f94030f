//! The capability interface every hardware family implements.
//!
//! A [`DeviceBackend`] wraps one vendor SDK. It speaks the vendor's call
//! shapes and numeric conventions and nothing else: connection state,
//! authorization, transaction assembly and signature normalization live in
//! [`DeviceSession`](crate::DeviceSession), which drives any backend the same
//! way.
//!
//! Vendor failures stay typed as [`DeviceBackend::VendorError`] until the
//! session passes them through [`DeviceBackend::translate`], so nothing
//! outside a session ever sees a raw vendor error.

use core::fmt;

use async_trait::async_trait;

use crate::dpath::DerivationPath;
use crate::error::{ErrorEnvelope, Result};
use crate::signature::RawSignature;
use crate::transaction::{LegacyTransaction, TransactionV};
use crate::typed_data::{TypedData, TypedDataHashes};

/// Hardware wallet family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFamily {
    /// Ledger Nano devices.
    Ledger,
    /// Trezor devices.
    Trezor,
    /// D'CENT biometric wallets.
    Dcent,
}

impl DeviceFamily {
    /// Lowercase family name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ledger => "ledger",
            Self::Trezor => "trezor",
            Self::Dcent => "dcent",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a device session.
///
/// ```text
/// Uninitialized --bootstrap--> Initialized --derive--> Connected
///       ^                                                  |
///       +------------- Disconnected <----disconnect--------+
/// ```
///
/// A disconnected session bootstraps again on the next connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Nothing has happened yet.
    #[default]
    Uninitialized,
    /// The transport or SDK is set up; no address derived.
    Initialized,
    /// An address was derived and selected.
    Connected,
    /// Torn down; a fresh connect is required.
    Disconnected,
}

/// Typed data handed to a backend: the document and its digests.
///
/// Backends that sign digests use `hashes`; backends that parse the
/// document on device use `typed_data`.
#[derive(Debug, Clone, Copy)]
pub struct TypedDataPayload<'a> {
    /// The parsed document.
    pub typed_data: &'a TypedData,

    /// Its EIP-712 digests.
    pub hashes: TypedDataHashes,
}

/// A signature in whichever shape the vendor returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSignature {
    /// `r`, `s` as hex and a numeric `v`.
    Parts(RawSignature),

    /// `r`, `s` and `v` all as hex strings.
    HexParts {
        /// `r` as hex.
        r: String,
        /// `s` as hex.
        s: String,
        /// `v` as hex.
        v: String,
    },

    /// A 65-byte `r‖s‖v` hex string.
    Joined(String),
}

impl DeviceSignature {
    /// Decodes into a [`RawSignature`].
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor output is not a valid signature.
    pub fn into_raw(self) -> Result<RawSignature> {
        match self {
            Self::Parts(raw) => Ok(raw),
            Self::HexParts { r, s, v } => RawSignature::from_hex_parts(r, s, &v),
            Self::Joined(joined) => RawSignature::from_concatenated(&joined),
        }
    }
}

impl From<RawSignature> for DeviceSignature {
    fn from(raw: RawSignature) -> Self {
        Self::Parts(raw)
    }
}

/// One hardware family's vendor SDK, as seen by a
/// [`DeviceSession`](crate::DeviceSession).
///
/// Calls are issued one at a time; a backend may assume exclusive use of
/// its transport.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// The vendor's native error shape.
    type VendorError: fmt::Debug + Send;

    /// Which family this backend drives.
    fn family(&self) -> DeviceFamily;

    /// Maps a vendor error to an actionable [`ErrorEnvelope`].
    ///
    /// Known codes get a human message; anything else keeps the vendor's
    /// own message. Never fails.
    fn translate(&self, error: &Self::VendorError) -> ErrorEnvelope;

    /// One-time transport or SDK setup.
    async fn bootstrap(&mut self) -> core::result::Result<(), Self::VendorError>;

    /// Derives the address at `path`.
    async fn get_address(
        &mut self,
        path: &DerivationPath,
    ) -> core::result::Result<String, Self::VendorError>;

    /// Signs an EIP-191 personal message.
    async fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        account: &str,
        message: &[u8],
    ) -> core::result::Result<DeviceSignature, Self::VendorError>;

    /// Signs EIP-712 typed data.
    async fn sign_typed_data(
        &mut self,
        path: &DerivationPath,
        account: &str,
        payload: &TypedDataPayload<'_>,
    ) -> core::result::Result<DeviceSignature, Self::VendorError>;

    /// How [`Self::sign_transaction`] reports `v`.
    fn transaction_v(&self) -> TransactionV {
        TransactionV::Inferred
    }

    /// Signs a legacy transaction and returns the device's `v`, `r`, `s`.
    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        account: &str,
        transaction: &LegacyTransaction,
    ) -> core::result::Result<DeviceSignature, Self::VendorError>;

    /// Releases the transport.
    async fn teardown(&mut self) -> core::result::Result<(), Self::VendorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn sessions_start_uninitialized() {
        assert_eq!(ConnectionState::default(), ConnectionState::Uninitialized);
    }

    #[test]
    fn family_names() {
        assert_eq!(DeviceFamily::Ledger.to_string(), "ledger");
        assert_eq!(DeviceFamily::Trezor.to_string(), "trezor");
        assert_eq!(DeviceFamily::Dcent.to_string(), "dcent");
    }

    #[test]
    fn signature_shapes_decode() {
        let parts = DeviceSignature::from(RawSignature::new("11", "22", 27));
        assert_eq!(parts.into_raw().unwrap().v, 27);

        let hex_parts = DeviceSignature::HexParts {
            r: "11".into(),
            s: "22".into(),
            v: "25".into(),
        };
        assert_eq!(hex_parts.into_raw().unwrap().v, 37);

        let joined = DeviceSignature::Joined(format!("0x{}{}1b", "aa".repeat(32), "bb".repeat(32)));
        assert_eq!(joined.into_raw().unwrap().v, 27);

        let broken = DeviceSignature::Joined("0x1234".into());
        assert!(matches!(broken.into_raw(), Err(Error::InvalidSignature(_))));
    }
}
