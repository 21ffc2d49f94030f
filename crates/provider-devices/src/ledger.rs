//! Ledger devices through the Ethereum app.
//!
//! The Ethereum app is reached over WebHID or WebUSB. [`LedgerBackend`]
//! opens one of the two (HID first unless [`LedgerOptions::prefer_usb`] is
//! set), falling back to the other when the first fails, and drives the app
//! through the [`LedgerEthApp`] capability.
//!
//! # Call Shapes
//!
//! | Operation        | Sent to the app                                  |
//! |------------------|--------------------------------------------------|
//! | address          | derivation path                                  |
//! | personal message | message bytes as hex                             |
//! | transaction      | unsigned EIP-155 RLP payload as hex              |
//! | typed data       | domain separator and message hash as hex         |
//!
//! # Status Words
//!
//! App failures carry an ISO 7816 status word, either as a field or buried
//! in the message (`"Ledger device: UNKNOWN_ERROR (0x6b0c)"`). Known words
//! are translated into instructions for the user.

use core::fmt;

use async_trait::async_trait;
use hardware_evm_provider_core::{
    DerivationPath, DeviceBackend, DeviceFamily, DeviceSignature, ErrorEnvelope,
    LegacyTransaction, RawSignature, TransactionV, TypedDataPayload,
};
use serde::{Deserialize, Serialize};

/// Status words the Ethereum app reports.
pub mod status {
    /// The device is locked (older firmware).
    pub const LOCKED_DEVICE: u16 = 0x6b0c;

    /// The Ethereum or RSK app is not the one open.
    pub const WRONG_APP: u16 = 0x6a15;

    /// The user rejected the request on the device.
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;

    /// Instruction not supported: no app or the dashboard is open.
    pub const INS_NOT_SUPPORTED: u16 = 0x6d00;

    /// Class not supported: no app or the dashboard is open.
    pub const CLA_NOT_SUPPORTED: u16 = 0x6e00;

    /// The app closed while the request was pending.
    pub const APP_NOT_OPEN: u16 = 0x6511;

    /// The device is locked.
    pub const LOCKED: u16 = 0x5515;
}

/// Message used before a transport is open.
const NOT_OPEN: &str = "You need to connect the device first";

/// A Ledger failure as the transport or app reports it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct LedgerError {
    /// ISO 7816 status word, when the app answered.
    pub status: Option<u16>,

    /// The transport's message.
    pub message: String,
}

impl LedgerError {
    /// Creates an error without a status word.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Attaches a status word.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// The status word, from the field or parsed from a trailing
    /// `(0x....)` in the message.
    #[must_use]
    pub fn status_word(&self) -> Option<u16> {
        self.status.or_else(|| {
            let start = self.message.rfind("(0x")?;
            let rest = &self.message[start + 3..];
            let end = rest.find(')')?;
            u16::from_str_radix(&rest[..end], 16).ok()
        })
    }
}

/// Which transport to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerTransportKind {
    /// WebHID.
    Hid,
    /// WebUSB.
    Usb,
}

impl fmt::Display for LedgerTransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hid => f.write_str("hid"),
            Self::Usb => f.write_str("usb"),
        }
    }
}

/// Ledger-specific options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOptions {
    /// Try WebUSB before WebHID.
    #[serde(default, alias = "preferUsb")]
    pub prefer_usb: bool,
}

impl LedgerOptions {
    /// Transports in the order they are attempted.
    #[must_use]
    pub const fn transport_order(self) -> [LedgerTransportKind; 2] {
        if self.prefer_usb {
            [LedgerTransportKind::Usb, LedgerTransportKind::Hid]
        } else {
            [LedgerTransportKind::Hid, LedgerTransportKind::Usb]
        }
    }
}

/// A signature whose `v` is a number (messages and typed data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSignature {
    /// `v` as returned, usually 27 or 28.
    pub v: u64,
    /// `r` as hex.
    pub r: String,
    /// `s` as hex.
    pub s: String,
}

/// A transaction signature; the app returns `v` as hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransactionSignature {
    /// `v` as hex, possibly truncated to its low byte.
    pub v: String,
    /// `r` as hex.
    pub r: String,
    /// `s` as hex.
    pub s: String,
}

/// The Ethereum app on an open transport.
#[async_trait]
pub trait LedgerEthApp: Send + Sync {
    /// Returns the address at `path`.
    async fn get_address(&mut self, path: &str) -> Result<String, LedgerError>;

    /// Signs a personal message given as hex.
    async fn sign_personal_message(
        &mut self,
        path: &str,
        message_hex: &str,
    ) -> Result<LedgerSignature, LedgerError>;

    /// Signs an unsigned RLP payload given as hex.
    async fn sign_transaction(
        &mut self,
        path: &str,
        raw_tx_hex: &str,
    ) -> Result<LedgerTransactionSignature, LedgerError>;

    /// Signs typed data from its domain separator and message hash.
    async fn sign_eip712_hashed_message(
        &mut self,
        path: &str,
        domain_separator_hex: &str,
        message_hash_hex: &str,
    ) -> Result<LedgerSignature, LedgerError>;

    /// Closes the transport.
    async fn close(&mut self) -> Result<(), LedgerError>;
}

/// Opens transports to a Ledger.
#[async_trait]
pub trait LedgerTransportFactory: Send + Sync {
    /// The app handle an open transport yields.
    type App: LedgerEthApp;

    /// Opens a transport of the given kind.
    async fn open(&self, kind: LedgerTransportKind) -> Result<Self::App, LedgerError>;
}

/// [`DeviceBackend`] for Ledger devices.
pub struct LedgerBackend<F: LedgerTransportFactory> {
    factory: F,
    options: LedgerOptions,
    app: Option<F::App>,
}

impl<F: LedgerTransportFactory> fmt::Debug for LedgerBackend<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerBackend")
            .field("options", &self.options)
            .field("open", &self.app.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: LedgerTransportFactory> LedgerBackend<F> {
    /// Creates a backend; nothing is opened until bootstrap.
    #[must_use]
    pub const fn new(factory: F, options: LedgerOptions) -> Self {
        Self {
            factory,
            options,
            app: None,
        }
    }

    /// The open app, if any.
    #[must_use]
    pub const fn app(&self) -> Option<&F::App> {
        self.app.as_ref()
    }

    fn open_app(&mut self) -> Result<&mut F::App, LedgerError> {
        self.app.as_mut().ok_or_else(|| LedgerError::new(NOT_OPEN))
    }
}

#[async_trait]
impl<F: LedgerTransportFactory> DeviceBackend for LedgerBackend<F> {
    type VendorError = LedgerError;

    fn family(&self) -> DeviceFamily {
        DeviceFamily::Ledger
    }

    fn translate(&self, error: &LedgerError) -> ErrorEnvelope {
        let Some(status) = error.status_word() else {
            return ErrorEnvelope::new(error.message.clone());
        };
        let message = match status {
            status::LOCKED_DEVICE => "Unlock the device to connect.",
            status::WRONG_APP => {
                "Navigate to the correct app (Ethereum or RSK Mainnet) in the Ledger."
            }
            status::CONDITIONS_NOT_SATISFIED => "The request was rejected on the Ledger.",
            status::INS_NOT_SUPPORTED | status::CLA_NOT_SUPPORTED | status::APP_NOT_OPEN => {
                "Open the Ethereum or RSK app on the Ledger."
            }
            status::LOCKED => "The Ledger is locked. Unlock it and try again.",
            _ => error.message.as_str(),
        };
        ErrorEnvelope::new(message).with_code(format!("0x{status:04x}"))
    }

    async fn bootstrap(&mut self) -> Result<(), LedgerError> {
        let [first, second] = self.options.transport_order();
        let app = match self.factory.open(first).await {
            Ok(app) => app,
            Err(err) => {
                tracing::debug!(transport = %first, error = %err, "transport unavailable, falling back");
                self.factory.open(second).await?
            }
        };
        self.app = Some(app);
        Ok(())
    }

    async fn get_address(&mut self, path: &DerivationPath) -> Result<String, LedgerError> {
        self.open_app()?.get_address(path.as_str()).await
    }

    async fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        _account: &str,
        message: &[u8],
    ) -> Result<DeviceSignature, LedgerError> {
        let sig = self
            .open_app()?
            .sign_personal_message(path.as_str(), &hex::encode(message))
            .await?;
        Ok(RawSignature::new(sig.r, sig.s, sig.v).into())
    }

    async fn sign_typed_data(
        &mut self,
        path: &DerivationPath,
        _account: &str,
        payload: &TypedDataPayload<'_>,
    ) -> Result<DeviceSignature, LedgerError> {
        let domain = hex::encode(payload.hashes.domain_separator);
        let message = hex::encode(payload.hashes.message_hash);
        let sig = self
            .open_app()?
            .sign_eip712_hashed_message(path.as_str(), &domain, &message)
            .await?;
        Ok(RawSignature::new(sig.r, sig.s, sig.v).into())
    }

    /// The Ethereum app returns `v` as a single byte.
    fn transaction_v(&self) -> TransactionV {
        TransactionV::LowByte
    }

    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        _account: &str,
        transaction: &LegacyTransaction,
    ) -> Result<DeviceSignature, LedgerError> {
        let unsigned = hex::encode(transaction.unsigned_rlp());
        let sig = self
            .open_app()?
            .sign_transaction(path.as_str(), &unsigned)
            .await?;
        Ok(DeviceSignature::HexParts {
            r: sig.r,
            s: sig.s,
            v: sig.v,
        })
    }

    async fn teardown(&mut self) -> Result<(), LedgerError> {
        match self.app.take() {
            Some(mut app) => app.close().await,
            None => Ok(()),
        }
    }
}
