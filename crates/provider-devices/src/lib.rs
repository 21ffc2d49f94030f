//! Hardware EVM Provider Device Families
//!
//! This crate plugs Ledger, Trezor and D'CENT wallets into the
//! `hardware-evm-provider-core` [`Provider`].
//!
//! Each family wraps its vendor SDK behind a capability trait
//! ([`LedgerTransportFactory`], [`TrezorConnect`], [`DcentConnector`]) that
//! the embedding application implements over the real SDK. The family
//! backend speaks that SDK's call shapes and translates its errors; the
//! core session does everything else.
//!
//! # Configuration File
//!
//! ```toml
//! rpc_url = "https://public-node.rsk.co"
//! chain_id = 30
//! debug = false
//!
//! [ledger]
//! prefer_usb = false
//!
//! [trezor]
//! email = "dev@example.com"
//! appUrl = "https://dapp.example.com"
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use hardware_evm_provider_devices::DeviceConfig;
//!
//! let config = DeviceConfig::from_toml_str(&std::fs::read_to_string("provider.toml")?)?;
//! let mut provider = config.ledger_provider(webhid_factory, chain_reader)?;
//!
//! provider.connect().await?;
//! let accounts = provider.request("eth_accounts", serde_json::json!([])).await?;
//! ```

pub mod dcent;
pub mod ledger;
pub mod trezor;

use std::sync::Arc;

pub use dcent::{DcentBackend, DcentConnector, DcentError};
pub use ledger::{
    LedgerBackend, LedgerEthApp, LedgerError, LedgerOptions, LedgerTransportFactory,
    LedgerTransportKind,
};
pub use trezor::{TrezorBackend, TrezorConnect, TrezorError, TrezorManifest};

use hardware_evm_provider_core::{ChainReader, Error, Provider, ProviderConfig, Result};
use serde::{Deserialize, Serialize};

/// Shared settings plus the per-family sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Settings every family uses.
    #[serde(flatten)]
    pub provider: ProviderConfig,

    /// Ledger transport preferences.
    #[serde(default)]
    pub ledger: LedgerOptions,

    /// Trezor Connect manifest; required for Trezor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trezor: Option<TrezorManifest>,
}

impl DeviceConfig {
    /// Wraps shared settings with default family sections.
    #[must_use]
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            ledger: LedgerOptions::default(),
            trezor: None,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for malformed TOML or a malformed
    /// Trezor section, and any error [`ProviderConfig::validate`] reports.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.provider.validate()?;
        if let Some(manifest) = &config.trezor {
            manifest.validate()?;
        }
        Ok(config)
    }

    /// The Trezor manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the section is missing or
    /// incomplete.
    pub fn trezor_manifest(&self) -> Result<TrezorManifest> {
        let manifest = self
            .trezor
            .clone()
            .ok_or_else(|| Error::InvalidConfig("the [trezor] manifest section is required".into()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Builds a Ledger provider.
    ///
    /// # Errors
    ///
    /// See [`ledger_provider`].
    pub fn ledger_provider<F: LedgerTransportFactory>(
        &self,
        factory: F,
        chain: Arc<dyn ChainReader>,
    ) -> Result<Provider<LedgerBackend<F>>> {
        ledger_provider(factory, self.ledger, chain, &self.provider)
    }

    /// Builds a Trezor provider.
    ///
    /// # Errors
    ///
    /// See [`Self::trezor_manifest`] and [`trezor_provider`].
    pub fn trezor_provider<C: TrezorConnect>(
        &self,
        connect: C,
        chain: Arc<dyn ChainReader>,
    ) -> Result<Provider<TrezorBackend<C>>> {
        trezor_provider(connect, self.trezor_manifest()?, chain, &self.provider)
    }

    /// Builds a D'CENT provider.
    ///
    /// # Errors
    ///
    /// See [`dcent_provider`].
    pub fn dcent_provider<C: DcentConnector>(
        &self,
        connector: C,
        chain: Arc<dyn ChainReader>,
    ) -> Result<Provider<DcentBackend<C>>> {
        dcent_provider(connector, chain, &self.provider)
    }
}

/// Builds a Ledger provider.
///
/// # Errors
///
/// Returns the error [`ProviderConfig::validate`] reports.
pub fn ledger_provider<F: LedgerTransportFactory>(
    factory: F,
    options: LedgerOptions,
    chain: Arc<dyn ChainReader>,
    config: &ProviderConfig,
) -> Result<Provider<LedgerBackend<F>>> {
    Provider::from_config(LedgerBackend::new(factory, options), chain, config)
}

/// Builds a Trezor provider.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for an incomplete manifest and the
/// error [`ProviderConfig::validate`] reports.
pub fn trezor_provider<C: TrezorConnect>(
    connect: C,
    manifest: TrezorManifest,
    chain: Arc<dyn ChainReader>,
    config: &ProviderConfig,
) -> Result<Provider<TrezorBackend<C>>> {
    manifest.validate()?;
    Provider::from_config(TrezorBackend::new(connect, manifest), chain, config)
}

/// Builds a D'CENT provider.
///
/// # Errors
///
/// Returns the error [`ProviderConfig::validate`] reports.
pub fn dcent_provider<C: DcentConnector>(
    connector: C,
    chain: Arc<dyn ChainReader>,
    config: &ProviderConfig,
) -> Result<Provider<DcentBackend<C>>> {
    Provider::from_config(DcentBackend::new(connector), chain, config)
}
