//! Provider configuration.
//!
//! # Configuration File
//!
//! ```toml
//! rpc_url = "https://public-node.testnet.rsk.co"
//! chain_id = 31
//! # derivation_path = "m/44'/60'/0'/0/0"
//! debug = false
//! ```
//!
//! `chain_id` may be an integer or a numeric string. `derivation_path`
//! (also accepted as `dPath`) overrides the per-chain default.
//!
//! # Examples
//!
//! ```
//! use hardware_evm_provider_core::ProviderConfig;
//!
//! let config = ProviderConfig::from_toml_str(r#"
//! rpc_url = "https://public-node.rsk.co"
//! chain_id = "30"
//! "#).unwrap();
//!
//! assert_eq!(config.derivation_path().unwrap().as_str(), "44'/137'/0'/0/0");
//! ```

use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::dpath::{self, DerivationPath};
use crate::error::{Error, Result};

/// Settings shared by every hardware family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// JSON-RPC endpoint of the node chain reads go to.
    #[serde(alias = "rpcUrl")]
    pub rpc_url: String,

    /// Network transactions are signed for.
    #[serde(alias = "chainId")]
    pub chain_id: ChainId,

    /// Explicit derivation path; resolved from `chain_id` when absent.
    #[serde(default, alias = "dPath", skip_serializing_if = "Option::is_none")]
    pub derivation_path: Option<String>,

    /// Log request parameters.
    #[serde(default)]
    pub debug: bool,
}

impl ProviderConfig {
    /// Creates a configuration without an explicit path.
    #[must_use]
    pub fn new(rpc_url: impl Into<String>, chain_id: ChainId) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            derivation_path: None,
            debug: false,
        }
    }

    /// Sets an explicit derivation path.
    #[must_use]
    pub fn with_derivation_path(mut self, path: impl Into<String>) -> Self {
        self.derivation_path = Some(path.into());
        self
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for malformed TOML and any error
    /// [`Self::validate`] reports.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration is usable.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if `rpc_url` is empty, `chain_id` is zero
    ///   or the explicit path is malformed
    /// - [`Error::UnsupportedNetwork`] if no path is given and the chain has
    ///   no default
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(Error::InvalidConfig("rpc_url is required".to_string()));
        }
        if self.chain_id.get() == 0 {
            return Err(Error::InvalidConfig("chain_id is required".to_string()));
        }
        self.derivation_path().map(|_| ())
    }

    /// The active derivation path: the explicit one, or the chain default.
    ///
    /// # Errors
    ///
    /// See [`Self::validate`].
    pub fn derivation_path(&self) -> Result<DerivationPath> {
        dpath::resolve_or_explicit(self.derivation_path.as_deref(), self.chain_id).map_err(
            |err| match err {
                Error::CallerInput(msg) => Error::InvalidConfig(msg),
                other => other,
            },
        )
    }
}
