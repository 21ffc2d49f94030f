//! The EIP-1193 provider façade.
//!
//! [`Provider::request`] is the single entry point dapps use. Account,
//! chain and signing methods are answered here or by the
//! [`DeviceSession`]; every other method is forwarded verbatim to the
//! [`ChainReader`].
//!
//! | method | behavior |
//! |---|---|
//! | `eth_accounts`, `eth_requestAccounts` | `[selectedAddress]`, `[]` before connect |
//! | `eth_chainId`, `net_version` | chain id as `0x` hex |
//! | `personal_sign` | `[message, account]`, account checked when given |
//! | `eth_sign` | `[account, message]`, same as `personal_sign` |
//! | `eth_sendTransaction` | `[tx]`, `tx.from` checked when given |
//! | `eth_signTypedData_v4` | `[account, typedData]` |
//! | anything else | forwarded to the chain |
//!
//! # Example
//!
//! ```no_run
//! # async fn run<B: hardware_evm_provider_core::DeviceBackend>(
//! #     mut provider: hardware_evm_provider_core::Provider<B>,
//! # ) -> hardware_evm_provider_core::Result<()> {
//! use serde_json::json;
//!
//! provider.connect().await?;
//! let accounts = provider.request("eth_accounts", json!([])).await?;
//! let signature = provider
//!     .request("personal_sign", json!(["hello", accounts[0]]))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::Span;

use crate::assembler::PendingTransaction;
use crate::chain::{ChainId, ChainReader};
use crate::config::ProviderConfig;
use crate::device::{DeviceBackend, DeviceFamily};
use crate::dpath::DerivationPath;
use crate::error::{Error, ProviderRpcError, Result};
use crate::session::DeviceSession;
use crate::typed_data::parse_typed_data;

/// A JSON-RPC request object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Method name.
    pub method: String,

    /// Positional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }
}

/// The success payload handed to `send_async` callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// The method result.
    pub result: Value,
}

/// Provider state for consumers relaying it to UI frameworks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorUpdate {
    /// The provider's network.
    pub chain_id: ChainId,

    /// The selected account, lowercase.
    pub account: Option<String>,
}

/// EIP-1193 provider backed by one hardware device.
pub struct Provider<B: DeviceBackend> {
    session: DeviceSession<B>,
    log_params: bool,
}

impl<B: DeviceBackend> fmt::Debug for Provider<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("session", &self.session)
            .field("log_params", &self.log_params)
            .finish()
    }
}

impl<B: DeviceBackend> Provider<B> {
    /// Wraps a session.
    #[must_use]
    pub const fn new(session: DeviceSession<B>) -> Self {
        Self {
            session,
            log_params: false,
        }
    }

    /// Builds a provider from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the error [`ProviderConfig::validate`] reports.
    pub fn from_config(
        backend: B,
        chain: Arc<dyn ChainReader>,
        config: &ProviderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let path = config.derivation_path()?;
        let session = DeviceSession::new(backend, chain, config.chain_id, path);
        Ok(Self::new(session).with_debug(config.debug))
    }

    /// Logs request parameters when set.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.log_params = debug;
        self
    }

    /// Replaces the span provider and session events are recorded under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.session = self.session.with_span(span);
        self
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &DeviceSession<B> {
        &self.session
    }

    /// The underlying session, mutably.
    pub const fn session_mut(&mut self) -> &mut DeviceSession<B> {
        &mut self.session
    }

    /// The hardware family (`isLedger`, `isTrezor`, `isDcent`).
    #[must_use]
    pub fn family(&self) -> DeviceFamily {
        self.session.family()
    }

    /// The selected account, lowercase, once connected.
    #[must_use]
    pub fn selected_address(&self) -> Option<&str> {
        self.session.selected_address()
    }

    /// The provider's network.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        self.session.chain_id()
    }

    /// Connects the device and selects the account at the active path.
    ///
    /// # Errors
    ///
    /// Returns the translated device failure.
    pub async fn connect(&mut self) -> Result<&mut Self> {
        self.session.connect().await?;
        Ok(self)
    }

    /// Selects the account at `path`.
    ///
    /// # Errors
    ///
    /// See [`DeviceSession::choose_account`].
    pub async fn choose_account(&mut self, path: DerivationPath) -> Result<String> {
        self.session.choose_account(path).await
    }

    /// Disconnects the device.
    ///
    /// # Errors
    ///
    /// See [`DeviceSession::disconnect`].
    pub async fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Handles one JSON-RPC request.
    ///
    /// # Arguments
    ///
    /// * `method` - The JSON-RPC method
    /// * `params` - Positional parameters (`null` when absent)
    ///
    /// # Errors
    ///
    /// Input and authorization errors are raised before any device or
    /// network call. Device failures arrive translated; chain failures
    /// arrive as the transport reported them.
    #[tracing::instrument(parent = self.session.span(), skip_all, fields(method = %method))]
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        if self.log_params {
            tracing::info!(%params, "incoming request");
        } else {
            tracing::debug!("incoming request");
        }

        match method {
            "eth_accounts" | "eth_requestAccounts" => Ok(self.accounts()),
            "eth_chainId" | "net_version" => Ok(json!(self.chain_id().to_hex())),
            "personal_sign" => {
                let message = string_param(&params, 0, "message")?;
                let account = optional_string_param(&params, 1, "account")?;
                self.personal_sign(message, account).await
            }
            "eth_sign" => {
                let account = optional_string_param(&params, 0, "account")?;
                let message = string_param(&params, 1, "message")?;
                self.personal_sign(message, account).await
            }
            "eth_sendTransaction" => {
                let tx = param(&params, 0)
                    .ok_or_else(|| Error::input("eth_sendTransaction needs a transaction"))?;
                let pending = PendingTransaction::from_value(tx)?;
                let hash = self.session.send_transaction(&pending).await?;
                Ok(json!(hash))
            }
            "eth_signTypedData_v4" => {
                let account = optional_string_param(&params, 0, "account")?;
                let document = param(&params, 1)
                    .ok_or_else(|| Error::input("eth_signTypedData_v4 needs typed data"))?;
                let typed_data = parse_typed_data(document)?;
                let signature = self.session.sign_typed_data(&typed_data, account).await?;
                Ok(json!(signature))
            }
            _ => {
                tracing::debug!("forwarding to chain");
                Ok(self.session.chain().request(method, params).await?)
            }
        }
    }

    /// Callback form of [`Self::request`] for older dapps.
    ///
    /// The callback receives either the error or `{ result }`, never both.
    pub async fn send_async<F>(&mut self, request: RpcRequest, callback: F)
    where
        F: FnOnce(Option<ProviderRpcError>, Option<RpcResponse>),
    {
        let params = request.params.unwrap_or(Value::Null);
        match self.request(&request.method, params).await {
            Ok(result) => callback(None, Some(RpcResponse { result })),
            Err(err) => callback(Some(ProviderRpcError::from(err)), None),
        }
    }

    /// Accepts an event subscription; events are relayed by the consumer.
    pub fn on(&self, event: &str) {
        self.session.span().in_scope(|| {
            tracing::debug!(event, "registering listener");
        });
    }

    /// Accepts a listener reset; events are relayed by the consumer.
    pub fn remove_all_listeners(&self) {
        self.session.span().in_scope(|| {
            tracing::debug!("removing all listeners");
        });
    }

    /// Reads the account and chain id the way a UI connector does.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain id answer is not a numeric string.
    pub async fn activate(&mut self) -> Result<ConnectorUpdate> {
        let accounts = self.request("eth_accounts", json!([])).await?;
        let chain_id = self.request("eth_chainId", json!([])).await?;

        let chain_id = chain_id
            .as_str()
            .ok_or_else(|| Error::InvalidConfig("eth_chainId did not answer a string".into()))?
            .parse::<ChainId>()?;
        let account = accounts
            .get(0)
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase);

        Ok(ConnectorUpdate { chain_id, account })
    }

    fn accounts(&self) -> Value {
        match self.selected_address() {
            Some(address) => json!([address]),
            None => json!([]),
        }
    }

    async fn personal_sign(&mut self, message: &str, account: Option<&str>) -> Result<Value> {
        let bytes = message_bytes(message);
        let signature = self.session.personal_sign(&bytes, account).await?;
        Ok(json!(signature))
    }
}

/// The bytes a personal message stands for.
///
/// A `0x`-prefixed string of valid hex is decoded; anything else is taken
/// as UTF-8 text.
#[must_use]
pub fn message_bytes(message: &str) -> Vec<u8> {
    message
        .strip_prefix("0x")
        .and_then(|digits| hex::decode(digits).ok())
        .unwrap_or_else(|| message.as_bytes().to_vec())
}

pub(crate) fn param(params: &Value, index: usize) -> Option<&Value> {
    params.get(index).filter(|value| !value.is_null())
}

fn string_param<'a>(params: &'a Value, index: usize, name: &str) -> Result<&'a str> {
    optional_string_param(params, index, name)?
        .ok_or_else(|| Error::input(format!("missing `{name}` parameter")))
}

fn optional_string_param<'a>(
    params: &'a Value,
    index: usize,
    name: &str,
) -> Result<Option<&'a str>> {
    param(params, index)
        .map(|value| {
            value
                .as_str()
                .ok_or_else(|| Error::input(format!("`{name}` must be a string")))
        })
        .transpose()
}
