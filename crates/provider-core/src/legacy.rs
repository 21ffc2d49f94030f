//! Compatibility shim for dapps written against the older request-object
//! provider shape.
//!
//! The legacy shape differs from [`Provider`] in a handful of answers:
//!
//! - every request needs a connected device first;
//! - `eth_chainId` and `net_version` answer hex without `0x`;
//! - `eth_getBalance` defaults to the selected account and answers hex
//!   without `0x`;
//! - `eth_estimateGas` defaults `value` and `data` and answers a number;
//! - `eth_getTransactionReceipt` answers `null` for unknown hashes;
//! - `enable()` connects on demand and returns the accounts.
//!
//! Everything else goes through the canonical [`Provider`].

use core::fmt;

use serde_json::{Value, json};

use crate::assembler::ZERO_HEX;
use crate::chain::{CallRequest, ChainId};
use crate::device::{DeviceBackend, DeviceFamily};
use crate::error::{Error, ProviderRpcError, Result};
use crate::provider::{Provider, RpcRequest, RpcResponse, param};
use crate::quantity::Quantity;

/// [`Provider`] with the legacy request-object behavior.
pub struct LegacyProvider<B: DeviceBackend> {
    inner: Provider<B>,
}

impl<B: DeviceBackend> fmt::Debug for LegacyProvider<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyProvider")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<B: DeviceBackend> From<Provider<B>> for LegacyProvider<B> {
    fn from(inner: Provider<B>) -> Self {
        Self::new(inner)
    }
}

impl<B: DeviceBackend> LegacyProvider<B> {
    /// Wraps a canonical provider.
    #[must_use]
    pub const fn new(inner: Provider<B>) -> Self {
        Self { inner }
    }

    /// The canonical provider.
    #[must_use]
    pub const fn provider(&self) -> &Provider<B> {
        &self.inner
    }

    /// Unwraps the canonical provider.
    #[must_use]
    pub fn into_inner(self) -> Provider<B> {
        self.inner
    }

    /// The hardware family.
    #[must_use]
    pub fn family(&self) -> DeviceFamily {
        self.inner.family()
    }

    /// The selected account, lowercase, once connected.
    #[must_use]
    pub fn selected_address(&self) -> Option<&str> {
        self.inner.selected_address()
    }

    /// The provider's network.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        self.inner.chain_id()
    }

    /// Connects the device.
    ///
    /// # Errors
    ///
    /// Returns the translated device failure.
    pub async fn connect(&mut self) -> Result<&mut Self> {
        self.inner.connect().await?;
        Ok(self)
    }

    /// Disconnects the device.
    ///
    /// # Errors
    ///
    /// Returns the translated teardown failure.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.inner.disconnect().await
    }

    /// Returns `[selectedAddress]`, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns the translated device failure if connecting fails.
    pub async fn enable(&mut self) -> Result<Vec<String>> {
        let selected = match self.inner.selected_address() {
            Some(selected) => selected.to_string(),
            None => self.inner.session_mut().connect().await?,
        };
        Ok(vec![selected])
    }

    /// Handles one request object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before a connect, otherwise whatever
    /// the method fails with.
    pub async fn request(&mut self, request: RpcRequest) -> Result<Value> {
        let selected = self.inner.session().require_connected()?;
        let params = request.params.unwrap_or(Value::Null);
        let chain = self.inner.session().chain();

        match request.method.as_str() {
            "eth_chainId" | "net_version" => Ok(json!(self.chain_id().to_unprefixed_hex())),
            "eth_getBalance" => {
                let address = param(&params, 0)
                    .and_then(Value::as_str)
                    .unwrap_or(&selected);
                let balance = chain.get_balance(address).await?;
                Ok(json!(format!("{balance:x}")))
            }
            "eth_getTransactionReceipt" => {
                let hash = param(&params, 0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::input("missing transaction hash"))?;
                let receipt = chain.get_transaction_receipt(hash).await?;
                Ok(receipt.unwrap_or(Value::Null))
            }
            "eth_call" => {
                let call = param(&params, 0)
                    .ok_or_else(|| Error::input("eth_call needs a call object"))?;
                Ok(chain.call(call, param(&params, 1)).await?)
            }
            "eth_estimateGas" => {
                let call = param(&params, 0)
                    .ok_or_else(|| Error::input("eth_estimateGas needs a call object"))?;
                let estimate = chain.estimate_gas(&estimate_request(call)?).await?;
                Ok(json!(estimate))
            }
            _ => self.inner.request(&request.method, params).await,
        }
    }

    /// Callback form of [`Self::request`].
    pub async fn send_async<F>(&mut self, request: RpcRequest, callback: F)
    where
        F: FnOnce(Option<ProviderRpcError>, Option<RpcResponse>),
    {
        match self.request(request).await {
            Ok(result) => callback(None, Some(RpcResponse { result })),
            Err(err) => callback(Some(ProviderRpcError::from(err)), None),
        }
    }

    /// Accepts an event subscription.
    pub fn on(&self, event: &str) {
        self.inner.on(event);
    }

    /// Accepts a listener reset.
    pub fn remove_all_listeners(&self) {
        self.inner.remove_all_listeners();
    }
}

/// Builds the estimate call, defaulting `value` to zero and `data` to `0x0`.
fn estimate_request(call: &Value) -> Result<CallRequest> {
    let field = |name: &str| call.get(name).and_then(Value::as_str).map(str::to_string);
    let value = match call.get("value").filter(|v| !v.is_null()) {
        Some(value) => serde_json::from_value::<Quantity>(value.clone())
            .map_err(|e| Error::input(format!("invalid value: {e}")))?,
        None => Quantity::default(),
    };
    Ok(CallRequest {
        from: field("from"),
        to: field("to"),
        value: value.to_hex(),
        data: field("data")
            .filter(|data| !data.is_empty())
            .unwrap_or_else(|| ZERO_HEX.to_string()),
    })
}
