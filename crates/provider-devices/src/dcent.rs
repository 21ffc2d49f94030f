//! D'CENT biometric wallets through the D'CENT connector bridge.
//!
//! The connector speaks JSON-RPC itself: the backend forwards signing
//! methods with `send(method, params)` and the chain reader does the
//! broadcast. Transaction quantities go to the connector as decimal strings.

use core::fmt;

use alloy_rlp::Header;
use async_trait::async_trait;
use hardware_evm_provider_core::{
    DerivationPath, DeviceBackend, DeviceFamily, DeviceSignature, ErrorEnvelope,
    LegacyTransaction, RawSignature, TypedDataPayload,
};
use serde_json::{Value, json};

/// Error codes the connector reports.
pub mod code {
    /// The user cancelled on the device.
    pub const USER_CANCEL: &str = "user_cancel";

    /// No device or bridge answered.
    pub const NOT_FOUND_DEVICE: &str = "not_found_device";

    /// The device timed out waiting for the user.
    pub const TIMEOUT: &str = "timeout";

    /// The connector answered something that is not a signature.
    pub const INVALID_RESPONSE: &str = "invalid_response";
}

/// A connector failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DcentError {
    /// Connector error code.
    pub code: Option<String>,

    /// Connector error text.
    pub message: String,
}

impl DcentError {
    /// Creates an error without a code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Attaches a code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// The D'CENT connector bridge.
#[async_trait]
pub trait DcentConnector: Send + Sync {
    /// Opens the bridge and returns the accounts it exposes.
    async fn enable(&mut self) -> Result<Vec<String>, DcentError>;

    /// Returns the address at `path`.
    async fn get_address(&mut self, path: &str) -> Result<String, DcentError>;

    /// Forwards a JSON-RPC call to the device.
    ///
    /// Signing methods answer with a 65-byte `r‖s‖v` hex string or a
    /// `{r, s, v}` object. `eth_signTransaction` may instead answer with the
    /// signed transaction as hex, bare or as `{raw, tx}`.
    async fn send(&mut self, method: &str, params: Value) -> Result<Value, DcentError>;

    /// Closes the bridge.
    async fn disconnect(&mut self) -> Result<(), DcentError>;
}

/// [`DeviceBackend`] for D'CENT wallets.
pub struct DcentBackend<C: DcentConnector> {
    connector: C,
    enabled: bool,
}

impl<C: DcentConnector> fmt::Debug for DcentBackend<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DcentBackend")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl<C: DcentConnector> DcentBackend<C> {
    /// Creates a backend; the bridge is enabled on bootstrap.
    #[must_use]
    pub const fn new(connector: C) -> Self {
        Self {
            connector,
            enabled: false,
        }
    }

    /// The connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }
}

/// The connector's transaction object: decimal quantities.
fn transaction_params(transaction: &LegacyTransaction, account: &str) -> Value {
    json!({
        "from": account,
        "to": transaction.to.to_hex(),
        "value": transaction.value.to_string(),
        "data": format!("0x{}", hex::encode(&transaction.data)),
        "nonce": transaction.nonce.to_string(),
        "gasPrice": transaction.gas_price.to_string(),
        "gasLimit": transaction.gas_limit.to_string(),
        "chainId": transaction.chain_id,
    })
}

fn invalid_response(message: impl fmt::Display) -> DcentError {
    DcentError::new(message.to_string()).with_code(code::INVALID_RESPONSE)
}

/// Reads a signature out of a connector answer: a joined hex string, a
/// signed transaction, or a `{v, r, s}` object.
fn signature_from(value: Value) -> Result<DeviceSignature, DcentError> {
    let invalid = || invalid_response("unexpected signature shape");
    match value {
        Value::String(text) => {
            let digits = text.trim_start_matches("0x");
            match hex::decode(digits) {
                Ok(bytes) if bytes.len() > 65 && bytes.first().is_some_and(|b| *b >= 0xc0) => {
                    signed_rlp_signature(&bytes)
                }
                _ => Ok(DeviceSignature::Joined(text)),
            }
        }
        Value::Object(mut fields) if fields.contains_key("raw") => match fields.remove("raw") {
            Some(raw @ Value::String(_)) => signature_from(raw),
            _ => Err(invalid()),
        },
        Value::Object(fields) => {
            let part = |name: &str| match fields.get(name) {
                Some(Value::String(text)) => Some(text.clone()),
                Some(Value::Number(number)) => number.as_u64().map(|n| format!("{n:x}")),
                _ => None,
            };
            match (part("r"), part("s"), part("v")) {
                (Some(r), Some(s), Some(v)) => Ok(DeviceSignature::HexParts { r, s, v }),
                _ => Err(invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

/// Takes `v`, `r` and `s` out of a signed legacy transaction,
/// `rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])`.
fn signed_rlp_signature(raw: &[u8]) -> Result<DeviceSignature, DcentError> {
    let mut buf = raw;
    let list = Header::decode(&mut buf).map_err(invalid_response)?;
    if !list.list {
        return Err(invalid_response("signed transaction is not an RLP list"));
    }
    let mut fields = buf
        .get(..list.payload_length)
        .ok_or_else(|| invalid_response("signed transaction is truncated"))?;

    for _ in 0..6 {
        rlp_item(&mut fields)?;
    }
    let v = rlp_item(&mut fields)?;
    if v.len() > 8 {
        return Err(invalid_response("signature v does not fit 64 bits"));
    }
    let v = v.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    let r = hex::encode(rlp_item(&mut fields)?);
    let s = hex::encode(rlp_item(&mut fields)?);

    Ok(RawSignature::new(r, s, v).into())
}

/// Splits the next string item off `fields` and returns its payload.
fn rlp_item<'a>(fields: &mut &'a [u8]) -> Result<&'a [u8], DcentError> {
    let header = Header::decode(fields).map_err(invalid_response)?;
    if header.list {
        return Err(invalid_response("unexpected list in signed transaction"));
    }
    let (payload, rest) = fields
        .split_at_checked(header.payload_length)
        .ok_or_else(|| invalid_response("signed transaction is truncated"))?;
    *fields = rest;
    Ok(payload)
}

#[async_trait]
impl<C: DcentConnector> DeviceBackend for DcentBackend<C> {
    type VendorError = DcentError;

    fn family(&self) -> DeviceFamily {
        DeviceFamily::Dcent
    }

    fn translate(&self, error: &DcentError) -> ErrorEnvelope {
        let Some(error_code) = error.code.as_deref() else {
            return ErrorEnvelope::new(error.message.clone());
        };
        let message = match error_code {
            code::USER_CANCEL => "The request was cancelled on the D'CENT wallet.",
            code::NOT_FOUND_DEVICE => {
                "D'CENT wallet not found. Connect the device and start the D'CENT bridge."
            }
            code::TIMEOUT => "The D'CENT wallet did not respond in time.",
            _ => error.message.as_str(),
        };
        ErrorEnvelope::new(message).with_code(error_code)
    }

    async fn bootstrap(&mut self) -> Result<(), DcentError> {
        let accounts = self.connector.enable().await?;
        tracing::debug!(accounts = accounts.len(), "bridge enabled");
        self.enabled = true;
        Ok(())
    }

    async fn get_address(&mut self, path: &DerivationPath) -> Result<String, DcentError> {
        self.connector.get_address(path.as_str()).await
    }

    async fn sign_personal_message(
        &mut self,
        _path: &DerivationPath,
        account: &str,
        message: &[u8],
    ) -> Result<DeviceSignature, DcentError> {
        let params = json!([format!("0x{}", hex::encode(message)), account]);
        signature_from(self.connector.send("personal_sign", params).await?)
    }

    async fn sign_typed_data(
        &mut self,
        _path: &DerivationPath,
        account: &str,
        payload: &TypedDataPayload<'_>,
    ) -> Result<DeviceSignature, DcentError> {
        let document = serde_json::to_string(payload.typed_data)
            .map_err(|e| DcentError::new(e.to_string()))?;
        let params = json!([account, document]);
        signature_from(self.connector.send("eth_signTypedData_v4", params).await?)
    }

    async fn sign_transaction(
        &mut self,
        _path: &DerivationPath,
        account: &str,
        transaction: &LegacyTransaction,
    ) -> Result<DeviceSignature, DcentError> {
        let params = json!([transaction_params(transaction, account)]);
        signature_from(self.connector.send("eth_signTransaction", params).await?)
    }

    async fn teardown(&mut self) -> Result<(), DcentError> {
        if !self.enabled {
            return Ok(());
        }
        self.enabled = false;
        self.connector.disconnect().await
    }
}
