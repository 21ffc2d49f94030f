//! Transaction assembly.
//!
//! Turns the partial transaction object a dapp sends with
//! `eth_sendTransaction` into a complete one: nonce, gas price and gas limit
//! are read from the chain when the caller left them out, `to` and `from` are
//! lowercased and `value`/`data` get their defaults.
//!
//! # Example
//!
//! ```no_run
//! # async fn run(chain: &dyn hardware_evm_provider_core::ChainReader) -> hardware_evm_provider_core::Result<()> {
//! use hardware_evm_provider_core::assembler::{PendingTransaction, assemble};
//!
//! let pending = PendingTransaction {
//!     to: Some("0xabc".to_string()),
//!     value: Some("10000".parse()?),
//!     ..PendingTransaction::default()
//! };
//! let tx = assemble(chain, "0xSENDER", &pending).await?;
//! assert_eq!(tx.value, "0x2710");
//! # Ok(())
//! # }
//! ```

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::chain::{CallRequest, ChainReader};
use crate::error::{Error, Result};
use crate::quantity::Quantity;
use crate::transaction::decode_data;

/// Default for a missing `value` or `data`.
pub const ZERO_HEX: &str = "0x0";

/// Gas price inflation applied to chain-reported prices, in percent.
const GAS_PRICE_MARKUP_PERCENT: u64 = 101;

/// A transaction object as sent by a dapp; everything but `to` is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    /// Sender; checked against the selected account, never trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Value in wei.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Quantity>,

    /// Call data as hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Caller-chosen nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Quantity>,

    /// Caller-chosen gas price in wei.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<Quantity>,

    /// Caller-chosen gas limit.
    #[serde(default, alias = "gas", skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<Quantity>,
}

impl PendingTransaction {
    /// Parses the first element of `eth_sendTransaction` params.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallerInput`] if the object does not have the
    /// expected shape.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| Error::input(format!("invalid transaction: {e}")))
    }

    /// Checks the fields a node would only reject after a round trip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallerInput`] if `to` is missing or not an address,
    /// or if `data` is not hex.
    pub fn validate(&self) -> Result<()> {
        let to = self
            .to
            .as_deref()
            .filter(|to| !to.trim().is_empty())
            .ok_or_else(|| Error::input("transaction is missing `to`"))?;
        Address::from_hex(to)?;
        if let Some(data) = &self.data {
            decode_data(data)?;
        }
        Ok(())
    }
}

/// A fully populated transaction, ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTransaction {
    /// Sender, lowercase.
    pub from: String,

    /// Recipient, lowercase.
    pub to: String,

    /// Nonce.
    pub nonce: u64,

    /// Call data as hex, `0x0` when empty.
    pub data: String,

    /// Value as lowercase `0x` hex.
    pub value: String,

    /// Gas price in wei.
    pub gas_price: U256,

    /// Gas limit.
    pub gas_limit: u64,
}

/// Fills in a [`PendingTransaction`] for `from`.
///
/// The nonce and gas price reads run concurrently; the gas estimate runs
/// afterwards against the assembled candidate. Caller-supplied values always
/// win over chain reads, including a nonce of zero.
///
/// # Errors
///
/// - [`Error::CallerInput`] if `to` is missing or a numeric field does not fit
/// - [`Error::ChainReadFailed`] if any chain read fails; nothing partial is
///   returned
pub async fn assemble(
    chain: &dyn ChainReader,
    from: &str,
    pending: &PendingTransaction,
) -> Result<CompleteTransaction> {
    let to = pending
        .to
        .as_deref()
        .filter(|to| !to.trim().is_empty())
        .ok_or_else(|| Error::input("transaction is missing `to`"))?
        .trim()
        .to_ascii_lowercase();
    let from = from.to_ascii_lowercase();
    let value = pending.value.unwrap_or_default().to_hex();
    let data = pending
        .data
        .clone()
        .filter(|data| !data.is_empty())
        .unwrap_or_else(|| ZERO_HEX.to_string());
    let nonce = pending.nonce.map(|n| n.to_u64("nonce")).transpose()?;
    let gas_limit = pending
        .gas_limit
        .map(|g| g.to_u64("gasLimit"))
        .transpose()?;

    let (nonce, gas_price) = futures::try_join!(
        async {
            match nonce {
                Some(nonce) => Ok(nonce),
                None => chain.get_transaction_count(&from).await,
            }
        },
        async {
            match pending.gas_price {
                Some(price) => Ok(price.value()),
                None => chain.gas_price().await.map(inflate_gas_price),
            }
        },
    )?;

    let gas_limit = match gas_limit {
        Some(limit) => limit,
        None => {
            let candidate = CallRequest {
                from: Some(from.clone()),
                to: Some(to.clone()),
                value: value.clone(),
                data: data.clone(),
            };
            chain.estimate_gas(&candidate).await?
        }
    };

    tracing::debug!(%from, %to, nonce, %gas_price, gas_limit, "assembled transaction");

    Ok(CompleteTransaction {
        from,
        to,
        nonce,
        data,
        value,
        gas_price,
        gas_limit,
    })
}

/// `floor(price * 1.01)` in integer arithmetic.
fn inflate_gas_price(price: U256) -> U256 {
    price.saturating_mul(U256::from(GAS_PRICE_MARKUP_PERCENT)) / U256::from(100u64)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::chain::ChainError;
    use crate::testing::MockChain;

    fn pending(value: serde_json::Value) -> PendingTransaction {
        PendingTransaction::from_value(&value).unwrap()
    }

    #[tokio::test]
    async fn fills_missing_fields_from_chain() {
        let chain = MockChain::new(5, 10_000, 35_000);
        let tx = assemble(
            &chain,
            "0xABCDEF",
            &pending(json!({"to": "0xABC", "value": "10000"})),
        )
        .await
        .unwrap();

        assert_eq!(
            tx,
            CompleteTransaction {
                from: "0xabcdef".into(),
                to: "0xabc".into(),
                nonce: 5,
                data: "0x0".into(),
                value: "0x2710".into(),
                gas_price: U256::from(10_100),
                gas_limit: 35_000,
            }
        );
    }

    #[tokio::test]
    async fn estimate_sees_assembled_candidate() {
        let chain = MockChain::new(5, 10_000, 35_000);
        assemble(
            &chain,
            "0xSender",
            &pending(json!({"to": "0xabc", "value": 16, "data": "0xdead"})),
        )
        .await
        .unwrap();

        let estimated = chain.last_estimate().unwrap();
        assert_eq!(
            estimated,
            CallRequest {
                from: Some("0xsender".into()),
                to: Some("0xabc".into()),
                value: "0x10".into(),
                data: "0xdead".into(),
            }
        );
    }

    #[tokio::test]
    async fn caller_values_win() {
        let chain = MockChain::new(5, 10_000, 35_000);
        let tx = assemble(
            &chain,
            "0xabc",
            &pending(json!({"to": "0xdef", "nonce": 0, "gasPrice": "0x3b9aca00", "gas": 21000})),
        )
        .await
        .unwrap();

        assert_eq!(tx.nonce, 0);
        assert_eq!(tx.gas_price, U256::from(1_000_000_000u64));
        assert_eq!(tx.gas_limit, 21_000);
        assert_eq!(chain.calls.nonce.load(Ordering::SeqCst), 0);
        assert_eq!(chain.calls.gas_price.load(Ordering::SeqCst), 0);
        assert_eq!(chain.calls.estimate.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn gas_price_inflation_floors() {
        assert_eq!(inflate_gas_price(U256::from(10_000)), U256::from(10_100));
        assert_eq!(inflate_gas_price(U256::from(150)), U256::from(151));
        assert_eq!(inflate_gas_price(U256::from(99)), U256::from(99));
        assert_eq!(inflate_gas_price(U256::ZERO), U256::ZERO);
    }

    #[tokio::test]
    async fn missing_to_is_caller_error_without_reads() {
        let chain = MockChain::new(5, 10_000, 35_000);
        let err = assemble(&chain, "0xabc", &pending(json!({"value": "1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CallerInput(_)));
        assert_eq!(chain.calls.nonce.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn validate_checks_recipient_and_data() {
        let ok = pending(json!({"to": format!("0x{}", "35".repeat(20)), "data": "0xdead"}));
        assert!(ok.validate().is_ok());

        for bad in [
            json!({"to": "0xnot-an-address"}),
            json!({"to": "0xabc"}),
            json!({"to": format!("0x{}", "35".repeat(20)), "data": "0xzz"}),
            json!({"data": "0x"}),
        ] {
            assert!(
                matches!(pending(bad.clone()).validate(), Err(Error::CallerInput(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn invalid_value_is_rejected() {
        let result = PendingTransaction::from_value(&json!({"to": "0xabc", "value": "ten"}));
        assert!(matches!(result, Err(Error::CallerInput(_))));
    }

    #[tokio::test]
    async fn chain_failure_aborts_assembly() {
        let chain = MockChain::new(5, 10_000, 35_000)
            .failing_gas_price(ChainError::new("gas oracle down").with_code(-32000));
        let err = assemble(&chain, "0xabc", &pending(json!({"to": "0xdef"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChainReadFailed(ref e) if e.message == "gas oracle down"));
        assert_eq!(chain.calls.estimate.load(Ordering::SeqCst), 0);
    }
}
