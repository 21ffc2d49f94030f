//! Hand-written collaborators for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::chain::{CallRequest, ChainError, ChainReader};
use crate::device::{DeviceBackend, DeviceFamily, DeviceSignature, TypedDataPayload};
use crate::dpath::DerivationPath;
use crate::error::ErrorEnvelope;
use crate::signature::RawSignature;
use crate::transaction::LegacyTransaction;

/// The account the mock device derives at index 0.
pub(crate) const SELECTED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

/// Signature components from the EIP-155 worked example.
pub(crate) const SIG_R: &str = "28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276";
pub(crate) const SIG_S: &str = "67cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";

/// The `Mail` example from EIP-712.
pub(crate) fn mail() -> Value {
    json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "Person": [
                {"name": "name", "type": "string"},
                {"name": "wallet", "type": "address"}
            ],
            "Mail": [
                {"name": "from", "type": "Person"},
                {"name": "to", "type": "Person"},
                {"name": "contents", "type": "string"}
            ]
        },
        "primaryType": "Mail",
        "domain": {
            "name": "Ether Mail",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
            "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
            "contents": "Hello, Bob!"
        }
    })
}

#[derive(Debug, Default)]
pub(crate) struct ChainCalls {
    pub(crate) nonce: AtomicUsize,
    pub(crate) gas_price: AtomicUsize,
    pub(crate) estimate: AtomicUsize,
    pub(crate) send_raw: AtomicUsize,
    pub(crate) request: AtomicUsize,
}

/// A chain reader answering from fixed values and recording what it saw.
#[derive(Debug)]
pub(crate) struct MockChain {
    nonce: u64,
    gas_price: U256,
    gas_estimate: u64,
    balance: U256,
    receipt: Option<Value>,
    gas_price_error: Option<ChainError>,
    pub(crate) calls: ChainCalls,
    estimates: Mutex<Vec<CallRequest>>,
    raw_transactions: Mutex<Vec<String>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl MockChain {
    pub(crate) fn new(nonce: u64, gas_price: u64, gas_estimate: u64) -> Self {
        Self {
            nonce,
            gas_price: U256::from(gas_price),
            gas_estimate,
            balance: U256::from(1_000_000u64),
            receipt: None,
            gas_price_error: None,
            calls: ChainCalls::default(),
            estimates: Mutex::default(),
            raw_transactions: Mutex::default(),
            requests: Mutex::default(),
        }
    }

    pub(crate) fn failing_gas_price(mut self, error: ChainError) -> Self {
        self.gas_price_error = Some(error);
        self
    }

    pub(crate) fn with_receipt(mut self, receipt: Value) -> Self {
        self.receipt = Some(receipt);
        self
    }

    pub(crate) fn last_estimate(&self) -> Option<CallRequest> {
        self.estimates.lock().unwrap().last().cloned()
    }

    pub(crate) fn last_raw_transaction(&self) -> Option<String> {
        self.raw_transactions.lock().unwrap().last().cloned()
    }

    pub(crate) fn last_request(&self) -> Option<(String, Value)> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn get_transaction_count(&self, _address: &str) -> Result<u64, ChainError> {
        self.calls.nonce.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonce)
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.calls.gas_price.fetch_add(1, Ordering::SeqCst);
        match &self.gas_price_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.gas_price),
        }
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, ChainError> {
        self.calls.estimate.fetch_add(1, Ordering::SeqCst);
        self.estimates.lock().unwrap().push(request.clone());
        Ok(self.gas_estimate)
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<String, ChainError> {
        self.calls.send_raw.fetch_add(1, Ordering::SeqCst);
        self.raw_transactions.lock().unwrap().push(raw.to_string());
        Ok("0xhash".to_string())
    }

    async fn call(&self, request: &Value, block: Option<&Value>) -> Result<Value, ChainError> {
        self.requests
            .lock()
            .unwrap()
            .push(("eth_call".to_string(), json!([request, block])));
        Ok(json!("0xcafe"))
    }

    async fn get_balance(&self, address: &str) -> Result<U256, ChainError> {
        self.requests
            .lock()
            .unwrap()
            .push(("eth_getBalance".to_string(), json!([address])));
        Ok(self.balance)
    }

    async fn get_transaction_receipt(&self, _hash: &str) -> Result<Option<Value>, ChainError> {
        Ok(self.receipt.clone())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        self.calls.request.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        Ok(json!({"method": method, "params": params}))
    }
}

#[derive(Debug, Default)]
pub(crate) struct BackendCalls {
    pub(crate) bootstrap: usize,
    pub(crate) get_address: usize,
    pub(crate) sign_message: usize,
    pub(crate) sign_typed: usize,
    pub(crate) sign_transaction: usize,
    pub(crate) teardown: usize,
}

impl BackendCalls {
    pub(crate) const fn total(&self) -> usize {
        self.bootstrap
            + self.get_address
            + self.sign_message
            + self.sign_typed
            + self.sign_transaction
            + self.teardown
    }
}

/// The mock vendor's error shape.
#[derive(Debug, Clone)]
pub(crate) struct MockVendorError(pub(crate) String);

/// A device that derives [`SELECTED`] at index 0 and signs with fixed
/// components.
#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    pub(crate) calls: BackendCalls,
    pub(crate) fail_bootstrap: Option<String>,
    pub(crate) fail_address: Option<String>,
    pub(crate) fail_signing: Option<String>,
    pub(crate) fail_teardown: bool,
    paths: Vec<String>,
    messages: Vec<Vec<u8>>,
    typed_hashes: Vec<B256>,
    transactions: Vec<LegacyTransaction>,
}

impl MockBackend {
    pub(crate) fn failing_bootstrap(mut self, message: &str) -> Self {
        self.fail_bootstrap = Some(message.to_string());
        self
    }

    pub(crate) fn failing_address(mut self, message: &str) -> Self {
        self.fail_address = Some(message.to_string());
        self
    }

    pub(crate) fn derived_paths(&self) -> &[String] {
        &self.paths
    }

    pub(crate) fn last_message(&self) -> Option<Vec<u8>> {
        self.messages.last().cloned()
    }

    pub(crate) fn last_typed_hash(&self) -> Option<B256> {
        self.typed_hashes.last().copied()
    }

    pub(crate) fn last_transaction(&self) -> Option<LegacyTransaction> {
        self.transactions.last().cloned()
    }

    fn signing(&self) -> Result<(), MockVendorError> {
        match &self.fail_signing {
            Some(message) => Err(MockVendorError(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceBackend for MockBackend {
    type VendorError = MockVendorError;

    fn family(&self) -> DeviceFamily {
        DeviceFamily::Ledger
    }

    fn translate(&self, error: &MockVendorError) -> ErrorEnvelope {
        ErrorEnvelope::new(format!("translated: {}", error.0)).with_code("mock")
    }

    async fn bootstrap(&mut self) -> Result<(), MockVendorError> {
        self.calls.bootstrap += 1;
        match &self.fail_bootstrap {
            Some(message) => Err(MockVendorError(message.clone())),
            None => Ok(()),
        }
    }

    async fn get_address(&mut self, path: &DerivationPath) -> Result<String, MockVendorError> {
        self.calls.get_address += 1;
        if let Some(message) = &self.fail_address {
            return Err(MockVendorError(message.clone()));
        }
        self.paths.push(path.to_string());
        let index = path.as_str().rsplit('/').next().unwrap_or("0");
        Ok(if index == "0" {
            SELECTED.to_string()
        } else {
            format!("0x{index:0>40}")
        })
    }

    async fn sign_personal_message(
        &mut self,
        _path: &DerivationPath,
        _account: &str,
        message: &[u8],
    ) -> Result<DeviceSignature, MockVendorError> {
        self.calls.sign_message += 1;
        self.signing()?;
        self.messages.push(message.to_vec());
        Ok(RawSignature::new(SIG_R, SIG_S, 28).into())
    }

    async fn sign_typed_data(
        &mut self,
        _path: &DerivationPath,
        _account: &str,
        payload: &TypedDataPayload<'_>,
    ) -> Result<DeviceSignature, MockVendorError> {
        self.calls.sign_typed += 1;
        self.signing()?;
        self.typed_hashes.push(payload.hashes.signing_hash);
        Ok(DeviceSignature::Joined(format!("0x{SIG_R}{SIG_S}1b")))
    }

    async fn sign_transaction(
        &mut self,
        _path: &DerivationPath,
        _account: &str,
        transaction: &LegacyTransaction,
    ) -> Result<DeviceSignature, MockVendorError> {
        self.calls.sign_transaction += 1;
        self.signing()?;
        self.transactions.push(transaction.clone());
        Ok(DeviceSignature::HexParts {
            r: SIG_R.to_string(),
            s: SIG_S.to_string(),
            v: format!("{:x}", transaction.chain_id * 2 + 35),
        })
    }

    async fn teardown(&mut self) -> Result<(), MockVendorError> {
        self.calls.teardown += 1;
        if self.fail_teardown {
            Err(MockVendorError("transport busy".to_string()))
        } else {
            Ok(())
        }
    }
}
