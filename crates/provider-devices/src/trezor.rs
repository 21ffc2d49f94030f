//! Trezor devices through Trezor Connect.
//!
//! Trezor Connect must be initialized once with an application manifest
//! before any call. Initialization is lazy: the SDK only injects its bridge
//! when the first method runs. Transactions go to the device field by
//! field with hex-encoded quantities and the numeric chain id.

use core::fmt;

use async_trait::async_trait;
use hardware_evm_provider_core::{
    DerivationPath, DeviceBackend, DeviceFamily, DeviceSignature, Error, ErrorEnvelope,
    LegacyTransaction, Result as CoreResult, TypedDataPayload,
};
use serde::{Deserialize, Serialize};

/// A Trezor Connect failure: the `payload` of an unsuccessful response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TrezorError {
    /// The SDK's error code (`"Failure_ActionCancelled"`, ...).
    pub code: Option<String>,

    /// The SDK's error text.
    pub message: String,
}

impl TrezorError {
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

/// Application manifest Trezor Connect requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrezorManifest {
    /// Developer contact email.
    #[serde(alias = "manifestEmail")]
    pub email: String,

    /// Application URL.
    #[serde(rename = "appUrl", alias = "app_url", alias = "manifestAppUrl")]
    pub app_url: String,
}

impl TrezorManifest {
    /// Creates a manifest.
    #[must_use]
    pub fn new(email: impl Into<String>, app_url: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            app_url: app_url.into(),
        }
    }

    /// Checks both fields are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the missing field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.email.trim().is_empty() {
            return Err(Error::InvalidConfig("trezor manifest email is required".into()));
        }
        if self.app_url.trim().is_empty() {
            return Err(Error::InvalidConfig("trezor manifest app_url is required".into()));
        }
        Ok(())
    }
}

/// Settings for `TrezorConnect.init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrezorInit {
    /// Defer bridge injection until the first call.
    pub lazy_load: bool,

    /// The application manifest.
    pub manifest: TrezorManifest,
}

/// A transaction in the shape `ethereumSignTransaction` takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrezorTransaction {
    /// Recipient, lowercase hex.
    pub to: String,
    /// Value as `0x` hex.
    pub value: String,
    /// Data as `0x` hex.
    pub data: String,
    /// Numeric chain id.
    pub chain_id: u64,
    /// Nonce as `0x` hex.
    pub nonce: String,
    /// Gas price as `0x` hex.
    pub gas_price: String,
    /// Gas limit as `0x` hex.
    pub gas_limit: String,
}

impl From<&LegacyTransaction> for TrezorTransaction {
    fn from(tx: &LegacyTransaction) -> Self {
        Self {
            to: tx.to.to_hex(),
            value: format!("0x{:x}", tx.value),
            data: format!("0x{}", hex::encode(&tx.data)),
            chain_id: tx.chain_id,
            nonce: format!("0x{:x}", tx.nonce),
            gas_price: format!("0x{:x}", tx.gas_price),
            gas_limit: format!("0x{:x}", tx.gas_limit),
        }
    }
}

/// The `{v, r, s}` payload of `ethereumSignTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrezorTransactionSignature {
    /// `v` as `0x` hex.
    pub v: String,
    /// `r` as `0x` hex.
    pub r: String,
    /// `s` as `0x` hex.
    pub s: String,
}

/// The subset of Trezor Connect the provider uses.
#[async_trait]
pub trait TrezorConnect: Send + Sync {
    /// `TrezorConnect.init`.
    async fn init(&mut self, settings: &TrezorInit) -> Result<(), TrezorError>;

    /// `ethereumGetAddress`.
    async fn ethereum_get_address(
        &mut self,
        path: &str,
        show_on_trezor: bool,
    ) -> Result<String, TrezorError>;

    /// `ethereumSignMessage`; returns the joined signature hex.
    async fn ethereum_sign_message(
        &mut self,
        path: &str,
        message: &str,
        hex: bool,
    ) -> Result<String, TrezorError>;

    /// `ethereumSignTransaction`.
    async fn ethereum_sign_transaction(
        &mut self,
        path: &str,
        transaction: &TrezorTransaction,
    ) -> Result<TrezorTransactionSignature, TrezorError>;

    /// `ethereumSignTypedData` with precomputed hashes; returns the joined
    /// signature hex.
    async fn ethereum_sign_typed_data_hash(
        &mut self,
        path: &str,
        domain_separator_hash: &str,
        message_hash: &str,
    ) -> Result<String, TrezorError>;

    /// `TrezorConnect.dispose`.
    async fn dispose(&mut self) -> Result<(), TrezorError>;
}

/// [`DeviceBackend`] for Trezor devices.
pub struct TrezorBackend<C: TrezorConnect> {
    connect: C,
    manifest: TrezorManifest,
    initialized: bool,
}

impl<C: TrezorConnect> fmt::Debug for TrezorBackend<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrezorBackend")
            .field("manifest", &self.manifest)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl<C: TrezorConnect> TrezorBackend<C> {
    /// Creates a backend; Trezor Connect is initialized on bootstrap.
    #[must_use]
    pub const fn new(connect: C, manifest: TrezorManifest) -> Self {
        Self {
            connect,
            manifest,
            initialized: false,
        }
    }

    /// The SDK handle.
    #[must_use]
    pub const fn connect(&self) -> &C {
        &self.connect
    }

    /// Whether `init` has succeeded.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[async_trait]
impl<C: TrezorConnect> DeviceBackend for TrezorBackend<C> {
    type VendorError = TrezorError;

    fn family(&self) -> DeviceFamily {
        DeviceFamily::Trezor
    }

    fn translate(&self, error: &TrezorError) -> ErrorEnvelope {
        match &error.code {
            Some(code) => ErrorEnvelope::new(format!("Trezor: {code} - {}", error.message))
                .with_code(code.clone()),
            None => ErrorEnvelope::new(error.message.clone()),
        }
    }

    async fn bootstrap(&mut self) -> Result<(), TrezorError> {
        if self.initialized {
            return Ok(());
        }
        let settings = TrezorInit {
            lazy_load: true,
            manifest: self.manifest.clone(),
        };
        self.connect.init(&settings).await?;
        self.initialized = true;
        Ok(())
    }

    async fn get_address(&mut self, path: &DerivationPath) -> Result<String, TrezorError> {
        self.connect.ethereum_get_address(path.as_str(), false).await
    }

    async fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        _account: &str,
        message: &[u8],
    ) -> Result<DeviceSignature, TrezorError> {
        let signature = self
            .connect
            .ethereum_sign_message(path.as_str(), &hex::encode(message), true)
            .await?;
        Ok(DeviceSignature::Joined(signature))
    }

    async fn sign_typed_data(
        &mut self,
        path: &DerivationPath,
        _account: &str,
        payload: &TypedDataPayload<'_>,
    ) -> Result<DeviceSignature, TrezorError> {
        let domain = format!("0x{}", hex::encode(payload.hashes.domain_separator));
        let message = format!("0x{}", hex::encode(payload.hashes.message_hash));
        let signature = self
            .connect
            .ethereum_sign_typed_data_hash(path.as_str(), &domain, &message)
            .await?;
        Ok(DeviceSignature::Joined(signature))
    }

    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        _account: &str,
        transaction: &LegacyTransaction,
    ) -> Result<DeviceSignature, TrezorError> {
        let request = TrezorTransaction::from(transaction);
        let sig = self
            .connect
            .ethereum_sign_transaction(path.as_str(), &request)
            .await?;
        Ok(DeviceSignature::HexParts {
            r: sig.r,
            s: sig.s,
            v: sig.v,
        })
    }

    async fn teardown(&mut self) -> Result<(), TrezorError> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;
        self.connect.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use hardware_evm_provider_core::{Address, U256};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default)]
    struct MockConnect {
        inits: Vec<TrezorInit>,
        shown: Vec<bool>,
        messages: Vec<(String, bool)>,
        transactions: Vec<TrezorTransaction>,
        disposed: usize,
        fail_init: bool,
    }

    #[async_trait]
    impl TrezorConnect for MockConnect {
        async fn init(&mut self, settings: &TrezorInit) -> Result<(), TrezorError> {
            if self.fail_init {
                return Err(TrezorError::new("Init_ManifestMissing"));
            }
            self.inits.push(settings.clone());
            Ok(())
        }

        async fn ethereum_get_address(
            &mut self,
            _path: &str,
            show_on_trezor: bool,
        ) -> Result<String, TrezorError> {
            self.shown.push(show_on_trezor);
            Ok("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string())
        }

        async fn ethereum_sign_message(
            &mut self,
            _path: &str,
            message: &str,
            hex: bool,
        ) -> Result<String, TrezorError> {
            self.messages.push((message.to_string(), hex));
            Ok(format!("{}{}1c", "11".repeat(32), "22".repeat(32)))
        }

        async fn ethereum_sign_transaction(
            &mut self,
            _path: &str,
            transaction: &TrezorTransaction,
        ) -> Result<TrezorTransactionSignature, TrezorError> {
            self.transactions.push(transaction.clone());
            Ok(TrezorTransactionSignature {
                v: "0x60".to_string(),
                r: format!("0x{}", "11".repeat(32)),
                s: format!("0x{}", "22".repeat(32)),
            })
        }

        async fn ethereum_sign_typed_data_hash(
            &mut self,
            _path: &str,
            _domain_separator_hash: &str,
            _message_hash: &str,
        ) -> Result<String, TrezorError> {
            Err(TrezorError::new("Cancelled").with_code("Failure_ActionCancelled"))
        }

        async fn dispose(&mut self) -> Result<(), TrezorError> {
            self.disposed += 1;
            Ok(())
        }
    }

    fn manifest() -> TrezorManifest {
        TrezorManifest::new("dev@example.com", "https://dapp.example.com")
    }

    fn path() -> DerivationPath {
        DerivationPath::parse("m/44'/37310'/0'/0/0").unwrap()
    }

    #[tokio::test]
    async fn bootstrap_registers_manifest_once() {
        let mut backend = TrezorBackend::new(MockConnect::default(), manifest());
        backend.bootstrap().await.unwrap();
        backend.bootstrap().await.unwrap();

        assert!(backend.is_initialized());
        assert_eq!(backend.connect().inits.len(), 1);
        assert_eq!(
            serde_json::to_value(&backend.connect().inits[0]).unwrap(),
            json!({
                "lazyLoad": true,
                "manifest": {"email": "dev@example.com", "appUrl": "https://dapp.example.com"}
            })
        );
    }

    #[tokio::test]
    async fn failed_init_can_be_retried() {
        let mut backend = TrezorBackend::new(
            MockConnect {
                fail_init: true,
                ..MockConnect::default()
            },
            manifest(),
        );
        assert!(backend.bootstrap().await.is_err());
        assert!(!backend.is_initialized());
    }

    #[tokio::test]
    async fn address_is_not_shown_on_device() {
        let mut backend = TrezorBackend::new(MockConnect::default(), manifest());
        backend.get_address(&path()).await.unwrap();
        assert_eq!(backend.connect().shown, vec![false]);
    }

    #[tokio::test]
    async fn message_is_sent_as_hex() {
        let mut backend = TrezorBackend::new(MockConnect::default(), manifest());
        let sig = backend
            .sign_personal_message(&path(), "0xabc", b"hi")
            .await
            .unwrap();

        assert_eq!(backend.connect().messages, vec![("6869".to_string(), true)]);
        assert_eq!(sig.into_raw().unwrap().v, 28);
    }

    #[tokio::test]
    async fn transaction_fields_are_hex() {
        let tx = LegacyTransaction {
            chain_id: 31,
            nonce: 10,
            gas_price: U256::from(65_164_000u64),
            gas_limit: 21_000,
            to: Address::new([0xab; 20]),
            value: U256::from(1_000u64),
            data: vec![0xde, 0xad],
        };
        let mut backend = TrezorBackend::new(MockConnect::default(), manifest());
        let sig = backend.sign_transaction(&path(), "0xabc", &tx).await.unwrap();

        assert_eq!(
            serde_json::to_value(&backend.connect().transactions[0]).unwrap(),
            json!({
                "to": format!("0x{}", "ab".repeat(20)),
                "value": "0x3e8",
                "data": "0xdead",
                "chainId": 31,
                "nonce": "0xa",
                "gasPrice": "0x3e252e0",
                "gasLimit": "0x5208"
            })
        );
        assert_eq!(sig.into_raw().unwrap().v, 0x60);
    }

    #[tokio::test]
    async fn teardown_disposes_and_requires_new_init() {
        let mut backend = TrezorBackend::new(MockConnect::default(), manifest());
        backend.teardown().await.unwrap();
        assert_eq!(backend.connect().disposed, 0);

        backend.bootstrap().await.unwrap();
        backend.teardown().await.unwrap();
        assert_eq!(backend.connect().disposed, 1);

        backend.bootstrap().await.unwrap();
        assert_eq!(backend.connect().inits.len(), 2);
    }

    #[test]
    fn translates_with_code() {
        let backend = TrezorBackend::new(MockConnect::default(), manifest());

        let coded = backend.translate(
            &TrezorError::new("Action cancelled by user").with_code("Failure_ActionCancelled"),
        );
        assert_eq!(
            coded.message,
            "Trezor: Failure_ActionCancelled - Action cancelled by user"
        );
        assert_eq!(coded.code.as_deref(), Some("Failure_ActionCancelled"));

        let plain = backend.translate(&TrezorError::new("Popup closed"));
        assert_eq!(plain.message, "Popup closed");
        assert_eq!(plain.code, None);
    }

    #[test]
    fn manifest_validation() {
        assert!(manifest().validate().is_ok());
        assert!(matches!(
            TrezorManifest::new("", "https://x").validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            TrezorManifest::new("a@b.c", " ").validate(),
            Err(Error::InvalidConfig(_))
        ));

        let parsed: TrezorManifest =
            toml::from_str("email = \"a@b.c\"\napp_url = \"https://x\"").unwrap();
        assert_eq!(parsed.app_url, "https://x");
    }
}
