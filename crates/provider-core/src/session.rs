//! The device session state machine.
//!
//! A [`DeviceSession`] owns one backend, the selected account and the
//! active derivation path. It is the only place those change, and the only
//! place vendor errors are translated.
//!
//! Every signing operation checks, before any vendor call:
//!
//! 1. the session is [`ConnectionState::Connected`], else
//!    [`Error::NotConnected`];
//! 2. any account the caller named is the selected one, else
//!    [`Error::Unauthorized`].
//!
//! Calls take `&mut self`: one operation is in flight per device at a time.

use core::fmt;
use std::sync::Arc;

use tracing::Span;

use crate::address::{authorize, normalize_account};
use crate::assembler::{PendingTransaction, assemble};
use crate::chain::{ChainId, ChainReader};
use crate::device::{ConnectionState, DeviceBackend, DeviceFamily, TypedDataPayload};
use crate::dpath::DerivationPath;
use crate::error::{Error, Result};
use crate::signature::Signature;
use crate::transaction::LegacyTransaction;
use crate::typed_data::{Eip712Hasher, TypedData, TypedDataHasher};

/// Mutable session state; only [`DeviceSession`] methods touch it.
#[derive(Debug, Clone)]
struct SessionState {
    connection: ConnectionState,
    path: DerivationPath,
    selected: Option<String>,
}

/// Connection lifecycle and signing for one hardware device.
pub struct DeviceSession<B: DeviceBackend> {
    backend: B,
    state: SessionState,
    chain: Arc<dyn ChainReader>,
    chain_id: ChainId,
    hasher: Arc<dyn TypedDataHasher>,
    span: Span,
}

impl<B: DeviceBackend> fmt::Debug for DeviceSession<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("family", &self.backend.family())
            .field("chain_id", &self.chain_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<B: DeviceBackend> DeviceSession<B> {
    /// Creates an uninitialized session.
    ///
    /// # Arguments
    ///
    /// * `backend` - The vendor SDK wrapper
    /// * `chain` - Chain-state transport for nonce, gas and broadcast
    /// * `chain_id` - The network transactions are signed for
    /// * `path` - The active derivation path
    #[must_use]
    pub fn new(
        backend: B,
        chain: Arc<dyn ChainReader>,
        chain_id: ChainId,
        path: DerivationPath,
    ) -> Self {
        let span = tracing::info_span!(
            "hw_provider",
            family = %backend.family(),
            chain_id = chain_id.get()
        );
        Self {
            backend,
            state: SessionState {
                connection: ConnectionState::Uninitialized,
                path,
                selected: None,
            },
            chain,
            chain_id,
            hasher: Arc::new(Eip712Hasher),
            span,
        }
    }

    /// Replaces the span all session events are recorded under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Replaces the EIP-712 hashing collaborator.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn TypedDataHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// The span session events are recorded under.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// The hardware family.
    #[must_use]
    pub fn family(&self) -> DeviceFamily {
        self.backend.family()
    }

    /// The network this session signs for.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// The chain-state transport.
    #[must_use]
    pub fn chain(&self) -> &dyn ChainReader {
        self.chain.as_ref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.state.connection
    }

    /// The selected account, lowercase, once connected.
    #[must_use]
    pub fn selected_address(&self) -> Option<&str> {
        self.state.selected.as_deref()
    }

    /// The active derivation path.
    #[must_use]
    pub const fn derivation_path(&self) -> &DerivationPath {
        &self.state.path
    }

    /// The backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Bootstraps the device if needed and selects the address at the
    /// active path.
    ///
    /// Steps already done are skipped, so connecting a connected session
    /// makes no vendor calls. On failure the state stays at the last stage
    /// reached.
    ///
    /// # Returns
    ///
    /// The selected account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] with the translated vendor failure.
    #[tracing::instrument(parent = &self.span, skip_all)]
    pub async fn connect(&mut self) -> Result<String> {
        if matches!(
            self.state.connection,
            ConnectionState::Uninitialized | ConnectionState::Disconnected
        ) {
            tracing::debug!("bootstrapping device");
            let result = self.backend.bootstrap().await;
            self.vendor(result)?;
            self.state.connection = ConnectionState::Initialized;
        }

        if self.state.connection == ConnectionState::Initialized {
            let path = self.state.path.clone();
            let address = self.derive(&path).await?;
            self.select(path, address);
        }

        self.require_connected()
    }

    /// Selects the account at `path` without bootstrapping again.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the device was never bootstrapped
    /// - [`Error::Device`] if derivation fails; the previous selection stays
    #[tracing::instrument(parent = &self.span, skip_all, fields(path = %path))]
    pub async fn choose_account(&mut self, path: DerivationPath) -> Result<String> {
        self.require_bootstrapped()?;
        let address = self.derive(&path).await?;
        self.select(path, address);
        self.require_connected()
    }

    /// Derives the addresses at `paths`, one device call at a time, in
    /// order. The selection does not change.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the device was never bootstrapped
    /// - [`Error::Device`] on the first failing derivation
    #[tracing::instrument(parent = &self.span, skip_all, fields(count = paths.len()))]
    pub async fn derive_addresses(&mut self, paths: &[DerivationPath]) -> Result<Vec<String>> {
        self.require_bootstrapped()?;
        let mut addresses = Vec::with_capacity(paths.len());
        for path in paths {
            addresses.push(self.derive(path).await?);
        }
        Ok(addresses)
    }

    /// Signs `message` as an EIP-191 personal message.
    ///
    /// # Arguments
    ///
    /// * `message` - The message bytes
    /// * `account` - The signer the caller named, if any
    ///
    /// # Returns
    ///
    /// The `0x`-prefixed `r‖s‖v` signature.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`], [`Error::Unauthorized`] or the translated
    /// device failure.
    #[tracing::instrument(parent = &self.span, skip_all, fields(len = message.len()))]
    pub async fn personal_sign(&mut self, message: &[u8], account: Option<&str>) -> Result<String> {
        let signer = self.authorized_signer(account)?;
        tracing::debug!("requesting personal message signature");
        let result = self
            .backend
            .sign_personal_message(&self.state.path, &signer, message)
            .await;
        let signature = self.vendor(result)?.into_raw()?;
        Ok(Signature::from_raw(&signature)?.to_hex())
    }

    /// Signs EIP-712 typed data.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`], [`Error::Unauthorized`],
    /// [`Error::InvalidTypedData`] or the translated device failure.
    #[tracing::instrument(parent = &self.span, skip_all)]
    pub async fn sign_typed_data(
        &mut self,
        typed_data: &TypedData,
        account: Option<&str>,
    ) -> Result<String> {
        let signer = self.authorized_signer(account)?;
        let hashes = self.hasher.hash(typed_data)?;
        tracing::debug!(%hashes, "requesting typed data signature");

        let payload = TypedDataPayload { typed_data, hashes };
        let result = self
            .backend
            .sign_typed_data(&self.state.path, &signer, &payload)
            .await;
        let signature = self.vendor(result)?.into_raw()?;
        Ok(Signature::from_raw(&signature)?.to_hex())
    }

    /// Assembles, signs and broadcasts a transaction.
    ///
    /// `pending.from`, when present, must be the selected account; the
    /// transaction is always sent from the selected account.
    ///
    /// # Returns
    ///
    /// The transaction hash reported by the chain.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`], [`Error::Unauthorized`],
    /// [`Error::CallerInput`], [`Error::ChainReadFailed`] or the translated
    /// device failure.
    #[tracing::instrument(parent = &self.span, skip_all)]
    pub async fn send_transaction(&mut self, pending: &PendingTransaction) -> Result<String> {
        let signer = self.authorized_signer(pending.from.as_deref())?;
        pending.validate()?;

        let complete = assemble(self.chain.as_ref(), &signer, pending).await?;
        let transaction = LegacyTransaction::from_complete(&complete, self.chain_id)?;

        tracing::debug!(nonce = transaction.nonce, "requesting transaction signature");
        let result = self
            .backend
            .sign_transaction(&self.state.path, &signer, &transaction)
            .await;
        let signature = self.vendor(result)?.into_raw()?;

        let signed = transaction.signed_rlp(&signature, self.backend.transaction_v())?;
        let raw = format!("0x{}", hex::encode(signed));
        let hash = self.chain.send_raw_transaction(&raw).await?;
        tracing::info!(%hash, "transaction broadcast");
        Ok(hash)
    }

    /// Tears down the transport and forgets the selected account.
    ///
    /// The session ends up [`ConnectionState::Disconnected`] even when the
    /// teardown call fails; the failure is still reported. Disconnecting a
    /// disconnected session does nothing.
    ///
    /// # Errors
    ///
    /// Returns the translated teardown failure.
    #[tracing::instrument(parent = &self.span, skip_all)]
    pub async fn disconnect(&mut self) -> Result<()> {
        let previous = self.state.connection;
        self.state.connection = ConnectionState::Disconnected;
        self.state.selected = None;

        match previous {
            ConnectionState::Disconnected | ConnectionState::Uninitialized => Ok(()),
            ConnectionState::Initialized | ConnectionState::Connected => {
                let result = self.backend.teardown().await;
                self.vendor(result)?;
                tracing::debug!("device disconnected");
                Ok(())
            }
        }
    }

    /// Checks that `account` is the selected one.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] before a selection, [`Error::Unauthorized`]
    /// on mismatch.
    pub fn authorize(&self, account: &str) -> Result<()> {
        authorize(self.selected_address(), account)
    }

    /// Returns the selected account if the session is connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] otherwise.
    pub fn require_connected(&self) -> Result<String> {
        match (&self.state.connection, &self.state.selected) {
            (ConnectionState::Connected, Some(selected)) => Ok(selected.clone()),
            _ => Err(Error::NotConnected),
        }
    }

    fn require_bootstrapped(&self) -> Result<()> {
        match self.state.connection {
            ConnectionState::Initialized | ConnectionState::Connected => Ok(()),
            ConnectionState::Uninitialized | ConnectionState::Disconnected => {
                Err(Error::NotConnected)
            }
        }
    }

    fn authorized_signer(&self, account: Option<&str>) -> Result<String> {
        let selected = self.require_connected()?;
        if let Some(account) = account {
            self.authorize(account)?;
        }
        Ok(selected)
    }

    async fn derive(&mut self, path: &DerivationPath) -> Result<String> {
        tracing::debug!(%path, "deriving address");
        let result = self.backend.get_address(path).await;
        self.vendor(result).map(|address| normalize_account(&address))
    }

    fn select(&mut self, path: DerivationPath, address: String) {
        tracing::info!(account = %address, "account selected");
        self.state.path = path;
        self.state.selected = Some(address);
        self.state.connection = ConnectionState::Connected;
    }

    /// Translates a vendor failure into [`Error::Device`].
    fn vendor<T>(&self, result: core::result::Result<T, B::VendorError>) -> Result<T> {
        result.map_err(|err| {
            let envelope = self.backend.translate(&err);
            tracing::warn!(vendor = ?err, message = %envelope.message, "device call failed");
            Error::Device(envelope)
        })
    }
}
