//! Hardware Wallet EVM Provider Core Library
//!
//! This crate exposes Ledger, Trezor and D'CENT hardware wallets to dapps as
//! an [EIP-1193] provider, on RSK and any other EVM chain.
//!
//! # Overview
//!
//! Dapps talk JSON-RPC. Hardware wallets talk vendor protocols and only ever
//! sign. The pieces in between:
//!
//! - **Derivation paths**: the per-chain default account path ([`dpath`])
//! - **Transaction assembly**: filling nonce, gas price and gas limit from
//!   the chain ([`assembler`])
//! - **Device session**: the connect/sign/disconnect state machine over a
//!   [`DeviceBackend`] ([`DeviceSession`])
//! - **Provider façade**: `request({ method, params })` routing, plus the
//!   [`LegacyProvider`] shim for older dapps
//! - **Error translation**: vendor failures become [`ErrorEnvelope`]s and
//!   then [`ProviderRpcError`]s
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Dapp (EIP-1193 request calls)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │        Provider  /  LegacyProvider   (method routing)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DeviceSession  │  Assembler  │  Typed data  │  Signature    │
//! │  (state, auth)  │ (gas/nonce) │  (EIP-712)   │  (v rebase)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │     DeviceBackend (Ledger / Trezor / D'CENT)  │ ChainReader  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use hardware_evm_provider_core::{ChainId, ProviderConfig};
//!
//! let config = ProviderConfig::new("https://public-node.rsk.co", ChainId::RSK_MAINNET);
//! assert_eq!(config.derivation_path().unwrap().as_str(), "44'/137'/0'/0/0");
//! ```
//!
//! Backends for the three hardware families live in
//! `hardware-evm-provider-devices`.
//!
//! # Security Considerations
//!
//! - Signing requests naming an account other than the selected one are
//!   rejected before the device is touched
//! - Raw vendor errors never cross the provider boundary
//! - Transactions are always EIP-155 replay protected
//!
//! [EIP-1193]: https://eips.ethereum.org/EIPS/eip-1193

// Modules
pub mod address;
pub mod assembler;
pub mod chain;
pub mod config;
pub mod device;
pub mod dpath;
pub mod error;
pub mod legacy;
pub mod provider;
pub mod quantity;
pub mod session;
pub mod signature;
pub mod transaction;
pub mod typed_data;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use address::Address;
pub use assembler::{CompleteTransaction, PendingTransaction};
pub use chain::{CallRequest, ChainError, ChainId, ChainReader};
pub use config::ProviderConfig;
pub use device::{ConnectionState, DeviceBackend, DeviceFamily, DeviceSignature, TypedDataPayload};
pub use dpath::DerivationPath;
pub use error::{Error, ErrorEnvelope, ProviderRpcError, Result};
pub use legacy::LegacyProvider;
pub use provider::{ConnectorUpdate, Provider, RpcRequest, RpcResponse};
pub use quantity::Quantity;
pub use session::DeviceSession;
pub use signature::{RawSignature, Signature};
pub use transaction::{LegacyTransaction, TransactionV};
pub use typed_data::{Eip712Hasher, TypedData, TypedDataHasher, TypedDataHashes};

// Re-export commonly used alloy types
pub use alloy_primitives::{B256, U256};
