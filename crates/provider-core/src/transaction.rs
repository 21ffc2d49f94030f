//! EIP-155 legacy transactions and their RLP payloads.
//!
//! Hardware wallets sign legacy transactions in one of two ways: they take
//! the unsigned EIP-155 payload as raw RLP (Ledger), or they take the fields
//! one by one and rebuild that payload on the device (Trezor, D'CENT). Either
//! way they hand back `v`, `r` and `s`, which this module folds into the
//! signed serialization broadcast through `eth_sendRawTransaction`.
//!
//! # Signing Flow
//!
//! 1. Build a [`LegacyTransaction`] from an assembled transaction
//! 2. Pass [`LegacyTransaction::unsigned_rlp`] (or the fields) to the device
//! 3. Feed the returned triple to [`LegacyTransaction::signed_rlp`], along
//!    with the [`TransactionV`] convention the device reports `v` in
//!
//! # Example
//!
//! ```
//! use alloy_primitives::U256;
//! use hardware_evm_provider_core::{Address, LegacyTransaction};
//!
//! let tx = LegacyTransaction {
//!     chain_id: 1,
//!     nonce: 9,
//!     gas_price: U256::from(20_000_000_000u64),
//!     gas_limit: 21000,
//!     to: Address::new([0x35; 20]),
//!     value: U256::from(1_000_000_000_000_000_000u128),
//!     data: vec![],
//! };
//!
//! assert_eq!(tx.unsigned_rlp()[0], 0xec);
//! ```

use alloy_primitives::{B256, U256, keccak256};
use alloy_rlp::Encodable;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::assembler::CompleteTransaction;
use crate::chain::ChainId;
use crate::error::{Error, Result};
use crate::quantity::Quantity;
use crate::signature::RawSignature;

/// How a device reports the `v` of a transaction signature.
///
/// A truncated low byte and a bare recovery id cannot be told apart on every
/// chain (for chain 111, `0x01` is both), so the convention comes from the
/// backend instead of being guessed from the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransactionV {
    /// The full EIP-155 value, a bare recovery id, or `27`/`28`.
    #[default]
    Inferred,

    /// The full EIP-155 value truncated to its low byte once it exceeds 255.
    LowByte,
}

/// An EIP-155 legacy transaction.
///
/// This is the traditional Ethereum transaction format with chain ID
/// replay protection as specified in [EIP-155].
///
/// [EIP-155]: https://eips.ethereum.org/EIPS/eip-155
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTransaction {
    /// The chain ID for replay protection.
    pub chain_id: u64,

    /// The transaction nonce.
    pub nonce: u64,

    /// The gas price in wei.
    pub gas_price: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address.
    pub to: Address,

    /// The value to transfer in wei.
    pub value: U256,

    /// The transaction input data.
    pub data: Vec<u8>,
}

impl LegacyTransaction {
    /// Builds the transaction from an assembled one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallerInput`] if `to`, `value` or `data` are not
    /// valid hex.
    pub fn from_complete(tx: &CompleteTransaction, chain_id: ChainId) -> Result<Self> {
        Ok(Self {
            chain_id: chain_id.get(),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: Address::from_hex(&tx.to)?,
            value: tx.value.parse::<Quantity>()?.value(),
            data: decode_data(&tx.data)?,
        })
    }

    /// Encodes the unsigned EIP-155 payload:
    /// `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0])`.
    #[must_use]
    pub fn unsigned_rlp(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        encode_rlp_list(&mut buf, |buf| {
            self.encode_fields(buf);
            self.chain_id.encode(buf);
            0u8.encode(buf);
            0u8.encode(buf);
        });

        buf
    }

    /// Returns the hash the device signs, `keccak256` of [`Self::unsigned_rlp`].
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.unsigned_rlp())
    }

    /// Reconstructs the full EIP-155 `v` from what a device returned.
    ///
    /// Devices answer in one of four shapes: the full value
    /// (`chainId * 2 + 35 + recovery`), a bare recovery id (`0`/`1`), the
    /// pre-EIP-155 `27`/`28`, or the full value truncated to its low byte
    /// (Ledger, for chain ids whose `v` exceeds 255). With
    /// [`TransactionV::LowByte`] any single byte is read as the truncated
    /// form once the full value no longer fits.
    #[must_use]
    pub fn eip155_v(&self, device_v: u64, convention: TransactionV) -> u64 {
        let base = self.chain_id.saturating_mul(2).saturating_add(35);
        let low_byte = |v: u64| base.saturating_add(v.wrapping_sub(base & 0xff) & 1);

        if convention == TransactionV::LowByte && base > 0xff && device_v <= 0xff {
            return low_byte(device_v);
        }
        match device_v {
            v if v >= base => v,
            0 | 1 => base.saturating_add(device_v),
            27 | 28 => base.saturating_add(device_v - 27),
            v => low_byte(v),
        }
    }

    /// Encodes the signed transaction:
    /// `rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])`.
    ///
    /// # Errors
    ///
    /// Returns an error if `r` or `s` are not 32-byte hex words.
    pub fn signed_rlp(&self, signature: &RawSignature, convention: TransactionV) -> Result<Vec<u8>> {
        let r = signature.r_bytes()?;
        let s = signature.s_bytes()?;
        let v = self.eip155_v(signature.v, convention);

        let mut buf = Vec::new();
        encode_rlp_list(&mut buf, |buf| {
            self.encode_fields(buf);
            v.encode(buf);
            encode_bytes32(&r, buf);
            encode_bytes32(&s, buf);
        });

        Ok(buf)
    }

    fn encode_fields(&self, buf: &mut Vec<u8>) {
        self.nonce.encode(buf);
        encode_u256(&self.gas_price, buf);
        self.gas_limit.encode(buf);
        self.to.inner().encode(buf);
        encode_u256(&self.value, buf);
        self.data.as_slice().encode(buf);
    }
}

/// Decodes transaction call data.
///
/// `0x0`, `0x` and the empty string all mean "no data", since the assembler
/// defaults missing data to `0x0`.
///
/// # Errors
///
/// Returns [`Error::CallerInput`] for anything that is not hex.
pub fn decode_data(data: &str) -> Result<Vec<u8>> {
    let trimmed = data.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits == "0" {
        return Ok(Vec::new());
    }
    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{digits}");
        padded.as_str()
    } else {
        digits
    };
    hex::decode(digits).map_err(|e| Error::input(format!("invalid data `{data}`: {e}")))
}

/// Encodes an RLP list using a closure to write elements.
fn encode_rlp_list<F>(out: &mut Vec<u8>, f: F)
where
    F: FnOnce(&mut Vec<u8>),
{
    let mut content = Vec::new();
    f(&mut content);

    let header = alloy_rlp::Header {
        list: true,
        payload_length: content.len(),
    };
    header.encode(out);
    out.extend_from_slice(&content);
}

/// Encodes a U256 as RLP (strips leading zeros).
fn encode_u256(value: &U256, out: &mut Vec<u8>) {
    let bytes = value.to_be_bytes::<32>();
    encode_bytes32(&bytes, out);
}

/// Encodes a 32-byte word as a scalar, stripping leading zeros.
fn encode_bytes32(bytes: &[u8; 32], out: &mut Vec<u8>) {
    match bytes.iter().position(|&b| b != 0) {
        Some(start) => bytes[start..].encode(out),
        None => out.push(alloy_rlp::EMPTY_STRING_CODE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The worked example from EIP-155.
    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            chain_id: 1,
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21000,
            to: Address::new([0x35; 20]),
            value: U256::from(1_000_000_000_000_000_000u128),
            data: vec![],
        }
    }

    const EIP155_R: &str = "0x28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276";
    const EIP155_S: &str = "0x67cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";
    const EIP155_SIGNED: &str = "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";

    #[test]
    fn unsigned_payload_matches_eip155() {
        assert_eq!(
            hex::encode(eip155_example().unsigned_rlp()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
    }

    #[test]
    fn signing_hash_matches_eip155() {
        assert_eq!(
            hex::encode(eip155_example().signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn signed_payload_matches_eip155() {
        let tx = eip155_example();
        for device_v in [37, 0, 27] {
            let sig = RawSignature::new(EIP155_R, EIP155_S, device_v);
            assert_eq!(
                hex::encode(tx.signed_rlp(&sig, TransactionV::Inferred).unwrap()),
                EIP155_SIGNED
            );
        }
        // a Ledger on chain 1 reports the full value, which fits a byte
        let sig = RawSignature::new(EIP155_R, EIP155_S, 37);
        assert_eq!(
            hex::encode(tx.signed_rlp(&sig, TransactionV::LowByte).unwrap()),
            EIP155_SIGNED
        );
    }

    #[test]
    fn eip155_v_shapes() {
        let rsk = LegacyTransaction {
            chain_id: 30,
            ..eip155_example()
        };
        assert_eq!(rsk.eip155_v(95, TransactionV::Inferred), 95);
        assert_eq!(rsk.eip155_v(96, TransactionV::Inferred), 96);
        assert_eq!(rsk.eip155_v(1, TransactionV::Inferred), 96);
        assert_eq!(rsk.eip155_v(28, TransactionV::Inferred), 96);
        assert_eq!(rsk.eip155_v(96, TransactionV::LowByte), 96);

        // chain 1000: v = 2035/2036, whose low bytes are 0xf3/0xf4
        let large = LegacyTransaction {
            chain_id: 1000,
            ..eip155_example()
        };
        assert_eq!(large.eip155_v(0xf3, TransactionV::Inferred), 2035);
        assert_eq!(large.eip155_v(0xf4, TransactionV::LowByte), 2036);
    }

    #[test]
    fn low_byte_wins_where_it_collides_with_recovery_ids() {
        // chain 111: v = 257/258, low bytes 0x01/0x02
        let tx = LegacyTransaction {
            chain_id: 111,
            ..eip155_example()
        };
        assert_eq!(tx.eip155_v(0x01, TransactionV::LowByte), 257);
        assert_eq!(tx.eip155_v(0x02, TransactionV::LowByte), 258);
        assert_eq!(tx.eip155_v(257, TransactionV::LowByte), 257);

        assert_eq!(tx.eip155_v(0, TransactionV::Inferred), 257);
        assert_eq!(tx.eip155_v(1, TransactionV::Inferred), 258);
    }

    #[test]
    fn huge_chain_ids_do_not_overflow() {
        let tx = LegacyTransaction {
            chain_id: u64::MAX,
            ..eip155_example()
        };
        assert_eq!(tx.eip155_v(1, TransactionV::Inferred), u64::MAX);
        assert_eq!(tx.eip155_v(28, TransactionV::Inferred), u64::MAX);
        assert_eq!(tx.eip155_v(0x42, TransactionV::LowByte), u64::MAX);
    }

    #[test]
    fn zero_fields_encode_as_empty_strings() {
        let tx = LegacyTransaction {
            chain_id: 31,
            nonce: 0,
            gas_price: U256::ZERO,
            gas_limit: 0,
            to: Address::zero(),
            value: U256::ZERO,
            data: vec![],
        };
        let rlp = tx.unsigned_rlp();
        // list header, three empty scalars, then the 20-byte address
        assert_eq!(&rlp[1..5], &[0x80, 0x80, 0x80, 0x94]);
    }

    #[test]
    fn from_complete_converts_fields() {
        let complete = CompleteTransaction {
            from: "0x1111111111111111111111111111111111111111".into(),
            to: "0x3535353535353535353535353535353535353535".into(),
            nonce: 9,
            data: "0x0".into(),
            value: "0xde0b6b3a7640000".into(),
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21000,
        };
        let tx = LegacyTransaction::from_complete(&complete, ChainId::new(1)).unwrap();
        assert_eq!(tx, eip155_example());
    }

    #[test]
    fn decode_data_variants() {
        assert!(decode_data("0x0").unwrap().is_empty());
        assert!(decode_data("0x").unwrap().is_empty());
        assert!(decode_data("").unwrap().is_empty());
        assert_eq!(decode_data("0xdeadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_data("abc").unwrap(), vec![0x0a, 0xbc]);
        assert!(matches!(decode_data("0xzz"), Err(Error::CallerInput(_))));
    }
}
