//! Device signatures and their normalized `r‖s‖v` form.
//!
//! Vendor SDKs return signatures as loose `{r, s, v}` triples: `r` and `s`
//! as hex strings, `v` either as a number or as a hex string, and `v` in
//! either the legacy `27`/`28` convention or as a bare recovery id. Some
//! return the 65 bytes already concatenated. This module turns all of them
//! into one [`Signature`] whose hex form ends in `00` or `01`.
//!
//! # Example
//!
//! ```
//! use hardware_evm_provider_core::{RawSignature, Signature};
//!
//! let raw = RawSignature::new("11".repeat(32), "22".repeat(32), 28);
//! let sig = Signature::from_raw(&raw).unwrap();
//! assert!(sig.to_hex().ends_with("01"));
//! ```

use core::fmt;

use crate::error::{Error, Result};

/// Offset of the legacy Ethereum `v` convention.
const LEGACY_V_OFFSET: u64 = 27;

/// A signature triple as returned by a vendor SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignature {
    /// `r` as hex, `0x` prefix optional.
    pub r: String,

    /// `s` as hex, `0x` prefix optional.
    pub s: String,

    /// `v` in the device's own convention.
    pub v: u64,
}

impl RawSignature {
    /// Creates a triple.
    #[must_use]
    pub fn new(r: impl Into<String>, s: impl Into<String>, v: u64) -> Self {
        Self {
            r: r.into(),
            s: s.into(),
            v,
        }
    }

    /// Creates a triple whose `v` arrives as a hex string (`"25"`, `"0x25"`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if `v` is not hex.
    pub fn from_hex_parts(r: impl Into<String>, s: impl Into<String>, v: &str) -> Result<Self> {
        let digits = strip_hex_prefix(v.trim());
        let v = u64::from_str_radix(digits, 16)
            .map_err(|_| Error::InvalidSignature(format!("invalid v `{v}`")))?;
        Ok(Self::new(r, s, v))
    }

    /// Splits a concatenated 65-byte `r‖s‖v` hex signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] for non-hex input and
    /// [`Error::InvalidSignature`] for the wrong length.
    pub fn from_concatenated(signature: &str) -> Result<Self> {
        let bytes = hex::decode(strip_hex_prefix(signature.trim()))?;
        if bytes.len() != Signature::BYTE_LEN {
            return Err(Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Signature::BYTE_LEN,
                bytes.len()
            )));
        }
        Ok(Self::new(
            hex::encode(&bytes[0..32]),
            hex::encode(&bytes[32..64]),
            u64::from(bytes[64]),
        ))
    }

    /// Decodes `r` into a 32-byte word.
    ///
    /// # Errors
    ///
    /// Returns an error if `r` is not hex or longer than 32 bytes.
    pub fn r_bytes(&self) -> Result<[u8; 32]> {
        decode_word(&self.r, "r")
    }

    /// Decodes `s` into a 32-byte word.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not hex or longer than 32 bytes.
    pub fn s_bytes(&self) -> Result<[u8; 32]> {
        decode_word(&self.s, "s")
    }
}

/// A normalized ECDSA signature over secp256k1.
///
/// # Wire Format
///
/// `r (32 bytes) || s (32 bytes) || v (1 byte)`, where `v` is the recovery
/// byte re-based from the `27`/`28` convention to `0`/`1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// The R component of the signature (32 bytes).
    r: [u8; 32],

    /// The S component of the signature (32 bytes).
    s: [u8; 32],

    /// The re-based recovery byte.
    v: u8,
}

impl Signature {
    /// The length of a serialized signature in bytes.
    pub const BYTE_LEN: usize = 65;

    /// Creates a new signature from raw components.
    #[must_use]
    pub const fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Normalizes a vendor triple.
    ///
    /// A `v` of 27 or more is re-based by 27; smaller values are taken as a
    /// recovery id already. Only the low byte is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if `r` or `s` cannot be decoded.
    pub fn from_raw(raw: &RawSignature) -> Result<Self> {
        let rebased = if raw.v >= LEGACY_V_OFFSET {
            raw.v - LEGACY_V_OFFSET
        } else {
            raw.v
        };
        let [v, ..] = rebased.to_le_bytes();
        Ok(Self::new(raw.r_bytes()?, raw.s_bytes()?, v))
    }

    /// Serializes the signature to a 65-byte array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Returns the R component of the signature.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// Returns the S component of the signature.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Returns the re-based recovery byte.
    #[must_use]
    pub const fn v(&self) -> u8 {
        self.v
    }

    /// Encodes the signature as a hex string with `0x` prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use hardware_evm_provider_core::Signature;
    ///
    /// let sig = Signature::new([0u8; 32], [0u8; 32], 0);
    /// let hex = sig.to_hex();
    /// assert!(hex.starts_with("0x"));
    /// assert_eq!(hex.len(), 132); // "0x" + 130 hex chars
    /// ```
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Decodes up to 32 bytes of hex, left-padding to a full word.
fn decode_word(hex_str: &str, component: &str) -> Result<[u8; 32]> {
    let mut digits = strip_hex_prefix(hex_str.trim()).to_string();
    if digits.len() % 2 == 1 {
        digits.insert(0, '0');
    }
    let bytes = hex::decode(&digits)?;
    if bytes.len() > 32 {
        return Err(Error::InvalidSignature(format!(
            "{component} is {} bytes long",
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}
