//! Numeric transaction fields as dapps send them.
//!
//! A quantity may arrive as a JSON number, a `0x` hex string or a decimal
//! string. Anything else is a caller error; nothing is silently coerced to
//! zero.

use core::fmt;
use core::str::FromStr;

use alloy_primitives::U256;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};

/// A non-negative integer transaction field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quantity(U256);

impl Quantity {
    /// Wraps a value.
    #[must_use]
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// Returns the value.
    #[must_use]
    pub const fn value(self) -> U256 {
        self.0
    }

    /// Formats as lowercase `0x` hex (`0x0` for zero).
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("0x{:x}", self.0)
    }

    /// Narrows to `u64`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallerInput`] naming `field` when the value overflows.
    pub fn to_u64(self, field: &str) -> Result<u64> {
        u64::try_from(self.0)
            .map_err(|_| Error::input(format!("`{field}` does not fit in 64 bits")))
    }
}

impl From<u64> for Quantity {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Quantity {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some("") => Ok(U256::ZERO),
            Some(hex) => U256::from_str_radix(hex, 16),
            None if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) => {
                U256::from_str_radix(trimmed, 10)
            }
            None => return Err(Error::input(format!("invalid numeric value `{s}`"))),
        };
        parsed
            .map(Self)
            .map_err(|_| Error::input(format!("invalid numeric value `{s}`")))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        struct QuantityVisitor;

        impl Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer, hex string or decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> core::result::Result<Quantity, E> {
                Ok(Quantity::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> core::result::Result<Quantity, E> {
                u64::try_from(v)
                    .map(Quantity::from)
                    .map_err(|_| E::custom("quantity must not be negative"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> core::result::Result<Quantity, E> {
                if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v < u64::MAX as f64 {
                    #[expect(
                        clippy::cast_possible_truncation,
                        clippy::cast_sign_loss,
                        reason = "checked integral and in range above"
                    )]
                    let integral = v as u64;
                    Ok(Quantity::from(integral))
                } else {
                    Err(E::custom(format!("invalid numeric value `{v}`")))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> core::result::Result<Quantity, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}
