//! BIP-32 derivation paths and the per-chain default path table.
//!
//! # Example
//!
//! ```
//! use hardware_evm_provider_core::{ChainId, dpath};
//!
//! let path = dpath::resolve(ChainId::new(30)).unwrap();
//! assert_eq!(path.as_str(), "44'/137'/0'/0/0");
//! ```

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::error::{Error, Result};

/// RSK mainnet path (registered coin type 137, no `m` prefix).
const RSK_MAINNET_PATH: &str = "44'/137'/0'/0/0";

/// Ethereum path, shared by RSK testnet and the Ethereum networks.
const ETHEREUM_PATH: &str = "m/44'/60'/0'/0/0";

/// Largest non-hardened child index.
const MAX_INDEX: u32 = 0x7FFF_FFFF;

/// A validated BIP-32 derivation path.
///
/// Both `m/44'/60'/0'/0/0` and the unprefixed `44'/60'/0'/0/0` forms are
/// accepted and kept verbatim, since vendor SDKs receive the string as is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DerivationPath(String);

impl DerivationPath {
    /// Parses and validates a path.
    ///
    /// Every segment must be a decimal index below 2^31, optionally marked
    /// hardened with `'` or `h`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallerInput`] if the string is not in BIP-32 notation.
    pub fn parse(path: &str) -> Result<Self> {
        let body = path.strip_prefix("m/").unwrap_or(path);
        if body.is_empty() {
            return Err(Error::input(format!("empty derivation path `{path}`")));
        }

        for segment in body.split('/') {
            let index = segment
                .strip_suffix('\'')
                .or_else(|| segment.strip_suffix('h'))
                .unwrap_or(segment);
            let valid = !index.is_empty()
                && index.bytes().all(|b| b.is_ascii_digit())
                && index.parse::<u32>().is_ok_and(|i| i <= MAX_INDEX);
            if !valid {
                return Err(Error::input(format!(
                    "invalid derivation path segment `{segment}` in `{path}`"
                )));
            }
        }

        Ok(Self(path.to_string()))
    }

    /// Returns the path as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DerivationPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DerivationPath> for String {
    fn from(path: DerivationPath) -> Self {
        path.0
    }
}

/// Returns the default derivation path for `chain_id`.
///
/// Unknown chains are a hard error, never a guess.
///
/// # Errors
///
/// Returns [`Error::UnsupportedNetwork`] for any chain outside the table.
pub fn resolve(chain_id: ChainId) -> Result<DerivationPath> {
    let path = match chain_id.get() {
        30 => RSK_MAINNET_PATH,
        31 | 1 | 3 | 4 | 5 => ETHEREUM_PATH,
        _ => return Err(Error::UnsupportedNetwork(chain_id)),
    };
    Ok(DerivationPath(path.to_string()))
}

/// Uses `explicit` when given, otherwise [`resolve`]s from the chain.
///
/// # Errors
///
/// Returns [`Error::CallerInput`] for a malformed explicit path and
/// [`Error::UnsupportedNetwork`] when neither source yields a path.
pub fn resolve_or_explicit(explicit: Option<&str>, chain_id: ChainId) -> Result<DerivationPath> {
    explicit.map_or_else(|| resolve(chain_id), DerivationPath::parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chains() {
        assert_eq!(resolve(ChainId::new(30)).unwrap().as_str(), "44'/137'/0'/0/0");
        for id in [31, 1, 3, 4, 5] {
            assert_eq!(
                resolve(ChainId::new(id)).unwrap().as_str(),
                "m/44'/60'/0'/0/0"
            );
        }
    }

    #[test]
    fn unknown_chain_is_unsupported() {
        for id in [0, 2, 42, 137, 1337] {
            assert!(matches!(
                resolve(ChainId::new(id)),
                Err(Error::UnsupportedNetwork(c)) if c == ChainId::new(id)
            ));
        }
    }

    #[test]
    fn explicit_path_wins() {
        let path = resolve_or_explicit(Some("m/44'/60'/0'/0/3"), ChainId::new(9999)).unwrap();
        assert_eq!(path.as_str(), "m/44'/60'/0'/0/3");

        let path = resolve_or_explicit(None, ChainId::new(31)).unwrap();
        assert_eq!(path.as_str(), "m/44'/60'/0'/0/0");
    }

    #[test]
    fn parse_accepts_both_notations() {
        assert!(DerivationPath::parse("m/44'/60'/0'/0/0").is_ok());
        assert!(DerivationPath::parse("44'/137'/0'/0/0").is_ok());
        assert!(DerivationPath::parse("m/44h/60h/0h/0/1").is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "m/", "m/44'//0", "m/abc", "m/44'/60'/-1", "m/4294967295"] {
            assert!(
                matches!(DerivationPath::parse(bad), Err(Error::CallerInput(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn serde_validates() {
        let ok: DerivationPath = serde_json::from_str("\"m/44'/60'/0'/0/0\"").unwrap();
        assert_eq!(ok.to_string(), "m/44'/60'/0'/0/0");
        assert!(serde_json::from_str::<DerivationPath>("\"nope\"").is_err());
    }
}
