//! Wallet addresses — the subjects facts and records pertain to.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A 20-byte account address in `0x`-prefixed hex form.
///
/// Parsing normalises to lowercase so that two spellings of the same address
/// compare (and hash) equal; lock and cache keys depend on that.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
  /// Number of raw bytes in an address.
  pub const BYTES: usize = 20;

  pub fn parse(input: &str) -> Result<Self> {
    let trimmed = input.trim();
    let digits = trimmed
      .strip_prefix("0x")
      .or_else(|| trimmed.strip_prefix("0X"))
      .ok_or_else(|| Error::InvalidAddress(input.to_owned()))?;

    match hex::decode(digits) {
      Ok(bytes) if bytes.len() == Self::BYTES => {
        Ok(Self(format!("0x{}", hex::encode(bytes))))
      }
      _ => Err(Error::InvalidAddress(input.to_owned())),
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for Address {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for Address {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<Address> for String {
  fn from(a: Address) -> Self { a.0 }
}
