//! ---
//! pki_section: "01-common-foundation"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Shared primitives and utilities for the R-PKI core."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CaError, CaResult};

/// Certificate serial number: an unbounded unsigned integer stored as
/// normalized big-endian bytes (no leading zero octets, zero is `[0]`).
///
/// Serialized as a lowercase hex string so records and audit entries stay
/// readable.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerialNumber(Vec<u8>);

impl SerialNumber {
    /// Build a serial from big-endian bytes, normalizing leading zeros.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let normalized = if first == bytes.len() {
            vec![0]
        } else {
            bytes[first..].to_vec()
        };
        Self(normalized)
    }

    /// Parse a hex serial, with or without a `0x` prefix.
    pub fn from_hex(input: &str) -> CaResult<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(CaError::BadInput("empty serial number".into()));
        }
        let padded = if digits.len() % 2 == 1 {
            format!("0{digits}")
        } else {
            digits.to_owned()
        };
        let bytes = hex::decode(&padded)
            .map_err(|err| CaError::BadInput(format!("malformed serial {trimmed}: {err}")))?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Big-endian byte view.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<u64> for SerialNumber {
    fn from(value: u64) -> Self {
        Self::from_bytes(&value.to_be_bytes())
    }
}

impl TryFrom<String> for SerialNumber {
    type Error = CaError;

    fn try_from(value: String) -> CaResult<Self> {
        Self::from_hex(&value)
    }
}

impl From<SerialNumber> for String {
    fn from(serial: SerialNumber) -> Self {
        serial.to_hex()
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({self})")
    }
}

impl Ord for SerialNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        // Normalized big-endian bytes order numerically by (length, bytes).
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for SerialNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
