//! Core value types: addresses, ids, fixed-point amounts and share math.
//!
//! Amounts are 18-decimal integers (wei). All pro-rata math multiplies before
//! dividing; when the product does not fit in `u128` the intermediate is
//! carried in a `BigUint`, so `a * b / d` never loses precision to overflow.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Underlying asset amount or share amount, in wei.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// One whole token with 18 decimals.
pub const WAD: Amount = 1_000_000_000_000_000_000;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u128 = 10_000;

pub const SECONDS_PER_DAY: u64 = 86_400;

// =============================================================================
// HEX NEWTYPES
// =============================================================================

/// Error returned when parsing a hex address or id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex identifier '{input}': expected {expected} bytes")]
pub struct ParseIdError {
    pub input: String,
    pub expected: usize,
}

macro_rules! hex_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// First four bytes, for compact log fields.
            pub fn short(&self) -> String {
                format!("0x{}", hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let err = || ParseIdError {
                    input: s.to_string(),
                    expected: $len,
                };
                let trimmed = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(trimmed).map_err(|_| err())?;
                let arr: [u8; $len] = bytes.try_into().map_err(|_| err())?;
                Ok(Self(arr))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(
    /// 20-byte account or contract address.
    Address,
    20
);

hex_newtype!(
    /// Content-derived market identifier.
    MarketId,
    32
);

hex_newtype!(
    /// Content-derived epoch identifier.
    EpochId,
    32
);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Deterministic address from a label (first 20 bytes of its SHA-256).
    ///
    /// Used for simulated accounts and for contract addresses created by the
    /// factory.
    pub fn derive(label: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(label.as_ref());
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Address(out)
    }
}

// =============================================================================
// VAULT SIDE
// =============================================================================

/// Which half of a market a vault holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultSide {
    Premium,
    Collateral,
}

impl VaultSide {
    /// Index used by `market_id_to_vaults`.
    pub fn index(&self) -> usize {
        match self {
            VaultSide::Premium => 0,
            VaultSide::Collateral => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(VaultSide::Premium),
            1 => Some(VaultSide::Collateral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VaultSide::Premium => "premium",
            VaultSide::Collateral => "collateral",
        }
    }
}

impl fmt::Display for VaultSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// MATH
// =============================================================================

fn biguint_to_u128(value: &BigUint) -> Option<u128> {
    let digits = value.to_u64_digits();
    match digits.len() {
        0 => Some(0),
        1 => Some(digits[0] as u128),
        2 => Some(((digits[1] as u128) << 64) | digits[0] as u128),
        _ => None,
    }
}

fn mul_div(a: Amount, b: Amount, denominator: Amount, round_up: bool) -> Option<Amount> {
    if denominator == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        let quotient = product / denominator;
        if round_up && product % denominator != 0 {
            return quotient.checked_add(1);
        }
        return Some(quotient);
    }

    let product = BigUint::from(a) * BigUint::from(b);
    let denom = BigUint::from(denominator);
    let mut quotient = &product / &denom;
    if round_up && (&product % &denom) != BigUint::from(0u32) {
        quotient += 1u32;
    }
    biguint_to_u128(&quotient)
}

/// `floor(a * b / denominator)`. `None` on zero denominator or overflow of
/// the result.
pub fn mul_div_down(a: Amount, b: Amount, denominator: Amount) -> Option<Amount> {
    mul_div(a, b, denominator, false)
}

/// `ceil(a * b / denominator)`.
pub fn mul_div_up(a: Amount, b: Amount, denominator: Amount) -> Option<Amount> {
    mul_div(a, b, denominator, true)
}

/// Truncating basis-point fee: `amount * bps / 10_000`.
pub fn bps_of(amount: Amount, bps: u16) -> Amount {
    // bps <= u16::MAX keeps this within the u128 fast path unless amount is
    // within 2^16 of u128::MAX, where the BigUint path takes over.
    mul_div_down(amount, bps as u128, BPS_DENOMINATOR).unwrap_or(0)
}

/// Parse a decimal string into a fixed-point amount.
///
/// `parse_units("9.95", 18)` is `9_950_000_000_000_000_000`. Returns `None`
/// for malformed input or more fractional digits than `decimals`.
pub fn parse_units(value: &str, decimals: u32) -> Option<Amount> {
    let value = value.trim();
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > decimals as usize {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let scale = 10u128.checked_pow(decimals)?;
    let whole_units: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse().ok()?
    };
    whole_units.checked_mul(scale)?.checked_add(frac_units)
}

/// `parse_units(value, 18)`.
pub fn parse_ether(value: &str) -> Option<Amount> {
    parse_units(value, 18)
}

/// Render an amount with 18 decimals, trimming trailing zeros.
pub fn format_ether(amount: Amount) -> String {
    let whole = amount / WAD;
    let frac = amount % WAD;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:018}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
