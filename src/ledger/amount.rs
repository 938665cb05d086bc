// Fixed-point amounts - 8 decimal digits, stored as integer minor units

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minor units per whole coin (8 decimal digits of precision)
pub const COIN: u64 = 100_000_000;

/// Errors that can occur when parsing an amount
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount string")]
    Empty,

    #[error("invalid digit in amount")]
    InvalidDigit,

    #[error("too many decimal places: {0} (max 8)")]
    TooManyDecimals(usize),

    #[error("amount out of range")]
    OutOfRange,
}

/// A non-negative fixed-point amount with 8 decimal digits.
///
/// Stored as integer minor units to avoid floating point drift; all
/// arithmetic is checked or saturating, never silently wrapping.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Create from raw minor units
    pub fn from_minor_units(units: u64) -> Self {
        Self(units)
    }

    /// Create from a whole number of coins
    pub fn from_coins(coins: u64) -> Option<Self> {
        coins.checked_mul(COIN).map(Self)
    }

    /// Raw minor units
    pub fn minor_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Parse a decimal string like "100", "0.01" or "899.99000000"
    pub fn parse(s: &str) -> Result<Amount, AmountError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        if frac_part.len() > 8 {
            return Err(AmountError::TooManyDecimals(frac_part.len()));
        }

        let int_units: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| AmountError::InvalidDigit)?
        };

        let frac_units: u64 = if frac_part.is_empty() {
            0
        } else {
            if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AmountError::InvalidDigit);
            }
            let padded = format!("{:0<8}", frac_part);
            padded.parse().map_err(|_| AmountError::InvalidDigit)?
        };

        int_units
            .checked_mul(COIN)
            .and_then(|u| u.checked_add(frac_units))
            .map(Amount)
            .ok_or(AmountError::OutOfRange)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}

/// A fee rate expressed in parts per million of the transfer amount.
///
/// The default of 100 ppm corresponds to a 0.0001 rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRate(u32);

impl FeeRate {
    const SCALE: u128 = 1_000_000;

    pub fn from_ppm(ppm: u32) -> Self {
        Self(ppm)
    }

    pub fn ppm(&self) -> u32 {
        self.0
    }

    /// Fee for a given amount, rounded half-up to minor units
    pub fn fee_for(&self, amount: Amount) -> Amount {
        let raw = amount.minor_units() as u128 * self.0 as u128;
        let fee = (raw + Self::SCALE / 2) / Self::SCALE;
        // A u64 amount times a u32 rate divided by 1e6 always fits back in u64
        Amount::from_minor_units(fee as u64)
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        Self(100)
    }
}
