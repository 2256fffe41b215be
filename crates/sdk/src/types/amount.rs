use std::fmt::Display;

use alloy::primitives::U256;

/// Quantity of a single token, in the token's smallest units.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Amount {
    /// Number of smallest units.
    pub quantity: U256,

    /// Number of decimal digits in the whole-token representation.
    pub fractional_digits: u8,

    /// Token ticker, e.g. `ETH` or `IOV`.
    pub ticker: String,
}

impl Amount {
    pub fn new(quantity: U256, fractional_digits: u8, ticker: impl Into<String>) -> Self {
        Self { quantity, fractional_digits, ticker: ticker.into() }
    }

    /// Ether amount in wei.
    pub fn ether(wei: U256) -> Self { Self::new(wei, 18, "ETH") }

    /// Whole and fractional parts in decimal.
    fn decimal(&self) -> (U256, String) {
        let scale = U256::from(10).pow(U256::from(self.fractional_digits));
        let (whole, fraction) = self.quantity.div_rem(scale);
        let fraction = format!("{:0>width$}", fraction.to_string(), width = self.fractional_digits as usize);
        (whole, fraction.trim_end_matches('0').to_string())
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (whole, fraction) = self.decimal();
        if fraction.is_empty() {
            write!(f, "{} {}", whole, self.ticker)
        } else {
            write!(f, "{}.{} {}", whole, fraction, self.ticker)
        }
    }
}
