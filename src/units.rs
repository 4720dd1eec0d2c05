//! Quantity parsing and unit formatting
//!
//! Wallet providers return quantities as 0x-prefixed hex strings, but some
//! (and most test doubles) answer with plain decimal strings. Both are accepted.

use crate::{Error, Result};
use alloy::primitives::utils::{self, ParseUnits};
use alloy::primitives::U256;

/// Decimals of the native currency on every EVM chain this crate presets.
pub const ETHER_DECIMALS: u8 = 18;

/// Parse a provider quantity (hex with `0x` prefix, or decimal) into a U256
pub fn parse_quantity(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some("") => return Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(raw, 10),
    };
    parsed.map_err(|e| Error::InvalidArgument(format!("Invalid quantity '{}': {}", raw, e)))
}

/// Parse a chain ID given as `0x`-hex or decimal
pub fn parse_chain_id(raw: &str) -> Result<u64> {
    let value = parse_quantity(raw)?;
    u64::try_from(value)
        .map_err(|_| Error::InvalidArgument(format!("Chain ID out of range: {}", raw)))
}

/// Encode a chain ID the way wallets expect it in `wallet_*` calls
pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{:x}", chain_id)
}

/// Format a U256 value with decimals, trimming trailing zeros
pub fn format_units(value: U256, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}

/// Parse a decimal amount in whole-currency units into the smallest unit.
///
/// Amounts with more fractional digits than `decimals` are rejected rather
/// than truncated.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    if amount.is_empty() || amount == "." {
        return Err(Error::InvalidArgument("Empty amount".to_string()));
    }
    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > decimals as usize {
            return Err(Error::InvalidArgument(format!(
                "Amount '{}' has more than {} decimal places",
                amount, decimals
            )));
        }
    }

    match utils::parse_units(amount, decimals) {
        Ok(ParseUnits::U256(value)) => Ok(value),
        Ok(ParseUnits::I256(_)) => Err(Error::InvalidArgument(format!(
            "Amount '{}' is negative",
            amount
        ))),
        Err(e) => Err(Error::InvalidArgument(format!("Invalid amount '{}': {}", amount, e))),
    }
}
