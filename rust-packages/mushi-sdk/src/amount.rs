//! Decimal string to fixed-point conversion.

use std::fmt;

use crate::error::{MushiError, MushiResult};

/// The two assets the program moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    /// The program's own token, minted by `start`.
    Base,
    /// The collateral/settlement token configured at initialisation.
    Quote,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Base => write!(f, "base"),
            Asset::Quote => write!(f, "quote"),
        }
    }
}

/// Decimal places of each asset's mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetScales {
    pub base: u8,
    pub quote: u8,
}

impl AssetScales {
    pub fn of(&self, asset: Asset) -> u8 {
        match asset {
            Asset::Base => self.base,
            Asset::Quote => self.quote,
        }
    }
}

/// Parse a strictly positive decimal string into base units at `decimals`
/// places. More fractional digits than the scale allows is an error rather
/// than a silent truncation.
pub fn parse_amount(input: &str, decimals: u8) -> MushiResult<u64> {
    let raw = parse_fixed(input, decimals)?;
    if raw == 0 {
        return Err(MushiError::invalid_input(format!("amount must be positive, got {input:?}")));
    }
    Ok(raw)
}

/// Like [`parse_amount`] but accepts zero.
pub fn parse_fixed(input: &str, decimals: u8) -> MushiResult<u64> {
    let invalid = |why: &str| MushiError::invalid_input(format!("{why}: {input:?}"));
    let (whole, frac) = split_decimal(input)?;
    if frac.len() > decimals as usize {
        return Err(invalid(&format!("more than {decimals} decimal places")));
    }

    let scale = 10u64
        .checked_pow(u32::from(decimals))
        .ok_or_else(|| invalid("scale too large"))?;
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid("amount too large"))?
    };
    let frac_units: u64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse().map_err(|_| invalid("amount too large"))?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(|| invalid("amount too large"))
}

/// Checks that `input` is a strictly positive decimal without knowing the
/// asset's scale yet.
pub fn check_positive(input: &str) -> MushiResult<()> {
    let (whole, frac) = split_decimal(input)?;
    if whole.bytes().chain(frac.bytes()).all(|b| b == b'0') {
        return Err(MushiError::invalid_input(format!("amount must be positive, got {input:?}")));
    }
    Ok(())
}

fn split_decimal(input: &str) -> MushiResult<(&str, &str)> {
    let invalid = |why: &str| MushiError::invalid_input(format!("{why}: {input:?}"));
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid("empty amount"));
    }
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("not a number"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a non-negative decimal"));
    }
    Ok((whole, frac))
}

/// Render base units back to a decimal string, trimming trailing zeros.
pub fn format_amount(raw: u64, decimals: u8) -> String {
    let scale = match 10u128.checked_pow(u32::from(decimals)) {
        Some(scale) if decimals > 0 => scale,
        _ => return raw.to_string(),
    };
    let whole = u128::from(raw) / scale;
    let frac = u128::from(raw) % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
