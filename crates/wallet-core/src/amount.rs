//! Chain amounts and conversion ratios.
//!
//! Everything here is integer arithmetic on [`BigInt`]/[`BigUint`] in the
//! asset's smallest unit (milli-STEEM, milli-SBD, micro-VESTS). Floats only
//! appear at the display boundary.

use std::fmt;
use std::str::FromStr;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

/// Asset symbols the wallet understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetSymbol {
    /// Liquid token (3 decimals)
    Steem,
    /// Dollar-pegged token (3 decimals)
    Sbd,
    /// Vesting shares (6 decimals)
    Vests,
}

impl AssetSymbol {
    /// Number of decimals on chain.
    pub fn precision(self) -> u32 {
        match self {
            Self::Steem | Self::Sbd => 3,
            Self::Vests => 6,
        }
    }

    /// Ticker as printed by the chain.
    pub fn ticker(self) -> &'static str {
        match self {
            Self::Steem => "STEEM",
            Self::Sbd => "SBD",
            Self::Vests => "VESTS",
        }
    }

    fn from_ticker(ticker: &str) -> Option<Self> {
        match ticker {
            "STEEM" | "TESTS" => Some(Self::Steem),
            "SBD" | "TBD" => Some(Self::Sbd),
            "VESTS" => Some(Self::Vests),
            _ => None,
        }
    }
}

/// An amount in the smallest unit of its symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Amount in smallest units (e.g. 1.234 STEEM is 1234)
    pub amount: BigInt,
    /// Symbol
    pub symbol: AssetSymbol,
}

impl Asset {
    /// Zero of the given symbol.
    pub fn zero(symbol: AssetSymbol) -> Self {
        Self {
            amount: BigInt::zero(),
            symbol,
        }
    }

    /// Build from smallest units.
    pub fn from_units(amount: impl Into<BigInt>, symbol: AssetSymbol) -> Self {
        Self {
            amount: amount.into(),
            symbol,
        }
    }

    /// Parse a chain asset string such as `"1.234 STEEM"`.
    pub fn parse(s: &str) -> WalletResult<Self> {
        let mut parts = s.split_whitespace();
        let (Some(number), Some(ticker), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(WalletError::decode("asset", format!("expected \"<amount> <SYMBOL>\", got {s:?}")));
        };
        let symbol = AssetSymbol::from_ticker(ticker)
            .ok_or_else(|| WalletError::decode("asset", format!("unknown symbol {ticker:?}")))?;
        let (units, scale) = parse_decimal(number)?;
        let precision = symbol.precision();
        if scale > precision {
            return Err(WalletError::decode(
                "asset",
                format!("{number} has more than {precision} decimals for {ticker}"),
            ));
        }
        Ok(Self {
            amount: units * BigInt::from(10u32).pow(precision - scale),
            symbol,
        })
    }

    /// Amount clamped at zero, as an unsigned integer.
    pub fn non_negative(&self) -> BigUint {
        self.amount.to_biguint().unwrap_or_default()
    }

    /// Decimal string without the symbol, e.g. `"1.234"`.
    pub fn format_amount(&self) -> String {
        format_units(&self.amount, self.symbol.precision())
    }

    /// Approximate value for display.
    pub fn to_f64(&self) -> f64 {
        let scale = 10f64.powi(self.symbol.precision() as i32);
        self.amount.to_f64().unwrap_or(0.0) / scale
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format_amount(), self.symbol.ticker())
    }
}

impl FromStr for Asset {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a plain decimal string into `(units, scale)` so that
/// `value = units / 10^scale`. No floating point is involved.
pub fn parse_decimal(s: &str) -> WalletResult<(BigInt, u32)> {
    let bad = || WalletError::decode("decimal", format!("not a decimal number: {s:?}"));
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let digits = format!("{int_part}{frac_part}");
    let magnitude = BigUint::parse_bytes(digits.as_bytes(), 10).ok_or_else(bad)?;
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Ok((BigInt::from_biguint(sign, magnitude), frac_part.len() as u32))
}

/// Render smallest units with a fixed number of decimals.
pub fn format_units(amount: &BigInt, precision: u32) -> String {
    let scale = BigUint::from(10u32).pow(precision);
    let magnitude = amount.magnitude();
    let whole = magnitude / &scale;
    let frac = magnitude % &scale;
    let sign = if amount.sign() == Sign::Minus { "-" } else { "" };
    if precision == 0 {
        return format!("{sign}{whole}");
    }
    format!(
        "{sign}{whole}.{frac:0>width$}",
        frac = frac.to_string(),
        width = precision as usize
    )
}

/// Price of one STEEM expressed in SBD, kept as an exact fraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRatio {
    /// SBD side
    pub numerator: BigUint,
    /// STEEM side
    pub denominator: BigUint,
}

impl PriceRatio {
    /// Build from a median-price style pair (`base` SBD per `quote` STEEM).
    pub fn from_assets(base: &Asset, quote: &Asset) -> WalletResult<Self> {
        if base.symbol != AssetSymbol::Sbd || quote.symbol != AssetSymbol::Steem {
            return Err(WalletError::decode(
                "price",
                format!("expected SBD/STEEM pair, got {base} / {quote}"),
            ));
        }
        // Both sides carry 3 decimals, so the unit counts form the ratio directly.
        Ok(Self {
            numerator: base.non_negative(),
            denominator: quote.non_negative(),
        })
    }

    /// Build from a decimal quote such as the ticker's `"0.2500"`.
    pub fn from_decimal(s: &str) -> WalletResult<Self> {
        let (units, scale) = parse_decimal(s)?;
        Ok(Self {
            numerator: units.to_biguint().unwrap_or_default(),
            denominator: BigUint::from(10u32).pow(scale),
        })
    }

    /// Convert milli-STEEM into milli-SBD. A zero denominator converts to zero.
    pub fn steem_to_sbd(&self, steem_units: &BigUint) -> BigUint {
        if self.denominator.is_zero() {
            return BigUint::zero();
        }
        steem_units * &self.numerator / &self.denominator
    }

    /// Approximate value for display.
    pub fn to_f64(&self) -> f64 {
        match (self.numerator.to_f64(), self.denominator.to_f64()) {
            (Some(n), Some(d)) if d > 0.0 => n / d,
            _ => 0.0,
        }
    }
}

/// Global vesting-fund / vesting-shares ratio used to express VESTS as STEEM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingRatio {
    /// STEEM held by the vesting fund
    pub total_vesting_fund_steem: Asset,
    /// VESTS outstanding
    pub total_vesting_shares: Asset,
}

impl VestingRatio {
    /// Convert micro-VESTS into milli-STEEM. Zero shares converts to zero.
    pub fn vests_to_steem(&self, vests: &BigInt) -> BigInt {
        let shares = &self.total_vesting_shares.amount;
        if shares.is_zero() {
            return BigInt::zero();
        }
        vests * &self.total_vesting_fund_steem.amount / shares
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assets_into_smallest_units() {
        let steem = Asset::parse("1.234 STEEM").unwrap();
        assert_eq!(steem.amount, BigInt::from(1234));
        let vests = Asset::parse("12345678901234.567890 VESTS").unwrap();
        assert_eq!(
            vests.amount,
            "12345678901234567890".parse::<BigInt>().unwrap()
        );
        let short = Asset::parse("5 SBD").unwrap();
        assert_eq!(short.amount, BigInt::from(5000));
    }

    #[test]
    fn rejects_malformed_assets() {
        assert!(Asset::parse("1.2345 STEEM").is_err());
        assert!(Asset::parse("1.000 DOGE").is_err());
        assert!(Asset::parse("abc STEEM").is_err());
        assert!(Asset::parse("1.000").is_err());
    }

    #[test]
    fn formats_with_fixed_precision() {
        assert_eq!(Asset::parse("0.050 SBD").unwrap().to_string(), "0.050 SBD");
        assert_eq!(format_units(&BigInt::from(-1500), 3), "-1.500");
        assert_eq!(format_units(&BigInt::from(7), 6), "0.000007");
    }

    #[test]
    fn price_ratio_converts_exactly() {
        let price = PriceRatio::from_decimal("0.2500").unwrap();
        assert_eq!(price.steem_to_sbd(&BigUint::from(4000u32)), BigUint::from(1000u32));

        let median = PriceRatio::from_assets(
            &Asset::parse("0.250 SBD").unwrap(),
            &Asset::parse("1.000 STEEM").unwrap(),
        )
        .unwrap();
        assert_eq!(median.steem_to_sbd(&BigUint::from(4000u32)), BigUint::from(1000u32));
    }

    #[test]
    fn zero_denominators_convert_to_zero() {
        let price = PriceRatio {
            numerator: BigUint::from(1u32),
            denominator: BigUint::zero(),
        };
        assert!(price.steem_to_sbd(&BigUint::from(10u32)).is_zero());

        let ratio = VestingRatio {
            total_vesting_fund_steem: Asset::parse("100.000 STEEM").unwrap(),
            total_vesting_shares: Asset::zero(AssetSymbol::Vests),
        };
        assert!(ratio.vests_to_steem(&BigInt::from(10)).is_zero());
    }
}
