//! Integer price math. Prices stay scaled `U256` values until they are shown.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::PriceError;
use crate::gateway::{LiquidityPoolSnapshot, TokenMetadata};

pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

/// Convert a token-decimal scaled integer into display units
pub fn to_decimal(value: U256, decimals: u8) -> f64 {
    let scale = pow10(decimals);
    let whole = value / scale;
    let frac = value % scale;
    u256_to_f64(whole) + u256_to_f64(frac) / 10_f64.powi(decimals as i32)
}

/// A price as `value / 10^decimals` units of the reference token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaledPrice {
    pub value: U256,
    pub decimals: u8,
}

impl ScaledPrice {
    pub fn to_f64(&self) -> f64 {
        to_decimal(self.value, self.decimals)
    }
}

/// Price of `paired` in units of `reference`, from a snapshot holding both.
///
/// reference_balance * 10^paired_decimals / paired_balance
pub fn quote_price(
    snapshot: &LiquidityPoolSnapshot,
    paired: &TokenMetadata,
    reference: &TokenMetadata,
) -> Result<ScaledPrice, PriceError> {
    let paired_balance = snapshot
        .balance_of(&paired.address)
        .ok_or(PriceError::MissingTokenData(paired.address))?;
    let reference_balance = snapshot
        .balance_of(&reference.address)
        .ok_or(PriceError::MissingTokenData(reference.address))?;

    if paired_balance.is_zero() {
        return Err(PriceError::ZeroLiquidity(snapshot.pair));
    }

    let value = reference_balance
        .checked_mul(pow10(paired.decimals))
        .ok_or(PriceError::Overflow(snapshot.pair))?
        / paired_balance;

    Ok(ScaledPrice { value, decimals: reference.decimals })
}

/// Price of the pair's other side, given the paired token's price.
///
/// paired_price * paired_balance * 10^base_decimals / (base_balance * 10^paired_decimals)
pub fn base_price(
    paired_price: ScaledPrice,
    snapshot: &LiquidityPoolSnapshot,
    base: &TokenMetadata,
    paired: &TokenMetadata,
) -> Result<ScaledPrice, PriceError> {
    let base_balance = snapshot
        .balance_of(&base.address)
        .ok_or(PriceError::MissingTokenData(base.address))?;
    let paired_balance = snapshot
        .balance_of(&paired.address)
        .ok_or(PriceError::MissingTokenData(paired.address))?;

    if base_balance.is_zero() {
        return Err(PriceError::ZeroLiquidity(snapshot.pair));
    }

    let numerator = paired_price
        .value
        .checked_mul(paired_balance)
        .and_then(|n| n.checked_mul(pow10(base.decimals)))
        .ok_or(PriceError::Overflow(snapshot.pair))?;
    let denominator = base_balance
        .checked_mul(pow10(paired.decimals))
        .ok_or(PriceError::Overflow(snapshot.pair))?;

    Ok(ScaledPrice {
        value: numerator / denominator,
        decimals: paired_price.decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::snapshot;
    use alloy_primitives::Address;

    fn meta(address: Address, symbol: &str, decimals: u8) -> TokenMetadata {
        TokenMetadata { address, decimals, symbol: symbol.to_string(), name: String::new() }
    }

    fn dai() -> Address { Address::repeat_byte(0xda) }
    fn weth() -> Address { Address::repeat_byte(0xee) }
    fn xyz() -> Address { Address::repeat_byte(0x42) }

    fn e(n: u64, decimals: u8) -> U256 {
        U256::from(n) * pow10(decimals)
    }

    #[test]
    fn test_ratio_law() {
        let s = snapshot(Address::repeat_byte(0x5a), dai(), weth(), e(1000, 18), e(2000, 6));
        let price = quote_price(&s, &meta(weth(), "WETH", 6), &meta(dai(), "DAI", 18)).unwrap();
        assert_eq!(price, ScaledPrice { value: e(5, 17), decimals: 18 });
        assert_eq!(price.to_f64(), 0.5);
    }

    #[test]
    fn test_ratio_law_truncates_at_wei_scale() {
        // 1 wei of reference per 3 paired units: integer division, not float
        let s = snapshot(Address::repeat_byte(0x5a), dai(), weth(), U256::from(1u64), U256::from(3u64));
        let price = quote_price(&s, &meta(weth(), "WETH", 0), &meta(dai(), "DAI", 0)).unwrap();
        assert_eq!(price.value, U256::ZERO);
    }

    #[test]
    fn test_zero_paired_balance() {
        let pair = Address::repeat_byte(0x5a);
        let s = snapshot(pair, dai(), weth(), e(1000, 18), U256::ZERO);
        assert_eq!(
            quote_price(&s, &meta(weth(), "WETH", 6), &meta(dai(), "DAI", 18)),
            Err(PriceError::ZeroLiquidity(pair))
        );
    }

    #[test]
    fn test_base_price_in_integers() {
        // 400 XYZ vs 100 WETH, WETH = 0.5 → XYZ = 0.125
        let s = snapshot(Address::repeat_byte(0x77), xyz(), weth(), e(400, 18), e(100, 6));
        let weth_price = ScaledPrice { value: e(5, 17), decimals: 18 };
        let price = base_price(weth_price, &s, &meta(xyz(), "XYZ", 18), &meta(weth(), "WETH", 6)).unwrap();
        assert_eq!(price, ScaledPrice { value: U256::from(125u64) * pow10(15), decimals: 18 });

        // Same reserves, but XYZ has 6 decimals: far more XYZ units in the pool
        let price = base_price(weth_price, &s, &meta(xyz(), "XYZ", 6), &meta(weth(), "WETH", 6)).unwrap();
        assert_eq!(price.value, U256::from(125_000u64));
    }

    #[test]
    fn test_base_price_overflow() {
        let pair = Address::repeat_byte(0x77);
        let s = snapshot(pair, xyz(), weth(), U256::from(1u64), U256::MAX);
        let huge = ScaledPrice { value: U256::MAX, decimals: 18 };
        assert_eq!(
            base_price(huge, &s, &meta(xyz(), "XYZ", 18), &meta(weth(), "WETH", 18)),
            Err(PriceError::Overflow(pair))
        );
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(to_decimal(e(15, 17), 18), 1.5);
        assert_eq!(to_decimal(U256::from(1_250_000u64), 6), 1.25);
        assert_eq!(to_decimal(U256::ZERO, 18), 0.0);
    }
}
