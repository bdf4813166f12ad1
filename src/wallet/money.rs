/// Money amounts and the platform revenue split
///
/// Amounts are held as integer minor units (poisha, 1/100 BDT) so that
/// database arithmetic is exact. The API boundary speaks `Decimal`.
use crate::error::{MarketError, MarketResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Minor units per major currency unit
const MINOR_PER_MAJOR: i64 = 100;

/// Share of each sale credited to the uploader, in percent
pub const SELLER_SHARE_PERCENT: i64 = 90;

/// Largest price a listing may carry (99 999.99)
pub const MAX_PRICE: Money = Money(9_999_999);

/// Non-negative amount of money in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(minor: i64) -> MarketResult<Self> {
        if minor < 0 {
            return Err(MarketError::InvalidInput("Amount cannot be negative".to_string()));
        }
        Ok(Money(minor))
    }

    pub const fn from_major(major: i64) -> Self {
        Money(major * MINOR_PER_MAJOR)
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Convert from a decimal amount with at most two fractional digits
    pub fn from_decimal(value: Decimal) -> MarketResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MarketError::InvalidInput("Amount cannot be negative".to_string()));
        }
        if value.normalize().scale() > 2 {
            return Err(MarketError::InvalidInput(
                "Amount must have at most 2 decimal places".to_string(),
            ));
        }
        let minor = value
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .and_then(|v| v.to_i64())
            .ok_or_else(|| MarketError::InvalidInput("Amount is out of range".to_string()))?;
        Ok(Money(minor))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn parse(raw: &str) -> MarketResult<Self> {
        let value = Decimal::from_str(raw.trim())
            .map_err(|_| MarketError::InvalidInput(format!("'{}' is not a valid amount", raw)))?;
        Self::from_decimal(value)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).filter(|v| *v >= 0).map(Money)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::from_decimal(value).map_err(serde::de::Error::custom)
    }
}

/// Division of a sale between uploader and platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSplit {
    pub seller_amount: Money,
    pub platform_amount: Money,
}

impl RevenueSplit {
    /// Seller share is rounded half-up to the cent; the platform keeps the remainder,
    /// so `seller_amount + platform_amount == price` always holds.
    pub fn of(price: Money) -> Self {
        let seller = (price.0 * SELLER_SHARE_PERCENT + 50) / 100;
        RevenueSplit {
            seller_amount: Money(seller),
            platform_amount: Money(price.0 - seller),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_split_of_fifty() {
        let split = RevenueSplit::of(Money::from_major(50));
        assert_eq!(split.seller_amount, Money::from_major(45));
        assert_eq!(split.platform_amount, Money::from_major(5));
    }

    #[test]
    fn test_split_of_one_poisha_rounds_up_to_seller() {
        let price = Money::parse("0.01").unwrap();
        let split = RevenueSplit::of(price);
        assert_eq!(split.seller_amount.minor(), 1);
        assert_eq!(split.platform_amount.minor(), 0);
    }

    #[test]
    fn test_split_of_max_price() {
        let split = RevenueSplit::of(MAX_PRICE);
        // 99999.99 * 0.9 = 89999.991 -> 89999.99
        assert_eq!(split.seller_amount.to_decimal(), dec("89999.99"));
        assert_eq!(split.platform_amount.to_decimal(), dec("10000.00"));
    }

    #[test]
    fn test_split_always_sums_to_price() {
        let samples = (0..2_000).chain([4_999_999, 9_999_998, 9_999_999]);
        for minor in samples {
            let price = Money::from_minor(minor).unwrap();
            let split = RevenueSplit::of(price);
            assert_eq!(
                split.seller_amount.minor() + split.platform_amount.minor(),
                minor,
                "split drifted for {}",
                price
            );
        }
    }

    #[test]
    fn test_from_decimal_rejects_extra_precision() {
        assert!(Money::from_decimal(dec("1.005")).is_err());
        assert_eq!(Money::from_decimal(dec("1.50")).unwrap().minor(), 150);
        assert_eq!(Money::from_decimal(dec("2.000")).unwrap().minor(), 200);
    }

    #[test]
    fn test_from_decimal_rejects_negative() {
        assert!(Money::from_decimal(dec("-1")).is_err());
        assert!(Money::parse("abc").is_err());
    }

    #[test]
    fn test_serde_accepts_numbers_and_strings() {
        let from_number: Money = serde_json::from_str("12.5").unwrap();
        let from_string: Money = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"12.50\"");
    }

    #[test]
    fn test_huge_amount_is_rejected_not_overflowed() {
        assert!(serde_json::from_str::<Money>("\"79228162514264337593543950335\"").is_err());
        assert!(matches!(
            Money::parse("79228162514264337593543950335").unwrap_err(),
            MarketError::InvalidInput(_)
        ));
        assert!(Money::parse("92233720368547758.08").is_err());
    }
}
