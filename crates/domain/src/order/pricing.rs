//! Checkout pricing: shipping and tax.

use serde::{Deserialize, Serialize};

use super::OrderError;
use crate::Money;

/// Shipping and tax rules applied when an order is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Orders whose subtotal is strictly above this ship for free.
    pub free_shipping_threshold: Money,
    pub flat_shipping: Money,
    /// Tax rate in basis points (1000 = 10%).
    pub tax_rate_bps: u32,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_dollars(100),
            flat_shipping: Money::from_dollars(10),
            tax_rate_bps: 1000,
        }
    }
}

/// The money lines of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total_amount: Money,
}

impl PricingPolicy {
    pub fn shipping_for(&self, subtotal: Money) -> Money {
        if subtotal > self.free_shipping_threshold {
            Money::zero()
        } else {
            self.flat_shipping
        }
    }

    /// Tax is levied on the subtotal only, not on shipping.
    pub fn tax_for(&self, subtotal: Money) -> Result<Money, OrderError> {
        subtotal
            .apply_rate_bps(self.tax_rate_bps)
            .ok_or(OrderError::AmountTooLarge)
    }

    pub fn price(&self, subtotal: Money) -> Result<PriceBreakdown, OrderError> {
        let shipping_cost = self.shipping_for(subtotal);
        let tax = self.tax_for(subtotal)?;
        let total_amount = Money::checked_sum([subtotal, shipping_cost, tax])
            .ok_or(OrderError::AmountTooLarge)?;
        Ok(PriceBreakdown {
            subtotal,
            shipping_cost,
            tax,
            total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_order_ships_free() {
        let breakdown = PricingPolicy::default()
            .price(Money::from_dollars(120))
            .unwrap();
        assert_eq!(breakdown.shipping_cost, Money::zero());
        assert_eq!(breakdown.tax, Money::from_dollars(12));
        assert_eq!(breakdown.total_amount, Money::from_dollars(132));
    }

    #[test]
    fn small_order_pays_flat_shipping() {
        let breakdown = PricingPolicy::default()
            .price(Money::from_dollars(50))
            .unwrap();
        assert_eq!(breakdown.shipping_cost, Money::from_dollars(10));
        assert_eq!(breakdown.tax, Money::from_dollars(5));
        assert_eq!(breakdown.total_amount, Money::from_dollars(65));
    }

    #[test]
    fn threshold_itself_is_not_free() {
        let policy = PricingPolicy::default();
        assert_eq!(
            policy.shipping_for(Money::from_dollars(100)),
            Money::from_dollars(10)
        );
        assert_eq!(policy.shipping_for(Money::from_cents(10_001)), Money::zero());
    }

    #[test]
    fn tax_rounds_half_up_to_cents() {
        let policy = PricingPolicy::default();
        // 10% of 0.45 is 0.045
        assert_eq!(policy.tax_for(Money::from_cents(45)).unwrap().cents(), 5);
        assert_eq!(policy.tax_for(Money::from_cents(44)).unwrap().cents(), 4);
    }

    #[test]
    fn custom_policy() {
        let policy = PricingPolicy {
            free_shipping_threshold: Money::from_dollars(50),
            flat_shipping: Money::from_cents(499),
            tax_rate_bps: 825,
        };
        let breakdown = policy.price(Money::from_dollars(40)).unwrap();
        assert_eq!(breakdown.shipping_cost.cents(), 499);
        assert_eq!(breakdown.tax.cents(), 330);
        assert_eq!(breakdown.total_amount.cents(), 4000 + 499 + 330);
    }

    #[test]
    fn totals_that_overflow_are_rejected() {
        let policy = PricingPolicy::default();
        let near_max = Money::from_cents(i64::MAX - 100);
        assert!(matches!(
            policy.price(near_max),
            Err(OrderError::AmountTooLarge)
        ));
    }
}
