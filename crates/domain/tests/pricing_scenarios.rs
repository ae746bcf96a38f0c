//! End-to-end pricing scenarios over the public API.

use chrono::Utc;
use common::{ProductId, VariantId};
use domain::{Coupon, CouponLookup, Money, OrderLineItem, PricingEngine, PricingError};
use rust_decimal_macros::dec;

fn line(sku: &str, price: Money, quantity: u32) -> OrderLineItem {
    OrderLineItem::new(VariantId::new(), ProductId::new(), sku, sku, quantity, price)
}

#[test]
fn ten_percent_coupon_below_free_shipping() {
    let lines = [
        line("SKU-A", Money::from_major(50), 2),
        line("SKU-B", Money::from_major(100), 1),
    ];
    let coupon = CouponLookup::Found(Coupon::percentage("SAVE10", dec!(10)));

    let quote = PricingEngine::default()
        .quote(&lines, Some(&coupon), Utc::now())
        .unwrap();

    assert_eq!(quote.totals.subtotal, Money::from_major(200));
    assert_eq!(quote.totals.discount, Money::from_major(20));
    assert_eq!(quote.totals.shipping_cost, Money::from_major(50));
    assert_eq!(quote.totals.tax, Money::new(dec!(32.40)));
    assert_eq!(quote.totals.total, Money::new(dec!(262.40)));
    assert_eq!(quote.totals.total.to_string(), "262.40");
    assert_eq!(quote.coupon_code.as_deref(), Some("SAVE10"));
}

#[test]
fn large_cart_without_coupon_ships_free() {
    let lines = [line("SKU-A", Money::from_major(400), 3)];

    let quote = PricingEngine::default().quote(&lines, None, Utc::now()).unwrap();

    assert_eq!(quote.totals.subtotal, Money::from_major(1200));
    assert_eq!(quote.totals.discount, Money::ZERO);
    assert_eq!(quote.totals.shipping_cost, Money::ZERO);
    assert_eq!(quote.totals.tax, Money::from_major(216));
    assert_eq!(quote.totals.total, Money::from_major(1416));
    assert!(quote.coupon_code.is_none());
}

#[test]
fn free_shipping_boundary() {
    let engine = PricingEngine::default();
    let now = Utc::now();

    let just_below = engine
        .quote(&[line("SKU-A", Money::new(dec!(999.99)), 1)], None, now)
        .unwrap();
    assert_eq!(just_below.totals.shipping_cost, Money::from_major(50));

    let at_threshold = engine
        .quote(&[line("SKU-A", Money::new(dec!(1000.00)), 1)], None, now)
        .unwrap();
    assert_eq!(at_threshold.totals.shipping_cost, Money::ZERO);
}

#[test]
fn threshold_applies_after_discount() {
    let coupon = CouponLookup::Found(Coupon::fixed("FIVE", Money::from_major(5)));
    let quote = PricingEngine::default()
        .quote(
            &[line("SKU-A", Money::new(dec!(1004.99)), 1)],
            Some(&coupon),
            Utc::now(),
        )
        .unwrap();

    assert_eq!(quote.totals.discount, Money::from_major(5));
    assert_eq!(quote.totals.shipping_cost, Money::from_major(50));
}

#[test]
fn totals_are_never_negative_and_discount_never_exceeds_subtotal() {
    let engine = PricingEngine::default();
    let now = Utc::now();
    let coupons = [
        Coupon::percentage("P5", dec!(5)),
        Coupon::percentage("P100", dec!(100)),
        Coupon::percentage("P150", dec!(150)),
        Coupon::percentage("CAPPED", dec!(50)).with_max_discount(Money::from_major(30)),
        Coupon::fixed("F1", Money::from_major(1)),
        Coupon::fixed("F10K", Money::from_major(10_000)),
    ];
    let prices = [dec!(0.01), dec!(0.99), dec!(19.99), dec!(333.33), dec!(999.99), dec!(2500)];

    for coupon in coupons {
        let lookup = CouponLookup::Found(coupon);
        for price in prices {
            for quantity in [1, 3, 7] {
                let lines = [line("SKU", Money::new(price), quantity)];
                let totals = engine.quote(&lines, Some(&lookup), now).unwrap().totals;

                for amount in [
                    totals.subtotal,
                    totals.discount,
                    totals.tax,
                    totals.shipping_cost,
                    totals.total,
                ] {
                    assert!(!amount.is_negative(), "{totals:?}");
                }
                assert!(totals.discount <= totals.subtotal, "{totals:?}");
                assert_eq!(
                    totals.total,
                    totals.subtotal - totals.discount + totals.tax + totals.shipping_cost
                );
            }
        }
    }
}

#[test]
fn coupon_failures_surface_as_pricing_errors() {
    let now = Utc::now();
    let lines = [line("SKU-A", Money::from_major(100), 1)];
    let engine = PricingEngine::default();

    let min = CouponLookup::Found(
        Coupon::percentage("MIN500", dec!(10)).with_min_purchase(Money::from_major(500)),
    );
    assert!(matches!(
        engine.quote(&lines, Some(&min), now),
        Err(PricingError::MinPurchaseNotMet { .. })
    ));

    let mut used_up = Coupon::percentage("USED", dec!(10)).with_usage_limit(3);
    used_up.usage_count = 3;
    assert!(matches!(
        engine.quote(&lines, Some(&CouponLookup::Found(used_up)), now),
        Err(PricingError::UsageLimitExceeded { .. })
    ));
}
