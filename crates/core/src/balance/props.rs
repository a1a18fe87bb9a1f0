//! Property-based tests for sign rules, case resolution, and roll-up.

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::case::{BalanceCase, CaseKind};
use super::coa::CoaType;
use super::records::{MovementRecord, PriorBalanceRecord};
use super::trial::TrialBalanceTotals;

/// Strategy to generate signed amounts with up to 4 decimal places.
fn signed_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000_000i64..1_000_000_000_000i64, 0u32..=4)
        .prop_map(|(units, scale)| Decimal::new(units, scale))
}

/// Strategy to generate non-negative movement sides.
fn movement_side() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn coa_type() -> impl Strategy<Value = CoaType> {
    prop_oneof![Just(CoaType::Asset), Just(CoaType::Liability)]
}

fn prior(closing: Decimal) -> PriorBalanceRecord {
    PriorBalanceRecord {
        account_number: "1001".to_string(),
        closing_balance: closing,
        entity_code: "E1".to_string(),
        category_code: "C1".to_string(),
        sub_category_code: "S1".to_string(),
    }
}

fn movement(debit: Decimal, credit: Decimal) -> MovementRecord {
    MovementRecord {
        account_number: "1001".to_string(),
        debit,
        credit,
    }
}

/// Strategy for one account: class, optional prior closing, optional movement.
fn account() -> impl Strategy<Value = (CoaType, Option<Decimal>, Option<(Decimal, Decimal)>)> {
    (
        coa_type(),
        prop::option::of(signed_amount()),
        prop::option::of((movement_side(), movement_side())),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Asset closing is exactly opening + debit - credit.
    #[test]
    fn prop_asset_sign_rule_exact(
        opening in signed_amount(),
        debit in movement_side(),
        credit in movement_side(),
    ) {
        let closing = CoaType::Asset.closing(opening, debit, credit);
        prop_assert_eq!(closing, opening + debit - credit);
        prop_assert_eq!(closing - opening, debit - credit);
    }

    /// Liability closing is exactly opening + credit - debit.
    #[test]
    fn prop_liability_sign_rule_exact(
        opening in signed_amount(),
        debit in movement_side(),
        credit in movement_side(),
    ) {
        let closing = CoaType::Liability.closing(opening, debit, credit);
        prop_assert_eq!(closing, opening + credit - debit);
    }

    /// The two sign rules mirror each other around the opening balance.
    #[test]
    fn prop_sign_rules_are_opposite(
        debit in movement_side(),
        credit in movement_side(),
    ) {
        prop_assert_eq!(
            CoaType::Asset.net_movement(debit, credit),
            -CoaType::Liability.net_movement(debit, credit)
        );
    }

    /// Zero prior and zero movement never produce a row.
    #[test]
    fn prop_zero_inputs_are_dormant(class in coa_type(), with_prior in any::<bool>(), with_movement in any::<bool>()) {
        let case = BalanceCase::resolve(
            with_prior.then(|| prior(Decimal::ZERO)),
            with_movement.then(|| movement(Decimal::ZERO, Decimal::ZERO)),
        );
        prop_assert_eq!(case.kind(), CaseKind::Dormant);
        prop_assert!(case.compute(class).is_none());
    }

    /// Every non-dormant account closes by its own class's sign rule.
    #[test]
    fn prop_computed_closing_follows_class((class, closing, sides) in account()) {
        let case = BalanceCase::resolve(
            closing.map(prior),
            sides.map(|(debit, credit)| movement(debit, credit)),
        );
        if let Some(computed) = case.compute(class) {
            prop_assert_eq!(
                computed.closing,
                class.closing(computed.opening, computed.debit, computed.credit)
            );
        }
    }

    /// Group closing equals the sum of account closings, in any fold order.
    #[test]
    fn prop_trial_balance_equals_sum_of_closings(
        accounts in prop::collection::vec(account(), 0..40),
        split in 0usize..40,
    ) {
        let computed: Vec<_> = accounts
            .iter()
            .filter_map(|(class, closing, sides)| {
                BalanceCase::resolve(
                    closing.map(prior),
                    sides.map(|(debit, credit)| movement(debit, credit)),
                )
                .compute(*class)
            })
            .collect();

        let expected: Decimal = computed.iter().map(|c| c.closing).sum();

        let split = split.min(computed.len());
        let mut left = TrialBalanceTotals::default();
        let mut right = TrialBalanceTotals::default();
        for c in &computed[..split] {
            left.add(c);
        }
        for c in &computed[split..] {
            right.add(c);
        }
        let merged = right.merge(&left);

        prop_assert_eq!(merged.closing(), expected);
        prop_assert_eq!(merged.account_count, computed.len() as u64);
    }
}
