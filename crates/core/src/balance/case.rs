//! Per-account merge of prior balance and movement.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::coa::CoaType;
use super::records::{AccountBalanceDaily, AccountRegistryEntry, MovementRecord, PriorBalanceRecord};

/// What is known about one account on the business date.
///
/// Zero-valued inputs count as absent: a prior closing balance of exactly
/// zero and a movement with zero debit and credit resolve as if missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceCase {
    /// No prior balance and no movement. No row is produced.
    Dormant,
    /// Prior balance only; carried forward unchanged.
    CarriedForward(PriorBalanceRecord),
    /// Movement only; opening balance is zero.
    MovementOnly(MovementRecord),
    /// Prior balance and movement.
    Posted {
        /// Previous day's balance.
        prior: PriorBalanceRecord,
        /// Today's movement.
        movement: MovementRecord,
    },
}

/// Fieldless discriminant of [`BalanceCase`], used for run statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    /// See [`BalanceCase::Dormant`].
    Dormant,
    /// See [`BalanceCase::CarriedForward`].
    CarriedForward,
    /// See [`BalanceCase::MovementOnly`].
    MovementOnly,
    /// See [`BalanceCase::Posted`].
    Posted,
}

/// Opening, movement, and closing figures of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputedBalance {
    /// Opening balance.
    pub opening: Decimal,
    /// Debit movement.
    pub debit: Decimal,
    /// Credit movement.
    pub credit: Decimal,
    /// Closing balance.
    pub closing: Decimal,
}

impl BalanceCase {
    /// Resolves the case from the optional staged lookups.
    #[must_use]
    pub fn resolve(prior: Option<PriorBalanceRecord>, movement: Option<MovementRecord>) -> Self {
        let prior = prior.filter(|p| !p.closing_balance.is_zero());
        let movement = movement.filter(|m| !m.is_zero());

        match (prior, movement) {
            (None, None) => Self::Dormant,
            (Some(prior), None) => Self::CarriedForward(prior),
            (None, Some(movement)) => Self::MovementOnly(movement),
            (Some(prior), Some(movement)) => Self::Posted { prior, movement },
        }
    }

    /// Returns the discriminant.
    #[must_use]
    pub const fn kind(&self) -> CaseKind {
        match self {
            Self::Dormant => CaseKind::Dormant,
            Self::CarriedForward(_) => CaseKind::CarriedForward,
            Self::MovementOnly(_) => CaseKind::MovementOnly,
            Self::Posted { .. } => CaseKind::Posted,
        }
    }

    /// Computes the account's figures under its class's sign rule.
    ///
    /// Returns `None` for [`BalanceCase::Dormant`].
    #[must_use]
    pub fn compute(&self, class: CoaType) -> Option<ComputedBalance> {
        match self {
            Self::Dormant => None,
            Self::CarriedForward(prior) => Some(ComputedBalance {
                opening: prior.closing_balance,
                debit: Decimal::ZERO,
                credit: Decimal::ZERO,
                closing: prior.closing_balance,
            }),
            Self::MovementOnly(movement) => Some(ComputedBalance {
                opening: Decimal::ZERO,
                debit: movement.debit,
                credit: movement.credit,
                closing: class.closing(Decimal::ZERO, movement.debit, movement.credit),
            }),
            Self::Posted { prior, movement } => Some(ComputedBalance {
                opening: prior.closing_balance,
                debit: movement.debit,
                credit: movement.credit,
                closing: class.closing(prior.closing_balance, movement.debit, movement.credit),
            }),
        }
    }
}

impl ComputedBalance {
    /// Builds the persisted row for an account.
    #[must_use]
    pub fn into_daily(self, entry: &AccountRegistryEntry, balance_date: NaiveDate) -> AccountBalanceDaily {
        AccountBalanceDaily {
            account_number: entry.account_number.clone(),
            balance_date,
            entity_code: entry.entity_code.clone(),
            category_code: entry.category_code.clone(),
            sub_category_code: entry.sub_category_code.clone(),
            opening_balance: self.opening,
            debit_movement: self.debit,
            credit_movement: self.credit,
            closing_balance: self.closing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

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

    #[rstest]
    #[case(None, None, CaseKind::Dormant)]
    #[case(Some(dec!(0)), Some((dec!(0), dec!(0))), CaseKind::Dormant)]
    #[case(Some(dec!(100)), None, CaseKind::CarriedForward)]
    #[case(Some(dec!(100)), Some((dec!(0), dec!(0))), CaseKind::CarriedForward)]
    #[case(None, Some((dec!(20), dec!(5))), CaseKind::MovementOnly)]
    #[case(Some(dec!(0)), Some((dec!(20), dec!(5))), CaseKind::MovementOnly)]
    #[case(Some(dec!(100)), Some((dec!(20), dec!(5))), CaseKind::Posted)]
    #[case(Some(dec!(-40)), Some((dec!(0), dec!(1))), CaseKind::Posted)]
    fn test_resolve(
        #[case] closing: Option<Decimal>,
        #[case] sides: Option<(Decimal, Decimal)>,
        #[case] expected: CaseKind,
    ) {
        let case = BalanceCase::resolve(
            closing.map(prior),
            sides.map(|(debit, credit)| movement(debit, credit)),
        );
        assert_eq!(case.kind(), expected);
    }

    #[test]
    fn test_dormant_produces_nothing() {
        assert_eq!(BalanceCase::Dormant.compute(CoaType::Asset), None);
        assert_eq!(BalanceCase::Dormant.compute(CoaType::Liability), None);
    }

    #[test]
    fn test_carried_forward_ignores_class() {
        let case = BalanceCase::CarriedForward(prior(dec!(250.75)));
        for class in [CoaType::Asset, CoaType::Liability] {
            let computed = case.compute(class).unwrap();
            assert_eq!(computed.opening, dec!(250.75));
            assert_eq!(computed.closing, dec!(250.75));
            assert_eq!(computed.debit, Decimal::ZERO);
            assert_eq!(computed.credit, Decimal::ZERO);
        }
    }

    #[test]
    fn test_movement_only_opens_at_zero() {
        let case = BalanceCase::MovementOnly(movement(dec!(20), dec!(5)));

        let asset = case.compute(CoaType::Asset).unwrap();
        assert_eq!(asset.opening, Decimal::ZERO);
        assert_eq!(asset.closing, dec!(15));

        let liability = case.compute(CoaType::Liability).unwrap();
        assert_eq!(liability.closing, dec!(-15));
    }

    #[test]
    fn test_posted_asset_and_liability() {
        let asset = BalanceCase::resolve(Some(prior(dec!(100))), Some(movement(dec!(20), dec!(5))))
            .compute(CoaType::Asset)
            .unwrap();
        assert_eq!(asset.opening, dec!(100));
        assert_eq!(asset.closing, dec!(115));

        let liability = BalanceCase::resolve(Some(prior(dec!(50))), Some(movement(dec!(5), dec!(15))))
            .compute(CoaType::Liability)
            .unwrap();
        assert_eq!(liability.opening, dec!(50));
        assert_eq!(liability.closing, dec!(60));
    }

    #[test]
    fn test_into_daily_copies_registry_metadata() {
        let entry = AccountRegistryEntry {
            account_number: "2001".to_string(),
            entity_code: "E2".to_string(),
            category_code: "C9".to_string(),
            sub_category_code: "S4".to_string(),
            coa_type: None,
        };
        let date = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        let row = ComputedBalance {
            opening: dec!(1),
            debit: dec!(2),
            credit: dec!(3),
            closing: dec!(0),
        }
        .into_daily(&entry, date);

        assert_eq!(row.account_number, "2001");
        assert_eq!(row.entity_code, "E2");
        assert_eq!(row.sub_category_code, "S4");
        assert_eq!(row.balance_date, date);
        assert_eq!(row.credit_movement, dec!(3));
    }
}
