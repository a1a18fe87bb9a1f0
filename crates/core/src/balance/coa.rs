//! Chart-of-account classes and closing-balance sign rules.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::records::AccountRegistryEntry;

/// Chart-of-account class selecting the closing-balance sign rule.
///
/// - Asset (debit-normal): closing = opening + debit - credit
/// - Liability (credit-normal): closing = opening + credit - debit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoaType {
    /// Debit-normal accounts (assets, expenses).
    Asset,
    /// Credit-normal accounts (liabilities, equity, revenue).
    Liability,
}

impl CoaType {
    /// Chart-of-account codes accepted by the schema, debit-normal first.
    pub const KNOWN_CODES: [&'static str; 5] = ["asset", "expense", "liability", "equity", "revenue"];

    /// Determines the class from a chart-of-account code.
    ///
    /// Unknown codes are treated as debit-normal.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "liability" | "equity" | "revenue" => Self::Liability,
            _ => Self::Asset,
        }
    }

    /// Returns true if `code` names a known class.
    #[must_use]
    pub fn is_known_code(code: &str) -> bool {
        let code = code.trim().to_lowercase();
        Self::KNOWN_CODES.contains(&code.as_str())
    }

    /// Signed change a day's movement makes to the balance.
    #[must_use]
    pub fn net_movement(self, debit: Decimal, credit: Decimal) -> Decimal {
        match self {
            Self::Asset => debit - credit,
            Self::Liability => credit - debit,
        }
    }

    /// Closing balance after applying a movement to `opening`.
    #[must_use]
    pub fn closing(self, opening: Decimal, debit: Decimal, credit: Decimal) -> Decimal {
        opening + self.net_movement(debit, credit)
    }

    /// Lowercase code as stored in the chart of accounts.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
        }
    }
}

impl std::fmt::Display for CoaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an account's class was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassSource {
    /// The registry entry carried its own chart-of-account type.
    Account,
    /// Looked up from the sub-category mapping.
    SubCategory,
    /// Neither was available; debit-normal was assumed.
    Fallback,
}

/// Sub-category code → chart-of-account class.
#[derive(Debug, Clone, Default)]
pub struct CoaTypeMap {
    by_sub_category: HashMap<String, CoaType>,
}

impl CoaTypeMap {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a sub-category to a class, replacing any previous mapping.
    pub fn insert(&mut self, sub_category_code: impl Into<String>, coa_type: CoaType) {
        self.by_sub_category
            .insert(sub_category_code.into(), coa_type);
    }

    /// Returns the class mapped to a sub-category.
    #[must_use]
    pub fn get(&self, sub_category_code: &str) -> Option<CoaType> {
        self.by_sub_category.get(sub_category_code).copied()
    }

    /// Resolves the class used for an account's sign rule.
    #[must_use]
    pub fn class_for(&self, entry: &AccountRegistryEntry) -> (CoaType, ClassSource) {
        if let Some(coa_type) = entry.coa_type {
            return (coa_type, ClassSource::Account);
        }
        match self.get(&entry.sub_category_code) {
            Some(coa_type) => (coa_type, ClassSource::SubCategory),
            None => (CoaType::Asset, ClassSource::Fallback),
        }
    }

    /// Number of mapped sub-categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_sub_category.len()
    }

    /// Returns true if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_sub_category.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, CoaType)> for CoaTypeMap {
    fn from_iter<I: IntoIterator<Item = (K, CoaType)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (code, coa_type) in iter {
            map.insert(code, coa_type);
        }
        map
    }
}
