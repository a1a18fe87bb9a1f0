//! `SeaORM` entity definitions.

pub mod account_balance_daily;
pub mod account_transactions;
pub mod account_trial_balance;
pub mod accounts;
pub mod sub_categories;
