//! Repository abstractions for data access.
//!
//! Repositories implement the source, catalog, and sink seams of the daily
//! balance job, hiding the `SeaORM` implementation details from the core.

pub mod balance_sink;
pub mod balance_source;
pub mod chart_of_accounts;

pub use balance_sink::PgBalanceSink;
pub use balance_source::PgBalanceSource;
pub use chart_of_accounts::PgChartOfAccounts;
