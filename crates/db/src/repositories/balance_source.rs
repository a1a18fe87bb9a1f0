//! Paged source streams for the daily balance job.
//!
//! Every stream issues one offset query per page, so no more than a page of
//! rows is held in memory at a time.

use std::future::Future;

use daybook_core::balance::{AccountRegistryEntry, CoaType, MovementRecord, PriorBalanceRecord};
use daybook_core::source::{BalanceSource, RecordStream, SourceError, SourceQuery};
use futures::{StreamExt, TryStreamExt, stream};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait,
};
use tracing::debug;

use crate::entities::{account_balance_daily, account_transactions, accounts};
use crate::error::source_error;

/// Default rows fetched per page.
pub const DEFAULT_PAGE_SIZE: u64 = 5000;

/// Reads movements, prior balances, and the account registry from PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgBalanceSource {
    db: DatabaseConnection,
    page_size: u64,
}

#[derive(Debug, FromQueryResult)]
struct MovementRow {
    account_number: String,
    debit: Option<Decimal>,
    credit: Option<Decimal>,
}

impl PgBalanceSource {
    /// Creates a source reading `page_size` rows per query.
    #[must_use]
    pub fn new(db: DatabaseConnection, page_size: u64) -> Self {
        Self {
            db,
            page_size: page_size.max(1),
        }
    }

    /// Rows fetched per query.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }
}

impl BalanceSource for PgBalanceSource {
    fn movements(&self, query: &SourceQuery) -> RecordStream<MovementRecord> {
        let db = self.db.clone();
        let query = query.clone();

        paged("movements", self.page_size, move |offset, limit| {
            let db = db.clone();
            let query = query.clone();
            async move {
                let rows = account_transactions::Entity::find()
                    .select_only()
                    .column(account_transactions::Column::AccountNumber)
                    .column_as(
                        Expr::col((
                            account_transactions::Entity,
                            account_transactions::Column::Debit,
                        ))
                        .sum(),
                        "debit",
                    )
                    .column_as(
                        Expr::col((
                            account_transactions::Entity,
                            account_transactions::Column::Credit,
                        ))
                        .sum(),
                        "credit",
                    )
                    .join(
                        JoinType::InnerJoin,
                        account_transactions::Relation::Accounts.def(),
                    )
                    .filter(account_transactions::Column::TransactionDate.eq(query.business_date))
                    .filter(accounts::Column::EntityCode.is_in(query.entity_codes.clone()))
                    .filter(accounts::Column::SubCategoryCode.is_in(query.sub_categories.clone()))
                    .group_by(account_transactions::Column::AccountNumber)
                    .order_by_asc(account_transactions::Column::AccountNumber)
                    .offset(offset)
                    .limit(limit)
                    .into_model::<MovementRow>()
                    .all(&db)
                    .await
                    .map_err(source_error)?;

                Ok(rows
                    .into_iter()
                    .map(|row| MovementRecord {
                        account_number: row.account_number,
                        debit: row.debit.unwrap_or_default(),
                        credit: row.credit.unwrap_or_default(),
                    })
                    .collect())
            }
        })
    }

    fn prior_balances(&self, query: &SourceQuery) -> RecordStream<PriorBalanceRecord> {
        let Some(prior_date) = query.prior_date() else {
            return stream::empty().boxed();
        };
        let db = self.db.clone();
        let query = query.clone();

        paged("prior_balances", self.page_size, move |offset, limit| {
            let db = db.clone();
            let query = query.clone();
            async move {
                let rows = account_balance_daily::Entity::find()
                    .filter(account_balance_daily::Column::BalanceDate.eq(prior_date))
                    .filter(account_balance_daily::Column::EntityCode.is_in(query.entity_codes.clone()))
                    .filter(
                        account_balance_daily::Column::SubCategoryCode
                            .is_in(query.sub_categories.clone()),
                    )
                    .order_by_asc(account_balance_daily::Column::AccountNumber)
                    .offset(offset)
                    .limit(limit)
                    .all(&db)
                    .await
                    .map_err(source_error)?;

                Ok(rows.into_iter().map(prior_balance_from_model).collect())
            }
        })
    }

    fn accounts(&self, query: &SourceQuery) -> RecordStream<AccountRegistryEntry> {
        let db = self.db.clone();
        let query = query.clone();

        paged("accounts", self.page_size, move |offset, limit| {
            let db = db.clone();
            let query = query.clone();
            async move {
                let rows = accounts::Entity::find()
                    .filter(accounts::Column::IsActive.eq(true))
                    .filter(accounts::Column::EntityCode.is_in(query.entity_codes.clone()))
                    .filter(accounts::Column::SubCategoryCode.is_in(query.sub_categories.clone()))
                    .order_by_asc(accounts::Column::AccountNumber)
                    .offset(offset)
                    .limit(limit)
                    .all(&db)
                    .await
                    .map_err(source_error)?;

                Ok(rows.into_iter().map(registry_entry_from_model).collect())
            }
        })
    }
}

fn prior_balance_from_model(model: account_balance_daily::Model) -> PriorBalanceRecord {
    PriorBalanceRecord {
        account_number: model.account_number,
        closing_balance: model.closing_balance,
        entity_code: model.entity_code,
        category_code: model.category_code,
        sub_category_code: model.sub_category_code,
    }
}

/// Unknown account-level type codes are dropped so the sub-category mapping
/// applies.
fn registry_entry_from_model(model: accounts::Model) -> AccountRegistryEntry {
    AccountRegistryEntry {
        account_number: model.account_number,
        entity_code: model.entity_code,
        category_code: model.category_code,
        sub_category_code: model.sub_category_code,
        coa_type: model
            .coa_type
            .as_deref()
            .filter(|code| CoaType::is_known_code(code))
            .map(CoaType::from_code),
    }
}

/// Streams the rows of consecutive `(offset, limit)` pages until a short
/// page is returned.
fn paged<T, F, Fut>(partition: &'static str, page_size: u64, fetch: F) -> RecordStream<T>
where
    T: Send + 'static,
    F: Fn(u64, u64) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>, SourceError>> + Send + 'static,
{
    stream::try_unfold(Some(0u64), move |next| {
        let request = next.map(|offset| (offset, fetch(offset, page_size)));
        async move {
            let Some((offset, request)) = request else {
                return Ok(None);
            };
            let rows = request.await?;
            let fetched = u64::try_from(rows.len()).unwrap_or(u64::MAX);
            debug!(partition, offset, fetched, "Fetched source page");
            let next = (fetched >= page_size).then_some(offset + fetched);
            Ok(Some((rows, next)))
        }
    })
    .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<T, SourceError>)))
    .try_flatten()
    .boxed()
}
