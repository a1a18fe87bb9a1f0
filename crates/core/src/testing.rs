//! In-memory fakes of the source, catalog, sink, and notifier traits.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use chrono::NaiveDate;
use futures::StreamExt;
use futures::stream;
use rust_decimal::Decimal;

use crate::balance::{
    AccountBalanceDaily, AccountRegistryEntry, AccountTrialBalance, CoaType, CoaTypeMap,
    MovementRecord, PriorBalanceRecord,
};
use crate::notify::{Notifier, NotifyError};
use crate::persist::{BalanceSink, ClearedRows, PersistError};
use crate::source::{BalanceSource, ChartOfAccounts, RecordStream, SourceError, SourceQuery};

pub fn movement(account: &str, debit: Decimal, credit: Decimal) -> MovementRecord {
    MovementRecord {
        account_number: account.to_string(),
        debit,
        credit,
    }
}

pub fn prior(account: &str, closing: Decimal) -> PriorBalanceRecord {
    PriorBalanceRecord {
        account_number: account.to_string(),
        closing_balance: closing,
        entity_code: "E1".to_string(),
        category_code: "C1".to_string(),
        sub_category_code: "S1".to_string(),
    }
}

pub fn account(account: &str, entity: &str, sub_category: &str) -> AccountRegistryEntry {
    AccountRegistryEntry {
        account_number: account.to_string(),
        entity_code: entity.to_string(),
        category_code: "C1".to_string(),
        sub_category_code: sub_category.to_string(),
        coa_type: None,
    }
}

pub fn typed_account(
    number: &str,
    entity: &str,
    sub_category: &str,
    coa_type: CoaType,
) -> AccountRegistryEntry {
    AccountRegistryEntry {
        coa_type: Some(coa_type),
        ..account(number, entity, sub_category)
    }
}

pub fn daily_row(account: &str) -> AccountBalanceDaily {
    AccountBalanceDaily {
        account_number: account.to_string(),
        balance_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
        entity_code: "E1".to_string(),
        category_code: "C1".to_string(),
        sub_category_code: "S1".to_string(),
        opening_balance: Decimal::ZERO,
        debit_movement: Decimal::ONE,
        credit_movement: Decimal::ZERO,
        closing_balance: Decimal::ONE,
    }
}

pub fn conflict() -> PersistError {
    PersistError::WriteConflict {
        code: "40P01".to_string(),
        message: "deadlock detected".to_string(),
    }
}

#[derive(Default)]
pub struct MemorySource {
    pub movements: Vec<MovementRecord>,
    pub priors: Vec<PriorBalanceRecord>,
    pub accounts: Vec<AccountRegistryEntry>,
    /// Error yielded after the last movement.
    pub movement_error: Option<String>,
    /// Keep the account stream open forever after its records.
    pub accounts_never_end: bool,
    pub queries: Mutex<Vec<SourceQuery>>,
}

impl BalanceSource for MemorySource {
    fn movements(&self, query: &SourceQuery) -> RecordStream<MovementRecord> {
        self.queries.lock().unwrap().push(query.clone());
        let failure = self
            .movement_error
            .clone()
            .map(|message| Err(SourceError::Query(message)));
        stream::iter(self.movements.clone().into_iter().map(Ok).chain(failure)).boxed()
    }

    fn prior_balances(&self, _query: &SourceQuery) -> RecordStream<PriorBalanceRecord> {
        stream::iter(self.priors.clone().into_iter().map(Ok)).boxed()
    }

    fn accounts(&self, _query: &SourceQuery) -> RecordStream<AccountRegistryEntry> {
        let records = stream::iter(self.accounts.clone().into_iter().map(Ok));
        if self.accounts_never_end {
            records.chain(stream::pending()).boxed()
        } else {
            records.boxed()
        }
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    pub coa_types: Vec<(String, CoaType)>,
    pub sub_categories: Vec<String>,
    pub unavailable: bool,
}

impl ChartOfAccounts for MemoryCatalog {
    async fn coa_types(&self) -> Result<CoaTypeMap, SourceError> {
        if self.unavailable {
            return Err(SourceError::Unavailable("catalog offline".to_string()));
        }
        Ok(self.coa_types.iter().cloned().collect())
    }

    async fn sub_categories(&self) -> Result<Vec<String>, SourceError> {
        if self.unavailable {
            return Err(SourceError::Unavailable("catalog offline".to_string()));
        }
        Ok(self.sub_categories.clone())
    }
}

#[derive(Default)]
pub struct MemorySink {
    account_rows: Mutex<Vec<AccountBalanceDaily>>,
    trial_rows: Mutex<Vec<AccountTrialBalance>>,
    account_script: Mutex<VecDeque<Result<(), PersistError>>>,
    trial_failure: Mutex<Option<PersistError>>,
    account_attempts: AtomicU32,
    trial_calls: AtomicU32,
    clear_calls: AtomicU32,
    writing: AtomicUsize,
    max_writing: AtomicUsize,
}

impl MemorySink {
    /// Outcomes of the next account inserts; unscripted inserts succeed.
    pub fn script_account_results(&self, results: impl IntoIterator<Item = Result<(), PersistError>>) {
        self.account_script.lock().unwrap().extend(results);
    }

    pub fn fail_trial_balances(&self, err: PersistError) {
        *self.trial_failure.lock().unwrap() = Some(err);
    }

    pub fn account_rows(&self) -> Vec<AccountBalanceDaily> {
        self.account_rows.lock().unwrap().clone()
    }

    pub fn trial_rows(&self) -> Vec<AccountTrialBalance> {
        self.trial_rows.lock().unwrap().clone()
    }

    pub fn account_attempts(&self) -> u32 {
        self.account_attempts.load(Ordering::SeqCst)
    }

    pub fn trial_calls(&self) -> u32 {
        self.trial_calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> u32 {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_account_writes(&self) -> usize {
        self.max_writing.load(Ordering::SeqCst)
    }
}

impl BalanceSink for MemorySink {
    async fn clear_balances(
        &self,
        business_date: NaiveDate,
        entity_codes: &[String],
    ) -> Result<ClearedRows, PersistError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        let in_scope = |date: NaiveDate, entity: &str| {
            date == business_date && entity_codes.iter().any(|code| code == entity)
        };

        let mut accounts = self.account_rows.lock().unwrap();
        let before = accounts.len();
        accounts.retain(|row| !in_scope(row.balance_date, &row.entity_code));
        let account_rows = (before - accounts.len()) as u64;

        let mut trial = self.trial_rows.lock().unwrap();
        let before = trial.len();
        trial.retain(|row| !in_scope(row.balance_date, &row.entity_code));
        let trial_balance_rows = (before - trial.len()) as u64;

        Ok(ClearedRows {
            account_rows,
            trial_balance_rows,
        })
    }

    async fn insert_account_balances(&self, rows: &[AccountBalanceDaily]) -> Result<(), PersistError> {
        self.account_attempts.fetch_add(1, Ordering::SeqCst);
        let writing = self.writing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writing.fetch_max(writing, Ordering::SeqCst);

        tokio::task::yield_now().await;

        let scripted = self.account_script.lock().unwrap().pop_front();
        self.writing.fetch_sub(1, Ordering::SeqCst);
        match scripted {
            Some(Err(e)) => Err(e),
            _ => {
                let mut stored = self.account_rows.lock().unwrap();
                for row in rows {
                    stored.retain(|existing| {
                        existing.account_number != row.account_number
                            || existing.balance_date != row.balance_date
                    });
                    stored.push(row.clone());
                }
                Ok(())
            }
        }
    }

    async fn insert_trial_balances(&self, rows: &[AccountTrialBalance]) -> Result<(), PersistError> {
        self.trial_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.trial_failure.lock().unwrap().take() {
            return Err(err);
        }
        let mut stored = self.trial_rows.lock().unwrap();
        for row in rows {
            stored.retain(|existing| {
                existing.entity_code != row.entity_code
                    || existing.sub_category_code != row.sub_category_code
                    || existing.balance_date != row.balance_date
            });
            stored.push(row.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
    pub unreachable: bool,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, operation: &str, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((operation.to_string(), message.to_string()));
        if self.unreachable {
            return Err(NotifyError::Delivery("connection refused".to_string()));
        }
        Ok(())
    }
}
