//! Daily balance job runner.
//!
//! Usage:
//!   daily-balance               - Compute balances for yesterday (UTC)
//!   daily-balance 2026-03-31    - Compute balances for the given business date
//!
//! Exits with 78 on configuration errors, 69 when the database is
//! unreachable, and 75 when the run failed in a way a rerun may resolve.

mod notify;

use std::process::ExitCode;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use daybook_core::{DailyBalanceJob, JobError, JobSettings};
use daybook_db::{PgBalanceSink, PgBalanceSource, PgChartOfAccounts, connect};
use daybook_shared::{AppConfig, AppError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::notify::OperatorChannel;

/// EX_TEMPFAIL.
const EXIT_RETRYABLE: u8 = 75;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "daily-balance failed");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "daybook=info,daily_balance=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var_os("DAYBOOK_LOG_JSON").is_some() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().map_err(AppError::from)?;
    config.job.validate()?;

    let arg = std::env::args().nth(1);
    let business_date = business_date(arg.as_deref(), Utc::now().date_naive())?;

    let db = connect(&config.database)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    info!("Connected to database");

    let notifier = OperatorChannel::from_config(&config.notification)
        .map_err(|e| AppError::ExternalService(e.to_string()))?;
    let settings = JobSettings::from_config(&config.job, &config.flags());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let job = DailyBalanceJob::new(
        PgBalanceSource::new(db.clone(), config.job.source_page_size),
        PgChartOfAccounts::new(db.clone()),
        Arc::new(PgBalanceSink::new(db)),
        notifier,
        settings,
    )
    .with_cancellation(cancel);

    let summary = job.run(business_date).await?;
    info!(
        %business_date,
        accounts = summary.calculation.accounts_visited,
        account_rows = summary.flushed.rows,
        trial_balance_rows = summary.trial_balance.rows,
        "Run complete"
    );

    Ok(())
}

/// Business date from the first argument, or the day before `today`.
fn business_date(arg: Option<&str>, today: NaiveDate) -> Result<NaiveDate, AppError> {
    match arg.map(str::trim) {
        Some(raw) if !raw.is_empty() => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| AppError::Validation(format!("invalid business date '{raw}': {e}"))),
        _ => today
            .pred_opt()
            .ok_or_else(|| AppError::Validation("no day before today".to_string())),
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(app) = err.downcast_ref::<AppError>() {
        return u8::try_from(app.exit_code()).unwrap_or(1);
    }
    match err.downcast_ref::<JobError>() {
        Some(job) if job.is_retryable() => EXIT_RETRYABLE,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::persist::PersistError;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(None, date(2026, 3, 31))]
    #[case(Some(""), date(2026, 3, 31))]
    #[case(Some("2026-02-28"), date(2026, 2, 28))]
    #[case(Some(" 2025-12-31 "), date(2025, 12, 31))]
    fn test_business_date(#[case] arg: Option<&str>, #[case] expected: NaiveDate) {
        assert_eq!(business_date(arg, date(2026, 4, 1)).unwrap(), expected);
    }

    #[test]
    fn test_invalid_business_date() {
        let err = business_date(Some("31/03/2026"), date(2026, 4, 1)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_exit_codes() {
        let config = anyhow::Error::from(AppError::Validation("x".to_string()));
        assert_eq!(exit_code(&config), 78);

        let exhausted = anyhow::Error::from(JobError::Persistence(PersistError::RetriesExhausted {
            attempts: 3,
            last: Box::new(PersistError::WriteConflict {
                code: "40P01".to_string(),
                message: "deadlock detected".to_string(),
            }),
        }));
        assert_eq!(exit_code(&exhausted), EXIT_RETRYABLE);

        let cancelled = anyhow::Error::from(JobError::Cancelled);
        assert_eq!(exit_code(&cancelled), 1);
    }
}
