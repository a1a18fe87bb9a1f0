//! Classification of database errors into core error kinds.
//!
//! Write conflicts are recognised by SQLSTATE through the sqlx database
//! error, never by message text.

use daybook_core::persist::PersistError;
use daybook_core::source::SourceError;
use sea_orm::{DbErr, RuntimeErr};

/// `deadlock_detected`.
pub const DEADLOCK_DETECTED: &str = "40P01";
/// `serialization_failure`.
pub const SERIALIZATION_FAILURE: &str = "40001";

/// Returns true for SQLSTATE codes that a retry can resolve.
pub fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code, DEADLOCK_DETECTED | SERIALIZATION_FAILURE)
}

/// SQLSTATE reported by the server, if the error came from one.
pub fn sqlstate(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db_err)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db_err)))
        | DbErr::Conn(RuntimeErr::SqlxError(sqlx::Error::Database(db_err))) => {
            db_err.code().map(std::borrow::Cow::into_owned)
        }
        _ => None,
    }
}

/// Maps a failed write to a [`PersistError`].
pub fn persist_error(err: DbErr) -> PersistError {
    match sqlstate(&err) {
        Some(code) if is_transient_sqlstate(&code) => PersistError::WriteConflict {
            code,
            message: err.to_string(),
        },
        _ => PersistError::Write(err.to_string()),
    }
}

/// Maps a failed read to a [`SourceError`].
pub fn source_error(err: DbErr) -> SourceError {
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => SourceError::Unavailable(err.to_string()),
        other => SourceError::Query(other.to_string()),
    }
}
