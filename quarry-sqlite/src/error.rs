//! Mapping rusqlite failures onto SQLSTATE-carrying diagnostics.
//!
//! SQLite reports numeric result codes, not SQLSTATE. The executor's
//! retry policy is SQLSTATE-driven, so each result code is assigned
//! the class with the matching meaning: constraint violations land in
//! `23`, busy/interrupted in `57`, unusable-database conditions in the
//! connection class `08`.

use rusqlite::ErrorCode;

use quarry_query::ErrorInfo;

/// Translate a rusqlite error into an [`ErrorInfo`] the classifier
/// understands.
pub fn map_error(err: rusqlite::Error) -> ErrorInfo {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let sqlstate = sqlstate_for(failure.code);
            let text = message
                .clone()
                .unwrap_or_else(|| failure.to_string());
            ErrorInfo::new(sqlstate, Some(i64::from(failure.extended_code)), text)
        }
        other => ErrorInfo::new("42000", None, other.to_string()),
    }
}

fn sqlstate_for(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::ConstraintViolation => "23000",
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::OperationInterrupted => {
            "57014"
        }
        ErrorCode::CannotOpen
        | ErrorCode::NotADatabase
        | ErrorCode::PermissionDenied
        | ErrorCode::SystemIoFailure => "08001",
        ErrorCode::DatabaseCorrupt => "XX001",
        _ => "42000",
    }
}
