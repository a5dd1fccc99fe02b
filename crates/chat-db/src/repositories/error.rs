//! Error mapping for the PostgreSQL stores

use chat_core::error::DomainError;
use sqlx::Error as SqlxError;

/// Constraint violations are caller mistakes; everything else means the
/// database could not serve the request.
pub fn map_db_error(e: SqlxError) -> DomainError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_foreign_key_violation() || db_err.is_check_violation() {
            return DomainError::ValidationError(db_err.message().to_string());
        }
    }
    DomainError::StoreUnavailable(e.to_string())
}
