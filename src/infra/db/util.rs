use crate::application::repos::RepoError;
use crate::domain::types::SessionId;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db) if db.message().contains("violates check constraint") => {
            RepoError::InvalidInput {
                message: format!(
                    "{} ({})",
                    db.message(),
                    db.constraint().unwrap_or("unknown constraint")
                ),
            }
        }
        sqlx::Error::Database(db) if db.message().contains("violates") => RepoError::Integrity {
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

/// Narrows a stored integer column, reporting out-of-range values as
/// integrity failures rather than truncating.
pub(super) fn narrow<T, S>(column: &'static str, value: S) -> Result<T, RepoError>
where
    T: TryFrom<S>,
    S: Copy + std::fmt::Display,
{
    T::try_from(value)
        .map_err(|_| RepoError::integrity(format!("column `{column}` holds out-of-range value {value}")))
}

pub(super) fn stored_session(raw: &str) -> Result<SessionId, RepoError> {
    SessionId::parse(raw)
        .map_err(|err| RepoError::integrity(err.to_string()))?
        .ok_or_else(|| RepoError::integrity("stored session id is blank"))
}
