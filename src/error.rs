use crate::datasource::DataSourceError;
use crate::domain::CharacterId;
use thiserror::Error;

/// Failure of one participant's poll cycle.
///
/// Any variant leaves the participant's cursors untouched; the next
/// scheduler pass retries from the same position.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("data source error: {0}")]
    DataSource(#[from] DataSourceError),
    #[error("token owner changed for character {character}")]
    IdentityMismatch { character: CharacterId },
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
