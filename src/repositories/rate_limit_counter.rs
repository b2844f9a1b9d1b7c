//! # Rate Limit Counter Repository
//!
//! Counters are incremented with a single `INSERT .. ON CONFLICT DO UPDATE`
//! so concurrent dispatchers never read-modify-write.

use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    prelude::DateTimeWithTimeZone,
    sea_query::{Expr, OnConflict},
};

use crate::error::RepositoryError;
use crate::models::rate_limit_counter::{
    ActiveModel as CounterActiveModel, Column, Entity as RateLimitCounter,
};

pub struct RateLimitCounterRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> RateLimitCounterRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Atomically add one to `key`, creating it with `expires_at` if missing.
    pub async fn increment(
        &self,
        key: &str,
        expires_at: DateTimeWithTimeZone,
    ) -> Result<(), RepositoryError> {
        let counter = CounterActiveModel {
            key: Set(key.to_string()),
            count: Set(1),
            expires_at: Set(expires_at),
        };

        RateLimitCounter::insert(counter)
            .on_conflict(
                OnConflict::column(Column::Key)
                    .value(
                        Column::Count,
                        Expr::col((RateLimitCounter, Column::Count)).add(1),
                    )
                    .to_owned(),
            )
            .exec_without_returning(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    /// Current value of an unexpired counter, zero when absent.
    pub async fn current(
        &self,
        key: &str,
        at: DateTimeWithTimeZone,
    ) -> Result<u64, RepositoryError> {
        let counter = RateLimitCounter::find_by_id(key.to_string())
            .filter(Column::ExpiresAt.gt(at))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(counter.map(|c| c.count.max(0) as u64).unwrap_or(0))
    }

    /// Delete counters whose TTL has passed.
    pub async fn purge_expired(&self, at: DateTimeWithTimeZone) -> Result<u64, RepositoryError> {
        let result = RateLimitCounter::delete_many()
            .filter(Column::ExpiresAt.lte(at))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected)
    }
}
