//! # Delivery Job Repository
//!
//! The typed task queue behind the delivery worker. Claiming selects eligible
//! ids and then flips them to `running` with a conditional update inside one
//! transaction, so two workers never run the same job.

use chrono::Duration;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait, prelude::DateTimeWithTimeZone, sea_query::Expr,
};
use uuid::Uuid;

use super::now;
use crate::error::RepositoryError;
use crate::models::delivery_job::{
    ActiveModel as DeliveryJobActiveModel, Column, Entity as DeliveryJob, Model, status,
};

pub struct DeliveryJobRepository<'a, C = DatabaseConnection> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait + TransactionTrait> DeliveryJobRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Queue a delivery for `notification_id`, runnable from `available_at`.
    pub async fn enqueue(
        &self,
        tenant_id: Option<Uuid>,
        notification_id: Uuid,
        available_at: DateTimeWithTimeZone,
        max_attempts: u32,
    ) -> Result<Model, RepositoryError> {
        let timestamp = now();
        DeliveryJobActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            notification_id: Set(notification_id),
            status: Set(status::QUEUED.to_string()),
            attempts: Set(0),
            max_attempts: Set(max_attempts.max(1) as i32),
            available_at: Set(available_at),
            started_at: Set(None),
            finished_at: Set(None),
            last_error: Set(None),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, RepositoryError> {
        DeliveryJob::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list_for_notification(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<Model>, RepositoryError> {
        DeliveryJob::find()
            .filter(Column::NotificationId.eq(notification_id))
            .order_by_asc(Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Claim up to `limit` queued jobs whose `available_at` has passed.
    ///
    /// Claimed jobs are `running` with `attempts` incremented.
    pub async fn claim(
        &self,
        limit: usize,
        at: DateTimeWithTimeZone,
    ) -> Result<Vec<Model>, RepositoryError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;

        let eligible: Vec<Uuid> = DeliveryJob::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::Status.eq(status::QUEUED))
            .filter(Column::AvailableAt.lte(at))
            .order_by_asc(Column::AvailableAt)
            .order_by_asc(Column::CreatedAt)
            .limit(Some(limit as u64))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await
            .map_err(RepositoryError::database_error)?;

        if eligible.is_empty() {
            txn.commit()
                .await
                .map_err(RepositoryError::database_error)?;
            return Ok(Vec::new());
        }

        let updated = DeliveryJob::update_many()
            .col_expr(Column::Status, Expr::value(status::RUNNING))
            .col_expr(Column::StartedAt, Expr::value(at))
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .filter(Column::Id.is_in(eligible.clone()))
            .filter(Column::Status.eq(status::QUEUED))
            .exec(&txn)
            .await
            .map_err(RepositoryError::database_error)?;

        let claimed = if updated.rows_affected > 0 {
            DeliveryJob::find()
                .filter(Column::Id.is_in(eligible))
                .filter(Column::Status.eq(status::RUNNING))
                .filter(Column::StartedAt.eq(at))
                .order_by_asc(Column::AvailableAt)
                .all(&txn)
                .await
                .map_err(RepositoryError::database_error)?
        } else {
            Vec::new()
        };

        txn.commit()
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(claimed)
    }

    /// Return jobs stuck in `running` since before `at - stale_after` to the queue.
    pub async fn requeue_stale(
        &self,
        at: DateTimeWithTimeZone,
        stale_after: Duration,
    ) -> Result<u64, RepositoryError> {
        let cutoff = at - stale_after;
        let result = DeliveryJob::update_many()
            .col_expr(Column::Status, Expr::value(status::QUEUED))
            .col_expr(Column::AvailableAt, Expr::value(at))
            .col_expr(
                Column::LastError,
                Expr::value("delivery attempt abandoned by a stopped worker"),
            )
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .filter(Column::Status.eq(status::RUNNING))
            .filter(Column::StartedAt.lt(cutoff))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected)
    }

    pub async fn mark_succeeded(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.finish(id, status::SUCCEEDED, None).await
    }

    pub async fn mark_discarded(&self, id: Uuid, reason: &str) -> Result<(), RepositoryError> {
        self.finish(id, status::DISCARDED, Some(reason)).await
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        self.finish(id, status::FAILED, Some(error)).await
    }

    /// Put a running job back in the queue for another attempt.
    pub async fn schedule_retry(
        &self,
        id: Uuid,
        available_at: DateTimeWithTimeZone,
        error: &str,
    ) -> Result<(), RepositoryError> {
        DeliveryJob::update_many()
            .col_expr(Column::Status, Expr::value(status::QUEUED))
            .col_expr(Column::AvailableAt, Expr::value(available_at))
            .col_expr(Column::LastError, Expr::value(error))
            .col_expr(Column::UpdatedAt, Expr::value(now()))
            .filter(Column::Id.eq(id))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        terminal_status: &str,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let timestamp = now();
        let mut update = DeliveryJob::update_many()
            .col_expr(Column::Status, Expr::value(terminal_status))
            .col_expr(Column::FinishedAt, Expr::value(timestamp))
            .col_expr(Column::UpdatedAt, Expr::value(timestamp));
        if let Some(error) = error {
            update = update.col_expr(Column::LastError, Expr::value(error));
        }

        update
            .filter(Column::Id.eq(id))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }
}
