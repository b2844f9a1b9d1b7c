//! # Notification Repository
//!
//! Persistence for notification rows. State transitions and analytics
//! counters are applied with conditional `UPDATE` statements so concurrent
//! workers and tracking callbacks never lose increments.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait,
    QueryFilter, QueryOrder, Set, prelude::DateTimeWithTimeZone, sea_query::Expr,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{now, tenant_filter};
use crate::error::RepositoryError;
use crate::models::notification::{
    ActiveModel as NotificationActiveModel, Column, Entity as Notification, Model,
};
use crate::models::{ChannelType, NotificationStatus, Recipient};

/// Input for creating a pending notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub tenant_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub recipient: Recipient,
    pub channel: ChannelType,
    pub subject: String,
    pub content: String,
    pub data: JsonValue,
    pub tracking_token: String,
    pub scheduled_at: Option<DateTimeWithTimeZone>,
}

/// Listing filter for the admin API.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub status: Option<NotificationStatus>,
    pub channel: Option<ChannelType>,
    pub user_id: Option<i64>,
    pub page: u64,
    pub per_page: u64,
}

/// Works on a pooled connection or inside a caller's transaction.
pub struct NotificationRepository<'a, C = DatabaseConnection> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> NotificationRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Insert a notification in `pending` state.
    pub async fn create(&self, input: NewNotification) -> Result<Model, RepositoryError> {
        if input.tracking_token.is_empty() {
            return Err(RepositoryError::validation_error(
                "Tracking token cannot be empty",
            ));
        }

        let timestamp = now();
        NotificationActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(input.tenant_id),
            template_id: Set(input.template_id),
            user_id: Set(input.recipient.id),
            channel: Set(input.channel.as_str().to_string()),
            subject: Set(input.subject),
            content: Set(input.content),
            data: Set(Some(input.data)),
            recipient: Set(Some(serde_json::to_value(&input.recipient)?)),
            tracking_token: Set(input.tracking_token),
            status: Set(NotificationStatus::Pending.as_str().to_string()),
            error: Set(None),
            scheduled_at: Set(input.scheduled_at),
            sent_at: Set(None),
            opened_at: Set(None),
            clicked_at: Set(None),
            opens_count: Set(0),
            clicks_count: Set(0),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(
        &self,
        tenant_id: Option<Uuid>,
        id: Uuid,
    ) -> Result<Option<Model>, RepositoryError> {
        Notification::find_by_id(id)
            .filter(tenant_filter(Column::TenantId, tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Authoritative token lookup. Tracking callbacks are tenant-agnostic.
    pub async fn find_by_tracking_token(
        &self,
        token: &str,
    ) -> Result<Option<Model>, RepositoryError> {
        Notification::find()
            .filter(Column::TrackingToken.eq(token))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Page of notifications, newest first, plus the total match count.
    pub async fn list(
        &self,
        tenant_id: Option<Uuid>,
        filter: &NotificationFilter,
    ) -> Result<(Vec<Model>, u64), RepositoryError> {
        let mut query = Notification::find().filter(tenant_filter(Column::TenantId, tenant_id));
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }
        if let Some(channel) = filter.channel {
            query = query.filter(Column::Channel.eq(channel.as_str()));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }

        let paginator = query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .paginate(self.db, filter.per_page.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(RepositoryError::database_error)?;
        let items = paginator
            .fetch_page(filter.page)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok((items, total))
    }

    /// Mark delivered; a retried attempt may move `failed` to `sent`. Returns false if already sent.
    pub async fn mark_sent(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let timestamp = now();
        let result = Notification::update_many()
            .col_expr(Column::Status, Expr::value(NotificationStatus::Sent.as_str()))
            .col_expr(Column::SentAt, Expr::value(timestamp))
            .col_expr(Column::Error, Expr::value(Option::<String>::None))
            .col_expr(Column::UpdatedAt, Expr::value(timestamp))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.ne(NotificationStatus::Sent.as_str()))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected > 0)
    }

    /// Record a failure. A notification that already reached `sent` is left alone.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool, RepositoryError> {
        let result = Notification::update_many()
            .col_expr(
                Column::Status,
                Expr::value(NotificationStatus::Failed.as_str()),
            )
            .col_expr(Column::Error, Expr::value(error))
            .col_expr(Column::UpdatedAt, Expr::value(now()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.ne(NotificationStatus::Sent.as_str()))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected > 0)
    }

    /// Move a `failed` or `sent` notification back to `pending` for a resend.
    ///
    /// Analytics columns are not touched.
    pub async fn reset_to_pending(
        &self,
        tenant_id: Option<Uuid>,
        id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let result = Notification::update_many()
            .col_expr(
                Column::Status,
                Expr::value(NotificationStatus::Pending.as_str()),
            )
            .col_expr(Column::Error, Expr::value(Option::<String>::None))
            .col_expr(Column::SentAt, Expr::value(Option::<DateTimeWithTimeZone>::None))
            .col_expr(Column::UpdatedAt, Expr::value(now()))
            .filter(Column::Id.eq(id))
            .filter(tenant_filter(Column::TenantId, tenant_id))
            .filter(Column::Status.is_in([
                NotificationStatus::Failed.as_str(),
                NotificationStatus::Sent.as_str(),
            ]))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected > 0)
    }

    /// Count an open; `opened_at` is only set by the first one.
    pub async fn record_open(
        &self,
        id: Uuid,
        at: DateTimeWithTimeZone,
    ) -> Result<bool, RepositoryError> {
        self.record_interaction(id, at, Column::OpensCount, Column::OpenedAt)
            .await
    }

    /// Count a click; `clicked_at` is only set by the first one.
    pub async fn record_click(
        &self,
        id: Uuid,
        at: DateTimeWithTimeZone,
    ) -> Result<bool, RepositoryError> {
        self.record_interaction(id, at, Column::ClicksCount, Column::ClickedAt)
            .await
    }

    async fn record_interaction(
        &self,
        id: Uuid,
        at: DateTimeWithTimeZone,
        counter: Column,
        first_seen: Column,
    ) -> Result<bool, RepositoryError> {
        let incremented = Notification::update_many()
            .col_expr(counter, Expr::col(counter).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .filter(Column::Id.eq(id))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if incremented.rows_affected == 0 {
            return Ok(false);
        }

        Notification::update_many()
            .col_expr(first_seen, Expr::value(at))
            .filter(Column::Id.eq(id))
            .filter(first_seen.is_null())
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(true)
    }

    fn analytics_condition(
        tenant_id: Option<Uuid>,
        cutoff: DateTimeWithTimeZone,
    ) -> Condition {
        Condition::all()
            .add(tenant_filter(Column::TenantId, tenant_id))
            .add(Column::CreatedAt.lt(cutoff))
            .add(
                Condition::any()
                    .add(Column::OpenedAt.is_not_null())
                    .add(Column::ClickedAt.is_not_null())
                    .add(Column::OpensCount.gt(0))
                    .add(Column::ClicksCount.gt(0)),
            )
    }

    /// Number of rows older than `cutoff` still carrying analytics.
    pub async fn count_analytics_before(
        &self,
        tenant_id: Option<Uuid>,
        cutoff: DateTimeWithTimeZone,
    ) -> Result<u64, RepositoryError> {
        Notification::find()
            .filter(Self::analytics_condition(tenant_id, cutoff))
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Clear analytics on rows older than `cutoff`. Rows themselves are kept.
    pub async fn clear_analytics_before(
        &self,
        tenant_id: Option<Uuid>,
        cutoff: DateTimeWithTimeZone,
    ) -> Result<u64, RepositoryError> {
        let result = Notification::update_many()
            .col_expr(
                Column::OpenedAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .col_expr(
                Column::ClickedAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .col_expr(Column::OpensCount, Expr::value(0))
            .col_expr(Column::ClicksCount, Expr::value(0))
            .filter(Self::analytics_condition(tenant_id, cutoff))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected)
    }
}
