//! Event entity model
//!
//! Database-declared events, used when the event catalog is tenant-managed
//! rather than configured statically.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifier_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning tenant, absent when multitenancy is disabled
    pub tenant_id: Option<Uuid>,

    /// Stable event key, e.g. `user.registered`
    pub key: String,

    pub name: String,

    /// Grouping label used by preference UIs
    pub event_group: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Inactive events are never dispatched
    pub active: bool,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
