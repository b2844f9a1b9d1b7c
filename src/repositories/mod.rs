//! # Repository Layer
//!
//! Repository implementations encapsulating SeaORM operations. Every
//! tenant-owned table is accessed with an explicit `tenant_id` argument;
//! `None` means multitenancy is off and no tenant filter is applied.

use chrono::Utc;
use sea_orm::{ColumnTrait, Condition, prelude::DateTimeWithTimeZone};
use uuid::Uuid;

pub mod channel;
pub mod delivery_job;
pub mod event;
pub mod event_channel_setting;
pub mod notification;
pub mod preference;
pub mod rate_limit_counter;
pub mod setting;
pub mod template;

pub use channel::ChannelRepository;
pub use delivery_job::DeliveryJobRepository;
pub use event::{EventRecord, EventRepository};
pub use event_channel_setting::EventChannelSettingRepository;
pub use notification::{NewNotification, NotificationFilter, NotificationRepository};
pub use preference::PreferenceRepository;
pub use rate_limit_counter::RateLimitCounterRepository;
pub use setting::SettingRepository;
pub use template::{NewTemplate, TemplateRepository};

/// Condition restricting `column` to the given tenant, or matching everything.
pub fn tenant_filter<C: ColumnTrait>(column: C, tenant_id: Option<Uuid>) -> Condition {
    match tenant_id {
        Some(id) => Condition::all().add(column.eq(id)),
        None => Condition::all(),
    }
}

/// Current time in the representation stored by the entities.
pub fn now() -> DateTimeWithTimeZone {
    Utc::now().fixed_offset()
}
