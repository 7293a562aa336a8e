//! # Clinic Notify
//!
//! 诊所系统的事件通知模块。通知属于尽力而为的副作用，
//! 投递失败只记录日志，绝不影响主状态转换的结果。

pub mod dispatcher;
pub mod events;

pub use dispatcher::{
    DeliveryStatus, NotificationDispatcher, NotificationRecord, WebhookSubscription,
};
pub use events::{ClinicEvent, ClinicEventType, Recipient};
