//! # Clinic Workflow
//!
//! 预约与支付生命周期的核心模块：
//! - 预约状态机与支付状态机
//! - 医生可用时段管理（原子预订）
//! - 支付统计聚合
//! - 可插拔的生命周期持久化接口
//! - 协调以上组件并派发通知的工作流引擎

pub mod appointment;
pub mod availability;
pub mod engine;
pub mod payment;
pub mod statistics;
pub mod store;

pub use appointment::{AppointmentEvent, AppointmentStateMachine};
pub use availability::AvailabilityManager;
pub use engine::{Actor, ClinicEngine, ProcessPaymentRequest};
pub use payment::{PaymentEvent, PaymentStateMachine};
pub use statistics::PaymentStatistics;
pub use store::LifecycleStore;
