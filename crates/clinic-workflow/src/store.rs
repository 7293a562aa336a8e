//! 生命周期持久化接口
//!
//! 引擎在内存状态提交前写入存储：写入失败时内存保持不变，
//! 调用方收到错误。未配置存储时所有操作只作用于内存。

use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_core::{Appointment, AppointmentStatus, Payment, PaymentStatus, Result, TimeSlot};
use uuid::Uuid;

/// 预约与支付生命周期的持久化后端
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// 写入新预约
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()>;

    /// 条件更新预约
    ///
    /// 仅当存储中的状态仍为 `expected` 时更新，否则报错
    async fn update_appointment(
        &self,
        expected: &AppointmentStatus,
        appointment: &Appointment,
    ) -> Result<()>;

    /// 写入新支付记录
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    /// 条件更新支付记录
    async fn update_payment(&self, expected: &PaymentStatus, payment: &Payment) -> Result<()>;

    /// 写入医生某一天的时段列表
    async fn insert_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slots: &[TimeSlot],
    ) -> Result<()>;

    /// 替换医生某一天的时段列表
    async fn replace_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slots: &[TimeSlot],
    ) -> Result<()>;

    /// 删除医生某一天的时段列表
    async fn delete_availability(&self, doctor_id: Uuid, date: NaiveDate) -> Result<()>;

    /// 条件预订时段，已被预订时报错
    async fn book_slot(&self, doctor_id: Uuid, date: NaiveDate, slot_index: usize) -> Result<()>;

    /// 释放时段
    async fn release_slot(&self, doctor_id: Uuid, date: NaiveDate, slot_index: usize)
        -> Result<()>;
}
