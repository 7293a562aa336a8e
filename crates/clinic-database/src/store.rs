//! 引擎持久化后端的PostgreSQL实现
//!
//! 把 `LifecycleStore` 的每个操作委托给 `DatabaseQueries`。
//! 条件更新影响行数为0时说明存储中的状态已被并发修改，报错返回，
//! 引擎据此放弃本次内存提交。

use crate::connection::DatabasePool;
use crate::models::{NewAppointment, NewPayment};
use crate::queries::DatabaseQueries;
use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_core::{
    Appointment, AppointmentStatus, ClinicError, Payment, PaymentStatus, Result, TimeSlot,
};
use clinic_workflow::LifecycleStore;
use std::sync::Arc;
use uuid::Uuid;

/// 基于数据库连接池的生命周期存储
pub struct DatabaseStore {
    pool: Arc<DatabasePool>,
}

impl DatabaseStore {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    fn queries(&self) -> DatabaseQueries<'_> {
        DatabaseQueries::new(self.pool.as_ref())
    }
}

#[async_trait]
impl LifecycleStore for DatabaseStore {
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        self.queries()
            .create_appointment(&NewAppointment::from_appointment(appointment))
            .await?;
        Ok(())
    }

    async fn update_appointment(
        &self,
        expected: &AppointmentStatus,
        appointment: &Appointment,
    ) -> Result<()> {
        let updated = self
            .queries()
            .update_appointment_status(&appointment.id, expected, appointment)
            .await?;
        if !updated {
            return Err(ClinicError::Database(format!(
                "Appointment {} was modified concurrently",
                appointment.id
            )));
        }
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        self.queries()
            .create_payment(&NewPayment::from_payment(payment))
            .await?;
        Ok(())
    }

    async fn update_payment(&self, expected: &PaymentStatus, payment: &Payment) -> Result<()> {
        let updated = self
            .queries()
            .update_payment_status(&payment.id, expected, payment)
            .await?;
        if !updated {
            return Err(ClinicError::Database(format!(
                "Payment {} was modified concurrently",
                payment.id
            )));
        }
        Ok(())
    }

    async fn insert_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slots: &[TimeSlot],
    ) -> Result<()> {
        self.queries()
            .insert_availability(&doctor_id, date, slots)
            .await
    }

    async fn replace_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slots: &[TimeSlot],
    ) -> Result<()> {
        let queries = self.queries();
        let deleted = queries.delete_availability(&doctor_id, date).await?;
        if !deleted {
            return Err(ClinicError::Database(format!(
                "Availability for doctor {} on {} has booked slots",
                doctor_id, date
            )));
        }
        queries.insert_availability(&doctor_id, date, slots).await
    }

    async fn delete_availability(&self, doctor_id: Uuid, date: NaiveDate) -> Result<()> {
        let deleted = self.queries().delete_availability(&doctor_id, date).await?;
        if !deleted {
            return Err(ClinicError::Database(format!(
                "Availability for doctor {} on {} has booked slots",
                doctor_id, date
            )));
        }
        Ok(())
    }

    async fn book_slot(&self, doctor_id: Uuid, date: NaiveDate, slot_index: usize) -> Result<()> {
        let booked = self
            .queries()
            .book_slot(&doctor_id, date, slot_index as i32)
            .await?;
        if !booked {
            return Err(ClinicError::Validation(format!(
                "Slot {} on {} is already booked",
                slot_index, date
            )));
        }
        Ok(())
    }

    async fn release_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slot_index: usize,
    ) -> Result<()> {
        self.queries()
            .release_slot(&doctor_id, date, slot_index as i32)
            .await
    }
}
