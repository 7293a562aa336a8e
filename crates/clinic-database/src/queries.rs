//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use chrono::NaiveDate;
use clinic_core::{Appointment, ClinicError, Payment, Result, TimeSlot};
use sqlx::Row;
use uuid::Uuid;

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建预约表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS appointments (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL,
                doctor_id UUID NOT NULL,
                appointment_date DATE NOT NULL,
                start_time TIME NOT NULL,
                end_time TIME NOT NULL,
                slot_index INTEGER NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'PENDING',
                request_message TEXT,
                rejection_reason TEXT,
                consultation_fee BIGINT,
                approval_notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建支付表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS payments (
                id UUID PRIMARY KEY,
                transaction_id VARCHAR(64) UNIQUE NOT NULL,
                invoice_number VARCHAR(64) UNIQUE NOT NULL,
                appointment_id UUID NOT NULL REFERENCES appointments(id),
                patient_id UUID NOT NULL,
                doctor_id UUID NOT NULL,
                amount BIGINT NOT NULL,
                payment_method VARCHAR(20) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'PENDING',
                phone_number VARCHAR(20),
                card_last_digits VARCHAR(4),
                refund_reason TEXT,
                refund_notes TEXT,
                refund_requested_at TIMESTAMP WITH TIME ZONE,
                refund_processed_at TIMESTAMP WITH TIME ZONE,
                refund_amount BIGINT,
                transaction_date TIMESTAMP WITH TIME ZONE NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建可用时段表，(doctor_id, slot_date, slot_index) 唯一
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS availability_slots (
                doctor_id UUID NOT NULL,
                slot_date DATE NOT NULL,
                slot_index INTEGER NOT NULL,
                start_time TIME NOT NULL,
                end_time TIME NOT NULL,
                is_booked BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                PRIMARY KEY (doctor_id, slot_date, slot_index)
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_appointments_patient_id ON appointments(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_appointments_doctor_id ON appointments(doctor_id)",
            "CREATE INDEX IF NOT EXISTS idx_appointments_date ON appointments(appointment_date)",
            "CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status)",
            "CREATE INDEX IF NOT EXISTS idx_payments_appointment_id ON payments(appointment_id)",
            "CREATE INDEX IF NOT EXISTS idx_payments_patient_id ON payments(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status)",
            "CREATE INDEX IF NOT EXISTS idx_availability_doctor_date ON availability_slots(doctor_id, slot_date)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| ClinicError::Database(e.to_string()))?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 预约相关操作 ==========

    /// 创建新预约
    pub async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO appointments (id, patient_id, doctor_id, appointment_date, start_time, end_time, slot_index, status, request_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
        "#)
        .bind(appointment.id)
        .bind(appointment.patient_id)
        .bind(appointment.doctor_id)
        .bind(appointment.appointment_date)
        .bind(appointment.start_time)
        .bind(appointment.end_time)
        .bind(appointment.slot_index)
        .bind(appointment_status_to_str(&appointment.status))
        .bind(&appointment.request_message)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| ClinicError::Database(e.to_string()))
    }

    /// 根据ID查找预约
    pub async fn get_appointment_by_id(&self, id: &Uuid) -> Result<Option<Appointment>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbAppointment>(
            "SELECT * FROM appointments WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(Appointment::from))
    }

    /// 根据患者ID获取所有预约
    pub async fn get_appointments_by_patient_id(&self, patient_id: &Uuid) -> Result<Vec<Appointment>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbAppointment>(
            "SELECT * FROM appointments WHERE patient_id = $1 ORDER BY appointment_date, start_time"
        )
        .bind(patient_id)
        .fetch_all(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Appointment::from).collect())
    }

    /// 根据医生ID获取所有预约
    pub async fn get_appointments_by_doctor_id(&self, doctor_id: &Uuid) -> Result<Vec<Appointment>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbAppointment>(
            "SELECT * FROM appointments WHERE doctor_id = $1 ORDER BY appointment_date, start_time"
        )
        .bind(doctor_id)
        .fetch_all(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Appointment::from).collect())
    }

    /// 更新预约状态及审批字段
    ///
    /// WHERE子句同时校验当前状态，作为并发下的最后一道防线
    pub async fn update_appointment_status(
        &self,
        id: &Uuid,
        expected_status: &clinic_core::AppointmentStatus,
        appointment: &Appointment,
    ) -> Result<bool> {
        let pool = self.pool.pool();

        let result = sqlx::query(r#"
            UPDATE appointments
            SET status = $1, rejection_reason = $2, consultation_fee = $3, approval_notes = $4, updated_at = NOW()
            WHERE id = $5 AND status = $6
        "#)
        .bind(appointment_status_to_str(&appointment.status))
        .bind(&appointment.rejection_reason)
        .bind(appointment.consultation_fee)
        .bind(&appointment.approval_notes)
        .bind(id)
        .bind(appointment_status_to_str(expected_status))
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    // ========== 支付相关操作 ==========

    /// 创建新支付记录
    pub async fn create_payment(&self, payment: &NewPayment) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO payments (id, transaction_id, invoice_number, appointment_id, patient_id, doctor_id, amount, payment_method, status, phone_number, card_last_digits, transaction_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            RETURNING id
        "#)
        .bind(payment.id)
        .bind(&payment.transaction_id)
        .bind(&payment.invoice_number)
        .bind(payment.appointment_id)
        .bind(payment.patient_id)
        .bind(payment.doctor_id)
        .bind(payment.amount)
        .bind(payment_method_to_str(&payment.payment_method))
        .bind(payment_status_to_str(&payment.status))
        .bind(&payment.phone_number)
        .bind(&payment.card_last_digits)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| ClinicError::Database(e.to_string()))
    }

    /// 根据ID查找支付记录
    pub async fn get_payment_by_id(&self, id: &Uuid) -> Result<Option<Payment>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbPayment>(
            "SELECT * FROM payments WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(Payment::from))
    }

    /// 检查预约是否已有未失败的支付
    pub async fn has_active_payment(&self, appointment_id: &Uuid) -> Result<bool> {
        let pool = self.pool.pool();

        let row = sqlx::query(
            "SELECT COUNT(*) AS active FROM payments WHERE appointment_id = $1 AND status != 'FAILED'"
        )
        .bind(appointment_id)
        .fetch_one(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        let active: i64 = row.get("active");
        Ok(active > 0)
    }

    /// 更新支付状态及退款字段
    ///
    /// WHERE子句同时校验当前状态
    pub async fn update_payment_status(
        &self,
        id: &Uuid,
        expected_status: &clinic_core::PaymentStatus,
        payment: &Payment,
    ) -> Result<bool> {
        let pool = self.pool.pool();

        let result = sqlx::query(r#"
            UPDATE payments
            SET status = $1, refund_reason = $2, refund_notes = $3, refund_requested_at = $4, refund_processed_at = $5, refund_amount = $6, transaction_date = $7
            WHERE id = $8 AND status = $9
        "#)
        .bind(payment_status_to_str(&payment.status))
        .bind(&payment.refund_reason)
        .bind(&payment.refund_notes)
        .bind(payment.refund_requested_at)
        .bind(payment.refund_processed_at)
        .bind(payment.refund_amount)
        .bind(payment.transaction_date)
        .bind(id)
        .bind(payment_status_to_str(expected_status))
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    /// 支付统计：按状态和方式分组的计数与金额
    pub async fn payment_statistics_rows(&self) -> Result<Vec<PaymentStatisticsRow>> {
        let pool = self.pool.pool();

        let rows = sqlx::query_as::<_, PaymentStatisticsRow>(r#"
            SELECT status, payment_method,
                   COUNT(*) AS payment_count,
                   COALESCE(SUM(amount), 0) AS total_amount
            FROM payments
            GROUP BY status, payment_method
        "#)
        .fetch_all(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(rows)
    }

    // ========== 可用时段相关操作 ==========

    /// 写入医生某一天的时段列表
    pub async fn insert_availability(
        &self,
        doctor_id: &Uuid,
        date: NaiveDate,
        slots: &[TimeSlot],
    ) -> Result<()> {
        let pool = self.pool.pool();

        for (index, slot) in slots.iter().enumerate() {
            sqlx::query(r#"
                INSERT INTO availability_slots (doctor_id, slot_date, slot_index, start_time, end_time, is_booked)
                VALUES ($1, $2, $3, $4, $5, FALSE)
            "#)
            .bind(doctor_id)
            .bind(date)
            .bind(index as i32)
            .bind(slot.start_time)
            .bind(slot.end_time)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;
        }

        Ok(())
    }

    /// 查询医生某一天的时段列表
    pub async fn get_availability(
        &self,
        doctor_id: &Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbAvailabilitySlot>(
            "SELECT * FROM availability_slots WHERE doctor_id = $1 AND slot_date = $2 ORDER BY slot_index"
        )
        .bind(doctor_id)
        .bind(date)
        .fetch_all(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(results.into_iter().map(TimeSlot::from).collect())
    }

    /// 原子预订时段
    ///
    /// 单条条件更新：仅当 is_booked 为 FALSE 时翻转，
    /// 并发的第二次预订会因为影响行数为0而失败
    pub async fn book_slot(
        &self,
        doctor_id: &Uuid,
        date: NaiveDate,
        slot_index: i32,
    ) -> Result<bool> {
        let pool = self.pool.pool();

        let result = sqlx::query(r#"
            UPDATE availability_slots
            SET is_booked = TRUE, updated_at = NOW()
            WHERE doctor_id = $1 AND slot_date = $2 AND slot_index = $3 AND is_booked = FALSE
        "#)
        .bind(doctor_id)
        .bind(date)
        .bind(slot_index)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    /// 释放时段
    pub async fn release_slot(
        &self,
        doctor_id: &Uuid,
        date: NaiveDate,
        slot_index: i32,
    ) -> Result<()> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            UPDATE availability_slots
            SET is_booked = FALSE, updated_at = NOW()
            WHERE doctor_id = $1 AND slot_date = $2 AND slot_index = $3
        "#)
        .bind(doctor_id)
        .bind(date)
        .bind(slot_index)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    /// 删除医生某一天的时段列表
    ///
    /// 仅当该天没有被预订的时段时删除
    pub async fn delete_availability(&self, doctor_id: &Uuid, date: NaiveDate) -> Result<bool> {
        let pool = self.pool.pool();

        let row = sqlx::query(
            "SELECT COUNT(*) AS booked FROM availability_slots WHERE doctor_id = $1 AND slot_date = $2 AND is_booked = TRUE"
        )
        .bind(doctor_id)
        .bind(date)
        .fetch_one(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        let booked: i64 = row.get("booked");
        if booked > 0 {
            return Ok(false);
        }

        sqlx::query(
            "DELETE FROM availability_slots WHERE doctor_id = $1 AND slot_date = $2"
        )
        .bind(doctor_id)
        .bind(date)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(true)
    }
}
