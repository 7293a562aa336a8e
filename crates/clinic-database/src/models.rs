//! 数据库模型

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clinic_core::models::*;
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 预约状态与数据库字符串的映射
pub fn appointment_status_to_str(status: &AppointmentStatus) -> &'static str {
    match status {
        AppointmentStatus::Pending => "PENDING",
        AppointmentStatus::Approved => "APPROVED",
        AppointmentStatus::Rejected => "REJECTED",
        AppointmentStatus::Completed => "COMPLETED",
        AppointmentStatus::Cancelled => "CANCELLED",
    }
}

pub fn appointment_status_from_str(status: &str) -> AppointmentStatus {
    match status {
        "APPROVED" => AppointmentStatus::Approved,
        "REJECTED" => AppointmentStatus::Rejected,
        "COMPLETED" => AppointmentStatus::Completed,
        "CANCELLED" => AppointmentStatus::Cancelled,
        _ => AppointmentStatus::Pending, // 默认状态
    }
}

/// 支付状态与数据库字符串的映射
pub fn payment_status_to_str(status: &PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "PENDING",
        PaymentStatus::Paid => "PAID",
        PaymentStatus::Failed => "FAILED",
        PaymentStatus::RefundRequested => "REFUND_REQUESTED",
        PaymentStatus::Refunded => "REFUNDED",
        PaymentStatus::Cancelled => "CANCELLED",
    }
}

pub fn payment_status_from_str(status: &str) -> PaymentStatus {
    match status {
        "PAID" => PaymentStatus::Paid,
        "FAILED" => PaymentStatus::Failed,
        "REFUND_REQUESTED" => PaymentStatus::RefundRequested,
        "REFUNDED" => PaymentStatus::Refunded,
        "CANCELLED" => PaymentStatus::Cancelled,
        _ => PaymentStatus::Pending,
    }
}

/// 支付方式与数据库字符串的映射
pub fn payment_method_to_str(method: &PaymentMethod) -> &'static str {
    method.as_str()
}

pub fn payment_method_from_str(method: &str) -> PaymentMethod {
    match method {
        "credit_card" => PaymentMethod::CreditCard,
        "debit_card" => PaymentMethod::DebitCard,
        "easypaisa" => PaymentMethod::Easypaisa,
        "jazzcash" => PaymentMethod::JazzCash,
        _ => PaymentMethod::ClinicVisit,
    }
}

/// 数据库预约表
#[derive(Debug, FromRow)]
pub struct DbAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_index: i32,
    pub status: String, // 存储为字符串，转换为AppointmentStatus枚举
    pub request_message: Option<String>,
    pub rejection_reason: Option<String>,
    pub consultation_fee: Option<i64>,
    pub approval_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbAppointment> for Appointment {
    fn from(db: DbAppointment) -> Self {
        Appointment {
            id: db.id,
            patient_id: db.patient_id,
            doctor_id: db.doctor_id,
            appointment_date: db.appointment_date,
            start_time: db.start_time,
            end_time: db.end_time,
            slot_index: db.slot_index as usize,
            status: appointment_status_from_str(&db.status),
            request_message: db.request_message,
            rejection_reason: db.rejection_reason,
            consultation_fee: db.consultation_fee,
            approval_notes: db.approval_notes,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// 数据库支付表
#[derive(Debug, FromRow)]
pub struct DbPayment {
    pub id: Uuid,
    pub transaction_id: String,
    pub invoice_number: String,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub amount: i64,
    pub payment_method: String,
    pub status: String,
    pub phone_number: Option<String>,
    pub card_last_digits: Option<String>,
    pub refund_reason: Option<String>,
    pub refund_notes: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_processed_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<i64>,
    pub transaction_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<DbPayment> for Payment {
    fn from(db: DbPayment) -> Self {
        Payment {
            id: db.id,
            transaction_id: db.transaction_id,
            invoice_number: db.invoice_number,
            appointment_id: db.appointment_id,
            patient_id: db.patient_id,
            doctor_id: db.doctor_id,
            amount: db.amount,
            payment_method: payment_method_from_str(&db.payment_method),
            status: payment_status_from_str(&db.status),
            phone_number: db.phone_number,
            card_last_digits: db.card_last_digits,
            refund_reason: db.refund_reason,
            refund_notes: db.refund_notes,
            refund_requested_at: db.refund_requested_at,
            refund_processed_at: db.refund_processed_at,
            refund_amount: db.refund_amount,
            transaction_date: db.transaction_date,
            created_at: db.created_at,
        }
    }
}

/// 数据库可用时段表
///
/// 每行一个时段，(doctor_id, slot_date, slot_index) 唯一
#[derive(Debug, FromRow)]
pub struct DbAvailabilitySlot {
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub slot_index: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_booked: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<DbAvailabilitySlot> for TimeSlot {
    fn from(db: DbAvailabilitySlot) -> Self {
        TimeSlot {
            start_time: db.start_time,
            end_time: db.end_time,
            is_booked: db.is_booked,
        }
    }
}

// 插入模型 - 用于创建新记录

/// 新预约插入模型
#[derive(Debug)]
pub struct NewAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_index: i32,
    pub status: AppointmentStatus,
    pub request_message: Option<String>,
}

impl NewAppointment {
    pub fn from_appointment(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            appointment_date: appointment.appointment_date,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            slot_index: appointment.slot_index as i32,
            status: appointment.status.clone(),
            request_message: appointment.request_message.clone(),
        }
    }
}

/// 新支付插入模型
#[derive(Debug)]
pub struct NewPayment {
    pub id: Uuid,
    pub transaction_id: String,
    pub invoice_number: String,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub phone_number: Option<String>,
    pub card_last_digits: Option<String>,
}

impl NewPayment {
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            transaction_id: payment.transaction_id.clone(),
            invoice_number: payment.invoice_number.clone(),
            appointment_id: payment.appointment_id,
            patient_id: payment.patient_id,
            doctor_id: payment.doctor_id,
            amount: payment.amount,
            payment_method: payment.payment_method,
            status: payment.status.clone(),
            phone_number: payment.phone_number.clone(),
            card_last_digits: payment.card_last_digits.clone(),
        }
    }
}

/// 按状态和方式分组的支付统计行
#[derive(Debug, FromRow)]
pub struct PaymentStatisticsRow {
    pub status: String,
    pub payment_method: String,
    pub payment_count: i64,
    pub total_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appointment_status_roundtrip() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Approved,
            AppointmentStatus::Rejected,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ] {
            assert_eq!(
                appointment_status_from_str(appointment_status_to_str(&status)),
                status
            );
        }
    }

    #[test]
    fn test_payment_status_roundtrip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::RefundRequested,
            PaymentStatus::Refunded,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(payment_status_from_str(payment_status_to_str(&status)), status);
        }
    }

    #[test]
    fn test_unknown_status_defaults_to_pending() {
        assert_eq!(appointment_status_from_str("SCHEDULED"), AppointmentStatus::Pending);
        assert_eq!(payment_status_from_str(""), PaymentStatus::Pending);
    }
}
