//! 诊所事件定义
//!
//! 状态转换完成后产生的类型化事件，供通知分发器消费

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 诊所事件类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClinicEventType {
    AppointmentRequested,
    AppointmentApproved,
    AppointmentRejected,
    AppointmentCompleted,
    AppointmentCancelled,
    PaymentReceived,
    PaymentConfirmed,
    RefundRequested,
    RefundProcessed,
}

impl ClinicEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppointmentRequested => "appointment.requested",
            Self::AppointmentApproved => "appointment.approved",
            Self::AppointmentRejected => "appointment.rejected",
            Self::AppointmentCompleted => "appointment.completed",
            Self::AppointmentCancelled => "appointment.cancelled",
            Self::PaymentReceived => "payment.received",
            Self::PaymentConfirmed => "payment.confirmed",
            Self::RefundRequested => "payment.refund_requested",
            Self::RefundProcessed => "payment.refund_processed",
        }
    }
}

impl TryFrom<&str> for ClinicEventType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "appointment.requested" => Ok(Self::AppointmentRequested),
            "appointment.approved" => Ok(Self::AppointmentApproved),
            "appointment.rejected" => Ok(Self::AppointmentRejected),
            "appointment.completed" => Ok(Self::AppointmentCompleted),
            "appointment.cancelled" => Ok(Self::AppointmentCancelled),
            "payment.received" => Ok(Self::PaymentReceived),
            "payment.confirmed" => Ok(Self::PaymentConfirmed),
            "payment.refund_requested" => Ok(Self::RefundRequested),
            "payment.refund_processed" => Ok(Self::RefundProcessed),
            _ => Err(anyhow::anyhow!("Unknown event type: {}", value)),
        }
    }
}

/// 通知接收者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Uuid,
}

impl Recipient {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

/// 诊所事件数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicEvent {
    pub id: String,
    pub event_type: ClinicEventType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub recipients: Vec<Recipient>,
    pub data: serde_json::Value,
    pub source: String,
}

impl ClinicEvent {
    pub fn new(
        event_type: ClinicEventType,
        recipients: Vec<Recipient>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: chrono::Utc::now(),
            recipients,
            data,
            source: "clinic".to_string(),
        }
    }
}
