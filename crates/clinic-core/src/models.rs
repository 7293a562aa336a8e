//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 用户角色
///
/// 封闭的角色集合，所有能力分发都基于该枚举进行匹配
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Patient, // 患者
    Doctor,  // 医生
    Admin,   // 管理员
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

/// 患者基本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,  // 患者姓名
    pub email: String, // 联系邮箱
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 医生基本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub specialization: Option<String>, // 专科方向
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 预约信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate, // 就诊日期
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_index: usize, // 关联的医生可用时段序号
    pub status: AppointmentStatus,
    pub request_message: Option<String>,  // 患者申请留言
    pub rejection_reason: Option<String>, // 仅在 Rejected 状态有意义
    pub consultation_fee: Option<i64>,    // 审批时设置一次，之后不可变
    pub approval_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 预约状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    Pending,   // 待审批
    Approved,  // 已批准
    Rejected,  // 已拒绝（终态）
    Completed, // 已完成（终态）
    Cancelled, // 已取消（终态）
}

impl AppointmentStatus {
    /// 终态不再允许任何转换
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Rejected
                | AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
        )
    }
}

/// 支付方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    CreditCard, // 信用卡
    DebitCard,  // 借记卡
    Easypaisa,  // 电子钱包
    JazzCash,   // 电子钱包
    ClinicVisit, // 到店支付，需要医生手动确认
}

impl PaymentMethod {
    /// 电子钱包方式需要提供手机号
    pub fn requires_phone_number(&self) -> bool {
        matches!(self, PaymentMethod::Easypaisa | PaymentMethod::JazzCash)
    }

    /// 模拟网关可以即时结算的方式（到店支付除外）
    pub fn settles_instantly(&self) -> bool {
        !matches!(self, PaymentMethod::ClinicVisit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Easypaisa => "easypaisa",
            PaymentMethod::JazzCash => "jazzcash",
            PaymentMethod::ClinicVisit => "clinic_visit",
        }
    }
}

/// 支付记录
///
/// 与已批准的预约一一对应，金额在创建时从预约的诊费复制且不再变化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub transaction_id: String, // 全局唯一交易号
    pub invoice_number: String, // 全局唯一发票号
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid, // 由预约派生
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub phone_number: Option<String>,  // 钱包方式必填
    pub card_last_digits: Option<String>,
    pub refund_reason: Option<String>,
    pub refund_notes: Option<String>, // 管理员裁决备注
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_processed_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<i64>,
    pub transaction_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// 支付状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Pending,         // 待结算
    Paid,            // 已支付
    Failed,          // 失败（终态）
    RefundRequested, // 退款申请中
    Refunded,        // 已退款（终态）
    Cancelled,       // 已取消（终态）
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Refunded | PaymentStatus::Cancelled
        )
    }
}

/// 医生可用时段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_booked: bool,
}

impl TimeSlot {
    pub fn new(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            start_time,
            end_time,
            is_booked: false,
        }
    }
}

/// 医生某一天的可用时段列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityDay {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityDay {
    /// 是否存在已被预订的时段
    pub fn has_booked_slot(&self) -> bool {
        self.slots.iter().any(|slot| slot.is_booked)
    }
}
