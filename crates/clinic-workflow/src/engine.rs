//! 工作流引擎
//!
//! 协调预约状态机、支付状态机、可用时段管理和通知分发的核心引擎。
//! 所有权和角色检查在每次转换前完成；转换失败时记录保持不变。
//! 配置了持久化存储时，每次变更先写入存储再提交到内存。

use crate::{
    appointment::{AppointmentEvent, AppointmentStateMachine},
    availability::AvailabilityManager,
    payment::{PaymentEvent, PaymentStateMachine},
    statistics::PaymentStatistics,
    store::LifecycleStore,
};
use chrono::NaiveDate;
use clinic_core::{
    utils, Appointment, AppointmentStatus, ClinicError, Payment, PaymentMethod, PaymentStatus,
    Result, Role, TimeSlot,
};
use clinic_notify::{ClinicEvent, ClinicEventType, NotificationDispatcher, Recipient};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// 已认证的操作者
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// 支付处理请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaymentRequest {
    pub appointment_id: Uuid,
    pub payment_method: PaymentMethod,
    pub phone_number: Option<String>,
    pub card_last_digits: Option<String>,
}

/// 工作流引擎
///
/// 协调所有生命周期组件，提供统一的业务操作接口
pub struct ClinicEngine {
    appointment_sm: AppointmentStateMachine,
    payment_sm: PaymentStateMachine,
    availability: AvailabilityManager,
    appointments: HashMap<Uuid, Appointment>,
    payments: HashMap<Uuid, Payment>,
    appointment_payments: HashMap<Uuid, Vec<Uuid>>, // appointment_id -> payment_ids
    dispatcher: Arc<NotificationDispatcher>,
    store: Option<Arc<dyn LifecycleStore>>,
}

impl ClinicEngine {
    /// 创建新的工作流引擎
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            appointment_sm: AppointmentStateMachine::new(),
            payment_sm: PaymentStateMachine::new(),
            availability: AvailabilityManager::new(),
            appointments: HashMap::new(),
            payments: HashMap::new(),
            appointment_payments: HashMap::new(),
            dispatcher,
            store: None,
        }
    }

    /// 配置持久化存储
    pub fn set_store(&mut self, store: Arc<dyn LifecycleStore>) {
        self.store = Some(store);
    }

    // ========== 预约生命周期 ==========

    /// 患者创建预约
    ///
    /// 时段预订与预约创建同步完成；时段预订或存储写入失败时
    /// 不会产生预约记录，已占用的时段被释放
    pub async fn create_appointment(
        &mut self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        slot_index: usize,
        request_message: Option<String>,
    ) -> Result<Appointment> {
        let today = chrono::Utc::now().date_naive();
        if date <= today {
            return Err(ClinicError::Validation(format!(
                "Appointment date {} must be in the future",
                date
            )));
        }

        // 条件翻转：时段已被占用时在此处失败
        let slot = self.availability.book_slot(doctor_id, date, slot_index)?;

        let persisted_booking = match &self.store {
            Some(store) => store.book_slot(doctor_id, date, slot_index).await,
            None => Ok(()),
        };
        if let Err(e) = persisted_booking {
            self.availability.release_slot(doctor_id, date, slot_index);
            return Err(e);
        }

        let now = chrono::Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            appointment_date: date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            slot_index,
            status: AppointmentStatus::Pending,
            request_message,
            rejection_reason: None,
            consultation_fee: None,
            approval_notes: None,
            created_at: now,
            updated_at: now,
        };

        let persisted = match &self.store {
            Some(store) => store.insert_appointment(&appointment).await,
            None => Ok(()),
        };
        if let Err(e) = persisted {
            self.release_slot_everywhere(doctor_id, date, slot_index).await;
            return Err(e);
        }

        self.appointments.insert(appointment.id, appointment.clone());

        tracing::info!(
            "Created appointment {} for patient {} with doctor {} on {}",
            appointment.id,
            patient_id,
            doctor_id,
            date
        );

        self.notify(
            ClinicEventType::AppointmentRequested,
            vec![Recipient::new(doctor_id)],
            json!({
                "appointment_id": appointment.id,
                "patient_id": patient_id,
                "date": date,
            }),
        )
        .await;

        Ok(appointment)
    }

    /// 医生批准预约并设置诊费
    pub async fn approve_appointment(
        &mut self,
        doctor_id: Uuid,
        appointment_id: Uuid,
        consultation_fee: i64,
        approval_notes: Option<String>,
    ) -> Result<Appointment> {
        if consultation_fee < 0 {
            return Err(ClinicError::Validation(
                "Consultation fee must be non-negative".to_string(),
            ));
        }

        let current = Self::owned_appointment(&self.appointments, appointment_id, doctor_id)?;
        let expected = current.status.clone();
        let mut updated = current.clone();

        updated.status = self
            .appointment_sm
            .transition(&expected, &AppointmentEvent::Approved)?;
        updated.consultation_fee = Some(consultation_fee);
        updated.approval_notes = approval_notes;
        updated.updated_at = chrono::Utc::now();

        if let Some(store) = &self.store {
            store.update_appointment(&expected, &updated).await?;
        }
        self.appointments.insert(appointment_id, updated.clone());

        tracing::info!(
            "Appointment {} approved by doctor {} with fee {}",
            appointment_id,
            doctor_id,
            consultation_fee
        );

        self.notify(
            ClinicEventType::AppointmentApproved,
            vec![Recipient::new(updated.patient_id)],
            json!({
                "appointment_id": appointment_id,
                "consultation_fee": consultation_fee,
            }),
        )
        .await;

        Ok(updated)
    }

    /// 医生拒绝预约
    ///
    /// 终态；占用的时段被释放
    pub async fn reject_appointment(
        &mut self,
        doctor_id: Uuid,
        appointment_id: Uuid,
        rejection_reason: Option<String>,
    ) -> Result<Appointment> {
        let current = Self::owned_appointment(&self.appointments, appointment_id, doctor_id)?;
        let expected = current.status.clone();
        let mut updated = current.clone();

        updated.status = self
            .appointment_sm
            .transition(&expected, &AppointmentEvent::Rejected)?;
        updated.rejection_reason = rejection_reason;
        updated.updated_at = chrono::Utc::now();

        if let Some(store) = &self.store {
            store.update_appointment(&expected, &updated).await?;
        }
        self.appointments.insert(appointment_id, updated.clone());

        self.release_slot_everywhere(
            updated.doctor_id,
            updated.appointment_date,
            updated.slot_index,
        )
        .await;

        tracing::info!("Appointment {} rejected by doctor {}", appointment_id, doctor_id);

        self.notify(
            ClinicEventType::AppointmentRejected,
            vec![Recipient::new(updated.patient_id)],
            json!({
                "appointment_id": appointment_id,
                "reason": updated.rejection_reason,
            }),
        )
        .await;

        Ok(updated)
    }

    /// 医生标记就诊完成
    pub async fn complete_appointment(
        &mut self,
        doctor_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Appointment> {
        let current = Self::owned_appointment(&self.appointments, appointment_id, doctor_id)?;
        let expected = current.status.clone();
        let mut updated = current.clone();

        updated.status = self
            .appointment_sm
            .transition(&expected, &AppointmentEvent::Completed)?;
        updated.updated_at = chrono::Utc::now();

        if let Some(store) = &self.store {
            store.update_appointment(&expected, &updated).await?;
        }
        self.appointments.insert(appointment_id, updated.clone());

        tracing::info!("Appointment {} completed", appointment_id);

        self.notify(
            ClinicEventType::AppointmentCompleted,
            vec![Recipient::new(updated.patient_id)],
            json!({"appointment_id": appointment_id}),
        )
        .await;

        Ok(updated)
    }

    /// 取消已批准的预约
    ///
    /// 允许预约双方或管理员发起。终态；占用的时段被释放，
    /// 尚未结算的关联支付一并取消。
    pub async fn cancel_appointment(&mut self, actor: Actor, appointment_id: Uuid) -> Result<Appointment> {
        let current = self
            .appointments
            .get(&appointment_id)
            .ok_or_else(|| ClinicError::NotFound(format!("Appointment {} not found", appointment_id)))?;

        let is_party = actor.user_id == current.patient_id || actor.user_id == current.doctor_id;
        if !is_party && actor.role != Role::Admin {
            return Err(ClinicError::Permission(
                "Only the appointment parties or an admin may cancel".to_string(),
            ));
        }

        let expected = current.status.clone();
        let mut updated = current.clone();
        updated.status = self
            .appointment_sm
            .transition(&expected, &AppointmentEvent::Cancelled)?;
        updated.updated_at = chrono::Utc::now();

        if let Some(store) = &self.store {
            store.update_appointment(&expected, &updated).await?;
        }
        self.appointments.insert(appointment_id, updated.clone());

        self.release_slot_everywhere(
            updated.doctor_id,
            updated.appointment_date,
            updated.slot_index,
        )
        .await;

        // 待结算的支付随预约一起取消；已支付的走退款子流程
        let payment_ids = self
            .appointment_payments
            .get(&appointment_id)
            .cloned()
            .unwrap_or_default();
        for payment_id in payment_ids {
            let Some(payment) = self.payments.get(&payment_id) else {
                continue;
            };
            if payment.status != PaymentStatus::Pending {
                continue;
            }

            let mut cancelled = payment.clone();
            cancelled.status = self
                .payment_sm
                .transition(&PaymentStatus::Pending, &PaymentEvent::Cancelled)?;

            if let Some(store) = &self.store {
                store.update_payment(&PaymentStatus::Pending, &cancelled).await?;
            }
            self.payments.insert(payment_id, cancelled);

            tracing::info!("Payment {} cancelled with appointment {}", payment_id, appointment_id);
        }

        tracing::info!("Appointment {} cancelled by {:?}", appointment_id, actor.role);

        let other_party = if actor.user_id == updated.patient_id {
            updated.doctor_id
        } else {
            updated.patient_id
        };
        self.notify(
            ClinicEventType::AppointmentCancelled,
            vec![Recipient::new(other_party)],
            json!({"appointment_id": appointment_id}),
        )
        .await;

        Ok(updated)
    }

    // ========== 支付生命周期 ==========

    /// 患者发起支付
    ///
    /// 卡与钱包方式由模拟网关即时结算；到店支付保持待结算，
    /// 需要医生显式确认。
    pub async fn process_payment(
        &mut self,
        patient_id: Uuid,
        request: ProcessPaymentRequest,
    ) -> Result<Payment> {
        let appointment = self
            .appointments
            .get(&request.appointment_id)
            .ok_or_else(|| {
                ClinicError::NotFound(format!("Appointment {} not found", request.appointment_id))
            })?;

        if appointment.patient_id != patient_id {
            return Err(ClinicError::Permission(
                "Only the appointment patient may pay".to_string(),
            ));
        }

        if appointment.status != AppointmentStatus::Approved {
            return Err(ClinicError::InvalidStateTransition {
                from: format!("{:?}", appointment.status),
                event: "ProcessPayment".to_string(),
            });
        }

        let consultation_fee = appointment.consultation_fee.ok_or_else(|| {
            ClinicError::Internal(format!(
                "Approved appointment {} has no consultation fee",
                appointment.id
            ))
        })?;

        // 同一预约最多允许一笔未失败的支付
        if let Some(payment_ids) = self.appointment_payments.get(&request.appointment_id) {
            let has_active = payment_ids.iter().any(|id| {
                self.payments
                    .get(id)
                    .map(|p| p.status != PaymentStatus::Failed)
                    .unwrap_or(false)
            });
            if has_active {
                return Err(ClinicError::Validation(format!(
                    "Appointment {} already has an active payment",
                    request.appointment_id
                )));
            }
        }

        if request.payment_method.requires_phone_number() && request.phone_number.is_none() {
            return Err(ClinicError::Validation(format!(
                "Payment method {} requires a phone number",
                request.payment_method.as_str()
            )));
        }

        let now = chrono::Utc::now();
        let mut payment = Payment {
            id: Uuid::new_v4(),
            transaction_id: utils::generate_transaction_id(),
            invoice_number: utils::generate_invoice_number(),
            appointment_id: appointment.id,
            patient_id,
            doctor_id: appointment.doctor_id,
            amount: consultation_fee,
            payment_method: request.payment_method,
            status: PaymentStatus::Pending,
            phone_number: request.phone_number,
            card_last_digits: request.card_last_digits,
            refund_reason: None,
            refund_notes: None,
            refund_requested_at: None,
            refund_processed_at: None,
            refund_amount: None,
            transaction_date: now,
            created_at: now,
        };

        // 模拟网关：卡与钱包方式即时结算
        if payment.payment_method.settles_instantly() {
            payment.status = self
                .payment_sm
                .transition(&payment.status, &PaymentEvent::Settled)?;
            payment.transaction_date = chrono::Utc::now();
        }

        if let Some(store) = &self.store {
            store.insert_payment(&payment).await?;
        }

        let doctor_id = payment.doctor_id;
        self.payments.insert(payment.id, payment.clone());
        self.appointment_payments
            .entry(payment.appointment_id)
            .or_default()
            .push(payment.id);

        tracing::info!(
            "Payment {} created for appointment {} via {} ({:?})",
            payment.id,
            payment.appointment_id,
            payment.payment_method.as_str(),
            payment.status
        );

        self.notify(
            ClinicEventType::PaymentReceived,
            vec![Recipient::new(patient_id), Recipient::new(doctor_id)],
            json!({
                "payment_id": payment.id,
                "invoice_number": payment.invoice_number,
                "amount": payment.amount,
                "status": payment.status,
            }),
        )
        .await;

        Ok(payment)
    }

    /// 医生确认到店支付
    pub async fn confirm_clinic_visit_payment(
        &mut self,
        doctor_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .get(&payment_id)
            .ok_or_else(|| ClinicError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.doctor_id != doctor_id {
            return Err(ClinicError::Permission(
                "Only the appointment doctor may confirm this payment".to_string(),
            ));
        }

        if payment.payment_method != PaymentMethod::ClinicVisit {
            return Err(ClinicError::Validation(
                "Only clinic visit payments require confirmation".to_string(),
            ));
        }

        let expected = payment.status.clone();
        let mut updated = payment.clone();
        updated.status = self.payment_sm.transition(&expected, &PaymentEvent::Settled)?;
        updated.transaction_date = chrono::Utc::now();

        if let Some(store) = &self.store {
            store.update_payment(&expected, &updated).await?;
        }
        self.payments.insert(payment_id, updated.clone());

        tracing::info!("Clinic visit payment {} confirmed by doctor {}", payment_id, doctor_id);

        self.notify(
            ClinicEventType::PaymentConfirmed,
            vec![Recipient::new(updated.patient_id)],
            json!({"payment_id": payment_id}),
        )
        .await;

        Ok(updated)
    }

    /// 患者申请退款
    pub async fn request_refund(
        &mut self,
        patient_id: Uuid,
        payment_id: Uuid,
        reason: String,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .get(&payment_id)
            .ok_or_else(|| ClinicError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.patient_id != patient_id {
            return Err(ClinicError::Permission(
                "Only the paying patient may request a refund".to_string(),
            ));
        }

        let expected = payment.status.clone();
        let mut updated = payment.clone();
        updated.status = self
            .payment_sm
            .transition(&expected, &PaymentEvent::RefundRequested)?;
        updated.refund_reason = Some(reason);
        updated.refund_requested_at = Some(chrono::Utc::now());

        if let Some(store) = &self.store {
            store.update_payment(&expected, &updated).await?;
        }
        self.payments.insert(payment_id, updated.clone());

        tracing::info!("Refund requested for payment {}", payment_id);

        self.notify(
            ClinicEventType::RefundRequested,
            vec![Recipient::new(updated.doctor_id)],
            json!({
                "payment_id": payment_id,
                "reason": updated.refund_reason,
            }),
        )
        .await;

        Ok(updated)
    }

    /// 管理员裁决退款申请
    ///
    /// 批准时记录退款金额与处理时间；驳回时状态回到 Paid，
    /// 退款原因保留以供审计。裁决备注两种结果都记录。
    pub async fn process_refund(
        &mut self,
        payment_id: Uuid,
        approve: bool,
        admin_notes: Option<String>,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .get(&payment_id)
            .ok_or_else(|| ClinicError::NotFound(format!("Payment {} not found", payment_id)))?;

        let event = if approve {
            PaymentEvent::RefundApproved
        } else {
            PaymentEvent::RefundRejected
        };

        let expected = payment.status.clone();
        let mut updated = payment.clone();
        updated.status = self.payment_sm.transition(&expected, &event)?;
        updated.refund_notes = admin_notes;

        if approve {
            updated.refund_amount = Some(updated.amount);
            updated.refund_processed_at = Some(chrono::Utc::now());
        }

        if let Some(store) = &self.store {
            store.update_payment(&expected, &updated).await?;
        }
        self.payments.insert(payment_id, updated.clone());

        tracing::info!(
            "Refund for payment {} {}",
            payment_id,
            if approve { "approved" } else { "rejected" }
        );

        self.notify(
            ClinicEventType::RefundProcessed,
            vec![Recipient::new(updated.patient_id)],
            json!({
                "payment_id": payment_id,
                "approved": approve,
            }),
        )
        .await;

        Ok(updated)
    }

    // ========== 可用时段管理 ==========

    /// 医生新增某一天的时段列表
    pub async fn add_availability(
        &mut self,
        doctor_id: Uuid,
        date: NaiveDate,
        slots: Vec<TimeSlot>,
    ) -> Result<()> {
        self.availability.add_day(doctor_id, date, slots.clone())?;

        let persisted = match &self.store {
            Some(store) => store.insert_availability(doctor_id, date, &slots).await,
            None => Ok(()),
        };
        if let Err(e) = persisted {
            let _ = self.availability.delete_day(doctor_id, date);
            return Err(e);
        }

        Ok(())
    }

    /// 医生替换某一天的时段列表
    pub async fn replace_availability(
        &mut self,
        doctor_id: Uuid,
        date: NaiveDate,
        slots: Vec<TimeSlot>,
    ) -> Result<()> {
        let previous = self
            .availability
            .get_day(doctor_id, date)
            .map(|day| day.slots.clone());

        self.availability.replace_day(doctor_id, date, slots.clone())?;

        let persisted = match &self.store {
            Some(store) => store.replace_availability(doctor_id, date, &slots).await,
            None => Ok(()),
        };
        if let Err(e) = persisted {
            if let Some(previous) = previous {
                let _ = self.availability.replace_day(doctor_id, date, previous);
            }
            return Err(e);
        }

        Ok(())
    }

    /// 医生删除某一天的时段列表
    pub async fn delete_availability(&mut self, doctor_id: Uuid, date: NaiveDate) -> Result<()> {
        let previous = self
            .availability
            .get_day(doctor_id, date)
            .map(|day| day.slots.clone());

        self.availability.delete_day(doctor_id, date)?;

        let persisted = match &self.store {
            Some(store) => store.delete_availability(doctor_id, date).await,
            None => Ok(()),
        };
        if let Err(e) = persisted {
            if let Some(previous) = previous {
                let _ = self.availability.add_day(doctor_id, date, previous);
            }
            return Err(e);
        }

        Ok(())
    }

    // ========== 查询与统计 ==========

    /// 获取预约
    pub fn get_appointment(&self, appointment_id: Uuid) -> Option<&Appointment> {
        self.appointments.get(&appointment_id)
    }

    /// 获取支付记录
    pub fn get_payment(&self, payment_id: Uuid) -> Option<&Payment> {
        self.payments.get(&payment_id)
    }

    /// 按操作者角色列出可见的预约
    pub fn list_appointments(&self, actor: Actor) -> Vec<&Appointment> {
        let mut appointments: Vec<&Appointment> = self
            .appointments
            .values()
            .filter(|a| match actor.role {
                Role::Patient => a.patient_id == actor.user_id,
                Role::Doctor => a.doctor_id == actor.user_id,
                Role::Admin => true,
            })
            .collect();
        appointments.sort_by_key(|a| (a.appointment_date, a.start_time));
        appointments
    }

    /// 支付统计（管理员只读）
    pub fn payment_statistics(&self) -> PaymentStatistics {
        let payments: Vec<Payment> = self.payments.values().cloned().collect();
        PaymentStatistics::compute(&payments)
    }

    /// 获取可用时段管理器
    pub fn availability(&self) -> &AvailabilityManager {
        &self.availability
    }

    /// 获取通知分发器
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    // ========== 内部辅助 ==========

    /// 按医生所有权取出预约
    fn owned_appointment(
        appointments: &HashMap<Uuid, Appointment>,
        appointment_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<&Appointment> {
        let appointment = appointments
            .get(&appointment_id)
            .ok_or_else(|| ClinicError::NotFound(format!("Appointment {} not found", appointment_id)))?;

        if appointment.doctor_id != doctor_id {
            return Err(ClinicError::Permission(
                "Appointment belongs to another doctor".to_string(),
            ));
        }

        Ok(appointment)
    }

    /// 同时释放内存与存储中的时段
    ///
    /// 内存释放本身是静默的；存储释放失败只记录日志
    async fn release_slot_everywhere(
        &mut self,
        doctor_id: Uuid,
        date: NaiveDate,
        slot_index: usize,
    ) {
        self.availability.release_slot(doctor_id, date, slot_index);

        if let Some(store) = &self.store {
            if let Err(e) = store.release_slot(doctor_id, date, slot_index).await {
                tracing::warn!(
                    "Failed to release stored slot {} for doctor {} on {}: {}",
                    slot_index,
                    doctor_id,
                    date,
                    e
                );
            }
        }
    }

    /// 派发通知，投递失败不影响主流程
    async fn notify(
        &self,
        event_type: ClinicEventType,
        recipients: Vec<Recipient>,
        data: serde_json::Value,
    ) {
        self.dispatcher
            .dispatch(ClinicEvent::new(event_type, recipients, data))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};
    use std::sync::Mutex;

    fn engine() -> ClinicEngine {
        ClinicEngine::new(Arc::new(NotificationDispatcher::new()))
    }

    fn future_date() -> NaiveDate {
        chrono::Utc::now().date_naive() + Duration::days(7)
    }

    fn slot(start: &str, end: &str) -> TimeSlot {
        TimeSlot::new(
            NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
        )
    }

    async fn booked_appointment(engine: &mut ClinicEngine) -> (Uuid, Uuid, Appointment) {
        let patient_id = Uuid::new_v4();
        let doctor_id = Uuid::new_v4();
        let date = future_date();

        engine
            .add_availability(doctor_id, date, vec![slot("09:00", "09:30"), slot("10:00", "10:30")])
            .await
            .unwrap();

        let appointment = engine
            .create_appointment(patient_id, doctor_id, date, 0, None)
            .await
            .unwrap();

        (patient_id, doctor_id, appointment)
    }

    /// 记录每次写入的测试存储
    #[derive(Default)]
    struct RecordingStore {
        ops: Mutex<Vec<String>>,
        fail_insert_appointment: bool,
    }

    impl RecordingStore {
        fn record(&self, op: &str) {
            self.ops.lock().unwrap().push(op.to_string());
        }

        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl LifecycleStore for RecordingStore {
        async fn insert_appointment(&self, _appointment: &Appointment) -> Result<()> {
            if self.fail_insert_appointment {
                return Err(ClinicError::Database("insert failed".to_string()));
            }
            self.record("insert_appointment");
            Ok(())
        }

        async fn update_appointment(
            &self,
            _expected: &AppointmentStatus,
            appointment: &Appointment,
        ) -> Result<()> {
            self.record(&format!("update_appointment:{:?}", appointment.status));
            Ok(())
        }

        async fn insert_payment(&self, _payment: &Payment) -> Result<()> {
            self.record("insert_payment");
            Ok(())
        }

        async fn update_payment(&self, _expected: &PaymentStatus, payment: &Payment) -> Result<()> {
            self.record(&format!("update_payment:{:?}", payment.status));
            Ok(())
        }

        async fn insert_availability(
            &self,
            _doctor_id: Uuid,
            _date: NaiveDate,
            _slots: &[TimeSlot],
        ) -> Result<()> {
            self.record("insert_availability");
            Ok(())
        }

        async fn replace_availability(
            &self,
            _doctor_id: Uuid,
            _date: NaiveDate,
            _slots: &[TimeSlot],
        ) -> Result<()> {
            self.record("replace_availability");
            Ok(())
        }

        async fn delete_availability(&self, _doctor_id: Uuid, _date: NaiveDate) -> Result<()> {
            self.record("delete_availability");
            Ok(())
        }

        async fn book_slot(
            &self,
            _doctor_id: Uuid,
            _date: NaiveDate,
            _slot_index: usize,
        ) -> Result<()> {
            self.record("book_slot");
            Ok(())
        }

        async fn release_slot(
            &self,
            _doctor_id: Uuid,
            _date: NaiveDate,
            _slot_index: usize,
        ) -> Result<()> {
            self.record("release_slot");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        assert_eq!(appointment.status, AppointmentStatus::Pending);

        // 医生批准，诊费 2000
        let approved = engine
            .approve_appointment(doctor_id, appointment.id, 2000, None)
            .await
            .unwrap();
        assert_eq!(approved.status, AppointmentStatus::Approved);
        assert_eq!(approved.consultation_fee, Some(2000));

        // 患者用信用卡支付
        let payment = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::CreditCard,
                    phone_number: None,
                    card_last_digits: Some("4242".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.amount, 2000);

        // 患者申请退款
        let requested = engine
            .request_refund(patient_id, payment.id, "schedule conflict".to_string())
            .await
            .unwrap();
        assert_eq!(requested.status, PaymentStatus::RefundRequested);

        // 管理员批准退款
        let refunded = engine.process_refund(payment.id, true, None).await.unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.refund_amount, Some(2000));
        assert!(refunded.refund_processed_at.is_some());
    }

    #[tokio::test]
    async fn test_double_approve_fails_and_keeps_fee() {
        let mut engine = engine();
        let (_, doctor_id, appointment) = booked_appointment(&mut engine).await;

        engine
            .approve_appointment(doctor_id, appointment.id, 2000, None)
            .await
            .unwrap();

        let second = engine
            .approve_appointment(doctor_id, appointment.id, 9999, None)
            .await;
        assert!(second.is_err());

        // 诊费保持首次批准的值
        let stored = engine.get_appointment(appointment.id).unwrap();
        assert_eq!(stored.consultation_fee, Some(2000));
    }

    #[tokio::test]
    async fn test_wrong_doctor_cannot_approve() {
        let mut engine = engine();
        let (_, _, appointment) = booked_appointment(&mut engine).await;

        let other_doctor = Uuid::new_v4();
        let result = engine
            .approve_appointment(other_doctor, appointment.id, 2000, None)
            .await;
        assert!(matches!(result, Err(ClinicError::Permission(_))));

        // 记录保持不变
        let stored = engine.get_appointment(appointment.id).unwrap();
        assert_eq!(stored.status, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_payment_requires_approved_appointment() {
        let mut engine = engine();
        let (patient_id, _, appointment) = booked_appointment(&mut engine).await;

        let result = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::CreditCard,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(ClinicError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_double_payment_rejected() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 1500, None)
            .await
            .unwrap();

        let request = ProcessPaymentRequest {
            appointment_id: appointment.id,
            payment_method: PaymentMethod::DebitCard,
            phone_number: None,
            card_last_digits: None,
        };
        engine.process_payment(patient_id, request.clone()).await.unwrap();

        let second = engine.process_payment(patient_id, request).await;
        assert!(matches!(second, Err(ClinicError::Validation(_))));
    }

    #[tokio::test]
    async fn test_wallet_payment_requires_phone() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 1500, None)
            .await
            .unwrap();

        let result = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::JazzCash,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await;
        assert!(matches!(result, Err(ClinicError::Validation(_))));
    }

    #[tokio::test]
    async fn test_clinic_visit_requires_doctor_confirmation() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 1000, None)
            .await
            .unwrap();

        let payment = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::ClinicVisit,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await
            .unwrap();
        // 到店支付不会即时结算
        assert_eq!(payment.status, PaymentStatus::Pending);

        let confirmed = engine
            .confirm_clinic_visit_payment(doctor_id, payment.id)
            .await
            .unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_refund_rejection_returns_to_paid_and_keeps_reason() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 1000, None)
            .await
            .unwrap();

        let payment = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::CreditCard,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await
            .unwrap();

        engine
            .request_refund(patient_id, payment.id, "changed my mind".to_string())
            .await
            .unwrap();

        let rejected = engine.process_refund(payment.id, false, None).await.unwrap();
        assert_eq!(rejected.status, PaymentStatus::Paid);
        // 原因保留以供审计
        assert_eq!(rejected.refund_reason.as_deref(), Some("changed my mind"));
        assert!(rejected.refund_amount.is_none());
    }

    #[tokio::test]
    async fn test_refund_decision_records_admin_notes() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 1000, None)
            .await
            .unwrap();

        let payment = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::CreditCard,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await
            .unwrap();

        engine
            .request_refund(patient_id, payment.id, "duplicate charge".to_string())
            .await
            .unwrap();

        let refunded = engine
            .process_refund(payment.id, true, Some("verified against gateway log".to_string()))
            .await
            .unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(
            refunded.refund_notes.as_deref(),
            Some("verified against gateway log")
        );
    }

    #[tokio::test]
    async fn test_refund_on_pending_payment_fails() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 1000, None)
            .await
            .unwrap();

        let payment = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::ClinicVisit,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await
            .unwrap();

        let result = engine
            .request_refund(patient_id, payment.id, "too early".to_string())
            .await;
        assert!(matches!(
            result,
            Err(ClinicError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_releases_slot_and_pending_payment() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 1000, None)
            .await
            .unwrap();

        let payment = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::ClinicVisit,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await
            .unwrap();

        let cancelled = engine
            .cancel_appointment(Actor::new(patient_id, Role::Patient), appointment.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

        // 时段被释放，可再次预订
        let day = engine
            .availability()
            .get_day(doctor_id, appointment.appointment_date)
            .unwrap();
        assert!(!day.slots[appointment.slot_index].is_booked);

        // 待结算支付随之取消
        let stored = engine.get_payment(payment.id).unwrap();
        assert_eq!(stored.status, PaymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_by_stranger_is_forbidden() {
        let mut engine = engine();
        let (_, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 1000, None)
            .await
            .unwrap();

        let stranger = Actor::new(Uuid::new_v4(), Role::Patient);
        let result = engine.cancel_appointment(stranger, appointment.id).await;
        assert!(matches!(result, Err(ClinicError::Permission(_))));
    }

    #[tokio::test]
    async fn test_create_appointment_in_past_fails() {
        let mut engine = engine();
        let doctor_id = Uuid::new_v4();
        let yesterday = chrono::Utc::now().date_naive() - Duration::days(1);

        let result = engine
            .create_appointment(Uuid::new_v4(), doctor_id, yesterday, 0, None)
            .await;
        assert!(matches!(result, Err(ClinicError::Validation(_))));
    }

    #[tokio::test]
    async fn test_booked_slot_cannot_be_double_booked() {
        let mut engine = engine();
        let (_, doctor_id, appointment) = booked_appointment(&mut engine).await;

        let result = engine
            .create_appointment(
                Uuid::new_v4(),
                doctor_id,
                appointment.appointment_date,
                appointment.slot_index,
                None,
            )
            .await;
        assert!(matches!(result, Err(ClinicError::Validation(_))));
    }

    #[tokio::test]
    async fn test_payment_amount_matches_fee() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 3200, None)
            .await
            .unwrap();

        let payment = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::Easypaisa,
                    phone_number: Some("03001234567".to_string()),
                    card_last_digits: None,
                },
            )
            .await
            .unwrap();

        let fee = engine
            .get_appointment(appointment.id)
            .unwrap()
            .consultation_fee
            .unwrap();
        assert_eq!(payment.amount, fee);
    }

    #[tokio::test]
    async fn test_statistics_over_engine_payments() {
        let mut engine = engine();
        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 2000, None)
            .await
            .unwrap();
        engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::CreditCard,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await
            .unwrap();

        let stats = engine.payment_statistics();
        assert_eq!(stats.total_payments, 1);
        assert_eq!(stats.paid_total, 2000);
        assert_eq!(stats.net_revenue, 2000);
    }

    #[tokio::test]
    async fn test_store_receives_lifecycle_writes() {
        let store = Arc::new(RecordingStore::default());
        let mut engine = engine();
        engine.set_store(store.clone());

        let (patient_id, doctor_id, appointment) = booked_appointment(&mut engine).await;
        engine
            .approve_appointment(doctor_id, appointment.id, 2000, None)
            .await
            .unwrap();
        let payment = engine
            .process_payment(
                patient_id,
                ProcessPaymentRequest {
                    appointment_id: appointment.id,
                    payment_method: PaymentMethod::CreditCard,
                    phone_number: None,
                    card_last_digits: None,
                },
            )
            .await
            .unwrap();
        engine
            .request_refund(patient_id, payment.id, "schedule conflict".to_string())
            .await
            .unwrap();
        engine.process_refund(payment.id, true, None).await.unwrap();

        let ops = store.ops();
        assert_eq!(
            ops,
            vec![
                "insert_availability",
                "book_slot",
                "insert_appointment",
                "update_appointment:Approved",
                "insert_payment",
                "update_payment:RefundRequested",
                "update_payment:Refunded",
            ]
        );
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_slot_booking() {
        let store = Arc::new(RecordingStore {
            fail_insert_appointment: true,
            ..Default::default()
        });
        let mut engine = engine();
        engine.set_store(store);

        let doctor_id = Uuid::new_v4();
        let date = future_date();
        engine
            .add_availability(doctor_id, date, vec![slot("09:00", "09:30")])
            .await
            .unwrap();

        let result = engine
            .create_appointment(Uuid::new_v4(), doctor_id, date, 0, None)
            .await;
        assert!(matches!(result, Err(ClinicError::Database(_))));

        // 写入失败后时段回到未预订状态
        let day = engine.availability().get_day(doctor_id, date).unwrap();
        assert!(!day.slots[0].is_booked);
    }

    #[tokio::test]
    async fn test_delete_availability_with_booking_is_rejected() {
        let mut engine = engine();
        let (_, doctor_id, appointment) = booked_appointment(&mut engine).await;

        let result = engine
            .delete_availability(doctor_id, appointment.appointment_date)
            .await;
        assert!(matches!(result, Err(ClinicError::Validation(_))));
    }
}
