//! HTTP处理器

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{NaiveDate, NaiveTime};
use clinic_core::{ClinicError, Role, TimeSlot};
use clinic_workflow::{Actor, ProcessPaymentRequest};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::server::AppState;

/// HTTP层错误包装
///
/// 领域错误在此处映射为带JSON体的HTTP响应
#[derive(Debug)]
pub struct ApiError(pub ClinicError);

/// HTTP处理器统一结果类型
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<ClinicError> for ApiError {
    fn from(error: ClinicError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self.0 {
            ClinicError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ClinicError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ClinicError::Permission(msg) => (StatusCode::FORBIDDEN, msg),
            ClinicError::InvalidStateTransition { .. } => {
                (StatusCode::CONFLICT, self.0.to_string())
            }
            ClinicError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        let body = Json(json!({
            "error": true,
            "message": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Clinic Web API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "auth": "/auth",
            "api": "/api"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

// ========== 预约处理器 ==========

/// 创建预约请求体
#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub slot_index: usize,
    pub request_message: Option<String>,
}

/// 创建预约（患者）
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateAppointmentRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Patient)?;

    let mut engine = state.engine.write().await;
    let appointment = engine
        .create_appointment(
            user.id,
            request.doctor_id,
            request.appointment_date,
            request.slot_index,
            request.request_message,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

/// 按角色列出可见的预约
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let engine = state.engine.read().await;
    let appointments: Vec<_> = engine
        .list_appointments(Actor::new(user.id, user.role))
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

/// 审批请求体
#[derive(Debug, Deserialize)]
pub struct ApproveAppointmentRequest {
    pub consultation_fee: i64,
    pub approval_notes: Option<String>,
}

/// 批准预约（医生）
pub async fn approve_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<ApproveAppointmentRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Doctor)?;

    let mut engine = state.engine.write().await;
    let appointment = engine
        .approve_appointment(user.id, id, request.consultation_fee, request.approval_notes)
        .await?;

    Ok(Json(appointment))
}

/// 拒绝请求体
#[derive(Debug, Deserialize)]
pub struct RejectAppointmentRequest {
    pub rejection_reason: Option<String>,
}

/// 拒绝预约（医生）
pub async fn reject_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectAppointmentRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Doctor)?;

    let mut engine = state.engine.write().await;
    let appointment = engine
        .reject_appointment(user.id, id, request.rejection_reason)
        .await?;

    Ok(Json(appointment))
}

/// 标记就诊完成（医生）
pub async fn complete_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Doctor)?;

    let mut engine = state.engine.write().await;
    let appointment = engine.complete_appointment(user.id, id).await?;

    Ok(Json(appointment))
}

/// 取消预约（预约双方或管理员）
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let mut engine = state.engine.write().await;
    let appointment = engine
        .cancel_appointment(Actor::new(user.id, user.role), id)
        .await?;

    Ok(Json(appointment))
}

// ========== 支付处理器 ==========

/// 发起支付（患者）
pub async fn process_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ProcessPaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Patient)?;

    let mut engine = state.engine.write().await;
    let payment = engine.process_payment(user.id, request).await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

/// 确认到店支付（医生）
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Doctor)?;

    let mut engine = state.engine.write().await;
    let payment = engine.confirm_clinic_visit_payment(user.id, id).await?;

    Ok(Json(payment))
}

/// 退款申请请求体
#[derive(Debug, Deserialize)]
pub struct RefundRequestBody {
    pub reason: String,
}

/// 申请退款（患者）
pub async fn request_refund(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundRequestBody>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Patient)?;

    let mut engine = state.engine.write().await;
    let payment = engine.request_refund(user.id, id, request.reason).await?;

    Ok(Json(payment))
}

/// 退款裁决请求体
#[derive(Debug, Deserialize)]
pub struct ProcessRefundRequest {
    pub approve: bool,
    pub notes: Option<String>,
}

/// 裁决退款申请（管理员）
pub async fn process_refund(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProcessRefundRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Admin)?;

    let mut engine = state.engine.write().await;
    let payment = engine
        .process_refund(id, request.approve, request.notes)
        .await?;

    Ok(Json(payment))
}

/// 支付统计（管理员）
pub async fn payment_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Admin)?;

    let engine = state.engine.read().await;
    Ok(Json(engine.payment_statistics()))
}

// ========== 可用时段处理器 ==========

/// 时段请求体
#[derive(Debug, Deserialize)]
pub struct SlotBody {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// 可用时段请求体
#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub date: NaiveDate,
    pub slots: Vec<SlotBody>,
}

impl AvailabilityRequest {
    fn into_slots(self) -> (NaiveDate, Vec<TimeSlot>) {
        let slots = self
            .slots
            .into_iter()
            .map(|slot| TimeSlot::new(slot.start_time, slot.end_time))
            .collect();
        (self.date, slots)
    }
}

/// 查询自己的可用时段（医生）
pub async fn list_availability(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Doctor)?;

    let engine = state.engine.read().await;
    let days: Vec<_> = engine
        .availability()
        .list_days(user.id)
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(json!({
        "days": days,
        "total": days.len(),
    })))
}

/// 新增可用时段（医生）
pub async fn add_availability(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<AvailabilityRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Doctor)?;

    let (date, slots) = request.into_slots();
    let mut engine = state.engine.write().await;
    engine.add_availability(user.id, date, slots).await?;

    Ok((StatusCode::CREATED, Json(json!({"date": date}))))
}

/// 替换某一天的时段列表（医生）
pub async fn replace_availability(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(date): Path<NaiveDate>,
    Json(slots): Json<Vec<SlotBody>>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Doctor)?;

    let slots: Vec<TimeSlot> = slots
        .into_iter()
        .map(|slot| TimeSlot::new(slot.start_time, slot.end_time))
        .collect();

    let mut engine = state.engine.write().await;
    engine.replace_availability(user.id, date, slots).await?;

    Ok(Json(json!({"date": date})))
}

/// 删除某一天的时段列表（医生）
pub async fn delete_availability(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(date): Path<NaiveDate>,
) -> ApiResult<impl IntoResponse> {
    user.require_role(Role::Doctor)?;

    let mut engine = state.engine.write().await;
    engine.delete_availability(user.id, date).await?;

    Ok(Json(json!({"deleted": date})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                ClinicError::NotFound("appointment".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                ClinicError::Validation("bad slot".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ClinicError::Permission("doctor access required".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                ClinicError::InvalidStateTransition {
                    from: "Pending".to_string(),
                    event: "Completed".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                ClinicError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
