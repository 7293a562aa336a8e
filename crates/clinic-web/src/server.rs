//! Web服务器

use axum::{
    routing::{get, post, put},
    Router,
};
use clinic_core::Result;
use clinic_notify::NotificationDispatcher;
use clinic_workflow::ClinicEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::{
    auth_middleware, get_current_user, login_handler, logout_handler, AuthService,
};
use crate::handlers::{
    add_availability, api_root, approve_appointment, cancel_appointment, complete_appointment,
    confirm_payment, create_appointment, delete_availability, health, list_appointments,
    list_availability, payment_statistics, process_payment, process_refund, reject_appointment,
    replace_availability, request_refund,
};

/// 共享应用状态
pub struct AppState {
    pub engine: RwLock<ClinicEngine>,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            engine: RwLock::new(ClinicEngine::new(dispatcher)),
            auth: AuthService::new(),
        }
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>) -> Self {
        let app = Self::create_app(state);
        Self { addr, app }
    }

    fn create_app(state: Arc<AppState>) -> Router {
        // 需要认证的路由
        let protected = Router::new()
            .route("/auth/me", get(get_current_user))
            .route("/auth/logout", post(logout_handler))
            .nest("/api", api_routes())
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            ));

        Router::new()
            // 认证路由（无需token）
            .route("/auth/login", post(login_handler))
            // 根路径
            .route("/", get(api_root))
            // 健康检查
            .route("/health", get(health))
            .merge(protected)
            .with_state(state)
            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| clinic_core::ClinicError::Internal(format!("Web server failed: {}", e)))?;

        Ok(())
    }
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // 预约生命周期
        .route("/appointments", post(create_appointment).get(list_appointments))
        .route("/appointments/:id/approve", put(approve_appointment))
        .route("/appointments/:id/reject", put(reject_appointment))
        .route("/appointments/:id/complete", put(complete_appointment))
        .route("/appointments/:id/cancel", put(cancel_appointment))
        // 支付生命周期
        .route("/payments/process", post(process_payment))
        .route("/payments/:id/confirm", put(confirm_payment))
        .route("/payments/:id/refund-request", post(request_refund))
        .route("/payments/admin/:id/process-refund", put(process_refund))
        .route("/payments/admin/statistics", get(payment_statistics))
        // 医生可用时段
        .route("/availability", get(list_availability).post(add_availability))
        .route("/availability/:date", put(replace_availability).delete(delete_availability))
}
