//! 用户认证和授权系统
//!
//! 登录建立会话并签发不透明令牌，登出销毁会话；
//! 受保护路由通过中间件验证令牌并注入当前用户。

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use clinic_core::{ClinicError, Result, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::handlers::{ApiError, ApiResult};
use crate::server::AppState;

/// 用户信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_login: Option<chrono::DateTime<chrono::Utc>>,
}

/// 注入到请求扩展中的已认证用户
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    /// 角色检查
    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.role != role {
            return Err(ClinicError::Permission(format!(
                "{} access required",
                role.as_str()
            )));
        }
        Ok(())
    }
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// 用户信息（不包含敏感数据）
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            is_active: user.is_active,
        }
    }
}

/// 会话信息
#[derive(Debug, Clone)]
struct Session {
    username: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// 认证服务
pub struct AuthService {
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, Session>>,
    session_expiry_hours: i64,
}

impl AuthService {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            session_expiry_hours: 24,
        }
    }

    /// 初始化默认用户
    pub async fn init_default_users(&self) {
        let default_users = vec![
            User {
                id: Uuid::new_v4(),
                username: "admin".to_string(),
                email: "admin@clinic.local".to_string(),
                name: "System Administrator".to_string(),
                role: Role::Admin,
                is_active: true,
                created_at: chrono::Utc::now(),
                last_login: None,
            },
            User {
                id: Uuid::new_v4(),
                username: "doctor".to_string(),
                email: "doctor@clinic.local".to_string(),
                name: "Dr. Smith".to_string(),
                role: Role::Doctor,
                is_active: true,
                created_at: chrono::Utc::now(),
                last_login: None,
            },
            User {
                id: Uuid::new_v4(),
                username: "patient".to_string(),
                email: "patient@clinic.local".to_string(),
                name: "John Doe".to_string(),
                role: Role::Patient,
                is_active: true,
                created_at: chrono::Utc::now(),
                last_login: None,
            },
        ];

        let mut users = self.users.write().await;
        for user in default_users {
            // 注意：实际应用中应该使用安全的密码哈希
            // 这里为了演示使用明文密码
            users.insert(user.username.clone(), user);
        }

        info!("Initialized default users for clinic system");
    }

    /// 注册用户
    pub async fn add_user(&self, user: User) {
        self.users.write().await.insert(user.username.clone(), user);
    }

    /// 用户登录，建立会话
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let mut users = self.users.write().await;

        let user = users
            .get_mut(&request.username)
            .ok_or_else(|| ClinicError::Validation("Invalid username or password".to_string()))?;

        if !user.is_active {
            return Err(ClinicError::Validation("Account is disabled".to_string()));
        }

        // 注意：演示环境，密码等于用户名
        if request.password != user.username {
            return Err(ClinicError::Validation(
                "Invalid username or password".to_string(),
            ));
        }

        user.last_login = Some(chrono::Utc::now());
        let user_info = UserInfo::from(&*user);
        let username = user.username.clone();
        drop(users);

        let token = Uuid::new_v4().to_string();
        let expires_at = chrono::Utc::now() + chrono::Duration::hours(self.session_expiry_hours);
        self.sessions.write().await.insert(
            token.clone(),
            Session {
                username,
                expires_at,
            },
        );

        Ok(LoginResponse {
            token,
            user: user_info,
            expires_at,
        })
    }

    /// 登出，销毁会话
    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// 验证令牌并返回当前用户
    pub async fn verify_token(&self, token: &str) -> Result<AuthUser> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions
                .get(token)
                .cloned()
                .ok_or_else(|| ClinicError::Permission("Invalid token".to_string()))?
        };

        if session.expires_at < chrono::Utc::now() {
            self.sessions.write().await.remove(token);
            return Err(ClinicError::Permission("Token has expired".to_string()));
        }

        let users = self.users.read().await;
        let user = users
            .get(&session.username)
            .ok_or_else(|| ClinicError::Permission("User not found".to_string()))?;

        if !user.is_active {
            return Err(ClinicError::Permission("Account is disabled".to_string()));
        }

        Ok(AuthUser {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        })
    }

    /// 获取所有用户（管理员功能）
    pub async fn get_all_users(&self) -> Vec<User> {
        self.users.read().await.values().cloned().collect()
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new()
    }
}

/// 认证中间件
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    // 从请求头获取token
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return Err(ClinicError::Permission("Missing token".to_string()).into());
        }
    };

    let user = state.auth.verify_token(token).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("Login attempt for user: {}", request.username);

    match state.auth.login(request).await {
        Ok(response) => {
            info!("User logged in successfully: {}", response.user.username);
            Ok(Json(response))
        }
        Err(e) => {
            warn!("Login failed: {}", e);
            Err(e.into())
        }
    }
}

/// 登出处理器
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> ApiResult<impl IntoResponse> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ClinicError::Permission("Missing token".to_string()))?;

    state.auth.logout(token).await;
    Ok(Json(serde_json::json!({"logged_out": true})))
}

/// 获取当前用户信息
pub async fn get_current_user(Extension(user): Extension<AuthUser>) -> ApiResult<impl IntoResponse> {
    Ok(Json(serde_json::json!({
        "id": user.id,
        "username": user.username,
        "role": user.role,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service_with_defaults() -> AuthService {
        let service = AuthService::new();
        service.init_default_users().await;
        service
    }

    #[tokio::test]
    async fn test_login_and_verify() {
        let service = service_with_defaults().await;

        let response = service
            .login(LoginRequest {
                username: "doctor".to_string(),
                password: "doctor".to_string(),
            })
            .await
            .unwrap();

        let user = service.verify_token(&response.token).await.unwrap();
        assert_eq!(user.role, Role::Doctor);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let service = service_with_defaults().await;

        let result = service
            .login(LoginRequest {
                username: "doctor".to_string(),
                password: "wrong".to_string(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let service = service_with_defaults().await;

        let response = service
            .login(LoginRequest {
                username: "patient".to_string(),
                password: "patient".to_string(),
            })
            .await
            .unwrap();

        assert!(service.logout(&response.token).await);
        assert!(service.verify_token(&response.token).await.is_err());
    }

    #[tokio::test]
    async fn test_role_check() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            username: "patient".to_string(),
            role: Role::Patient,
        };

        assert!(user.require_role(Role::Patient).is_ok());
        assert!(user.require_role(Role::Admin).is_err());
    }
}
