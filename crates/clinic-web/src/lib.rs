//! # Clinic Web
//!
//! REST接口层：认证、角色与所有权检查、生命周期操作的HTTP处理器

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{AuthService, AuthUser};
pub use handlers::{ApiError, ApiResult};
pub use server::{AppState, WebServer};
