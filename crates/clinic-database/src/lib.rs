//! # Clinic Database
//!
//! 预约与支付记录的持久化层，基于sqlx/PostgreSQL。
//! 时段预订在SQL层面同样是条件更新，不存在先读后写的竞态窗口。

pub mod connection;
pub mod models;
pub mod queries;
pub mod store;

pub use connection::DatabasePool;
pub use queries::DatabaseQueries;
pub use store::DatabaseStore;
