//! # Clinic Admin
//!
//! 系统管理模块，提供配置管理功能

pub mod config;

pub use config::{ClinicConfig, ConfigManager};
