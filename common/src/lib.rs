//! 数据库桥接代理公共模块
//!
//! 包含配置加载、统一错误类型、响应体、中间件、数据模型与 SQL 方言工具。

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
