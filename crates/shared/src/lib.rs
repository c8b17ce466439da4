//! 共享库
//!
//! 通知分发服务的基础设施代码：配置加载、错误分类、数据库连接池、
//! Kafka 消费封装以及日志与指标的初始化。

pub mod config;
pub mod database;
pub mod error;
pub mod kafka;
pub mod observability;
